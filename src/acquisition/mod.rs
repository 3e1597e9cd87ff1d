
//! Code-delay / Doppler search.
//!
//! An acquisition engine consumes dwells of baseband samples and either
//! reports a coarse code/Doppler estimate or declares the search failed.
//! Failure is reported, never retried internally; the channel state machine
//! decides what to do next.

use num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::config::AcquisitionConfig;
use crate::replica::ReplicaCode;
use crate::Error;

pub mod pcps;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionResult {
	pub prn: usize,
	pub detected: bool,
	pub doppler_hz: f64,
	pub doppler_step_hz: f64,
	/// Peak location in samples from the start of the first dwell, modulo one code period
	pub code_phase_samples: usize,
	pub code_delay_chips: f64,
	/// Peak-to-noise-floor ratio the detection decision was made on
	pub test_statistic: f64,
	pub threshold: f64,
	pub dwells_used: usize,
	/// Stream index of the first sample of the first dwell
	pub sample_idx: usize,
}

pub trait AcquisitionEngine: Send {

	/// Samples consumed by one dwell
	fn dwell_len(&self) -> usize;

	/// Processes exactly one dwell.  Returns `Some` once the search is decided,
	/// either way, and `None` while more dwells are needed.
	fn dwell(&mut self, samples: &[Complex<f64>], start_idx: usize) -> Result<Option<AcquisitionResult>, Error>;

	/// Best candidate so far.  The detection flag requires the threshold
	/// beaten at a peak that has held still across consecutive dwells.
	fn verdict(&self) -> AcquisitionResult;

	/// Discards all accumulated search state
	fn reset(&mut self);

	/// One-shot search over a block of samples.  The caller must supply at
	/// least one full dwell; anything short of that is a contract violation.
	fn search(&mut self, samples: &[Complex<f64>], start_idx: usize) -> Result<AcquisitionResult, Error> {
		let n = self.dwell_len();
		if samples.len() < n { return Err(Error::InvalidInput("acquisition input shorter than one dwell")); }

		for (i, chunk) in samples.chunks_exact(n).enumerate() {
			if let Some(result) = self.dwell(chunk, start_idx + i * n)? {
				return Ok(result);
			}
		}
		Ok(self.verdict())
	}

}

/// Acquisition factory, keyed by the configuration's method string
pub fn make_acquisition(cfg: &AcquisitionConfig, replica: &ReplicaCode, fs: f64) -> Result<Box<dyn AcquisitionEngine>, Error> {
	match cfg.method.as_str() {
		"pcps" => Ok(Box::new(pcps::PcpsAcquisition::new(cfg, replica, fs)?)),
		_ => Err(Error::UnknownImplementation("acquisition method")),
	}
}
