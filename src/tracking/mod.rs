
//! Closed-loop code and carrier tracking.
//!
//! A tracking loop consumes one sample at a time and produces one epoch per
//! code period once the accumulators roll over.  All loop state is private;
//! the channel sees epochs, the lock flag, and the CN0 estimate.

use num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::acquisition::AcquisitionResult;
use crate::config::TrackingConfig;
use crate::replica::ReplicaCode;
use crate::{Error, Sample};

pub mod discriminators;
pub mod dll_pll;
pub mod lock_detector;
pub mod loop_filter;

/// One code period's worth of correlation, emitted when the code phase
/// accumulator wraps
#[derive(Debug, Clone, Copy)]
pub struct TrackingEpoch {
	pub prompt: Complex<f64>,
	/// Stream index of the sample that closed the epoch
	pub sample_idx: usize,
	pub carrier_freq_hz: f64,
	pub code_freq_chips_s: f64,
	/// Accumulated carrier phase since initialization
	pub carrier_phase_cycles: f64,
	pub cn0_db_hz: f64,
	pub locked: bool,
}

#[derive(Debug)]
pub enum TrackingResult {
	NotReady,
	Epoch(TrackingEpoch),
	Err(Error),
}

/// Loop internals for logging and post-run analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSnapshot {
	pub carrier_freq_hz: f64,
	pub code_freq_chips_s: f64,
	pub code_phase_chips: f64,
	pub carrier_phase_cycles: f64,
	pub cn0_db_hz: f64,
	pub locked: bool,
}

pub trait TrackingLoop: Send {

	/// Arms the loop from a coarse acquisition estimate.  The caller is
	/// responsible for starting the sample feed at a code-period boundary.
	fn initialize(&mut self, acq: &AcquisitionResult);

	fn apply(&mut self, sample: &Sample) -> TrackingResult;

	fn locked(&self) -> bool;

	fn cn0_db_hz(&self) -> f64;

	fn snapshot(&self) -> TrackingSnapshot;

}

/// Tracking factory, keyed by the configuration's method string
pub fn make_tracking(cfg: &TrackingConfig, replica: &ReplicaCode, fs: f64) -> Result<Box<dyn TrackingLoop>, Error> {
	match cfg.method.as_str() {
		"dll_pll" => Ok(Box::new(dll_pll::DllPllTracking::new(cfg, replica, fs)?)),
		_ => Err(Error::UnknownImplementation("tracking method")),
	}
}
