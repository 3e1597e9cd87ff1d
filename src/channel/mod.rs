
//! Per-satellite channel state machine.
//!
//! A channel owns one acquisition engine, one tracking loop, and one
//! telemetry decoder, and sequences them: search, align to a code-period
//! boundary, pull in, track, decode.  Failures fall back to acquisition
//! until the retry budget runs out, after which the channel idles and its
//! PRN can be reassigned.

use log::{debug, info};
use num_complex::Complex;

use crate::acquisition::{self, AcquisitionEngine, AcquisitionResult};
use crate::config::ChannelConfig;
use crate::constants::CODE_PERIOD_SEC;
use crate::observables::Observable;
use crate::pvt::ephemeris::Ephemeris;
use crate::replica::ReplicaCode;
use crate::telemetry::{self, TelemetryDecoder, TelemetryUpdate};
use crate::telemetry::subframe::Subframe;
use crate::tracking::{self, TrackingLoop, TrackingResult};
use crate::{Error, Sample, SampleBlock};

pub mod assignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
	Acquisition,
	/// Skipping samples to start tracking on a code-period boundary
	PullIn(usize),
	Tracking,
	/// Retry budget exhausted; waiting for reassignment
	Idle,
}

#[derive(Debug)]
pub enum ChannelResult {
	NotReady,
	Acquired{ doppler_hz: f64, code_phase_samples: usize, test_statistic: f64 },
	AcquisitionFailed,
	Subframe(Subframe),
	Err(Error),
}

pub struct Channel {
	pub prn: usize,
	pub fs: f64,
	cfg: ChannelConfig,
	state: ChannelState,
	acq: Box<dyn AcquisitionEngine>,
	trk: Box<dyn TrackingLoop>,
	tlm: Box<dyn TelemetryDecoder>,
	samples_per_code: usize,
	/// First sample index not yet consumed; blocks behind it are rejected
	consumed_idx: usize,
	dwell_buffer: Vec<Complex<f64>>,
	dwell_start_idx: usize,
	retries_left: usize,
	epochs_since_init: usize,
	ephemeris: Option<Ephemeris>,
	tow_sec: Option<f64>,
	last_observable: Option<Observable>,
}

impl Channel {

	pub fn new(cfg: ChannelConfig) -> Result<Self, Error> {
		let replica = ReplicaCode::new(cfg.prn)?;
		let acq = acquisition::make_acquisition(&cfg.acquisition, &replica, cfg.fs)?;
		let trk = tracking::make_tracking(&cfg.tracking, &replica, cfg.fs)?;
		let tlm = telemetry::make_telemetry(&cfg.telemetry)?;
		let samples_per_code = (cfg.fs * CODE_PERIOD_SEC).round() as usize;

		Ok(Self{
			prn: cfg.prn,
			fs: cfg.fs,
			retries_left: cfg.retry_budget,
			cfg,
			state: ChannelState::Acquisition,
			acq, trk, tlm,
			samples_per_code,
			consumed_idx: 0,
			dwell_buffer: vec![],
			dwell_start_idx: 0,
			epochs_since_init: 0,
			ephemeris: None,
			tow_sec: None,
			last_observable: None,
		})
	}

	pub fn state(&self) -> ChannelState { self.state }
	pub fn locked(&self) -> bool { self.trk.locked() }
	pub fn cn0_db_hz(&self) -> f64 { self.trk.cn0_db_hz() }
	pub fn ephemeris(&self) -> Option<Ephemeris> { self.ephemeris }
	pub fn tow_sec(&self) -> Option<f64> { self.tow_sec }

	/// Latest per-epoch measurement snapshot, present once both the
	/// transmitted time and an ephemeris are known
	pub fn observable(&self) -> Option<Observable> { self.last_observable.clone() }

	/// Back to acquisition with a fresh retry budget.  Decoded ephemerides
	/// survive; measurement state does not.  Calling this on an
	/// already-reset channel changes nothing.
	pub fn reset(&mut self) {
		self.state = ChannelState::Acquisition;
		self.acq.reset();
		self.dwell_buffer.clear();
		self.tlm.reset();
		self.retries_left = self.cfg.retry_budget;
		self.epochs_since_init = 0;
		self.tow_sec = None;
		self.last_observable = None;
	}

	pub fn apply(&mut self, s: Sample) -> ChannelResult {
		match self.state {
			ChannelState::Idle => ChannelResult::NotReady,
			ChannelState::Acquisition => self.apply_acquisition(s),
			ChannelState::PullIn(n) => {
				self.state = if n <= 1 { ChannelState::Tracking } else { ChannelState::PullIn(n - 1) };
				ChannelResult::NotReady
			},
			ChannelState::Tracking => self.apply_tracking(s),
		}
	}

	/// Runs a whole block through the channel and collects the notable
	/// results, dropping the per-sample `NotReady` chatter
	pub fn process_block(&mut self, block: &SampleBlock) -> Vec<ChannelResult> {
		if block.start_idx < self.consumed_idx {
			return vec![ChannelResult::Err(Error::InvalidInput("sample block precedes data already consumed"))];
		}
		self.consumed_idx = block.end_idx();

		let mut results = vec![];
		for s in block.iter() {
			match self.apply(s) {
				ChannelResult::NotReady => {},
				r => results.push(r),
			}
		}
		results
	}

	fn apply_acquisition(&mut self, s: Sample) -> ChannelResult {
		if self.dwell_buffer.is_empty() { self.dwell_start_idx = s.idx; }
		self.dwell_buffer.push(s.val);
		if self.dwell_buffer.len() < self.acq.dwell_len() { return ChannelResult::NotReady; }

		let dwell = match self.acq.dwell(&self.dwell_buffer, self.dwell_start_idx) {
			Ok(d) => d,
			Err(e) => return ChannelResult::Err(e),
		};
		self.dwell_buffer.clear();

		match dwell {
			None => ChannelResult::NotReady,
			Some(result) if result.detected => {
				info!("PRN {}: acquired at {:+.0} Hz, code phase {} samples, statistic {:.1}",
					self.prn, result.doppler_hz, result.code_phase_samples, result.test_statistic);
				self.start_tracking(&result, s.idx + 1);
				ChannelResult::Acquired{
					doppler_hz: result.doppler_hz,
					code_phase_samples: result.code_phase_samples,
					test_statistic: result.test_statistic,
				}
			},
			Some(_) => {
				self.acq.reset();
				if self.retries_left == 0 {
					debug!("PRN {}: search failed, retry budget exhausted", self.prn);
					self.state = ChannelState::Idle;
				} else {
					self.retries_left -= 1;
				}
				ChannelResult::AcquisitionFailed
			},
		}
	}

	fn start_tracking(&mut self, result: &AcquisitionResult, next_idx: usize) {
		self.trk.initialize(result);
		self.epochs_since_init = 0;
		self.retries_left = self.cfg.retry_budget;

		// Samples to skip so the loop starts exactly on a code-period boundary
		let boundary = result.sample_idx + result.code_phase_samples;
		let into_period = (next_idx - boundary) % self.samples_per_code;
		let skip = (self.samples_per_code - into_period) % self.samples_per_code;
		self.state = if skip == 0 { ChannelState::Tracking } else { ChannelState::PullIn(skip) };
	}

	fn apply_tracking(&mut self, s: Sample) -> ChannelResult {
		let epoch = match self.trk.apply(&s) {
			TrackingResult::NotReady => return ChannelResult::NotReady,
			TrackingResult::Err(e) => return self.handle_failure(e),
			TrackingResult::Epoch(e) => e,
		};

		self.epochs_since_init += 1;
		if !epoch.locked && self.epochs_since_init > self.cfg.pull_in_timeout_epochs {
			return self.handle_failure(Error::LossOfLock);
		}

		// Transmitted time advances exactly one code period per epoch
		if let Some(tow) = &mut self.tow_sec { *tow += CODE_PERIOD_SEC; }

		let result = match self.tlm.apply(epoch.prompt, epoch.sample_idx) {
			Ok(TelemetryUpdate::Progress) => ChannelResult::NotReady,
			Ok(TelemetryUpdate::Subframe{ subframe, ephemeris, .. }) => {
				self.tow_sec = Some(subframe.time_of_week());
				if let Some(eph) = ephemeris {
					info!("PRN {}: new ephemeris, IODC {}", self.prn, eph.iodc);
					self.ephemeris = Some(eph);
				}
				ChannelResult::Subframe(subframe)
			},
			Err(e) => {
				// Frame sync is gone but the code-epoch count is not
				// trustworthy either; stop stamping observables until the
				// next subframe
				self.tow_sec = None;
				self.last_observable = None;
				ChannelResult::Err(e)
			},
		};

		if let (Some(tow), Some(eph)) = (self.tow_sec, self.ephemeris.as_ref()) {
			self.last_observable = Some(Observable{
				prn: self.prn,
				rx_time_s: (epoch.sample_idx as f64) / self.fs,
				tx_tow_sec: tow,
				doppler_hz: epoch.carrier_freq_hz,
				carrier_phase_cycles: epoch.carrier_phase_cycles,
				cn0_db_hz: epoch.cn0_db_hz,
				ephemeris: *eph,
			});
		}

		result
	}

	fn handle_failure(&mut self, e: Error) -> ChannelResult {
		self.tow_sec = None;
		self.last_observable = None;
		self.tlm.reset();
		if self.retries_left > 0 {
			self.retries_left -= 1;
			debug!("PRN {}: {}, back to acquisition ({} retries left)", self.prn, e, self.retries_left);
			self.state = ChannelState::Acquisition;
			self.acq.reset();
			self.dwell_buffer.clear();
		} else {
			debug!("PRN {}: {}, channel going idle", self.prn, e);
			self.state = ChannelState::Idle;
		}
		ChannelResult::Err(e)
	}

}
