
//! Carrier-aided DLL/PLL tracking with early, prompt, and late correlators.
//!
//! The loop integrates sample by sample and closes both loops once per code
//! period.  Pull-in runs with wide noise bandwidths; once the lock detector
//! confirms, both filters are retuned to their steady-state bandwidths.  The
//! code NCO is slaved to the carrier estimate so the DLL only has to absorb
//! what carrier aiding leaves behind.

use std::f64::consts;

use log::debug;
use num_complex::Complex;

use crate::acquisition::AcquisitionResult;
use crate::config::{CarrierDiscriminator, TrackingConfig};
use crate::constants::{CHIP_RATE_HZ, CODE_LENGTH_CHIPS, CODE_PERIOD_SEC, L1_HZ};
use crate::replica::ReplicaCode;
use crate::tracking::{discriminators, TrackingEpoch, TrackingLoop, TrackingResult, TrackingSnapshot};
use crate::tracking::lock_detector::{Cn0Estimator, LockDetector, LockEvent};
use crate::tracking::loop_filter::LoopFilter;
use crate::{Error, Sample};

pub struct DllPllTracking {
	prn: usize,
	fs: f64,
	local_code: Vec<Complex<f64>>,
	spacing_chips: f64,
	discriminator: CarrierDiscriminator,

	carrier: Complex<f64>,
	carrier_inc: Complex<f64>,
	carrier_freq_hz: f64,
	carrier_phase_cycles: f64,

	code_phase_chips: f64,
	code_dphase: f64,
	code_freq_chips_s: f64,
	dll_nco_chips_s: f64,

	pll_filter: LoopFilter,
	dll_filter: LoopFilter,

	sum_early: Complex<f64>,
	sum_prompt: Complex<f64>,
	sum_late: Complex<f64>,
	prev_prompt: Complex<f64>,

	cn0: Cn0Estimator,
	lock: LockDetector,
	cn0_db_hz: f64,

	pll_bw_narrow_hz: f64,
	dll_bw_narrow_hz: f64,
	pll_bw_wide_hz: f64,
	dll_bw_wide_hz: f64,
	loop_damping: f64,
	max_carrier_step_hz: f64,
	max_code_step_chips_s: f64,
	narrowed: bool,

	initialized: bool,
	lost: bool,
}

const ZERO:Complex<f64> = Complex{ re: 0.0, im: 0.0 };

impl DllPllTracking {

	pub fn new(cfg: &TrackingConfig, replica: &ReplicaCode, fs: f64) -> Result<Self, Error> {
		if cfg.correlator_spacing_chips <= 0.0 || cfg.correlator_spacing_chips >= 1.0 {
			return Err(Error::InvalidInput("correlator spacing outside (0, 1) chips"));
		}
		if fs < 2.0 * CHIP_RATE_HZ {
			return Err(Error::InvalidInput("sampling rate below two samples per chip"));
		}

		Ok(Self{
			prn: replica.prn,
			fs,
			local_code: replica.chips_complex(),
			spacing_chips: cfg.correlator_spacing_chips,
			discriminator: cfg.carrier_discriminator,
			carrier: Complex{ re: 1.0, im: 0.0 },
			carrier_inc: Complex{ re: 1.0, im: 0.0 },
			carrier_freq_hz: 0.0,
			carrier_phase_cycles: 0.0,
			code_phase_chips: 0.0,
			code_dphase: CHIP_RATE_HZ / fs,
			code_freq_chips_s: CHIP_RATE_HZ,
			dll_nco_chips_s: 0.0,
			pll_filter: LoopFilter::new(cfg.pll_bw_wide_hz, cfg.loop_damping, 0.25, CODE_PERIOD_SEC),
			dll_filter: LoopFilter::new(cfg.dll_bw_wide_hz, cfg.loop_damping, 1.0, CODE_PERIOD_SEC),
			sum_early: ZERO,
			sum_prompt: ZERO,
			sum_late: ZERO,
			prev_prompt: ZERO,
			cn0: Cn0Estimator::new(cfg.cn0_window_epochs, CODE_PERIOD_SEC, cfg.cn0_smoothing_alpha),
			lock: LockDetector::new(cfg.cn0_threshold_db_hz, cfg.lock_confirm_epochs, cfg.loss_of_lock_epochs),
			cn0_db_hz: 0.0,
			pll_bw_narrow_hz: cfg.pll_bw_narrow_hz,
			dll_bw_narrow_hz: cfg.dll_bw_narrow_hz,
			pll_bw_wide_hz: cfg.pll_bw_wide_hz,
			dll_bw_wide_hz: cfg.dll_bw_wide_hz,
			loop_damping: cfg.loop_damping,
			max_carrier_step_hz: cfg.max_carrier_step_hz,
			max_code_step_chips_s: cfg.max_code_step_chips_s,
			narrowed: false,
			initialized: false,
			lost: false,
		})
	}

	fn code_index(&self, offset_chips: f64) -> usize {
		let idx = (self.code_phase_chips + offset_chips).floor() as isize;
		idx.rem_euclid(CODE_LENGTH_CHIPS as isize) as usize
	}

	fn set_carrier_freq(&mut self, freq_hz: f64) {
		self.carrier_freq_hz = freq_hz;
		let dphase_rad = (2.0 * consts::PI * freq_hz) / self.fs;
		self.carrier_inc = Complex{ re: dphase_rad.cos(), im: -dphase_rad.sin() };
	}

	fn close_loops(&mut self) {
		// Carrier loop
		let err_cycles = match self.discriminator {
			CarrierDiscriminator::CostasAtan => discriminators::costas_atan(self.sum_prompt),
			CarrierDiscriminator::Atan2 => discriminators::atan2(self.sum_prompt),
			// Frequency error folded into the equivalent per-interval phase error
			CarrierDiscriminator::FllCross =>
				discriminators::fll_cross(self.prev_prompt, self.sum_prompt, CODE_PERIOD_SEC) * CODE_PERIOD_SEC,
		};
		let carrier_step = self.pll_filter.apply(err_cycles)
			.clamp(-self.max_carrier_step_hz, self.max_carrier_step_hz);
		self.set_carrier_freq(self.carrier_freq_hz + carrier_step);

		// Code loop, carrier-aided
		let err_chips = discriminators::dll_early_late(self.sum_early, self.sum_late);
		let code_step = self.dll_filter.apply(err_chips)
			.clamp(-self.max_code_step_chips_s, self.max_code_step_chips_s);
		self.dll_nco_chips_s += code_step;
		self.code_freq_chips_s = CHIP_RATE_HZ * (1.0 + self.carrier_freq_hz / L1_HZ) + self.dll_nco_chips_s;
		self.code_dphase = self.code_freq_chips_s / self.fs;

		// Keep the carrier rotator on the unit circle
		let norm = self.carrier.norm();
		if norm > 0.0 { self.carrier = self.carrier / norm; }
	}

	fn supervise_lock(&mut self) -> Option<LockEvent> {
		let event = match self.cn0.update(self.sum_prompt) {
			Some(cn0) => {
				self.cn0_db_hz = cn0;
				self.lock.update(cn0)
			},
			None => None,
		};
		if let Some(LockEvent::Confirmed) = event {
			if !self.narrowed {
				self.pll_filter.set_bandwidth(self.pll_bw_narrow_hz);
				self.dll_filter.set_bandwidth(self.dll_bw_narrow_hz);
				self.narrowed = true;
				debug!("PRN {}: lock confirmed at {:.1} dB-Hz, narrowing loop bandwidths", self.prn, self.cn0_db_hz);
			}
		}
		event
	}

}

impl TrackingLoop for DllPllTracking {

	fn initialize(&mut self, acq: &AcquisitionResult) {
		self.carrier = Complex{ re: 1.0, im: 0.0 };
		self.carrier_phase_cycles = 0.0;
		self.set_carrier_freq(acq.doppler_hz);

		self.code_phase_chips = 0.0;
		self.dll_nco_chips_s = 0.0;
		self.code_freq_chips_s = CHIP_RATE_HZ * (1.0 + acq.doppler_hz / L1_HZ);
		self.code_dphase = self.code_freq_chips_s / self.fs;

		self.pll_filter = LoopFilter::new(self.pll_bw_wide_hz, self.loop_damping, 0.25, CODE_PERIOD_SEC);
		self.dll_filter = LoopFilter::new(self.dll_bw_wide_hz, self.loop_damping, 1.0, CODE_PERIOD_SEC);

		self.sum_early = ZERO;
		self.sum_prompt = ZERO;
		self.sum_late = ZERO;
		self.prev_prompt = ZERO;

		self.cn0.reset();
		self.lock.reset();
		self.cn0_db_hz = 0.0;
		self.narrowed = false;
		self.initialized = true;
		self.lost = false;
	}

	fn apply(&mut self, sample: &Sample) -> TrackingResult {
		if !self.initialized { return TrackingResult::Err(Error::NotAcquired); }
		if self.lost { return TrackingResult::Err(Error::LossOfLock); }

		// Carrier wipeoff
		self.carrier = self.carrier * self.carrier_inc;
		self.carrier_phase_cycles += self.carrier_freq_hz / self.fs;
		let x = sample.val * self.carrier;

		self.sum_early  += self.local_code[self.code_index(-self.spacing_chips)] * x;
		self.sum_prompt += self.local_code[self.code_index(0.0)] * x;
		self.sum_late   += self.local_code[self.code_index(self.spacing_chips)] * x;

		self.code_phase_chips += self.code_dphase;
		if self.code_phase_chips < CODE_LENGTH_CHIPS as f64 { return TrackingResult::NotReady; }

		// Code period rollover: close both loops and emit an epoch
		self.code_phase_chips -= CODE_LENGTH_CHIPS as f64;
		self.close_loops();
		let event = self.supervise_lock();

		let prompt = self.sum_prompt;
		self.prev_prompt = self.sum_prompt;
		self.sum_early = ZERO;
		self.sum_prompt = ZERO;
		self.sum_late = ZERO;

		if let Some(LockEvent::Lost) = event {
			self.lost = true;
			debug!("PRN {}: loss of lock at {:.1} dB-Hz", self.prn, self.cn0_db_hz);
			return TrackingResult::Err(Error::LossOfLock);
		}

		TrackingResult::Epoch(TrackingEpoch{
			prompt,
			sample_idx: sample.idx,
			carrier_freq_hz: self.carrier_freq_hz,
			code_freq_chips_s: self.code_freq_chips_s,
			carrier_phase_cycles: self.carrier_phase_cycles,
			cn0_db_hz: self.cn0_db_hz,
			locked: self.lock.locked(),
		})
	}

	fn locked(&self) -> bool { self.lock.locked() }

	fn cn0_db_hz(&self) -> f64 { self.cn0_db_hz }

	fn snapshot(&self) -> TrackingSnapshot {
		TrackingSnapshot{
			carrier_freq_hz: self.carrier_freq_hz,
			code_freq_chips_s: self.code_freq_chips_s,
			code_phase_chips: self.code_phase_chips,
			carrier_phase_cycles: self.carrier_phase_cycles,
			cn0_db_hz: self.cn0_db_hz,
			locked: self.lock.locked(),
		}
	}

}

#[cfg(test)]
mod tests {

	use std::f64::consts;

	use num_complex::Complex;

	use crate::config::TrackingConfig;
	use crate::constants::{CHIP_RATE_HZ, L1_HZ};
	use crate::replica::ReplicaCode;
	use crate::{Error, Sample};
	use super::*;

	const FS:f64 = 2.046e6;

	fn fake_acquisition(prn: usize, doppler_hz: f64) -> AcquisitionResult {
		AcquisitionResult{
			prn, detected: true,
			doppler_hz, doppler_step_hz: 250.0,
			code_phase_samples: 0, code_delay_chips: 0.0,
			test_statistic: 30.0, threshold: 12.0,
			dwells_used: 1, sample_idx: 0,
		}
	}

	// Data-modulated signal starting at a code-period boundary
	fn synth(code: &ReplicaCode, doppler_hz: f64, n: usize, bits: &[f64]) -> Vec<Complex<f64>> {
		let code_rate = CHIP_RATE_HZ * (1.0 + doppler_hz / L1_HZ);
		(0..n).map(|i| {
			let t = (i as f64) / FS;
			let chips = t * code_rate;
			let chip = code.chip(chips.floor() as usize) as f64;
			let bit = bits[((chips / (20.0 * 1023.0)).floor() as usize) % bits.len()];
			let phase = 2.0 * consts::PI * doppler_hz * t;
			Complex{ re: phase.cos(), im: phase.sin() } * chip * bit
		}).collect()
	}

	fn track(loop_: &mut DllPllTracking, signal: &[Complex<f64>], start_idx: usize) -> (Vec<TrackingEpoch>, Option<Error>) {
		let mut epochs = vec![];
		for (i, val) in signal.iter().enumerate() {
			match loop_.apply(&Sample{ val: *val, idx: start_idx + i }) {
				TrackingResult::NotReady => {},
				TrackingResult::Epoch(e) => epochs.push(e),
				TrackingResult::Err(e) => return (epochs, Some(e)),
			}
		}
		(epochs, None)
	}

	#[test]
	fn pulls_in_and_locks_on_clean_signal() {
		let code = ReplicaCode::new(7).unwrap();
		let mut trk = DllPllTracking::new(&TrackingConfig::default(), &code, FS).unwrap();
		// 50 Hz of initial Doppler error, as a coarse acquisition would leave
		trk.initialize(&fake_acquisition(7, 1150.0));

		let bits = [1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, -1.0];
		let signal = synth(&code, 1200.0, (0.3 * FS) as usize, &bits);
		let (epochs, err) = track(&mut trk, &signal, 0);

		assert!(err.is_none());
		// One epoch per millisecond, give or take the partial period at the end
		assert!(epochs.len() >= 298 && epochs.len() <= 301, "{} epochs", epochs.len());

		let last = epochs.last().unwrap();
		assert!(last.locked);
		assert!((last.carrier_freq_hz - 1200.0).abs() < 5.0, "carrier at {:.1} Hz", last.carrier_freq_hz);
		assert!(last.cn0_db_hz > 45.0, "CN0 at {:.1} dB-Hz", last.cn0_db_hz);
		// Carrier aiding keeps the code rate consistent with the Doppler estimate
		let aided = CHIP_RATE_HZ * (1.0 + last.carrier_freq_hz / L1_HZ);
		assert!((last.code_freq_chips_s - aided).abs() < 1.0);

		let snap = trk.snapshot();
		assert!(snap.locked);
		assert!((snap.carrier_freq_hz - last.carrier_freq_hz).abs() < 1.0e-9);
		let json = serde_json::to_string(&snap).unwrap();
		assert!(json.contains("carrier_freq_hz"));
	}

	#[test]
	fn prompt_sign_follows_data_bits() {
		let code = ReplicaCode::new(3).unwrap();
		let mut trk = DllPllTracking::new(&TrackingConfig::default(), &code, FS).unwrap();
		trk.initialize(&fake_acquisition(3, 500.0));

		let bits = [1.0, -1.0];
		let signal = synth(&code, 500.0, (0.2 * FS) as usize, &bits);
		let (epochs, err) = track(&mut trk, &signal, 0);
		assert!(err.is_none());

		// Once converged the prompt flips sign every 20 epochs
		let tail = &epochs[epochs.len() - 40..];
		let first_half:f64 = tail[..20].iter().map(|e| e.prompt.re.signum()).sum();
		let second_half:f64 = tail[20..].iter().map(|e| e.prompt.re.signum()).sum();
		assert_eq!(first_half.abs(), 20.0);
		assert_eq!(second_half.abs(), 20.0);
		assert!(first_half * second_half < 0.0);
	}

	#[test]
	fn reports_loss_of_lock_when_signal_vanishes() {
		let code = ReplicaCode::new(12).unwrap();
		let mut trk = DllPllTracking::new(&TrackingConfig::default(), &code, FS).unwrap();
		trk.initialize(&fake_acquisition(12, -800.0));

		let signal = synth(&code, -800.0, (0.2 * FS) as usize, &[1.0, -1.0, 1.0]);
		let (_, err) = track(&mut trk, &signal, 0);
		assert!(err.is_none());
		assert!(trk.locked());

		let silence = vec![Complex{ re: 0.0, im: 0.0 }; (0.1 * FS) as usize];
		let (_, err) = track(&mut trk, &silence, signal.len());
		assert_eq!(err, Some(Error::LossOfLock));
		assert!(!trk.locked());

		// The loop stays in the failed state until reinitialized
		match trk.apply(&Sample{ val: Complex{ re: 1.0, im: 0.0 }, idx: 0 }) {
			TrackingResult::Err(Error::LossOfLock) => {},
			other => panic!("expected loss of lock, got {:?}", other),
		}
	}

	#[test]
	fn apply_before_initialize_is_rejected() {
		let code = ReplicaCode::new(1).unwrap();
		let mut trk = DllPllTracking::new(&TrackingConfig::default(), &code, FS).unwrap();
		match trk.apply(&Sample{ val: Complex{ re: 1.0, im: 0.0 }, idx: 0 }) {
			TrackingResult::Err(Error::NotAcquired) => {},
			other => panic!("expected NotAcquired, got {:?}", other),
		}
	}

	#[test]
	fn rejects_bad_construction_parameters() {
		let code = ReplicaCode::new(1).unwrap();
		let mut cfg = TrackingConfig::default();
		cfg.correlator_spacing_chips = 1.5;
		assert!(DllPllTracking::new(&cfg, &code, FS).is_err());
		assert!(DllPllTracking::new(&TrackingConfig::default(), &code, 1.0e6).is_err());
	}

}
