
//! Parallel code-phase search acquisition.
//!
//! For each Doppler bin the incoming dwell is carrier-wiped, transformed with
//! an FFT, multiplied by the conjugate replica spectrum and transformed back,
//! which evaluates every code-phase hypothesis of that bin at once.  Dwells
//! accumulate non-coherently into a detection grid.  A detection requires
//! the grid peak to hold still across two consecutive dwells; a dwell that
//! straddles the signal onset can put a strong peak in the wrong bin.

use std::f64::consts;
use std::sync::Arc;

use log::debug;
use num_complex::Complex;
use num_traits::Zero;
use rustfft::{Fft, FftPlanner};

use crate::config::AcquisitionConfig;
use crate::replica::ReplicaCode;
use crate::Error;

pub struct PcpsAcquisition {
	pub prn: usize,
	pub fs: f64,
	pub threshold: f64,
	doppler_bins: Vec<f64>,
	doppler_step_hz: f64,
	max_dwells: usize,
	dwells_done: usize,
	len_fft: usize,
	samples_per_code: usize,
	chips_per_sample: f64,
	fft: Arc<dyn Fft<f64>>,
	ifft: Arc<dyn Fft<f64>>,
	replica_fft_conj: Vec<Complex<f64>>,
	// Non-coherent power accumulation, one row per Doppler bin
	grid: Vec<Vec<f64>>,
	first_dwell_idx: usize,
	// Grid peak of the previous dwell, (bin, cell)
	prev_peak: Option<(usize, usize)>,
	confirmed: bool,
}

impl PcpsAcquisition {

	pub fn new(cfg: &AcquisitionConfig, replica: &ReplicaCode, fs: f64) -> Result<Self, Error> {
		if cfg.false_alarm_prob <= 0.0 || cfg.false_alarm_prob >= 1.0 {
			return Err(Error::InvalidInput("false alarm probability outside (0, 1)"));
		}
		if cfg.doppler_step_hz <= 0.0 || cfg.coherent_code_periods == 0 || cfg.max_dwells == 0 {
			return Err(Error::InvalidInput("degenerate acquisition configuration"));
		}

		let one_code = replica.sampled_complex(fs);
		let samples_per_code = one_code.len();
		let len_fft = samples_per_code * cfg.coherent_code_periods;

		let mut planner = FftPlanner::new();
		let fft = planner.plan_fft_forward(len_fft);
		let ifft = planner.plan_fft_inverse(len_fft);

		let mut replica_time:Vec<Complex<f64>> = Vec::with_capacity(len_fft);
		for _ in 0..cfg.coherent_code_periods {
			replica_time.extend_from_slice(&one_code);
		}
		fft.process(&mut replica_time);
		let replica_fft_conj:Vec<Complex<f64>> = replica_time.iter().map(|p| p.conj()).collect();

		let mut doppler_bins:Vec<f64> = vec![];
		let mut freq = -cfg.doppler_max_hz;
		while freq <= cfg.doppler_max_hz + 1.0e-9 {
			doppler_bins.push(freq);
			freq += cfg.doppler_step_hz;
		}

		// Exponential noise-floor model: the probability that any of the
		// grid's cells exceeds gamma times the mean cell power is roughly
		// n_cells * exp(-gamma), so gamma follows from the configured Pfa.
		let n_cells = (len_fft * doppler_bins.len()) as f64;
		let threshold = (n_cells / cfg.false_alarm_prob).ln();

		let grid = vec![vec![0.0; len_fft]; doppler_bins.len()];

		Ok(Self{
			prn: replica.prn, fs, threshold,
			doppler_bins, doppler_step_hz: cfg.doppler_step_hz,
			max_dwells: cfg.max_dwells, dwells_done: 0,
			len_fft, samples_per_code,
			chips_per_sample: replica.chip_rate_hz / fs,
			fft, ifft, replica_fft_conj,
			grid, first_dwell_idx: 0,
			prev_peak: None, confirmed: false,
		})
	}

	/// Peak cell and the mean of the cells in its row more than a chip away
	fn peak_and_floor(&self) -> (f64, usize, usize) {
		let mut peak = 0.0;
		let mut peak_bin = 0;
		let mut peak_cell = 0;
		for (bin, row) in self.grid.iter().enumerate() {
			for (cell, p) in row.iter().enumerate() {
				if *p > peak {
					peak = *p;
					peak_bin = bin;
					peak_cell = cell;
				}
			}
		}

		let guard = (1.0 / self.chips_per_sample).ceil() as usize;
		let row = &self.grid[peak_bin];
		let mut floor_sum = 0.0;
		let mut floor_n = 0usize;
		for (cell, p) in row.iter().enumerate() {
			let dist = {
				let d = if cell > peak_cell { cell - peak_cell } else { peak_cell - cell };
				d.min(self.len_fft - d)
			};
			if dist > guard {
				floor_sum += *p;
				floor_n += 1;
			}
		}
		let floor = if floor_n > 0 { floor_sum / (floor_n as f64) } else { f64::MIN_POSITIVE };
		// A silent grid has no peak to test and must score zero, not infinity
		let stat = if peak == 0.0 { 0.0 } else if floor > 0.0 { peak / floor } else { f64::INFINITY };
		(stat, peak_bin, peak_cell)
	}

}

impl super::AcquisitionEngine for PcpsAcquisition {

	fn dwell_len(&self) -> usize { self.len_fft }

	fn dwell(&mut self, samples: &[Complex<f64>], start_idx: usize) -> Result<Option<super::AcquisitionResult>, Error> {
		if samples.len() != self.len_fft {
			return Err(Error::InvalidInput("dwell must be exactly one coherent interval"));
		}
		if self.dwells_done == 0 { self.first_dwell_idx = start_idx; }

		let mut wiped:Vec<Complex<f64>> = vec![Complex::zero(); self.len_fft];
		for (bin, freq) in self.doppler_bins.iter().enumerate() {
			// Wipe the carrier off the input signal
			let phase_step_rad:f64 = (-2.0 * consts::PI * freq) / self.fs;
			for (i, s) in samples.iter().enumerate() {
				let phase = phase_step_rad * (i as f64);
				wiped[i] = s * Complex{ re: phase.cos(), im: phase.sin() };
			}

			// Multiplication in the frequency domain is circular correlation in time
			self.fft.process(&mut wiped);
			for (w, r) in wiped.iter_mut().zip(self.replica_fft_conj.iter()) {
				*w = *w * r;
			}
			self.ifft.process(&mut wiped);

			let norm = (self.len_fft as f64).powi(2);
			for (cell, w) in wiped.iter().enumerate() {
				self.grid[bin][cell] += w.norm_sqr() / norm;
			}
		}

		self.dwells_done += 1;

		// Confirm the candidate only once the peak has stayed put since the
		// previous dwell; the first dwell can never decide on its own
		let (stat, bin, cell) = self.peak_and_floor();
		if stat > self.threshold {
			if let Some((prev_bin, prev_cell)) = self.prev_peak {
				let bin_off = if bin > prev_bin { bin - prev_bin } else { prev_bin - bin };
				let cell_off = {
					let d = if cell > prev_cell { cell - prev_cell } else { prev_cell - cell };
					d.min(self.len_fft - d)
				};
				let guard = (1.0 / self.chips_per_sample).ceil() as usize;
				if bin_off <= 1 && cell_off <= guard {
					self.confirmed = true;
				}
			}
		}
		self.prev_peak = Some((bin, cell));

		let result = self.verdict();
		if result.detected {
			debug!("PRN {} acquired: doppler {:.1} Hz, delay {:.2} chips, stat {:.1} (threshold {:.1})",
				self.prn, result.doppler_hz, result.code_delay_chips, result.test_statistic, result.threshold);
			Ok(Some(result))
		} else if self.dwells_done >= self.max_dwells {
			debug!("PRN {} not acquired after {} dwells (best stat {:.1})", self.prn, self.dwells_done, result.test_statistic);
			Ok(Some(result))
		} else {
			Ok(None)
		}
	}

	fn verdict(&self) -> super::AcquisitionResult {
		let (stat, bin, cell) = self.peak_and_floor();
		let code_phase_samples = cell % self.samples_per_code;
		super::AcquisitionResult{
			prn: self.prn,
			detected: self.confirmed,
			doppler_hz: self.doppler_bins[bin],
			doppler_step_hz: self.doppler_step_hz,
			code_phase_samples,
			code_delay_chips: (code_phase_samples as f64) * self.chips_per_sample,
			test_statistic: stat,
			threshold: self.threshold,
			dwells_used: self.dwells_done,
			sample_idx: self.first_dwell_idx,
		}
	}

	fn reset(&mut self) {
		for row in self.grid.iter_mut() {
			for cell in row.iter_mut() { *cell = 0.0; }
		}
		self.dwells_done = 0;
		self.first_dwell_idx = 0;
		self.prev_peak = None;
		self.confirmed = false;
	}

}

#[cfg(test)]
mod tests {

	use rand::SeedableRng;
	use rand::rngs::StdRng;
	use rand_distr::{Distribution, Normal};

	use crate::acquisition::{make_acquisition, AcquisitionEngine};
	use crate::config::AcquisitionConfig;
	use crate::replica::ReplicaCode;

	use super::*;

	const FS:f64 = 2.046e6;

	fn synth_signal(prn: usize, delay_samples: usize, doppler_hz: f64, n: usize) -> Vec<Complex<f64>> {
		let replica = ReplicaCode::new(prn).unwrap();
		let cps = replica.chip_rate_hz / FS;
		(0..n).map(|i| {
			let chip_idx = (((i as f64) - (delay_samples as f64)) * cps).floor() as i64;
			let chip = replica.chip(chip_idx.rem_euclid(1023) as usize) as f64;
			let phase = 2.0 * consts::PI * doppler_hz * (i as f64) / FS;
			Complex{ re: phase.cos(), im: phase.sin() } * chip
		}).collect()
	}

	#[test]
	fn clean_signal_found_within_half_chip_and_half_bin() {
		let cfg = AcquisitionConfig::default();
		let replica = ReplicaCode::new(9).unwrap();
		let mut acq = make_acquisition(&cfg, &replica, FS).unwrap();

		let delay_samples = 300;
		let doppler_hz = 1000.0;
		let signal = synth_signal(9, delay_samples, doppler_hz, 2 * acq.dwell_len());

		let result = acq.search(&signal, 0).unwrap();
		assert!(result.detected);
		let true_delay_chips = (delay_samples as f64) * 1.023e6 / FS;
		assert!((result.code_delay_chips - true_delay_chips).abs() <= 0.5);
		assert!((result.doppler_hz - doppler_hz).abs() <= cfg.doppler_step_hz / 2.0);
		// The second dwell confirms the peak of the first
		assert_eq!(result.dwells_used, 2);
	}

	#[test]
	fn off_grid_doppler_still_within_half_bin() {
		let cfg = AcquisitionConfig::default();
		let replica = ReplicaCode::new(3).unwrap();
		let mut acq = make_acquisition(&cfg, &replica, FS).unwrap();

		let doppler_hz = 1080.0;	// between the 1000 and 1250 Hz bins
		let signal = synth_signal(3, 50, doppler_hz, 2 * acq.dwell_len());
		let result = acq.search(&signal, 0).unwrap();
		assert!(result.detected);
		assert!((result.doppler_hz - doppler_hz).abs() <= cfg.doppler_step_hz);
	}

	#[test]
	fn short_input_is_a_contract_violation() {
		let cfg = AcquisitionConfig::default();
		let replica = ReplicaCode::new(1).unwrap();
		let mut acq = make_acquisition(&cfg, &replica, FS).unwrap();
		let short = vec![Complex::zero(); acq.dwell_len() - 1];
		assert!(matches!(acq.search(&short, 0), Err(Error::InvalidInput(_))));
	}

	#[test]
	fn pure_noise_is_not_acquired() {
		let cfg = AcquisitionConfig::default();
		let replica = ReplicaCode::new(22).unwrap();
		let mut acq = make_acquisition(&cfg, &replica, FS).unwrap();

		let mut rng = StdRng::seed_from_u64(1234);
		let dist = Normal::new(0.0, 1.0).unwrap();
		let noise:Vec<Complex<f64>> = (0..acq.dwell_len() * cfg.max_dwells)
			.map(|_| Complex{ re: dist.sample(&mut rng), im: dist.sample(&mut rng) })
			.collect();

		let result = acq.search(&noise, 0).unwrap();
		assert!(!result.detected);
		assert_eq!(result.dwells_used, cfg.max_dwells);
	}

	#[test]
	fn silence_is_not_acquired() {
		let cfg = AcquisitionConfig::default();
		let replica = ReplicaCode::new(5).unwrap();
		let mut acq = make_acquisition(&cfg, &replica, FS).unwrap();

		let silence = vec![Complex::zero(); acq.dwell_len() * cfg.max_dwells];
		let result = acq.search(&silence, 0).unwrap();
		assert!(!result.detected);
		assert_eq!(result.test_statistic, 0.0);
		assert_eq!(result.dwells_used, cfg.max_dwells);
	}

	// Signal absent before the onset, unlike `synth_signal` which wraps the code
	fn delayed_signal(prn: usize, delay_samples: usize, doppler_hz: f64, n: usize) -> Vec<Complex<f64>> {
		let replica = ReplicaCode::new(prn).unwrap();
		let cps = replica.chip_rate_hz / FS;
		(0..n).map(|i| {
			if i < delay_samples { return Complex::zero(); }
			let chip_idx = (((i - delay_samples) as f64) * cps).floor() as usize;
			let chip = replica.chip(chip_idx % 1023) as f64;
			let phase = 2.0 * consts::PI * doppler_hz * (i as f64) / FS;
			Complex{ re: phase.cos(), im: phase.sin() } * chip
		}).collect()
	}

	#[test]
	fn onset_straddling_dwell_does_not_misreport_doppler() {
		let cfg = AcquisitionConfig::default();
		let replica = ReplicaCode::new(11).unwrap();
		let mut acq = make_acquisition(&cfg, &replica, FS).unwrap();

		// Two satellites turn on partway through the first dwell; the partial
		// overlap must not hand tracking a confident wrong-bin estimate
		let n = acq.dwell_len() * cfg.max_dwells;
		let s3 = delayed_signal(3, 500, 1000.0, n);
		let s11 = delayed_signal(11, 1700, -2200.0, n);
		let mixed:Vec<Complex<f64>> = s3.iter().zip(&s11).map(|(a, b)| a + b).collect();

		let result = acq.search(&mixed, 0).unwrap();
		assert!(result.detected);
		assert!((result.doppler_hz - (-2200.0)).abs() <= cfg.doppler_step_hz / 2.0 + 1.0e-9,
			"doppler off by {:.0} Hz", result.doppler_hz + 2200.0);
		assert!(result.dwells_used >= 2);
	}

	#[test]
	fn threshold_grows_as_false_alarm_probability_shrinks() {
		let replica = ReplicaCode::new(4).unwrap();
		let mut loose = AcquisitionConfig::default();
		loose.false_alarm_prob = 1.0e-2;
		let mut tight = AcquisitionConfig::default();
		tight.false_alarm_prob = 1.0e-6;
		let a = PcpsAcquisition::new(&loose, &replica, FS).unwrap();
		let b = PcpsAcquisition::new(&tight, &replica, FS).unwrap();
		assert!(b.threshold > a.threshold);
	}

	#[test]
	fn reset_reproduces_a_fresh_search() {
		let cfg = AcquisitionConfig::default();
		let replica = ReplicaCode::new(12).unwrap();
		let mut acq = make_acquisition(&cfg, &replica, FS).unwrap();

		let signal = synth_signal(12, 777, -2500.0, 2 * acq.dwell_len());
		let first = acq.search(&signal, 0).unwrap();
		acq.reset();
		let second = acq.search(&signal, 0).unwrap();
		assert_eq!(first.code_phase_samples, second.code_phase_samples);
		assert_eq!(first.doppler_hz, second.doppler_hz);
		assert!((first.test_statistic - second.test_statistic).abs() < 1.0e-9);
	}

}
