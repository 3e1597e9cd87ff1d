
//! Carrier-to-noise estimation and lock supervision.

use std::collections::VecDeque;

use num_complex::Complex;

/// Signal-to-noise-variance CN0 estimator over a sliding prompt window,
/// with an exponential smoother on the raw estimate.
pub struct Cn0Estimator {
	window: VecDeque<Complex<f64>>,
	capacity: usize,
	coh_time_s: f64,
	alpha: f64,
	smoothed: Option<f64>,
}

impl Cn0Estimator {

	pub fn new(window_epochs: usize, coh_time_s: f64, alpha: f64) -> Self {
		Self{ window: VecDeque::with_capacity(window_epochs), capacity: window_epochs, coh_time_s, alpha, smoothed: None }
	}

	/// Returns the smoothed estimate once a full window is available
	pub fn update(&mut self, prompt: Complex<f64>) -> Option<f64> {
		if self.window.len() >= self.capacity { self.window.pop_front(); }
		self.window.push_back(prompt);
		if self.window.len() < self.capacity { return None; }

		let raw = self.raw_estimate();
		let next = match self.smoothed {
			Some(prev) => self.alpha * raw + (1.0 - self.alpha) * prev,
			None => raw,
		};
		self.smoothed = Some(next);
		Some(next)
	}

	fn raw_estimate(&self) -> f64 {
		let n = self.window.len() as f64;
		let p_sig:f64 = {
			let sum:f64 = self.window.iter().map(|c| c.re.abs()).sum();
			(sum / n).powi(2)
		};
		let p_tot:f64 = self.window.iter().map(|c| c.norm_sqr()).sum::<f64>() / n;

		if p_tot <= 0.0 { return 0.0; }
		// A window of pure-sign prompts pins the estimator at its ceiling
		if p_tot <= p_sig { return 60.0; }

		let snr = p_sig / (p_tot - p_sig);
		let cn0 = 10.0 * snr.log10() - 10.0 * self.coh_time_s.log10();
		cn0.clamp(0.0, 60.0)
	}

	pub fn reset(&mut self) {
		self.window.clear();
		self.smoothed = None;
	}

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
	Confirmed,
	Lost,
}

/// Hysteresis on the CN0 estimate: lock after N consecutive epochs above
/// threshold, loss after M consecutive epochs below.
pub struct LockDetector {
	threshold_db_hz: f64,
	confirm_epochs: usize,
	loss_epochs: usize,
	above: usize,
	below: usize,
	locked: bool,
}

impl LockDetector {

	pub fn new(threshold_db_hz: f64, confirm_epochs: usize, loss_epochs: usize) -> Self {
		Self{ threshold_db_hz, confirm_epochs, loss_epochs, above: 0, below: 0, locked: false }
	}

	pub fn update(&mut self, cn0_db_hz: f64) -> Option<LockEvent> {
		if cn0_db_hz >= self.threshold_db_hz {
			self.above += 1;
			self.below = 0;
			if !self.locked && self.above >= self.confirm_epochs {
				self.locked = true;
				return Some(LockEvent::Confirmed);
			}
		} else {
			self.below += 1;
			self.above = 0;
			if self.locked && self.below >= self.loss_epochs {
				self.locked = false;
				return Some(LockEvent::Lost);
			}
		}
		None
	}

	pub fn locked(&self) -> bool { self.locked }

	pub fn reset(&mut self) {
		self.above = 0;
		self.below = 0;
		self.locked = false;
	}

}
