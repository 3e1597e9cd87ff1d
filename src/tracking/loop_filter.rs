
//! Second-order proportional-integral loop filter.
//!
//! Coefficients follow the classic noise-bandwidth/damping derivation; the
//! filter output is the frequency increment to apply to the NCO for one
//! integration interval.  `set_bandwidth` retunes the coefficients in place,
//! which is how the wide-to-narrow pull-in schedule is realized.

pub struct LoopFilter {
	b0: f64,
	b1: f64,
	prev_error: f64,
	damping: f64,
	gain: f64,
	pdi_s: f64,
}

fn coefficients(bw_hz: f64, damping: f64, gain: f64, pdi_s: f64) -> (f64, f64) {
	let wn = (bw_hz * 8.0 * damping) / (4.0 * damping * damping + 1.0);
	let tau1 = gain / (wn * wn);
	let tau2 = (2.0 * damping) / wn;
	((pdi_s + 2.0 * tau2) / (2.0 * tau1), (pdi_s - 2.0 * tau2) / (2.0 * tau1))
}

impl LoopFilter {

	/// `gain` is the discriminator gain constant: 0.25 for a Costas phase
	/// detector, 1.0 for the code discriminator.
	pub fn new(bw_hz: f64, damping: f64, gain: f64, pdi_s: f64) -> Self {
		let (b0, b1) = coefficients(bw_hz, damping, gain, pdi_s);
		Self{ b0, b1, prev_error: 0.0, damping, gain, pdi_s }
	}

	/// Retunes for a new noise bandwidth without losing the error history
	pub fn set_bandwidth(&mut self, bw_hz: f64) {
		let (b0, b1) = coefficients(bw_hz, self.damping, self.gain, self.pdi_s);
		self.b0 = b0;
		self.b1 = b1;
	}

	/// One filter step; the return value is added to the NCO frequency
	pub fn apply(&mut self, error: f64) -> f64 {
		let out = self.b0 * error + self.b1 * self.prev_error;
		self.prev_error = error;
		out
	}

}
