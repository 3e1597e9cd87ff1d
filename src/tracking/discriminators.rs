
//! Carrier and code discriminators.
//!
//! Carrier discriminators return the phase (or frequency) error in cycles
//! (or Hz); the code discriminator returns the delay error in chips.

use num_complex::Complex;
use std::f64::consts;

/// Costas arctangent detector, insensitive to 180-degree data flips.
/// Output in cycles.
pub fn costas_atan(prompt: Complex<f64>) -> f64 {
	if prompt.re == 0.0 { 0.0 } else { (prompt.im / prompt.re).atan() / (2.0 * consts::PI) }
}

/// Four-quadrant arctangent detector, for pilot or data-wiped signals.
/// Output in cycles.
pub fn atan2(prompt: Complex<f64>) -> f64 {
	if prompt.norm_sqr() == 0.0 { 0.0 } else { prompt.im.atan2(prompt.re) / (2.0 * consts::PI) }
}

/// Cross-product frequency detector over two consecutive prompts.
/// Output in Hz for the given interval between them.
pub fn fll_cross(prev: Complex<f64>, curr: Complex<f64>, dt_s: f64) -> f64 {
	let cross = prev.re * curr.im - prev.im * curr.re;
	let dot = prev.re * curr.re + prev.im * curr.im;
	if cross == 0.0 && dot == 0.0 { 0.0 } else { cross.atan2(dot) / (2.0 * consts::PI * dt_s) }
}

/// Normalized early-minus-late power detector.  Output in chips.
pub fn dll_early_late(early: Complex<f64>, late: Complex<f64>) -> f64 {
	let e = early.norm();
	let l = late.norm();
	if e + l == 0.0 { 0.0 } else { 0.5 * (l - e) / (l + e) }
}
