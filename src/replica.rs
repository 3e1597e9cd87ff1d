
//! Local replica spreading codes.
//!
//! A `ReplicaCode` is generated once when a satellite is assigned to a channel
//! and is read-only for the lifetime of the assignment.

use num_complex::Complex;

use crate::constants::{CHIP_RATE_HZ, CODE_LENGTH_CHIPS};
use crate::Error;

// G2 phase-select taps per PRN (IS-GPS-200, Table 3-Ia), 1-indexed register stages
const G2_TAPS:[(usize, usize); 32] = [
	(2,6),  (3,7),  (4,8),  (5,9),  (1,9),  (2,10), (1,8),  (2,9),
	(3,10), (2,3),  (3,4),  (5,6),  (6,7),  (7,8),  (8,9),  (9,10),
	(1,4),  (2,5),  (3,6),  (4,7),  (5,8),  (6,9),  (1,3),  (4,6),
	(5,7),  (6,8),  (7,9),  (8,10), (1,6),  (2,7),  (3,8),  (4,9),
];

#[derive(Debug, Clone)]
pub struct ReplicaCode {
	pub prn: usize,
	pub chip_rate_hz: f64,
	chips: Vec<i8>,
}

impl ReplicaCode {

	/// Generates the C/A Gold code for the given PRN (1 through 32)
	pub fn new(prn: usize) -> Result<Self, Error> {
		if prn < 1 || prn > 32 { return Err(Error::InvalidInput("PRN outside 1..=32")); }
		let (t1, t2) = G2_TAPS[prn - 1];

		let mut g1:[bool; 10] = [true; 10];
		let mut g2:[bool; 10] = [true; 10];
		let mut chips:Vec<i8> = Vec::with_capacity(CODE_LENGTH_CHIPS);

		for _ in 0..CODE_LENGTH_CHIPS {
			let out = g1[9] ^ g2[t1 - 1] ^ g2[t2 - 1];
			chips.push(if out { 1 } else { -1 });

			let g1_fb = g1[2] ^ g1[9];
			let g2_fb = g2[1] ^ g2[2] ^ g2[5] ^ g2[7] ^ g2[8] ^ g2[9];
			for i in (1..10).rev() {
				g1[i] = g1[i - 1];
				g2[i] = g2[i - 1];
			}
			g1[0] = g1_fb;
			g2[0] = g2_fb;
		}

		Ok(Self{ prn, chip_rate_hz: CHIP_RATE_HZ, chips })
	}

	pub fn len_chips(&self) -> usize { self.chips.len() }

	pub fn chip(&self, idx: usize) -> i8 { self.chips[idx % self.chips.len()] }

	/// The chip sequence as a complex vector, one element per chip
	pub fn chips_complex(&self) -> Vec<Complex<f64>> {
		self.chips.iter().map(|c| Complex{ re: *c as f64, im: 0.0 }).collect()
	}

	/// One code period resampled to the receiver sampling rate
	pub fn sampled_complex(&self, fs: f64) -> Vec<Complex<f64>> {
		let samples_per_code:usize = (fs * (self.chips.len() as f64) / self.chip_rate_hz).round() as usize;
		let chips_per_sample:f64 = self.chip_rate_hz / fs;
		(0..samples_per_code).map(|i| {
			let chip_idx = ((i as f64) * chips_per_sample).floor() as usize;
			Complex{ re: self.chip(chip_idx) as f64, im: 0.0 }
		}).collect()
	}

}
