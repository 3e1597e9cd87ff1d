
//! Bit synchronization and frame-preamble detection.

use std::collections::VecDeque;

use crate::constants::CODES_PER_BIT;
use crate::telemetry::bits::parity_check;

pub(crate) const POS_PATTERN:[bool; 8] = [true,  false, false, false, true,  false, true,  true ];
const NEG_PATTERN:[bool; 8] = [false, true,  true,  true,  false, true,  false, false];

/// Finds the data-bit boundary by voting on the phase of prompt sign
/// transitions modulo the bit length.  A boundary is accepted once enough
/// transitions land on the same phase.
pub struct BitSync {
	votes: [usize; CODES_PER_BIT],
	required: usize,
	epoch: usize,
	prev_sign: Option<bool>,
}

impl BitSync {

	pub fn new(required_votes: usize) -> Self {
		Self{ votes: [0; CODES_PER_BIT], required: required_votes, epoch: 0, prev_sign: None }
	}

	/// Returns `Some` at an epoch that is an accepted bit boundary
	pub fn apply(&mut self, sign: bool) -> Option<()> {
		let phase = self.epoch % CODES_PER_BIT;
		let transition = self.prev_sign.map(|p| p != sign).unwrap_or(false);
		self.prev_sign = Some(sign);
		self.epoch += 1;

		if transition {
			self.votes[phase] += 1;
			if self.votes[phase] >= self.required { return Some(()); }
		}
		None
	}

}

/// Slides a 30-bit window over the bit stream looking for a telemetry word:
/// the 8-bit preamble in either polarity followed by a valid parity check
/// against zero priors.
pub struct PreambleDetector {
	buffer: VecDeque<(bool, usize)>,
}

#[derive(Debug, Clone, Copy)]
pub struct PreambleMatch {
	pub inverted: bool,
	/// Sample index of the last prompt of the first preamble bit
	pub sample_idx: usize,
}

impl PreambleDetector {

	pub fn new() -> Self {
		Self{ buffer: VecDeque::with_capacity(30) }
	}

	/// Feeds one bit; fires when the buffer holds a full telemetry word.
	/// On a match the buffer contents are the word's 30 bits, polarity
	/// already corrected.
	pub fn apply(&mut self, bit: bool, sample_idx: usize) -> Option<PreambleMatch> {
		if self.buffer.len() >= 30 { self.buffer.pop_front(); }
		self.buffer.push_back((bit, sample_idx));
		if self.buffer.len() < 30 { return None; }

		let first_eight:Vec<bool> = self.buffer.iter().take(8).map(|(b, _)| *b).collect();
		let inverted = if first_eight == POS_PATTERN { false }
			else if first_eight == NEG_PATTERN { true }
			else { return None };

		let word:Vec<bool> = self.buffer.iter().map(|(b, _)| b ^ inverted).collect();
		if !parity_check(&word, false, false) { return None; }

		if inverted {
			for entry in self.buffer.iter_mut() { entry.0 = !entry.0; }
		}
		let sample_idx = self.buffer.front().map(|(_, idx)| *idx).unwrap_or(0);
		Some(PreambleMatch{ inverted, sample_idx })
	}

	/// The pending telemetry word after a match
	pub fn take_buffer(&mut self) -> Vec<(bool, usize)> {
		self.buffer.drain(..).collect()
	}

}
