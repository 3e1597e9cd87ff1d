
//! Navigation message decoding.
//!
//! A telemetry decoder consumes one prompt correlation per code epoch and
//! works its way up from bit synchronization through frame synchronization
//! to decoded subframes.  Ephemerides are assembled from subframes 1
//! through 3 once their issue-of-data fields agree.

use log::debug;
use num_complex::Complex;

use crate::config::TelemetryConfig;
use crate::constants::CODES_PER_BIT;
use crate::pvt::ephemeris::Ephemeris;
use crate::Error;

pub mod bits;
pub mod preamble;
pub mod subframe;

use preamble::{BitSync, PreambleDetector};
use subframe::{Subframe, SubframeBody};

#[derive(Debug)]
pub enum TelemetryUpdate {
	Progress,
	Subframe{
		subframe: Subframe,
		/// Present when this subframe completed a consistent ephemeris set
		ephemeris: Option<Ephemeris>,
		/// Sample index of the prompt that closed the subframe; transmitted
		/// time at this instant is the handover word's TOW
		sample_idx: usize,
	},
}

pub trait TelemetryDecoder: Send {

	fn apply(&mut self, prompt: Complex<f64>, sample_idx: usize) -> Result<TelemetryUpdate, Error>;

	fn bit_synced(&self) -> bool;

	fn frame_synced(&self) -> bool;

	/// Back to bit synchronization; assembled ephemeris subframes survive
	fn reset(&mut self);

}

/// Telemetry factory, keyed by the configuration's method string
pub fn make_telemetry(cfg: &TelemetryConfig) -> Result<Box<dyn TelemetryDecoder>, Error> {
	match cfg.method.as_str() {
		"lnav" => Ok(Box::new(LnavDecoder::new(cfg))),
		_ => Err(Error::UnknownImplementation("telemetry method")),
	}
}

/// Collects subframes 1 through 3 and publishes each consistent ephemeris
/// set once
struct EphemerisAssembler {
	sf1: Option<subframe::Subframe1>,
	sf2: Option<subframe::Subframe2>,
	sf3: Option<subframe::Subframe3>,
	published_iodc: Option<u16>,
}

impl EphemerisAssembler {

	fn new() -> Self {
		Self{ sf1: None, sf2: None, sf3: None, published_iodc: None }
	}

	fn update(&mut self, sf: &Subframe) -> Option<Ephemeris> {
		match sf.body {
			SubframeBody::Subframe1(b) => self.sf1 = Some(b),
			SubframeBody::Subframe2(b) => self.sf2 = Some(b),
			SubframeBody::Subframe3(b) => self.sf3 = Some(b),
			SubframeBody::Other => {},
		}
		let eph = match (&self.sf1, &self.sf2, &self.sf3) {
			(Some(a), Some(b), Some(c)) => Ephemeris::from_subframes(a, b, c).ok()?,
			_ => return None,
		};
		if self.published_iodc == Some(eph.iodc) { return None; }
		self.published_iodc = Some(eph.iodc);
		Some(eph)
	}

}

enum DecoderState {
	BitSync(BitSync),
	PreambleSearch(PreambleDetector),
	FrameSync{ inverted: bool, bits: Vec<(bool, usize)>, misses: usize },
}

pub struct LnavDecoder {
	required_votes: usize,
	miss_limit: usize,
	state: DecoderState,
	bit_sum: f64,
	bit_epochs: usize,
	assembler: EphemerisAssembler,
}

enum BitOutcome {
	Progress,
	Frame([bool; 300], usize),
}

impl LnavDecoder {

	pub fn new(cfg: &TelemetryConfig) -> Self {
		Self{
			required_votes: cfg.bit_sync_votes,
			miss_limit: cfg.preamble_miss_limit,
			state: DecoderState::BitSync(BitSync::new(cfg.bit_sync_votes)),
			bit_sum: 0.0,
			bit_epochs: 0,
			assembler: EphemerisAssembler::new(),
		}
	}

	fn process_bit(&mut self, bit: bool, sample_idx: usize) -> Result<TelemetryUpdate, Error> {
		let outcome = match &mut self.state {
			DecoderState::PreambleSearch(det) => {
				if let Some(m) = det.apply(bit, sample_idx) {
					debug!("frame sync at sample {} (inverted: {})", m.sample_idx, m.inverted);
					let word = det.take_buffer();
					self.state = DecoderState::FrameSync{ inverted: m.inverted, bits: word, misses: 0 };
				}
				BitOutcome::Progress
			},
			DecoderState::FrameSync{ inverted, bits, .. } => {
				bits.push((bit ^ *inverted, sample_idx));
				if bits.len() >= 300 {
					let mut frame = [false; 300];
					for (i, (b, _)) in bits.iter().enumerate() { frame[i] = *b; }
					let end_idx = bits.last().map(|(_, idx)| *idx).unwrap_or(sample_idx);
					bits.clear();
					BitOutcome::Frame(frame, end_idx)
				} else {
					BitOutcome::Progress
				}
			},
			DecoderState::BitSync(_) => BitOutcome::Progress,
		};

		match outcome {
			BitOutcome::Progress => Ok(TelemetryUpdate::Progress),
			BitOutcome::Frame(frame, end_idx) => self.process_frame(frame, end_idx),
		}
	}

	fn process_frame(&mut self, frame: [bool; 300], sample_idx: usize) -> Result<TelemetryUpdate, Error> {
		let decoded = if frame[..8] == preamble::POS_PATTERN {
			bits::data_recover(&frame).and_then(|data| subframe::decode(&data))
		} else {
			Err(Error::InvalidTelemetryData("preamble missing at frame boundary"))
		};

		match decoded {
			Ok(sf) => {
				if let DecoderState::FrameSync{ misses, .. } = &mut self.state { *misses = 0; }
				debug!("subframe {} with TOW count {}", sf.subframe_id, sf.time_of_week_truncated);
				let ephemeris = self.assembler.update(&sf);
				Ok(TelemetryUpdate::Subframe{ subframe: sf, ephemeris, sample_idx })
			},
			Err(e) => {
				let lost = match &mut self.state {
					DecoderState::FrameSync{ misses, .. } => {
						*misses += 1;
						*misses >= self.miss_limit
					},
					_ => false,
				};
				if lost {
					debug!("frame sync lost: {}", e);
					self.reset();
					Err(Error::BitSyncLost)
				} else {
					debug!("subframe rejected: {}", e);
					Ok(TelemetryUpdate::Progress)
				}
			},
		}
	}

}

impl TelemetryDecoder for LnavDecoder {

	fn apply(&mut self, prompt: Complex<f64>, sample_idx: usize) -> Result<TelemetryUpdate, Error> {
		if let DecoderState::BitSync(sync) = &mut self.state {
			if sync.apply(prompt.re > 0.0).is_some() {
				debug!("bit sync at sample {}", sample_idx);
				self.state = DecoderState::PreambleSearch(PreambleDetector::new());
				// This epoch opens the first aligned bit
				self.bit_sum = prompt.re;
				self.bit_epochs = 1;
			}
			return Ok(TelemetryUpdate::Progress);
		}

		self.bit_sum += prompt.re;
		self.bit_epochs += 1;
		if self.bit_epochs < CODES_PER_BIT { return Ok(TelemetryUpdate::Progress); }

		let bit = self.bit_sum > 0.0;
		self.bit_sum = 0.0;
		self.bit_epochs = 0;
		self.process_bit(bit, sample_idx)
	}

	fn bit_synced(&self) -> bool {
		!matches!(self.state, DecoderState::BitSync(_))
	}

	fn frame_synced(&self) -> bool {
		matches!(self.state, DecoderState::FrameSync{ .. })
	}

	fn reset(&mut self) {
		self.state = DecoderState::BitSync(BitSync::new(self.required_votes));
		self.bit_sum = 0.0;
		self.bit_epochs = 0;
	}

}
