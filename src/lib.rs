
use num_complex::Complex;

pub mod acquisition;
pub mod block;
pub mod channel;
pub mod config;
pub mod constants;
pub mod geo;
pub mod observables;
pub mod pvt;
pub mod receiver;
pub mod replica;
pub mod telemetry;
pub mod tracking;

/// One complex baseband sample tagged with its position in the sample stream.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
	pub val: Complex<f64>,
	pub idx: usize,
}

/// A block of contiguous complex baseband samples.  Blocks are produced by an
/// external sample source, never mutated afterwards, and fanned out to every
/// channel subscribed to the band.
#[derive(Debug, Clone)]
pub struct SampleBlock {
	pub samples: Vec<Complex<f64>>,
	pub start_idx: usize,
	pub fs: f64,
}

impl SampleBlock {

	pub fn new(samples: Vec<Complex<f64>>, start_idx: usize, fs: f64) -> Self {
		Self{ samples, start_idx, fs }
	}

	/// Index of the first sample past the end of this block
	pub fn end_idx(&self) -> usize { self.start_idx + self.samples.len() }

	/// Receiver time at the end of this block, in seconds of the sample clock
	pub fn end_time_s(&self) -> f64 { (self.end_idx() as f64) / self.fs }

	pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
		self.samples.iter().enumerate().map(move |(i, val)| Sample{ val: *val, idx: self.start_idx + i })
	}

}

/// Every failure in the core is local and recoverable; the channel state
/// machine or the solver decides what happens next.  There is no fatal path.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Error {
	#[error("no correlation peak exceeded the detection threshold")]
	NotAcquired,
	#[error("loss of lock")]
	LossOfLock,
	#[error("bit synchronization lost")]
	BitSyncLost,
	#[error("invalid telemetry data: {0}")]
	InvalidTelemetryData(&'static str),
	#[error("not enough usable satellites ({0})")]
	NotEnoughSatellites(usize),
	#[error("position solution failed to converge")]
	NonConvergence,
	#[error("ill-conditioned geometry")]
	IllConditionedGeometry,
	#[error("invalid input: {0}")]
	InvalidInput(&'static str),
	#[error("unknown implementation: {0}")]
	UnknownImplementation(&'static str),
}
