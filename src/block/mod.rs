
//! Bounded-queue fan-out.
//!
//! Wraps a synchronous processing object in its own tokio task fed through
//! a bounded mpsc queue, so that one sample stream can be cloned out to
//! many channels with none of them blocking another.  Control messages are
//! interleaved with the input stream, which keeps the wrapped state free of
//! mutexes.

use std::sync::Arc;

use log::warn;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::{Channel, ChannelResult, ChannelState};
use crate::observables::Observable;
use crate::{Error, SampleBlock};

const QUEUE_DEPTH:usize = 10;

pub enum BlockResult<U> {
	NotReady,
	Ready(U),
	Err(Error),
}

/// A type wrappable into an independent task: consumes inputs, optionally
/// produces outputs, and accepts control messages between inputs
pub trait BlockFunctionality<C, T, U> {
	fn control(&mut self, control: &C) -> Result<(), Error>;
	fn apply(&mut self, input: &T) -> BlockResult<U>;
}

pub struct Block<C: 'static + Send, T: 'static + Send, U: 'static + Send> {
	pub tx_control: mpsc::Sender<C>,
	pub tx_input: mpsc::Sender<T>,
	pub rx_output: mpsc::Receiver<U>,
	handle: JoinHandle<Result<(), Error>>,
}

impl<C: 'static + Send, T: 'static + Send + Sync, U: 'static + Send> Block<C, T, U> {

	pub fn from<B: 'static + BlockFunctionality<C, T, U> + Send>(b: B) -> Self {

		let (tx_control, mut rx_control) = mpsc::channel::<C>(QUEUE_DEPTH);
		let (tx_input, mut rx_input) = mpsc::channel::<T>(QUEUE_DEPTH);
		let (tx_output, rx_output) = mpsc::channel::<U>(QUEUE_DEPTH);

		let handle:JoinHandle<Result<(), Error>> = tokio::spawn(async move {
			let mut owned_b = b;

			'rx: while let Some(t) = rx_input.recv().await {

				// Handling control between inputs means the state needs no lock
				if let Ok(c) = rx_control.try_recv() {
					owned_b.control(&c)?;
				}

				match owned_b.apply(&t) {
					BlockResult::Ready(u) => tx_output.send(u).await
						.map_err(|_| Error::InvalidInput("fan-out output receiver dropped"))?,
					BlockResult::NotReady => (),
					BlockResult::Err(e) => {
						warn!("fan-out task stopping: {}", e);
						break 'rx;
					},
				}
			}

			Ok(())
		});

		Block{ tx_control, tx_input, rx_output, handle }
	}

	/// Closes the input side and waits for the task to drain
	pub async fn shutdown(self) -> Result<(), Error> {
		let Block{ tx_control, tx_input, rx_output: _, handle } = self;
		drop(tx_control);
		drop(tx_input);
		handle.await.map_err(|_| Error::InvalidInput("fan-out task panicked"))?
	}

}

#[derive(Debug, Clone, Copy)]
pub enum ChannelControl {
	Reset,
}

/// What a channel task reports back after consuming one sample block
#[derive(Debug)]
pub struct ChannelReport {
	pub prn: usize,
	pub state: ChannelState,
	pub results: Vec<ChannelResult>,
	pub observable: Option<Observable>,
	pub block_end_time_s: f64,
}

impl BlockFunctionality<ChannelControl, Arc<SampleBlock>, ChannelReport> for Channel {

	fn control(&mut self, control: &ChannelControl) -> Result<(), Error> {
		match control {
			ChannelControl::Reset => {
				self.reset();
				Ok(())
			},
		}
	}

	// One report per block, even when nothing notable happened, so the
	// consumer can join streams without waiting on quiet channels
	fn apply(&mut self, block: &Arc<SampleBlock>) -> BlockResult<ChannelReport> {
		let results = self.process_block(block);
		BlockResult::Ready(ChannelReport{
			prn: self.prn,
			state: self.state(),
			observable: self.observable(),
			block_end_time_s: block.end_time_s(),
			results,
		})
	}

}
