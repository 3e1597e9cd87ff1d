
//! Top-level receiver: channels, assignment, alignment, and PVT.
//!
//! Owns a set of channels plus the aligner and solver behind them, and runs
//! one sample block at a time through all of it.  Channel results come back
//! as values; nothing here calls back into the caller.

use log::info;

use crate::channel::assignment::AssignmentTable;
use crate::channel::{Channel, ChannelResult, ChannelState};
use crate::config::{ChannelConfig, ReceiverConfig};
use crate::observables::ObservablesAligner;
use crate::pvt::{NavigationSolution, PvtSolver};
use crate::{Error, SampleBlock};

/// Everything one block of samples produced
#[derive(Debug)]
pub struct ReceiverUpdate {
	pub channel_events: Vec<(usize, ChannelResult)>,
	pub solutions: Vec<NavigationSolution>,
}

pub struct Receiver {
	fs: f64,
	channels: Vec<Channel>,
	channel_cfgs: Vec<ChannelConfig>,
	assignments: AssignmentTable,
	aligner: ObservablesAligner,
	solver: PvtSolver,
}

impl Receiver {

	pub fn new(cfg: &ReceiverConfig) -> Self {
		Self{
			fs: cfg.fs,
			channels: vec![],
			channel_cfgs: vec![],
			assignments: AssignmentTable::new(),
			aligner: ObservablesAligner::new(&cfg.alignment),
			solver: PvtSolver::new(cfg.pvt.clone()),
		}
	}

	/// Adds a channel for the configured PRN.  Fails if the PRN is already
	/// taken or the configuration is inconsistent with the receiver.
	pub fn add_channel(&mut self, cfg: ChannelConfig) -> Result<usize, Error> {
		if cfg.fs != self.fs {
			return Err(Error::InvalidInput("channel sampling rate does not match the receiver"));
		}
		let prn = cfg.prn;
		let id = self.channels.len();
		self.assignments.try_assign(prn, id)?;
		match Channel::new(cfg.clone()) {
			Ok(ch) => {
				info!("channel {} assigned to PRN {}", id, prn);
				self.channels.push(ch);
				self.channel_cfgs.push(cfg);
				Ok(id)
			},
			Err(e) => {
				self.assignments.release(prn, id);
				Err(e)
			},
		}
	}

	/// Points a channel at a (possibly new) PRN, rebuilding it from its
	/// stored configuration so it behaves exactly like a fresh channel
	pub fn reassign(&mut self, channel_id: usize, prn: usize) -> Result<(), Error> {
		let old_prn = self.channels.get(channel_id)
			.ok_or(Error::InvalidInput("no such channel"))?.prn;

		let mut cfg = self.channel_cfgs[channel_id].clone();
		cfg.prn = prn;
		let fresh = Channel::new(cfg.clone())?;

		// Claim first, release second, so a taken PRN leaves the old claim intact
		self.assignments.try_assign(prn, channel_id)?;
		if prn != old_prn {
			self.assignments.release(old_prn, channel_id);
		}
		self.aligner.drop_channel(old_prn);

		self.channels[channel_id] = fresh;
		self.channel_cfgs[channel_id] = cfg;
		info!("channel {} reassigned from PRN {} to PRN {}", channel_id, old_prn, prn);
		Ok(())
	}

	pub fn channel(&self, channel_id: usize) -> Option<&Channel> {
		self.channels.get(channel_id)
	}

	pub fn assigned_prns(&self) -> Vec<usize> {
		self.assignments.assigned_prns()
	}

	pub fn last_solution(&self) -> Option<&NavigationSolution> {
		self.solver.last_solution()
	}

	/// Runs one block through every channel, feeds fresh observables to the
	/// aligner, and solves any alignment epochs that came due
	pub fn process(&mut self, block: &SampleBlock) -> ReceiverUpdate {
		let mut channel_events = vec![];

		for (id, ch) in self.channels.iter_mut().enumerate() {
			let prn = ch.prn;
			for result in ch.process_block(block) {
				// A channel failure means its time tags cannot be trusted;
				// its snapshot must not linger in the aligner
				if matches!(result, ChannelResult::Err(_)) {
					self.aligner.drop_channel(prn);
				}
				channel_events.push((id, result));
			}
			if let Some(obs) = ch.observable() {
				self.aligner.submit(obs);
			}
			if ch.state() == ChannelState::Idle && self.assignments.assignment(prn) == Some(id) {
				info!("PRN {} released by idle channel {}", prn, id);
				self.assignments.release(prn, id);
				self.aligner.drop_channel(prn);
			}
		}

		let solutions = self.aligner.poll(block.end_time_s()).iter()
			.map(|set| self.solver.solve(set))
			.collect();

		ReceiverUpdate{ channel_events, solutions }
	}

}

#[cfg(test)]
mod tests {

	use std::f64::consts;

	use num_complex::Complex;
	use rand::prelude::*;
	use rand_distr::Normal;

	use crate::constants::{CHIP_RATE_HZ, L1_HZ};
	use crate::replica::ReplicaCode;
	use super::*;

	const FS:f64 = 2.046e6;

	fn satellite(prn: usize, doppler_hz: f64, delay_samples: usize, n: usize) -> Vec<Complex<f64>> {
		let code = ReplicaCode::new(prn).unwrap();
		let code_rate = CHIP_RATE_HZ * (1.0 + doppler_hz / L1_HZ);
		(0..n).map(|i| {
			if i < delay_samples { return Complex{ re: 0.0, im: 0.0 }; }
			let t = ((i - delay_samples) as f64) / FS;
			let chip = code.chip((t * code_rate).floor() as usize) as f64;
			let phase = 2.0 * consts::PI * doppler_hz * ((i as f64) / FS);
			Complex{ re: phase.cos(), im: phase.sin() } * chip
		}).collect()
	}

	fn run(rx: &mut Receiver, samples: &[Complex<f64>], start_idx: usize) -> Vec<ReceiverUpdate> {
		let chunk = (0.01 * FS) as usize;
		samples.chunks(chunk).enumerate()
			.map(|(i, c)| rx.process(&SampleBlock::new(c.to_vec(), start_idx + i * chunk, FS)))
			.collect()
	}

	#[test]
	fn duplicate_prn_is_rejected() {
		let mut rx = Receiver::new(&ReceiverConfig::new(FS));
		rx.add_channel(ChannelConfig::new(4, FS)).unwrap();
		assert!(rx.add_channel(ChannelConfig::new(4, FS)).is_err());
		assert_eq!(rx.assigned_prns(), vec![4]);

		let mut wrong_fs = ChannelConfig::new(6, FS);
		wrong_fs.fs = 4.092e6;
		assert!(rx.add_channel(wrong_fs).is_err());
	}

	#[test]
	fn tracks_two_satellites_in_one_stream() {
		let mut rx = Receiver::new(&ReceiverConfig::new(FS));
		let a = rx.add_channel(ChannelConfig::new(3, FS)).unwrap();
		let b = rx.add_channel(ChannelConfig::new(11, FS)).unwrap();

		let n = (0.3 * FS) as usize;
		let s3 = satellite(3, 1000.0, 500, n);
		let s11 = satellite(11, -2200.0, 1700, n);
		let mixed:Vec<Complex<f64>> = s3.iter().zip(&s11).map(|(x, y)| x + y).collect();

		let updates = run(&mut rx, &mixed, 0);
		let acquired:Vec<usize> = updates.iter()
			.flat_map(|u| u.channel_events.iter())
			.filter_map(|(id, r)| match r { ChannelResult::Acquired{ .. } => Some(*id), _ => None })
			.collect();
		assert!(acquired.contains(&a));
		assert!(acquired.contains(&b));

		assert_eq!(rx.channel(a).unwrap().state(), ChannelState::Tracking);
		assert_eq!(rx.channel(b).unwrap().state(), ChannelState::Tracking);
		assert!(rx.channel(a).unwrap().locked());
		assert!(rx.channel(b).unwrap().locked());

		// No telemetry in this signal, so no observables and no fixes
		assert!(updates.iter().all(|u| u.solutions.is_empty()));
		assert!(rx.last_solution().is_none());
	}

	#[test]
	fn idle_channels_release_their_prn() {
		let mut rx = Receiver::new(&ReceiverConfig::new(FS));
		let mut cfg = ChannelConfig::new(9, FS);
		cfg.retry_budget = 0;
		rx.add_channel(cfg).unwrap();

		let mut rng = StdRng::seed_from_u64(7);
		let dist = Normal::new(0.0, 1.0).unwrap();
		let n = 5 * (FS * 0.001) as usize;
		let noise:Vec<Complex<f64>> = (0..n)
			.map(|_| Complex{ re: dist.sample(&mut rng), im: dist.sample(&mut rng) })
			.collect();
		run(&mut rx, &noise, 0);

		assert_eq!(rx.channel(0).unwrap().state(), ChannelState::Idle);
		assert!(rx.assigned_prns().is_empty());

		// The PRN is free for another channel now
		rx.add_channel(ChannelConfig::new(9, FS)).unwrap();
		assert_eq!(rx.assigned_prns(), vec![9]);
	}

	#[test]
	fn reassignment_behaves_like_a_fresh_channel() {
		let mut rx = Receiver::new(&ReceiverConfig::new(FS));
		let id = rx.add_channel(ChannelConfig::new(5, FS)).unwrap();

		let n = (0.2 * FS) as usize;
		let signal = satellite(5, 1500.0, 0, n);
		run(&mut rx, &signal, 0);
		assert_eq!(rx.channel(id).unwrap().state(), ChannelState::Tracking);

		// Same PRN again: the rebuilt channel starts from scratch
		rx.reassign(id, 5).unwrap();
		assert_eq!(rx.channel(id).unwrap().state(), ChannelState::Acquisition);
		let updates = run(&mut rx, &satellite(5, 1500.0, 0, n), n);
		assert!(updates.iter().flat_map(|u| u.channel_events.iter())
			.any(|(_, r)| matches!(r, ChannelResult::Acquired{ .. })));
		assert_eq!(rx.channel(id).unwrap().state(), ChannelState::Tracking);

		// A different PRN frees the old one
		rx.reassign(id, 23).unwrap();
		assert_eq!(rx.assigned_prns(), vec![23]);
	}

}
