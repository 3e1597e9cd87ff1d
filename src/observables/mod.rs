
//! Cross-channel measurement alignment.
//!
//! Channels produce measurement snapshots on their own epoch cadence; the
//! aligner resamples them onto a common receiver time base and forms
//! pseudoranges against a single receiver clock.  The clock is seeded at
//! the first alignment epoch with any usable channel: the largest
//! propagated transmit time plus a nominal travel time, after which the
//! sample-clock-to-TOW offset stays fixed and the solver estimates the
//! residual bias.

use std::collections::HashMap;

use log::{debug, info};
use serde::{Serialize, Deserialize};

use crate::config::AlignmentConfig;
use crate::constants::{C_METERS_PER_SEC, L1_HZ, NOMINAL_TRAVEL_TIME_SEC};
use crate::pvt::ephemeris::Ephemeris;

/// One channel's measurement snapshot at a tracking epoch
#[derive(Debug, Clone, Copy)]
pub struct Observable {
	pub prn: usize,
	/// Receiver time of the snapshot, seconds of the sample clock
	pub rx_time_s: f64,
	/// Transmitted GPS time of week at that instant
	pub tx_tow_sec: f64,
	pub doppler_hz: f64,
	pub carrier_phase_cycles: f64,
	pub cn0_db_hz: f64,
	pub ephemeris: Ephemeris,
}

impl Observable {

	/// Transmit time propagated to a later receiver time.  The transmitted
	/// clock runs at the code rate, which is Doppler-scaled relative to the
	/// receiver sample clock.
	fn tow_at(&self, rx_time_s: f64) -> f64 {
		let dt = rx_time_s - self.rx_time_s;
		self.tx_tow_sec + dt * (1.0 + self.doppler_hz / L1_HZ)
	}

	fn phase_at(&self, rx_time_s: f64) -> f64 {
		self.carrier_phase_cycles + self.doppler_hz * (rx_time_s - self.rx_time_s)
	}

}

/// One satellite's contribution to an aligned epoch
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlignedObservation {
	pub prn: usize,
	pub pseudorange_m: f64,
	pub doppler_hz: f64,
	pub carrier_phase_cycles: f64,
	pub cn0_db_hz: f64,
	/// Transmit TOW the satellite position should be evaluated at
	pub tx_tow_sec: f64,
	pub ephemeris: Ephemeris,
}

/// All usable satellites at one receiver epoch
#[derive(Debug, Clone)]
pub struct ObservationSet {
	/// Receiver TOW the pseudoranges are referenced to
	pub rx_tow_sec: f64,
	pub observations: Vec<AlignedObservation>,
}

pub struct ObservablesAligner {
	cadence_s: f64,
	tolerance_s: f64,
	latest: HashMap<usize, Observable>,
	next_epoch_s: f64,
	/// Fixed mapping from the sample clock to receiver TOW, set at the
	/// first epoch with a usable channel
	clock_offset_s: Option<f64>,
}

impl ObservablesAligner {

	pub fn new(cfg: &AlignmentConfig) -> Self {
		Self{
			cadence_s: cfg.cadence_s,
			tolerance_s: cfg.tolerance_s,
			latest: HashMap::new(),
			next_epoch_s: cfg.cadence_s,
			clock_offset_s: None,
		}
	}

	/// Records a channel's newest snapshot, superseding the previous one
	pub fn submit(&mut self, obs: Observable) {
		match self.latest.get(&obs.prn) {
			Some(prev) if prev.rx_time_s >= obs.rx_time_s => {},
			_ => { self.latest.insert(obs.prn, obs); },
		}
	}

	/// Forgets a channel, e.g. after loss of lock, so its stale snapshot
	/// cannot leak into a later epoch
	pub fn drop_channel(&mut self, prn: usize) {
		self.latest.remove(&prn);
	}

	/// Emits every alignment epoch due at the given stream time
	pub fn poll(&mut self, now_rx_time_s: f64) -> Vec<ObservationSet> {
		let mut sets = vec![];
		while self.next_epoch_s <= now_rx_time_s {
			let epoch = self.next_epoch_s;
			self.next_epoch_s += self.cadence_s;
			if let Some(set) = self.align_epoch(epoch) {
				sets.push(set);
			}
		}
		sets
	}

	fn align_epoch(&mut self, epoch_rx_time_s: f64) -> Option<ObservationSet> {
		// A channel is usable if its snapshot is recent enough to propagate
		let usable:Vec<&Observable> = self.latest.values()
			.filter(|o| {
				let age = epoch_rx_time_s - o.rx_time_s;
				age >= 0.0 && age <= self.tolerance_s
			})
			.collect();
		if usable.is_empty() { return None; }

		let rx_tow_sec = match self.clock_offset_s {
			Some(offset) => epoch_rx_time_s + offset,
			None => {
				let max_tow = usable.iter().map(|o| o.tow_at(epoch_rx_time_s)).fold(f64::MIN, f64::max);
				let rx_tow = max_tow + NOMINAL_TRAVEL_TIME_SEC;
				self.clock_offset_s = Some(rx_tow - epoch_rx_time_s);
				info!("receiver time base established: TOW {:.3} at stream time {:.3}", rx_tow, epoch_rx_time_s);
				rx_tow
			},
		};

		let observations:Vec<AlignedObservation> = usable.iter().map(|o| {
			let tx_tow_sec = o.tow_at(epoch_rx_time_s);
			AlignedObservation{
				prn: o.prn,
				pseudorange_m: (rx_tow_sec - tx_tow_sec) * C_METERS_PER_SEC,
				doppler_hz: o.doppler_hz,
				carrier_phase_cycles: o.phase_at(epoch_rx_time_s),
				cn0_db_hz: o.cn0_db_hz,
				tx_tow_sec,
				ephemeris: o.ephemeris,
			}
		}).collect();

		debug!("alignment epoch at TOW {:.3} with {} satellites", rx_tow_sec, observations.len());
		Some(ObservationSet{ rx_tow_sec, observations })
	}

}
