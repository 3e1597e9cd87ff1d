
//! Position, velocity, and time estimation.
//!
//! Each aligned epoch is solved on its own by iterative least squares over
//! pseudoranges, with the receiver clock bias as the fourth unknown.
//! Velocity comes from a linear Doppler solve reusing the converged
//! geometry.  A single fault-exclusion pass drops the worst satellite when
//! the post-fit residuals say so.  Solving never kills the process: epochs
//! that cannot be solved produce a `NoFix` (or a held-over `Degraded`)
//! solution and the receiver moves on.

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3, Vector4};
use serde::{Serialize, Deserialize};

use crate::config::{PvtConfig, SolverMode};
use crate::constants::{C_METERS_PER_SEC, L1_WAVELENGTH_M, OMEGA_DOT_E};
use crate::geo;
use crate::observables::ObservationSet;
use crate::Error;

pub mod ephemeris;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixStatus {
	NoFix,
	Fix3d,
	/// A solution exists but should be treated with suspicion: failed fault
	/// exclusion, or a position held over from an earlier epoch
	Degraded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DilutionOfPrecision {
	pub gdop: f64,
	pub pdop: f64,
	pub hdop: f64,
	pub vdop: f64,
	pub tdop: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationSolution {
	pub rx_tow_sec: f64,
	pub status: FixStatus,
	pub position_ecef_m: Option<(f64, f64, f64)>,
	pub clock_bias_m: Option<f64>,
	pub velocity_ecef_m_s: Option<(f64, f64, f64)>,
	pub clock_drift_m_s: Option<f64>,
	pub num_satellites: usize,
	pub excluded_prns: Vec<usize>,
	pub dop: Option<DilutionOfPrecision>,
}

impl NavigationSolution {

	fn no_fix(rx_tow_sec: f64, num_satellites: usize) -> Self {
		Self{
			rx_tow_sec,
			status: FixStatus::NoFix,
			position_ecef_m: None,
			clock_bias_m: None,
			velocity_ecef_m_s: None,
			clock_drift_m_s: None,
			num_satellites,
			excluded_prns: vec![],
			dop: None,
		}
	}

}

/// One satellite's measurement after ephemeris evaluation, earth-rotation
/// compensation, and clock correction
#[derive(Debug, Clone)]
struct SatMeasurement {
	prn: usize,
	position: Vector3<f64>,
	velocity: Vector3<f64>,
	pseudorange_m: f64,
	doppler_hz: f64,
}

pub struct PvtSolver {
	cfg: PvtConfig,
	last: Option<NavigationSolution>,
}

impl PvtSolver {

	pub fn new(cfg: PvtConfig) -> Self {
		Self{ cfg, last: None }
	}

	pub fn last_solution(&self) -> Option<&NavigationSolution> { self.last.as_ref() }

	/// Solves one aligned epoch.  Always returns a solution; look at its
	/// status to see whether it carries a usable position.
	pub fn solve(&mut self, set: &ObservationSet) -> NavigationSolution {
		let mut meas = prepare(set);

		// Elevation masking needs a position; use the last one if we have it
		if let Some(rx) = self.last_position() {
			let mask_rad = self.cfg.elevation_mask_deg.to_radians();
			meas.retain(|m| geo::elevation_rad(&rx, &m.position) >= mask_rad);
		}

		let solution = match self.try_solve(&meas, set.rx_tow_sec) {
			Ok(sol) => {
				debug!("fix at TOW {:.3}: {} satellites, status {:?}", sol.rx_tow_sec, sol.num_satellites, sol.status);
				sol
			},
			Err(e) => self.fallback(e, set.rx_tow_sec, meas.len()),
		};

		if solution.position_ecef_m.is_some() {
			self.last = Some(solution.clone());
		}
		solution
	}

	fn last_position(&self) -> Option<Vector3<f64>> {
		self.last.as_ref()
			.and_then(|s| s.position_ecef_m)
			.map(|(x, y, z)| Vector3::new(x, y, z))
	}

	fn initial_state(&self) -> Vector4<f64> {
		match (self.last_position(), self.last.as_ref().and_then(|s| s.clock_bias_m)) {
			(Some(p), Some(b)) => Vector4::new(p.x, p.y, p.z, b),
			_ => Vector4::zeros(),
		}
	}

	fn try_solve(&self, meas: &[SatMeasurement], rx_tow_sec: f64) -> Result<NavigationSolution, Error> {
		if meas.len() < 4 { return Err(Error::NotEnoughSatellites(meas.len())); }

		let mut used:Vec<SatMeasurement> = meas.to_vec();
		let (mut state, mut geometry, residuals) = self.least_squares(&used, self.initial_state())?;
		let mut excluded_prns = vec![];
		let mut degraded = false;

		// With four satellites the post-fit residuals are identically zero,
		// so a fault cannot be seen, let alone excluded
		if self.cfg.fault_exclusion && used.len() < 5 {
			degraded = true;
		}

		if self.cfg.fault_exclusion && used.len() >= 5 {
			let (worst_i, worst) = residuals.iter().enumerate()
				.fold((0, 0.0), |acc, (i, r)| if r.abs() > acc.1 { (i, r.abs()) } else { acc });
			if worst > self.cfg.residual_threshold_m {
				let suspect = used[worst_i].prn;
				warn!("excluding PRN {}: post-fit residual {:.1} m", suspect, worst);
				let retained:Vec<SatMeasurement> = used.iter().enumerate()
					.filter(|(i, _)| *i != worst_i)
					.map(|(_, m)| m.clone())
					.collect();
				match self.least_squares(&retained, state) {
					Ok((s2, g2, r2)) => {
						excluded_prns.push(suspect);
						degraded = r2.iter().any(|r| r.abs() > self.cfg.residual_threshold_m);
						used = retained;
						state = s2;
						geometry = g2;
					},
					Err(_) => degraded = true,
				}
			}
		}

		let position = Vector3::new(state[0], state[1], state[2]);
		let dop = dilution_of_precision(&geometry, &position);
		let velocity = self.doppler_velocity(&used, &position);

		Ok(NavigationSolution{
			rx_tow_sec,
			status: if degraded { FixStatus::Degraded } else { FixStatus::Fix3d },
			position_ecef_m: Some((position.x, position.y, position.z)),
			clock_bias_m: Some(state[3]),
			velocity_ecef_m_s: velocity.map(|(v, _)| (v.x, v.y, v.z)),
			clock_drift_m_s: velocity.map(|(_, d)| d),
			num_satellites: used.len(),
			excluded_prns,
			dop,
		})
	}

	/// Gauss-Newton on pseudoranges.  Returns the converged state, the final
	/// geometry matrix, and the post-fit residuals.
	fn least_squares(&self, meas: &[SatMeasurement], initial: Vector4<f64>)
		-> Result<(Vector4<f64>, DMatrix<f64>, DVector<f64>), Error> {

		let n = meas.len();
		let mut state = initial;

		for _ in 0..self.cfg.max_iterations {
			let (h, r) = build_system(meas, &state)?;

			let hth = h.tr_mul(&h);
			let inv = hth.try_inverse().ok_or(Error::IllConditionedGeometry)?;
			let delta = inv * h.tr_mul(&r);
			state += Vector4::new(delta[0], delta[1], delta[2], delta[3]);

			let position_step = (delta[0].powi(2) + delta[1].powi(2) + delta[2].powi(2)).sqrt();
			if position_step < self.cfg.convergence_m {
				let (h, r) = build_system(meas, &state)?;
				debug_assert_eq!(r.len(), n);
				return Ok((state, h, r));
			}
		}
		Err(Error::NonConvergence)
	}

	/// Linear range-rate solve over Doppler measurements using the final
	/// position geometry
	fn doppler_velocity(&self, meas: &[SatMeasurement], rx: &Vector3<f64>) -> Option<(Vector3<f64>, f64)> {
		let n = meas.len();
		if n < 4 { return None; }

		let mut a = DMatrix::zeros(n, 4);
		let mut b = DVector::zeros(n);
		for (i, m) in meas.iter().enumerate() {
			let los = m.position - rx;
			let range = los.norm();
			if range <= 0.0 { return None; }
			let u = los / range;
			a[(i, 0)] = -u.x;
			a[(i, 1)] = -u.y;
			a[(i, 2)] = -u.z;
			a[(i, 3)] = 1.0;
			// Positive Doppler means the range is closing
			let range_rate = -m.doppler_hz * L1_WAVELENGTH_M;
			b[i] = range_rate - u.dot(&m.velocity);
		}

		let inv = a.tr_mul(&a).try_inverse()?;
		let x = inv * a.tr_mul(&b);
		Some((Vector3::new(x[0], x[1], x[2]), x[3]))
	}

	fn fallback(&self, e: Error, rx_tow_sec: f64, num_satellites: usize) -> NavigationSolution {
		debug!("no fix at TOW {:.3}: {}", rx_tow_sec, e);
		match (self.cfg.mode, self.last.as_ref()) {
			(SolverMode::Holdover, Some(prev)) if prev.position_ecef_m.is_some() => {
				info!("holding over position from TOW {:.3}", prev.rx_tow_sec);
				NavigationSolution{
					rx_tow_sec,
					status: FixStatus::Degraded,
					position_ecef_m: prev.position_ecef_m,
					clock_bias_m: None,
					velocity_ecef_m_s: None,
					clock_drift_m_s: None,
					num_satellites,
					excluded_prns: vec![],
					dop: None,
				}
			},
			_ => NavigationSolution::no_fix(rx_tow_sec, num_satellites),
		}
	}

}

/// Evaluates ephemerides at the transmit times and brings the satellite
/// states into the reception-time ECEF frame
fn prepare(set: &ObservationSet) -> Vec<SatMeasurement> {
	set.observations.iter().filter_map(|o| {
		if o.ephemeris.sv_health != 0 {
			debug!("PRN {} unhealthy (flags {:#x}), skipping", o.prn, o.ephemeris.sv_health);
			return None;
		}
		let clock = o.ephemeris.clock_bias_sec(o.tx_tow_sec);
		let t = o.tx_tow_sec - clock;

		// Earth rotation during signal flight
		let theta = OMEGA_DOT_E * (set.rx_tow_sec - o.tx_tow_sec);
		let rot = rotation_z(theta);

		Some(SatMeasurement{
			prn: o.prn,
			position: rot * o.ephemeris.position_ecef(t),
			velocity: rot * o.ephemeris.velocity_ecef(t),
			pseudorange_m: o.pseudorange_m + C_METERS_PER_SEC * clock,
			doppler_hz: o.doppler_hz,
		})
	}).collect()
}

fn rotation_z(theta: f64) -> Matrix3<f64> {
	let (s, c) = theta.sin_cos();
	Matrix3::new(
		 c,  s, 0.0,
		-s,  c, 0.0,
		0.0, 0.0, 1.0,
	)
}

fn build_system(meas: &[SatMeasurement], state: &Vector4<f64>) -> Result<(DMatrix<f64>, DVector<f64>), Error> {
	let n = meas.len();
	let rx = Vector3::new(state[0], state[1], state[2]);
	let mut h = DMatrix::zeros(n, 4);
	let mut r = DVector::zeros(n);
	for (i, m) in meas.iter().enumerate() {
		let los = m.position - rx;
		let range = los.norm();
		if range <= 0.0 { return Err(Error::IllConditionedGeometry); }
		let u = los / range;
		h[(i, 0)] = -u.x;
		h[(i, 1)] = -u.y;
		h[(i, 2)] = -u.z;
		h[(i, 3)] = 1.0;
		r[i] = m.pseudorange_m - (range + state[3]);
	}
	Ok((h, r))
}

/// DOP figures from the geometry covariance, with the position block
/// rotated into the local ENU frame for the horizontal/vertical split
fn dilution_of_precision(h: &DMatrix<f64>, position: &Vector3<f64>) -> Option<DilutionOfPrecision> {
	let q = h.tr_mul(h).try_inverse()?;

	let q_pos = Matrix3::new(
		q[(0, 0)], q[(0, 1)], q[(0, 2)],
		q[(1, 0)], q[(1, 1)], q[(1, 2)],
		q[(2, 0)], q[(2, 1)], q[(2, 2)],
	);
	let r = geo::ecef_to_enu_rotation(&geo::ecef_to_wgs84(position));
	let q_enu = r * q_pos * r.transpose();

	let tdop_sq = q[(3, 3)];
	let pdop_sq = q_pos.trace();
	Some(DilutionOfPrecision{
		gdop: (pdop_sq + tdop_sq).sqrt(),
		pdop: pdop_sq.sqrt(),
		hdop: (q_enu[(0, 0)] + q_enu[(1, 1)]).sqrt(),
		vdop: q_enu[(2, 2)].sqrt(),
		tdop: tdop_sq.sqrt(),
	})
}
