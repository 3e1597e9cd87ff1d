
//! Broadcast ephemeris: satellite orbit and clock evaluation.
//!
//! Assembled from subframes 1 through 3 once their issue-of-data fields
//! agree.  Orbit propagation follows the interface specification's Keplerian
//! algorithm; broadcast angles are in semicircles and converted to radians
//! here.

use std::f64::consts;

use nalgebra::Vector3;
use serde::{Serialize, Deserialize};

use crate::constants::{F_REL, MU, OMEGA_DOT_E};
use crate::telemetry::subframe::{Subframe1, Subframe2, Subframe3};
use crate::Error;

const WEEK_SEC:f64 = 604_800.0;

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Ephemeris {
	pub week_number: u16,
	pub sv_health: u8,
	pub iodc: u16,

	// Clock model
	pub t_gd: f64,
	pub t_oc: f64,
	pub a_f2: f64,
	pub a_f1: f64,
	pub a_f0: f64,

	// Orbit model; angles in semicircles as broadcast
	pub crs: f64,
	pub dn: f64,
	pub m0: f64,
	pub cuc: f64,
	pub e: f64,
	pub cus: f64,
	pub sqrt_a: f64,
	pub t_oe: f64,
	pub cic: f64,
	pub omega0: f64,
	pub cis: f64,
	pub i0: f64,
	pub crc: f64,
	pub omega: f64,
	pub omega_dot: f64,
	pub idot: f64,
}

/// Time difference accounting for the end-of-week crossover
fn week_crossover(dt: f64) -> f64 {
	if dt > WEEK_SEC / 2.0 { dt - WEEK_SEC }
	else if dt < -WEEK_SEC / 2.0 { dt + WEEK_SEC }
	else { dt }
}

impl Ephemeris {

	/// Merges the three ephemeris subframes.  The issue-of-data fields must
	/// agree, otherwise the subframes straddle an upload cutover and cannot
	/// be combined.
	pub fn from_subframes(sf1: &Subframe1, sf2: &Subframe2, sf3: &Subframe3) -> Result<Self, Error> {
		if (sf1.iodc % 256) != (sf2.iode as u16) || sf2.iode != sf3.iode {
			return Err(Error::InvalidTelemetryData("issue of data mismatch across subframes"));
		}

		Ok(Self{
			week_number: sf1.week_number,
			sv_health: sf1.sv_health,
			iodc: sf1.iodc,
			t_gd: sf1.t_gd,
			t_oc: sf1.t_oc as f64,
			a_f2: sf1.a_f2,
			a_f1: sf1.a_f1,
			a_f0: sf1.a_f0,
			crs: sf2.crs,
			dn: sf2.dn,
			m0: sf2.m0,
			cuc: sf2.cuc,
			e: sf2.e,
			cus: sf2.cus,
			sqrt_a: sf2.sqrt_a,
			t_oe: sf2.t_oe,
			cic: sf3.cic,
			omega0: sf3.omega0,
			cis: sf3.cis,
			i0: sf3.i0,
			crc: sf3.crc,
			omega: sf3.omega,
			omega_dot: sf3.omega_dot,
			idot: sf3.idot,
		})
	}

	fn eccentric_anomaly(&self, t: f64) -> f64 {
		let a = self.sqrt_a.powi(2);
		let n = (MU / a.powi(3)).sqrt() + self.dn * consts::PI;
		let tk = week_crossover(t - self.t_oe);
		let mk = self.m0 * consts::PI + n * tk;

		let mut ek = mk;
		for _ in 0..10 {
			ek = ek - (ek - self.e * ek.sin() - mk) / (1.0 - self.e * ek.cos());
		}
		ek
	}

	/// Satellite clock offset from system time, including the relativistic
	/// term and the L1 group delay
	pub fn clock_bias_sec(&self, t: f64) -> f64 {
		let dt = week_crossover(t - self.t_oc);
		let dt_rel = F_REL * self.e * self.sqrt_a * self.eccentric_anomaly(t).sin();
		self.a_f0 + self.a_f1 * dt + self.a_f2 * dt.powi(2) + dt_rel - self.t_gd
	}

	/// ECEF position at GPS system time `t`
	pub fn position_ecef(&self, t: f64) -> Vector3<f64> {
		let a = self.sqrt_a.powi(2);
		let tk = week_crossover(t - self.t_oe);
		let ek = self.eccentric_anomaly(t);

		// True anomaly and argument of latitude
		let nu_k = {
			let y = (1.0 - self.e.powi(2)).sqrt() * ek.sin() / (1.0 - self.e * ek.cos());
			let x = (ek.cos() - self.e) / (1.0 - self.e * ek.cos());
			y.atan2(x)
		};
		let phi_k = nu_k + self.omega * consts::PI;

		// Second-harmonic corrections
		let du_k = self.cus * (2.0 * phi_k).sin() + self.cuc * (2.0 * phi_k).cos();
		let dr_k = self.crs * (2.0 * phi_k).sin() + self.crc * (2.0 * phi_k).cos();
		let di_k = self.cis * (2.0 * phi_k).sin() + self.cic * (2.0 * phi_k).cos();

		let u_k = phi_k + du_k;
		let r_k = a * (1.0 - self.e * ek.cos()) + dr_k;
		let i_k = self.i0 * consts::PI + di_k + self.idot * consts::PI * tk;

		// Orbital-plane coordinates rotated into ECEF
		let x_kp = r_k * u_k.cos();
		let y_kp = r_k * u_k.sin();
		let omega_k = self.omega0 * consts::PI + (self.omega_dot * consts::PI - OMEGA_DOT_E) * tk - OMEGA_DOT_E * self.t_oe;

		Vector3::new(
			x_kp * omega_k.cos() - y_kp * i_k.cos() * omega_k.sin(),
			x_kp * omega_k.sin() + y_kp * i_k.cos() * omega_k.cos(),
			y_kp * i_k.sin(),
		)
	}

	/// ECEF velocity by central difference; accurate enough for the Doppler
	/// measurement model
	pub fn velocity_ecef(&self, t: f64) -> Vector3<f64> {
		let dt = 0.5;
		(self.position_ecef(t + dt) - self.position_ecef(t - dt)) / (2.0 * dt)
	}

}

#[cfg(test)]
mod tests {

	use super::*;

	// A circular 26560 km orbit at 55 degrees inclination
	pub(crate) fn circular_orbit() -> Ephemeris {
		Ephemeris{
			week_number: 2200, sv_health: 0, iodc: 0x1A5,
			t_gd: 0.0, t_oc: 302_400.0, a_f2: 0.0, a_f1: 0.0, a_f0: 0.0,
			crs: 0.0, dn: 0.0, m0: 0.25, cuc: 0.0, e: 0.0, cus: 0.0,
			sqrt_a: (26_560.0e3_f64).sqrt(), t_oe: 302_400.0,
			cic: 0.0, omega0: -0.4, cis: 0.0, i0: 55.0 / 180.0,
			crc: 0.0, omega: 0.1, omega_dot: 0.0, idot: 0.0,
		}
	}

	#[test]
	fn circular_orbit_radius_is_constant() {
		let eph = circular_orbit();
		for t in [300_000.0, 302_400.0, 310_000.0] {
			let r = eph.position_ecef(t).norm();
			assert!((r - 26_560.0e3).abs() < 1.0, "radius {} at t {}", r, t);
		}
	}

	#[test]
	fn velocity_is_tangential_for_circular_orbit() {
		let eph = circular_orbit();
		let t = 303_000.0;
		let r = eph.position_ecef(t);
		let v = eph.velocity_ecef(t);
		// Constant radius means the ECEF velocity has no radial component
		assert!(r.dot(&v).abs() / (r.norm() * v.norm()) < 1.0e-3);
		// Low-earth bound on the speed: orbital plus earth-rotation terms
		assert!(v.norm() > 2.0e3 && v.norm() < 5.0e3, "speed {}", v.norm());
	}

	#[test]
	fn clock_polynomial_and_group_delay() {
		let mut eph = circular_orbit();
		eph.a_f0 = 1.0e-4;
		eph.a_f1 = 1.0e-11;
		eph.t_gd = 5.0e-9;
		let t = eph.t_oc + 100.0;
		let expected = 1.0e-4 + 1.0e-11 * 100.0 - 5.0e-9;
		// e is zero so there is no relativistic term
		assert!((eph.clock_bias_sec(t) - expected).abs() < 1.0e-15);
	}

	#[test]
	fn week_crossover_wraps_both_ways() {
		assert_eq!(week_crossover(400_000.0), 400_000.0 - 604_800.0);
		assert_eq!(week_crossover(-400_000.0), -400_000.0 + 604_800.0);
		assert_eq!(week_crossover(1000.0), 1000.0);
	}

}
