
//! WGS-84 coordinate conversions.

use nalgebra::{Matrix3, Vector3};

pub const WGS84_SEMI_MAJOR_AXIS_METERS:f64 = 6378137.0;
pub const WGS84_SEMI_MINOR_AXIS_METERS:f64 = 6356752.314245;

#[derive(Debug, Clone, Copy)]
pub struct PositionWGS84 {
	pub latitude_rad: f64,
	pub longitude_rad: f64,
	pub height_above_ellipsoid_m: f64,
}

/// Closed-form ECEF to geodetic conversion (Bowring's method)
pub fn ecef_to_wgs84(ecef: &Vector3<f64>) -> PositionWGS84 {
	let a = WGS84_SEMI_MAJOR_AXIS_METERS;
	let b = WGS84_SEMI_MINOR_AXIS_METERS;
	let e_sq = (a * a - b * b) / (a * a);
	let ep_sq = (a * a - b * b) / (b * b);

	let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
	let r = (p * p + ecef.z * ecef.z).sqrt();

	let beta = (((b * ecef.z) / (a * p)) * (1.0 + ep_sq * (b / r))).atan();
	let latitude_rad = {
		let num = ecef.z + ep_sq * b * beta.sin().powi(3);
		let denom = p - e_sq * a * beta.cos().powi(3);
		(num / denom).atan()
	};
	let longitude_rad = ecef.y.atan2(ecef.x);

	let v = a / (1.0 - e_sq * latitude_rad.sin().powi(2)).sqrt();
	let height_above_ellipsoid_m = p * latitude_rad.cos() + ecef.z * latitude_rad.sin() - (a * a) / v;

	PositionWGS84{ latitude_rad, longitude_rad, height_above_ellipsoid_m }
}

/// Rotation taking ECEF vectors into the local east/north/up frame at the
/// given geodetic position
pub fn ecef_to_enu_rotation(pos: &PositionWGS84) -> Matrix3<f64> {
	let (slat, clat) = pos.latitude_rad.sin_cos();
	let (slon, clon) = pos.longitude_rad.sin_cos();
	Matrix3::new(
		-slon,        clon,         0.0,
		-slat * clon, -slat * slon, clat,
		 clat * clon,  clat * slon, slat,
	)
}

/// Elevation angle in radians of a satellite seen from a receiver, both in
/// ECEF
pub fn elevation_rad(rx_ecef: &Vector3<f64>, sv_ecef: &Vector3<f64>) -> f64 {
	let wgs84 = ecef_to_wgs84(rx_ecef);
	let los_enu = ecef_to_enu_rotation(&wgs84) * (sv_ecef - rx_ecef);
	let horizontal = (los_enu.x * los_enu.x + los_enu.y * los_enu.y).sqrt();
	los_enu.z.atan2(horizontal)
}
