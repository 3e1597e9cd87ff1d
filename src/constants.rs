
//! Physical and GPS L1 C/A signal constants.

pub const C_METERS_PER_SEC:f64 = 2.99792458e8;   // [m/s] speed of light
pub const MU:f64 = 3.986005e14;                  // [m^3/s^2] WGS-84 earth gravitational constant
pub const OMEGA_DOT_E:f64 = 7.2921151467e-5;     // [rad/s] WGS-84 earth rotation rate
pub const F_REL:f64 = -4.442807633e-10;          // [sec/root-meter] relativistic clock constant

pub const L1_HZ:f64 = 1.57542e9;                 // [Hz] L1 carrier frequency
pub const L1_WAVELENGTH_M:f64 = C_METERS_PER_SEC / L1_HZ;

pub const CODE_LENGTH_CHIPS:usize = 1023;
pub const CHIP_RATE_HZ:f64 = 1.023e6;
pub const CODE_PERIOD_SEC:f64 = 1.0e-3;
pub const CODES_PER_BIT:usize = 20;              // 50 bps data on a 1 kHz code epoch rate

/// Nominal one-way signal travel time used to seed the receiver time scale
/// before a position is available.
pub const NOMINAL_TRAVEL_TIME_SEC:f64 = 0.068802;
