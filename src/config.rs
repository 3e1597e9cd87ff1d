
//! Typed per-channel and per-stage configuration.
//!
//! The textual configuration loader lives outside the core; these structs are
//! what it deserializes into.  Defaults follow common L1 C/A practice.

use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
	/// Implementation selector for the acquisition factory
	pub method: String,
	pub doppler_max_hz: f64,
	pub doppler_step_hz: f64,
	/// Coherent integration time in code periods
	pub coherent_code_periods: usize,
	/// Non-coherent dwell budget before the search is declared failed
	pub max_dwells: usize,
	/// Per-search false alarm probability the detection threshold is derived from
	pub false_alarm_prob: f64,
}

impl Default for AcquisitionConfig {
	fn default() -> Self {
		Self{
			method: "pcps".to_owned(),
			doppler_max_hz: 5000.0,
			doppler_step_hz: 250.0,
			coherent_code_periods: 1,
			max_dwells: 4,
			false_alarm_prob: 1.0e-3,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarrierDiscriminator {
	/// Costas atan(Q/I), insensitive to data-bit flips
	CostasAtan,
	/// Four-quadrant atan2(Q, I), for data-free tracking
	Atan2,
	/// Cross-product frequency discriminator
	FllCross,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
	/// Implementation selector for the tracking factory
	pub method: String,
	pub correlator_spacing_chips: f64,
	pub carrier_discriminator: CarrierDiscriminator,
	/// Pull-in loop noise bandwidths
	pub pll_bw_wide_hz: f64,
	pub dll_bw_wide_hz: f64,
	/// Steady-state bandwidths, applied once the lock criterion is met
	pub pll_bw_narrow_hz: f64,
	pub dll_bw_narrow_hz: f64,
	pub loop_damping: f64,
	/// CN0 threshold the lock/loss decisions compare against
	pub cn0_threshold_db_hz: f64,
	/// Consecutive epochs above threshold before lock is declared
	pub lock_confirm_epochs: usize,
	/// Consecutive epochs below threshold before loss of lock is declared
	pub loss_of_lock_epochs: usize,
	/// Prompt window the instantaneous CN0 estimate is formed over
	pub cn0_window_epochs: usize,
	/// Smoothing constant of the CN0 low-pass filter
	pub cn0_smoothing_alpha: f64,
	/// NCO slew limits, rejecting discriminator outliers
	pub max_carrier_step_hz: f64,
	pub max_code_step_chips_s: f64,
}

impl Default for TrackingConfig {
	fn default() -> Self {
		Self{
			method: "dll_pll".to_owned(),
			correlator_spacing_chips: 0.5,
			carrier_discriminator: CarrierDiscriminator::CostasAtan,
			pll_bw_wide_hz: 25.0,
			dll_bw_wide_hz: 2.0,
			pll_bw_narrow_hz: 12.0,
			dll_bw_narrow_hz: 1.0,
			loop_damping: 0.7,
			cn0_threshold_db_hz: 30.0,
			lock_confirm_epochs: 20,
			loss_of_lock_epochs: 20,
			cn0_window_epochs: 20,
			cn0_smoothing_alpha: 0.2,
			max_carrier_step_hz: 200.0,
			max_code_step_chips_s: 50.0,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
	/// Implementation selector for the telemetry factory
	pub method: String,
	/// Consecutive frame-preamble misses before bit sync is declared lost
	pub preamble_miss_limit: usize,
	/// Sign transitions that must agree before a bit boundary is accepted
	pub bit_sync_votes: usize,
}

impl Default for TelemetryConfig {
	fn default() -> Self {
		Self{ method: "lnav".to_owned(), preamble_miss_limit: 3, bit_sync_votes: 5 }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
	pub prn: usize,
	pub fs: f64,
	pub acquisition: AcquisitionConfig,
	pub tracking: TrackingConfig,
	pub telemetry: TelemetryConfig,
	/// Epochs the loop may spend pulling in before the attempt is abandoned
	pub pull_in_timeout_epochs: usize,
	/// Reacquisition attempts after a failure before the channel idles
	pub retry_budget: usize,
}

impl ChannelConfig {
	pub fn new(prn: usize, fs: f64) -> Self {
		Self{
			prn, fs,
			acquisition: AcquisitionConfig::default(),
			tracking: TrackingConfig::default(),
			telemetry: TelemetryConfig::default(),
			pull_in_timeout_epochs: 1500,
			retry_budget: 2,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentConfig {
	/// Output cadence of the observables aligner
	pub cadence_s: f64,
	/// How stale a channel's last observable may be before it is left out of an epoch
	pub tolerance_s: f64,
}

impl Default for AlignmentConfig {
	fn default() -> Self { Self{ cadence_s: 1.0, tolerance_s: 0.1 } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMode {
	/// Every epoch solved on its own
	SingleEpoch,
	/// Carry the previous solution forward when an epoch cannot be solved
	Holdover,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PvtConfig {
	pub mode: SolverMode,
	pub elevation_mask_deg: f64,
	pub fault_exclusion: bool,
	pub max_iterations: usize,
	/// Position-correction norm below which the iteration has converged
	pub convergence_m: f64,
	/// Post-fit residual bound for RAIM-style exclusion
	pub residual_threshold_m: f64,
}

impl Default for PvtConfig {
	fn default() -> Self {
		Self{
			mode: SolverMode::SingleEpoch,
			elevation_mask_deg: 5.0,
			fault_exclusion: true,
			max_iterations: 10,
			convergence_m: 1.0e-4,
			residual_threshold_m: 10.0,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
	pub fs: f64,
	pub alignment: AlignmentConfig,
	pub pvt: PvtConfig,
}

impl ReceiverConfig {
	pub fn new(fs: f64) -> Self {
		Self{ fs, alignment: AlignmentConfig::default(), pvt: PvtConfig::default() }
	}
}
