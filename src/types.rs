//! Data model: sensor frames, configuration, flags, and the firing solution.

use bitflags::bitflags;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Engine operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum Mode {
    /// Insufficient data for a solution.
    #[default]
    Idle = 0,
    /// A valid firing solution is available.
    SolutionReady = 1,
    /// A required input is missing or invalid.
    Fault = 2,
}

bitflags! {
    /// Fault conditions. The bit layout is externally visible and fixed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct FaultFlags: u32 {
        const NO_RANGE        = 1 << 0;
        const NO_BULLET       = 1 << 1;
        const NO_MV           = 1 << 2;
        const NO_BC           = 1 << 3;
        const ZERO_UNSOLVABLE = 1 << 4;
        const AHRS_UNSTABLE   = 1 << 5;
        const SENSOR_INVALID  = 1 << 6;
    }
}

impl FaultFlags {
    /// Faults that force FAULT mode and suppress the solution.
    /// `SENSOR_INVALID` is deliberately excluded so transient input glitches
    /// do not blank an otherwise valid solution.
    pub const HARD_MASK: FaultFlags = FaultFlags::from_bits_truncate(
        FaultFlags::NO_RANGE.bits()
            | FaultFlags::NO_BULLET.bits()
            | FaultFlags::NO_MV.bits()
            | FaultFlags::NO_BC.bits()
            | FaultFlags::ZERO_UNSOLVABLE.bits()
            | FaultFlags::AHRS_UNSTABLE.bits(),
    );
}

impl Default for FaultFlags {
    fn default() -> Self {
        FaultFlags::empty()
    }
}

impl Default for DiagFlags {
    fn default() -> Self {
        DiagFlags::empty()
    }
}

bitflags! {
    /// Informational diagnostics, never faults. Fixed bit layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DiagFlags: u32 {
        const CORIOLIS_DISABLED = 1 << 0;
        const DEFAULT_PRESSURE  = 1 << 1;
        const DEFAULT_TEMP      = 1 << 2;
        const DEFAULT_HUMIDITY  = 1 << 3;
        const DEFAULT_ALTITUDE  = 1 << 4;
        const DEFAULT_WIND      = 1 << 5;
        const MAG_SUPPRESSED    = 1 << 6;
        const LRF_STALE         = 1 << 7;
    }
}

/// Standard reference drag curve family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DragModel {
    #[default]
    G1,
    G2,
    G3,
    G4,
    G5,
    G6,
    G7,
    G8,
}

impl std::fmt::Display for DragModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DragModel::G1 => write!(f, "G1"),
            DragModel::G2 => write!(f, "G2"),
            DragModel::G3 => write!(f, "G3"),
            DragModel::G4 => write!(f, "G4"),
            DragModel::G5 => write!(f, "G5"),
            DragModel::G6 => write!(f, "G6"),
            DragModel::G7 => write!(f, "G7"),
            DragModel::G8 => write!(f, "G8"),
        }
    }
}

/// Selectable AHRS fusion algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AhrsAlgorithm {
    #[default]
    Madgwick,
    Mahony,
}

/// One normalized sensor frame, built by the caller each tick.
///
/// Timestamps are microseconds since boot and only need to be roughly
/// monotonic; jumps are tolerated by dt clamping.
#[derive(Debug, Clone, Copy)]
pub struct SensorFrame {
    pub timestamp_us: u64,

    /// Accelerometer (m/s²)
    pub accel: Vector3<f64>,
    /// Gyroscope (rad/s)
    pub gyro: Vector3<f64>,
    pub imu_valid: bool,

    /// Magnetometer field (μT)
    pub mag: Vector3<f64>,
    pub mag_valid: bool,

    pub baro_pressure_pa: f64,
    pub baro_temperature_c: f64,
    /// Relative humidity 0.0-1.0; only read when `baro_humidity_valid`.
    pub baro_humidity: f64,
    pub baro_valid: bool,
    pub baro_humidity_valid: bool,

    /// Laser rangefinder slant range (m)
    pub lrf_range_m: f64,
    /// Timestamp of the LRF reading itself
    pub lrf_timestamp_us: u64,
    /// Confidence 0.0-1.0; 0.0 means unprovided.
    pub lrf_confidence: f64,
    pub lrf_valid: bool,

    /// Zoom encoder focal length (mm); ingested but unused by the core.
    pub encoder_focal_length_mm: f64,
    pub encoder_valid: bool,
}

impl Default for SensorFrame {
    fn default() -> Self {
        SensorFrame {
            timestamp_us: 0,
            accel: Vector3::zeros(),
            gyro: Vector3::zeros(),
            imu_valid: false,
            mag: Vector3::zeros(),
            mag_valid: false,
            baro_pressure_pa: 0.0,
            baro_temperature_c: 0.0,
            baro_humidity: 0.0,
            baro_valid: false,
            baro_humidity_valid: false,
            lrf_range_m: 0.0,
            lrf_timestamp_us: 0,
            lrf_confidence: 0.0,
            lrf_valid: false,
            encoder_focal_length_mm: 0.0,
            encoder_valid: false,
        }
    }
}

/// Projectile description.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BulletProfile {
    /// Ballistic coefficient for the selected drag family.
    pub bc: f64,
    pub drag_model: DragModel,
    /// Published muzzle velocity (m/s).
    pub muzzle_velocity_ms: f64,
    /// Actual barrel length (in); velocity is adjusted for deviation from 24".
    pub barrel_length_in: f64,
    /// Velocity change per inch of barrel deviation (fps/in).
    pub mv_adjustment_factor: f64,
    pub mass_grains: f64,
    pub length_mm: f64,
    pub caliber_inches: f64,
    /// Signed twist rate (in/turn): positive = right-hand.
    pub twist_rate_inches: f64,
}

/// Zeroing configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ZeroConfig {
    pub zero_range_m: f64,
    /// Sight height above the bore axis (mm).
    pub sight_height_mm: f64,
}

/// Per-field opt-in replacements for the ISA defaults. Barometer readings
/// take precedence over pressure/temperature/humidity overrides; altitude
/// has no sensor counterpart, so its override always wins.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DefaultOverrides {
    pub use_altitude: bool,
    pub altitude_m: f64,

    pub use_pressure: bool,
    pub pressure_pa: f64,

    pub use_temperature: bool,
    pub temperature_c: f64,

    pub use_humidity: bool,
    pub humidity_fraction: f64,

    pub use_wind: bool,
    pub wind_speed_ms: f64,
    pub wind_heading_deg: f64,

    pub use_latitude: bool,
    pub latitude_deg: f64,
}

/// Angular offset pair (MOA) used for boresight and reticle corrections.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OffsetMoa {
    pub vertical_moa: f64,
    pub horizontal_moa: f64,
}

/// The engine's output, copied out on demand. All fields default to zero at
/// init; numeric fields keep their last published values while the engine is
/// in FAULT or IDLE (only mode and flags are refreshed then).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FiringSolution {
    pub mode: Mode,
    pub fault_flags: FaultFlags,
    pub diag_flags: DiagFlags,

    /// Total elevation hold (MOA).
    pub hold_elevation_moa: f64,
    /// Total windage hold (MOA).
    pub hold_windage_moa: f64,

    /// Slant range to target: the raw (unfiltered) LRF sample by design.
    pub range_m: f64,
    pub horizontal_range_m: f64,
    pub tof_ms: f64,
    pub velocity_at_target_ms: f64,
    pub energy_at_target_j: f64,

    pub coriolis_windage_moa: f64,
    pub coriolis_elevation_moa: f64,
    pub spin_drift_moa: f64,

    // Windage decomposition: wind-only, earth-spin (Coriolis + spin drift),
    // mechanical offsets, and the residual introduced by cant.
    pub wind_only_windage_moa: f64,
    pub earth_spin_windage_moa: f64,
    pub offsets_windage_moa: f64,
    pub cant_windage_moa: f64,

    pub cant_angle_deg: f64,
    pub heading_deg_true: f64,
    pub air_density_kgm3: f64,
}
