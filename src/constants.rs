//! Physical constants, unit conversions, and engine tuning parameters.

use std::f64::consts::PI;

/// Gravitational acceleration (m/s²)
pub const GRAVITY_MPS2: f64 = 9.80665;

/// Conversion factor: meters per second to feet per second
pub const MPS_TO_FPS: f64 = 3.28084;

/// Conversion factor: feet per second to meters per second
pub const FPS_TO_MPS: f64 = 0.3048;

/// Standard air density at sea level ISA (kg/m³)
pub const STD_AIR_DENSITY: f64 = 1.225;

/// Speed of sound at 15 °C, dry air (m/s)
pub const SPEED_OF_SOUND_15C: f64 = 340.29;

/// Specific gas constant for dry air (J/(kg·K))
pub const R_DRY_AIR: f64 = 287.05;

/// Kelvin offset from Celsius
pub const KELVIN_OFFSET: f64 = 273.15;

/// Earth rotation rate (rad/s)
pub const OMEGA_EARTH: f64 = 7.2921e-5;

pub const DEG_TO_RAD: f64 = PI / 180.0;
pub const RAD_TO_DEG: f64 = 180.0 / PI;
pub const MOA_TO_RAD: f64 = PI / (180.0 * 60.0);
pub const RAD_TO_MOA: f64 = (180.0 * 60.0) / PI;

/// Conversion factor: grains to kilograms
pub const GRAINS_TO_KG: f64 = 6.479891e-5;

pub const INCHES_TO_M: f64 = 0.0254;
pub const MM_TO_M: f64 = 1e-3;

// ---------------------------------------------------------------------------
// ISA defaults applied at init and whenever sensor/override data is absent
// ---------------------------------------------------------------------------

pub const DEFAULT_ALTITUDE_M: f64 = 0.0;
pub const DEFAULT_PRESSURE_PA: f64 = 101_325.0;
pub const DEFAULT_TEMPERATURE_C: f64 = 15.0;
pub const DEFAULT_HUMIDITY: f64 = 0.50;

/// Reference barometric pressure at sea level (Pa); baro field calibration
/// offsets the sensor so the current reading reports this value.
pub const STD_PRESSURE_PA: f64 = 101_325.0;

// ---------------------------------------------------------------------------
// Trajectory solver
// ---------------------------------------------------------------------------

/// Maximum supported target range (m); also sizes the trajectory table.
pub const MAX_RANGE_M: usize = 2500;

/// Trajectory table entries: 1-meter resolution from 0 to `MAX_RANGE_M` inclusive.
pub const TRAJ_TABLE_SIZE: usize = MAX_RANGE_M + 1;

/// Velocity below which integration terminates (m/s)
pub const MIN_VELOCITY_MS: f64 = 30.0;

/// Ballistic drag conversion constant used by the point-mass retardation
/// model. This is a legacy tuning parameter from an older model and is not
/// physically based. It is retained for calibration compatibility and must
/// not be modified without re-validating the entire system.
pub const BALLISTIC_DRAG_CONSTANT: f64 = 900.0;

/// Drag scale for the external-reference calibration mode. Reduces modeled
/// retardation while preserving legacy default behavior.
pub const EXTERNAL_REFERENCE_DRAG_SCALE: f64 = 0.84;
pub const DEFAULT_DRAG_REFERENCE_SCALE: f64 = 1.0;

/// Iteration cap for one integration pass (safety bound, never hit in
/// admissible configurations)
pub const MAX_SOLVER_ITERATIONS: u32 = 500_000;

/// Adaptive timestep bounds (seconds)
pub const DT_MIN_S: f64 = 0.00001; // 10 μs
pub const DT_MAX_S: f64 = 0.001; // 1 ms

/// Maximum downrange distance advanced per integration step (m)
pub const MAX_STEP_DISTANCE_M: f64 = 0.25;

/// Zero-angle bisection tolerance: drop error at the zero range (m)
pub const ZERO_TOLERANCE_M: f64 = 0.001;

/// Zero-angle bisection iteration cap
pub const ZERO_MAX_ITERATIONS: u32 = 50;

// Atmosphere shifts past these deltas latch a zero-recompute hint.
pub const ZERO_RECOMPUTE_BC_FACTOR_DELTA: f64 = 0.0015;
pub const ZERO_RECOMPUTE_DENSITY_DELTA: f64 = 0.005;
pub const ZERO_RECOMPUTE_SOS_DELTA: f64 = 0.75;

/// Gyroscopic stability factor estimate used by the Litz spin-drift
/// approximation. A reasonable average for stabilized match bullets; a
/// rigorous model would derive SG from geometry, twist, and velocity.
pub const SPIN_DRIFT_SG: f64 = 1.5;

// ---------------------------------------------------------------------------
// AHRS
// ---------------------------------------------------------------------------

/// Sliding window size for static/dynamic detection (samples)
pub const AHRS_STATIC_WINDOW: usize = 64;

/// Accel-magnitude variance threshold for static detection, (m/s²)²
pub const AHRS_STATIC_THRESHOLD: f64 = 0.05;

pub const MADGWICK_DEFAULT_BETA: f64 = 0.1;
pub const MAHONY_DEFAULT_KP: f64 = 2.0;
pub const MAHONY_DEFAULT_KI: f64 = 0.005;

// ---------------------------------------------------------------------------
// Rangefinder
// ---------------------------------------------------------------------------

/// Age past which a range sample no longer supports a solution (μs)
pub const LRF_STALE_US: u64 = 2_000_000;

/// Minimum accepted LRF confidence when provided (0.0 means unprovided)
pub const LRF_MIN_CONFIDENCE: f64 = 0.50;

/// IIR smoothing factor for accepted range samples
pub const LRF_FILTER_ALPHA: f64 = 0.2;

// ---------------------------------------------------------------------------
// Magnetometer
// ---------------------------------------------------------------------------

/// Expected Earth field magnitude range (μT); outside it the field is
/// treated as disturbed and suppressed from fusion.
pub const MAG_MIN_FIELD_UT: f64 = 20.0;
pub const MAG_MAX_FIELD_UT: f64 = 70.0;
