//! # Ballistic Core
//!
//! Deterministic firing-solution engine for a digital precision optic.
//!
//! The engine consumes normalized [`SensorFrame`]s (IMU, magnetometer,
//! barometer, laser rangefinder) plus static configuration (bullet profile,
//! zero, wind, latitude, calibration offsets) and produces a structured
//! [`FiringSolution`]: elevation and windage holds in MOA, time of flight,
//! remaining velocity/energy, and decomposed correction components
//! (Coriolis/Eötvös, spin drift, cant).
//!
//! Built for memory-constrained targets: all working storage is owned by the
//! [`Engine`] value and sized at compile time, and the update path never
//! allocates. The solver's inner loop is iteration-bounded.
//!
//! ## Usage
//!
//! ```
//! use ballistic_core::{Engine, SensorFrame, BulletProfile, ZeroConfig, DragModel, Mode};
//!
//! let mut engine = Engine::new();
//! engine.set_bullet_profile(&BulletProfile {
//!     bc: 0.505,
//!     drag_model: DragModel::G1,
//!     muzzle_velocity_ms: 792.0,
//!     mass_grains: 175.0,
//!     caliber_inches: 0.308,
//!     twist_rate_inches: 10.0,
//!     ..Default::default()
//! });
//! engine.set_zero_config(&ZeroConfig { zero_range_m: 100.0, sight_height_mm: 38.1 });
//!
//! // Drive with sensor frames; poll the mode and solution at any time.
//! let frame = SensorFrame::default();
//! engine.update(&frame);
//! assert_eq!(engine.mode(), Mode::Fault); // nothing ranged yet
//! ```

pub mod constants;

mod ahrs;
mod atmosphere;
mod cant;
mod drag;
mod engine;
mod madgwick;
mod mag;
mod mahony;
mod solver;
mod types;
mod wind;

pub mod api;

pub use ahrs::AhrsManager;
pub use atmosphere::Atmosphere;
pub use cant::cant_apply;
pub use drag::{drag_coefficient, drag_deceleration, DragTable};
pub use engine::Engine;
pub use madgwick::MadgwickFilter;
pub use mag::MagCalibration;
pub use mahony::MahonyFilter;
pub use solver::{BallisticSolver, SolverParams, SolverResult, TrajectoryPoint};
pub use types::{
    AhrsAlgorithm, BulletProfile, DefaultOverrides, DiagFlags, DragModel, FaultFlags,
    FiringSolution, Mode, OffsetMoa, SensorFrame, ZeroConfig,
};
pub use wind::WindModel;
