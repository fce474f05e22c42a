//! Process-wide engine instance with a thin setter/getter surface.
//!
//! Firmware integrations that cannot thread an [`Engine`] value through
//! their call sites use these free functions instead; they forward to one
//! statically stored instance. The mutex serializes callers, enforcing the
//! single-caller discipline the engine requires. Library users should
//! prefer owning an [`Engine`] directly.

use std::sync::{Mutex, MutexGuard};

use nalgebra::{Matrix3, Vector3};
use once_cell::sync::Lazy;

use crate::engine::Engine;
use crate::solver::TrajectoryPoint;
use crate::types::{
    AhrsAlgorithm, BulletProfile, DefaultOverrides, DiagFlags, FaultFlags, FiringSolution, Mode,
    SensorFrame, ZeroConfig,
};

static ENGINE: Lazy<Mutex<Engine>> = Lazy::new(|| Mutex::new(Engine::new()));

fn engine() -> MutexGuard<'static, Engine> {
    // The engine holds no invariants a panicking caller could break
    // mid-update, so a poisoned lock is recovered rather than propagated.
    match ENGINE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Reset the shared engine to its boot state: ISA atmosphere, identity
/// orientation, zero biases, no configuration, IDLE.
pub fn init() {
    *engine() = Engine::new();
}

/// Ingest one sensor frame; the sole driver of the pipeline.
pub fn update(frame: &SensorFrame) {
    engine().update(frame);
}

pub fn set_bullet_profile(profile: &BulletProfile) {
    engine().set_bullet_profile(profile);
}

pub fn set_zero_config(config: &ZeroConfig) {
    engine().set_zero_config(config);
}

pub fn set_wind_manual(speed_ms: f64, heading_deg: f64) {
    engine().set_wind_manual(speed_ms, heading_deg);
}

pub fn set_latitude(latitude_deg: f64) {
    engine().set_latitude(latitude_deg);
}

pub fn set_default_overrides(defaults: &DefaultOverrides) {
    engine().set_default_overrides(defaults);
}

pub fn set_imu_bias(accel_bias: Option<Vector3<f64>>, gyro_bias: Option<Vector3<f64>>) {
    engine().set_imu_bias(accel_bias, gyro_bias);
}

pub fn set_mag_calibration(hard_iron: Option<Vector3<f64>>, soft_iron: Option<Matrix3<f64>>) {
    engine().set_mag_calibration(hard_iron, soft_iron);
}

pub fn set_boresight_offset(vertical_moa: f64, horizontal_moa: f64) {
    engine().set_boresight_offset(vertical_moa, horizontal_moa);
}

pub fn set_reticle_mechanical_offset(vertical_moa: f64, horizontal_moa: f64) {
    engine().set_reticle_offset(vertical_moa, horizontal_moa);
}

pub fn calibrate_baro() {
    engine().calibrate_baro();
}

pub fn calibrate_gyro() {
    engine().calibrate_gyro();
}

pub fn set_ahrs_algorithm(algorithm: AhrsAlgorithm) {
    engine().set_ahrs_algorithm(algorithm);
}

pub fn set_mag_declination(declination_deg: f64) {
    engine().set_mag_declination(declination_deg);
}

pub fn set_external_reference_mode(enabled: bool) {
    engine().set_external_reference_mode(enabled);
}

pub fn get_solution() -> FiringSolution {
    engine().solution()
}

pub fn get_mode() -> Mode {
    engine().mode()
}

pub fn get_fault_flags() -> FaultFlags {
    engine().fault_flags()
}

pub fn get_diag_flags() -> DiagFlags {
    engine().diag_flags()
}

pub fn trajectory_point(range_m: usize) -> Option<TrajectoryPoint> {
    engine().trajectory_point(range_m)
}
