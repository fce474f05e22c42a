//! AHRS manager: owns both fusion filters, applies IMU biases, tracks
//! static/dynamic state, and exposes Euler angles from the active filter.

use nalgebra::{Quaternion, Vector3};

use crate::constants::{AHRS_STATIC_THRESHOLD, AHRS_STATIC_WINDOW};
use crate::madgwick::MadgwickFilter;
use crate::mahony::MahonyFilter;
use crate::types::AhrsAlgorithm;

/// Unit-normalize a quaternion, leaving a degenerate zero quaternion alone
/// rather than producing NaN.
pub(crate) fn normalize_quat(q: Quaternion<f64>) -> Quaternion<f64> {
    let norm = (q.w * q.w + q.i * q.i + q.j * q.j + q.k * q.k).sqrt();
    if norm > 0.0 {
        Quaternion::new(q.w / norm, q.i / norm, q.j / norm, q.k / norm)
    } else {
        q
    }
}

/// Pitch in radians (nose up positive).
fn quat_pitch(q: &Quaternion<f64>) -> f64 {
    let sinp = (2.0 * (q.w * q.j - q.k * q.i)).clamp(-1.0, 1.0);
    sinp.asin()
}

/// Roll in radians (right side down positive).
fn quat_roll(q: &Quaternion<f64>) -> f64 {
    let sinr_cosp = 2.0 * (q.w * q.i + q.j * q.k);
    let cosr_cosp = 1.0 - 2.0 * (q.i * q.i + q.j * q.j);
    sinr_cosp.atan2(cosr_cosp)
}

/// Yaw in radians (clockwise from north positive).
fn quat_yaw(q: &Quaternion<f64>) -> f64 {
    let siny_cosp = 2.0 * (q.w * q.k + q.i * q.j);
    let cosy_cosp = 1.0 - 2.0 * (q.j * q.j + q.k * q.k);
    siny_cosp.atan2(cosy_cosp)
}

/// Owns both filter variants as plain values and dispatches on the selected
/// algorithm tag, with no boxed trait objects. The static detector runs on
/// every update regardless of which filter is active, so switching
/// algorithms mid-stream does not reset stability tracking.
#[derive(Debug, Clone)]
pub struct AhrsManager {
    algorithm: AhrsAlgorithm,
    madgwick: MadgwickFilter,
    mahony: MahonyFilter,

    accel_bias: Vector3<f64>,
    gyro_bias: Vector3<f64>,

    // Ring buffer of accel magnitudes for static detection
    accel_mag_buf: [f64; AHRS_STATIC_WINDOW],
    buf_index: usize,
    sample_count: usize,
    is_static: bool,
}

impl Default for AhrsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AhrsManager {
    pub fn new() -> Self {
        AhrsManager {
            algorithm: AhrsAlgorithm::Madgwick,
            madgwick: MadgwickFilter::new(),
            mahony: MahonyFilter::new(),
            accel_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
            accel_mag_buf: [0.0; AHRS_STATIC_WINDOW],
            buf_index: 0,
            sample_count: 0,
            is_static: false,
        }
    }

    pub fn set_algorithm(&mut self, algorithm: AhrsAlgorithm) {
        self.algorithm = algorithm;
    }

    pub fn algorithm(&self) -> AhrsAlgorithm {
        self.algorithm
    }

    /// Feed one raw (uncorrected) IMU/mag sample; biases are applied here.
    pub fn update(
        &mut self,
        accel: Vector3<f64>,
        gyro: Vector3<f64>,
        mag: Vector3<f64>,
        use_mag: bool,
        dt: f64,
    ) {
        let accel = accel - self.accel_bias;
        let gyro = gyro - self.gyro_bias;

        match self.algorithm {
            AhrsAlgorithm::Madgwick => self.madgwick.update(accel, gyro, mag, use_mag, dt),
            AhrsAlgorithm::Mahony => self.mahony.update(accel, gyro, mag, use_mag, dt),
        }

        self.update_static_detection(accel);
    }

    pub fn set_accel_bias(&mut self, bias: Vector3<f64>) {
        self.accel_bias = bias;
    }

    pub fn set_gyro_bias(&mut self, bias: Vector3<f64>) {
        self.gyro_bias = bias;
    }

    /// Capture the given gyro reading as the new bias vector. The caller is
    /// expected to keep the device still while sampling.
    pub fn capture_gyro_bias(&mut self, gyro: Vector3<f64>) {
        self.gyro_bias = gyro;
    }

    pub fn quaternion(&self) -> Quaternion<f64> {
        match self.algorithm {
            AhrsAlgorithm::Madgwick => self.madgwick.quaternion(),
            AhrsAlgorithm::Mahony => self.mahony.quaternion(),
        }
    }

    pub fn pitch(&self) -> f64 {
        quat_pitch(&self.quaternion())
    }

    pub fn roll(&self) -> f64 {
        quat_roll(&self.quaternion())
    }

    pub fn yaw(&self) -> f64 {
        quat_yaw(&self.quaternion())
    }

    /// True if the device is approximately stationary.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// True once the detector window has filled and the device is static;
    /// the orientation estimate is then trustworthy for a solution.
    pub fn is_stable(&self) -> bool {
        self.sample_count >= AHRS_STATIC_WINDOW && self.is_static
    }

    fn update_static_detection(&mut self, accel: Vector3<f64>) {
        self.accel_mag_buf[self.buf_index] = accel.norm();
        self.buf_index = (self.buf_index + 1) % AHRS_STATIC_WINDOW;

        if self.sample_count < AHRS_STATIC_WINDOW {
            self.sample_count += 1;
            self.is_static = false;
            return;
        }

        let mean: f64 = self.accel_mag_buf.iter().sum::<f64>() / AHRS_STATIC_WINDOW as f64;
        let var: f64 = self
            .accel_mag_buf
            .iter()
            .map(|m| (m - mean) * (m - mean))
            .sum::<f64>()
            / AHRS_STATIC_WINDOW as f64;

        self.is_static = var < AHRS_STATIC_THRESHOLD;
    }
}
