//! Magnetometer calibration, disturbance gating, and true heading.

use nalgebra::{Matrix3, Vector3};

use crate::constants::{MAG_MAX_FIELD_UT, MAG_MIN_FIELD_UT, RAD_TO_DEG};

/// Hard/soft-iron correction plus declination. The disturbance state is
/// bookkeeping latched by [`MagCalibration::apply`], separate from the
/// calibration configuration itself.
#[derive(Debug, Clone)]
pub struct MagCalibration {
    hard_iron: Vector3<f64>,
    soft_iron: Matrix3<f64>,
    declination_deg: f64,
    is_disturbed: bool,
}

impl Default for MagCalibration {
    fn default() -> Self {
        Self::new()
    }
}

impl MagCalibration {
    pub fn new() -> Self {
        MagCalibration {
            hard_iron: Vector3::zeros(),
            soft_iron: Matrix3::identity(),
            declination_deg: 0.0,
            is_disturbed: false,
        }
    }

    pub fn set_calibration(&mut self, hard_iron: Vector3<f64>, soft_iron: Matrix3<f64>) {
        self.hard_iron = hard_iron;
        self.soft_iron = soft_iron;
    }

    pub fn set_declination(&mut self, declination_deg: f64) {
        self.declination_deg = declination_deg;
    }

    /// Correct a raw field sample: subtract hard iron, then multiply by the
    /// soft-iron matrix. Returns the corrected vector and whether the field
    /// magnitude is outside the plausible Earth-field band (disturbed);
    /// disturbed samples should be suppressed from fusion.
    pub fn apply(&mut self, raw: Vector3<f64>) -> (Vector3<f64>, bool) {
        let corrected = self.soft_iron * (raw - self.hard_iron);

        let field_mag = corrected.norm();
        self.is_disturbed = !(MAG_MIN_FIELD_UT..=MAG_MAX_FIELD_UT).contains(&field_mag);

        (corrected, self.is_disturbed)
    }

    /// Last disturbance verdict from [`MagCalibration::apply`].
    pub fn is_disturbed(&self) -> bool {
        self.is_disturbed
    }

    /// True heading in degrees [0, 360): yaw plus declination, wrapped.
    pub fn heading_deg(&self, yaw_rad: f64) -> f64 {
        let mut heading = yaw_rad * RAD_TO_DEG + self.declination_deg;
        while heading < 0.0 {
            heading += 360.0;
        }
        while heading >= 360.0 {
            heading -= 360.0;
        }
        heading
    }
}
