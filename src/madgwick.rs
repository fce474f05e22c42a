//! Madgwick gradient-descent orientation filter.
//!
//! Reference: S. Madgwick, "An efficient orientation filter for inertial and
//! inertial/magnetic sensor arrays", 2010.

use nalgebra::{Quaternion, Vector3};

use crate::ahrs::normalize_quat;
use crate::constants::MADGWICK_DEFAULT_BETA;

#[derive(Debug, Clone)]
pub struct MadgwickFilter {
    q: Quaternion<f64>,
    beta: f64,
}

impl Default for MadgwickFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl MadgwickFilter {
    pub fn new() -> Self {
        MadgwickFilter {
            q: Quaternion::identity(),
            beta: MADGWICK_DEFAULT_BETA,
        }
    }

    /// Gradient-descent gain. Higher values trust the vector observations
    /// more; lower values trust the gyro more.
    pub fn set_beta(&mut self, beta: f64) {
        self.beta = beta;
    }

    pub fn reset(&mut self) {
        self.q = Quaternion::identity();
    }

    pub fn quaternion(&self) -> Quaternion<f64> {
        self.q
    }

    /// One fusion step. Inputs are bias-corrected; `use_mag` selects the
    /// 9-axis path, otherwise the IMU-only gradient is used. With an
    /// unusable accelerometer sample the quaternion still integrates the
    /// gyro rate of change alone.
    pub fn update(
        &mut self,
        accel: Vector3<f64>,
        gyro: Vector3<f64>,
        mag: Vector3<f64>,
        use_mag: bool,
        dt: f64,
    ) {
        let (q0, q1, q2, q3) = (self.q.w, self.q.i, self.q.j, self.q.k);
        let (gx, gy, gz) = (gyro.x, gyro.y, gyro.z);
        let (mut ax, mut ay, mut az) = (accel.x, accel.y, accel.z);

        // Rate of change of quaternion from the gyroscope
        let mut q_dot0 = 0.5 * (-q1 * gx - q2 * gy - q3 * gz);
        let mut q_dot1 = 0.5 * (q0 * gx + q2 * gz - q3 * gy);
        let mut q_dot2 = 0.5 * (q0 * gy - q1 * gz + q3 * gx);
        let mut q_dot3 = 0.5 * (q0 * gz + q1 * gy - q2 * gx);

        let a_norm = (ax * ax + ay * ay + az * az).sqrt();
        if a_norm > 0.001 {
            let a_inv = 1.0 / a_norm;
            ax *= a_inv;
            ay *= a_inv;
            az *= a_inv;

            let m_norm = (mag.x * mag.x + mag.y * mag.y + mag.z * mag.z).sqrt();
            let (mut s0, mut s1, mut s2, mut s3);

            if use_mag && m_norm > 0.001 {
                let m_inv = 1.0 / m_norm;
                let mx = mag.x * m_inv;
                let my = mag.y * m_inv;
                let mz = mag.z * m_inv;

                let _2q0 = 2.0 * q0;
                let _2q1 = 2.0 * q1;
                let _2q2 = 2.0 * q2;
                let _2q3 = 2.0 * q3;
                let q0q0 = q0 * q0;
                let q0q1 = q0 * q1;
                let q0q2 = q0 * q2;
                let q0q3 = q0 * q3;
                let q1q1 = q1 * q1;
                let q1q2 = q1 * q2;
                let q1q3 = q1 * q3;
                let q2q2 = q2 * q2;
                let q2q3 = q2 * q3;
                let q3q3 = q3 * q3;

                // Reference direction of Earth's magnetic field
                let hx = mx * (q0q0 + q1q1 - q2q2 - q3q3)
                    + 2.0 * my * (q1q2 - q0q3)
                    + 2.0 * mz * (q1q3 + q0q2);
                let hy = 2.0 * mx * (q1q2 + q0q3)
                    + my * (q0q0 - q1q1 + q2q2 - q3q3)
                    + 2.0 * mz * (q2q3 - q0q1);
                let _2bx = (hx * hx + hy * hy).sqrt();
                let _2bz = 2.0 * mx * (q1q3 - q0q2)
                    + 2.0 * my * (q2q3 + q0q1)
                    + mz * (q0q0 - q1q1 - q2q2 + q3q3);

                // Gradient descent corrective step, 9-axis objective
                s0 = -_2q2 * (2.0 * q1q3 - _2q0 * q2 - ax)
                    + _2q1 * (2.0 * q0q1 + _2q2 * q3 - ay)
                    - _2bz * q2 * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
                    + (-_2bx * q3 + _2bz * q1)
                        * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
                    + _2bx * q2 * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
                s1 = _2q3 * (2.0 * q1q3 - _2q0 * q2 - ax)
                    + _2q0 * (2.0 * q0q1 + _2q2 * q3 - ay)
                    - 4.0 * q1 * (1.0 - 2.0 * q1q1 - 2.0 * q2q2 - az)
                    + _2bz * q3 * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
                    + (_2bx * q2 + _2bz * q0)
                        * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
                    + (_2bx * q3 - 4.0 * _2bz * q1)
                        * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
                s2 = -_2q0 * (2.0 * q1q3 - _2q0 * q2 - ax)
                    + _2q3 * (2.0 * q0q1 + _2q2 * q3 - ay)
                    - 4.0 * q2 * (1.0 - 2.0 * q1q1 - 2.0 * q2q2 - az)
                    + (-4.0 * _2bx * q2 - _2bz * q0)
                        * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
                    + (_2bx * q1 + _2bz * q3)
                        * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
                    + (_2bx * q0 - 4.0 * _2bz * q2)
                        * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
                s3 = _2q1 * (2.0 * q1q3 - _2q0 * q2 - ax)
                    + _2q2 * (2.0 * q0q1 + _2q2 * q3 - ay)
                    + (-4.0 * _2bx * q3 + _2bz * q1)
                        * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
                    + (-_2bx * q0 + _2bz * q2)
                        * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
                    + _2bx * q1 * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
            } else {
                // IMU-only gradient (no magnetometer this cycle)
                let _2q0 = 2.0 * q0;
                let _2q1 = 2.0 * q1;
                let _2q2 = 2.0 * q2;
                let _2q3 = 2.0 * q3;
                let _4q0 = 4.0 * q0;
                let _4q1 = 4.0 * q1;
                let _4q2 = 4.0 * q2;
                let _8q1 = 8.0 * q1;
                let _8q2 = 8.0 * q2;
                let q0q0 = q0 * q0;
                let q1q1 = q1 * q1;
                let q2q2 = q2 * q2;
                let q3q3 = q3 * q3;

                s0 = _4q0 * q2q2 + _2q2 * ax + _4q0 * q1q1 - _2q1 * ay;
                s1 = _4q1 * q3q3 - _2q3 * ax + 4.0 * q0q0 * q1 - _2q0 * ay - _4q1
                    + _8q1 * q1q1
                    + _8q1 * q2q2
                    + _4q1 * az;
                s2 = 4.0 * q0q0 * q2 + _2q0 * ax + _4q2 * q3q3 - _2q3 * ay - _4q2
                    + _8q2 * q1q1
                    + _8q2 * q2q2
                    + _4q2 * az;
                s3 = 4.0 * q1q1 * q3 - _2q1 * ax + 4.0 * q2q2 * q3 - _2q2 * ay;
            }

            let s_norm = (s0 * s0 + s1 * s1 + s2 * s2 + s3 * s3).sqrt();
            if s_norm > 0.001 {
                let s_inv = 1.0 / s_norm;
                s0 *= s_inv;
                s1 *= s_inv;
                s2 *= s_inv;
                s3 *= s_inv;
            }

            q_dot0 -= self.beta * s0;
            q_dot1 -= self.beta * s1;
            q_dot2 -= self.beta * s2;
            q_dot3 -= self.beta * s3;
        }

        let q = Quaternion::new(
            q0 + q_dot0 * dt,
            q1 + q_dot1 * dt,
            q2 + q_dot2 * dt,
            q3 + q_dot3 * dt,
        );
        self.q = normalize_quat(q);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_returns_to_identity() {
        let mut filter = MadgwickFilter::new();
        for _ in 0..50 {
            filter.update(
                Vector3::new(1.0, 2.0, 9.0),
                Vector3::new(0.3, -0.2, 0.1),
                Vector3::zeros(),
                false,
                0.01,
            );
        }
        assert!((filter.quaternion().w - 1.0).abs() > 1e-6);

        filter.reset();
        let q = filter.quaternion();
        assert_eq!(q.w, 1.0);
        assert_eq!(q.i, 0.0);
    }

    #[test]
    fn higher_beta_converges_faster() {
        // Start both filters tilted by integrating a pure roll rate, then
        // let the accelerometer pull them back upright
        let mut slow = MadgwickFilter::new();
        let mut fast = MadgwickFilter::new();
        slow.set_beta(0.01);
        fast.set_beta(0.5);

        for filter in [&mut slow, &mut fast] {
            for _ in 0..100 {
                filter.update(
                    Vector3::zeros(),
                    Vector3::new(0.5, 0.0, 0.0),
                    Vector3::zeros(),
                    false,
                    0.01,
                );
            }
            for _ in 0..100 {
                filter.update(
                    Vector3::new(0.0, 0.0, 9.81),
                    Vector3::zeros(),
                    Vector3::zeros(),
                    false,
                    0.01,
                );
            }
        }

        // The upright quaternion has |w| = 1; closer is better
        assert!(fast.quaternion().w.abs() > slow.quaternion().w.abs());
    }
}
