//! Mahony complementary orientation filter.
//!
//! Reference: R. Mahony, T. Hamel, J-M. Pflimlin, "Nonlinear Complementary
//! Filters on the Special Orthogonal Group", 2008.

use nalgebra::{Quaternion, Vector3};

use crate::ahrs::normalize_quat;
use crate::constants::{MAHONY_DEFAULT_KI, MAHONY_DEFAULT_KP};

#[derive(Debug, Clone)]
pub struct MahonyFilter {
    q: Quaternion<f64>,
    kp: f64,
    ki: f64,
    // Integral error terms for the PI controller
    integral_fb: Vector3<f64>,
}

impl Default for MahonyFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl MahonyFilter {
    pub fn new() -> Self {
        MahonyFilter {
            q: Quaternion::identity(),
            kp: MAHONY_DEFAULT_KP,
            ki: MAHONY_DEFAULT_KI,
            integral_fb: Vector3::zeros(),
        }
    }

    /// Proportional and integral feedback gains.
    pub fn set_gains(&mut self, kp: f64, ki: f64) {
        self.kp = kp;
        self.ki = ki;
    }

    pub fn reset(&mut self) {
        self.q = Quaternion::identity();
        self.integral_fb = Vector3::zeros();
    }

    pub fn quaternion(&self) -> Quaternion<f64> {
        self.q
    }

    /// One fusion step. The error term is the sum of cross products between
    /// measured and quaternion-estimated reference directions (gravity, and
    /// the Earth field when `use_mag` is set).
    pub fn update(
        &mut self,
        accel: Vector3<f64>,
        gyro: Vector3<f64>,
        mag: Vector3<f64>,
        use_mag: bool,
        dt: f64,
    ) {
        let (q0, q1, q2, q3) = (self.q.w, self.q.i, self.q.j, self.q.k);
        let (mut gx, mut gy, mut gz) = (gyro.x, gyro.y, gyro.z);

        let mut ex = 0.0;
        let mut ey = 0.0;
        let mut ez = 0.0;

        let a_norm = accel.norm();
        if a_norm > 0.001 {
            let a = accel / a_norm;

            // Estimated gravity direction from the quaternion
            let vx = 2.0 * (q1 * q3 - q0 * q2);
            let vy = 2.0 * (q0 * q1 + q2 * q3);
            let vz = q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3;

            ex += a.y * vz - a.z * vy;
            ey += a.z * vx - a.x * vz;
            ez += a.x * vy - a.y * vx;
        }

        if use_mag {
            let m_norm = mag.norm();
            if m_norm > 0.001 {
                let m = mag / m_norm;
                let (mx, my, mz) = (m.x, m.y, m.z);

                // Earth-frame reference direction of the measured field
                let hx = 2.0
                    * (mx * (0.5 - q2 * q2 - q3 * q3)
                        + my * (q1 * q2 - q0 * q3)
                        + mz * (q1 * q3 + q0 * q2));
                let hy = 2.0
                    * (mx * (q1 * q2 + q0 * q3)
                        + my * (0.5 - q1 * q1 - q3 * q3)
                        + mz * (q2 * q3 - q0 * q1));
                let bx = (hx * hx + hy * hy).sqrt();
                let bz = 2.0
                    * (mx * (q1 * q3 - q0 * q2)
                        + my * (q2 * q3 + q0 * q1)
                        + mz * (0.5 - q1 * q1 - q2 * q2));

                // Estimated field direction from the quaternion
                let wx = bx * (0.5 - q2 * q2 - q3 * q3) + bz * (q1 * q3 - q0 * q2);
                let wy = bx * (q1 * q2 - q0 * q3) + bz * (q0 * q1 + q2 * q3);
                let wz = bx * (q0 * q2 + q1 * q3) + bz * (0.5 - q1 * q1 - q2 * q2);

                ex += my * wz - mz * wy;
                ey += mz * wx - mx * wz;
                ez += mx * wy - my * wx;
            }
        }

        if self.ki > 0.0 {
            self.integral_fb.x += self.ki * ex * dt;
            self.integral_fb.y += self.ki * ey * dt;
            self.integral_fb.z += self.ki * ez * dt;
            gx += self.integral_fb.x;
            gy += self.integral_fb.y;
            gz += self.integral_fb.z;
        }

        gx += self.kp * ex;
        gy += self.kp * ey;
        gz += self.kp * ez;

        let q_dot0 = 0.5 * (-q1 * gx - q2 * gy - q3 * gz);
        let q_dot1 = 0.5 * (q0 * gx + q2 * gz - q3 * gy);
        let q_dot2 = 0.5 * (q0 * gy - q1 * gz + q3 * gx);
        let q_dot3 = 0.5 * (q0 * gz + q1 * gy - q2 * gx);

        let q = Quaternion::new(
            q0 + q_dot0 * dt,
            q1 + q_dot1 * dt,
            q2 + q_dot2 * dt,
            q3 + q_dot3 * dt,
        );
        self.q = normalize_quat(q);
    }
}
