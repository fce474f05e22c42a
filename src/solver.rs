//! Point-mass trajectory solver.
//!
//! Integrates the coupled position/velocity equations with an adaptive-step
//! classical RK4 and fills a 1-meter resolution trajectory table owned by the
//! solver. Also finds the zero angle by bisection.
//!
//! Coordinate frame: x downrange, y vertical (up positive), z lateral
//! (right positive). The bore axis is at y = 0 at the muzzle.

use nalgebra::Vector3;

use crate::constants::*;
use crate::drag::drag_deceleration;
use crate::types::DragModel;

/// Per-meter trajectory record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrajectoryPoint {
    /// Vertical position relative to the bore line (m, negative = below).
    pub drop_m: f64,
    /// Lateral deflection (m, positive = right).
    pub windage_m: f64,
    pub velocity_ms: f64,
    pub tof_s: f64,
    pub energy_j: f64,
}

/// Everything needed for one trajectory solution. Values arrive already
/// corrected: BC for atmosphere, muzzle velocity for barrel length, wind
/// decomposed into bore-axis components.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverParams {
    pub bc: f64,
    pub drag_model: DragModel,
    pub muzzle_velocity_ms: f64,
    pub bullet_mass_kg: f64,
    pub sight_height_m: f64,

    pub air_density: f64,
    pub speed_of_sound: f64,
    /// 1.0 = legacy baseline; < 1.0 reduces modeled retardation.
    pub drag_reference_scale: f64,

    /// Launch angle above horizontal (rad); set by the zero solver or caller.
    pub launch_angle_rad: f64,
    pub target_range_m: f64,

    /// Positive = into the shooter.
    pub headwind_ms: f64,
    /// Positive = right-to-left.
    pub crosswind_ms: f64,

    pub coriolis_enabled: bool,
    pub coriolis_lat_rad: f64,
    pub azimuth_rad: f64,

    pub spin_drift_enabled: bool,
    pub twist_rate_inches: f64,
    pub caliber_m: f64,
}

/// Result of one integration to target range.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverResult {
    pub valid: bool,
    pub drop_at_target_m: f64,
    pub windage_at_target_m: f64,
    pub tof_s: f64,
    pub velocity_at_target_ms: f64,
    pub energy_at_target_j: f64,
    pub horizontal_range_m: f64,

    pub coriolis_elev_moa: f64,
    pub coriolis_wind_moa: f64,
    pub spin_drift_moa: f64,
}

/// Owns the fixed trajectory table. One instance lives inside the engine;
/// reads through [`BallisticSolver::point_at`] are gated by the furthest
/// meter reached by the most recent table-filling integration.
pub struct BallisticSolver {
    table: [TrajectoryPoint; TRAJ_TABLE_SIZE],
    max_valid_range: usize,
}

impl Default for BallisticSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BallisticSolver {
    pub fn new() -> Self {
        BallisticSolver {
            table: [TrajectoryPoint::default(); TRAJ_TABLE_SIZE],
            max_valid_range: 0,
        }
    }

    /// Bisect for the launch angle whose trajectory crosses the line of
    /// sight at `zero_range_m`.
    ///
    /// The line of sight runs from the sight (sight_height above the bore)
    /// to the aim point, assumed at muzzle height; at the zero range the
    /// bullet must therefore sit at `-sight_height` relative to the bore
    /// line. If the bullet fails to reach the zero range at a candidate
    /// angle, the low bound is raised (more angle). Returns `None` when the
    /// search does not converge or the range is out of bounds.
    pub fn solve_zero_angle(&mut self, mut params: SolverParams, zero_range_m: f64) -> Option<f64> {
        if !(1.0..=MAX_RANGE_M as f64).contains(&zero_range_m) {
            return None;
        }

        let mut lo = -5.0 * DEG_TO_RAD;
        let mut hi = 5.0 * DEG_TO_RAD;

        let target_drop = -params.sight_height_m;

        let mut best_angle = 0.0;
        let mut solved = false;

        for _ in 0..ZERO_MAX_ITERATIONS {
            let mid = (lo + hi) * 0.5;
            params.launch_angle_rad = mid;

            let drop = match self.integrate_to_range(&params, zero_range_m, false) {
                Some(drop) => drop,
                None => {
                    // Fell short: the trajectory terminated before the zero
                    // range, so the angle must come up.
                    lo = mid;
                    continue;
                }
            };

            if drop > target_drop {
                // Hit high: bring the bore down.
                hi = mid;
            } else {
                lo = mid;
            }

            best_angle = mid;

            if (drop - target_drop).abs() < ZERO_TOLERANCE_M {
                solved = true;
                break;
            }
        }

        // The cap may expire with the last probe already inside tolerance.
        if !solved {
            if let Some(drop) = self.integrate_to_range(&params, zero_range_m, false) {
                solved = (drop - target_drop).abs() < ZERO_TOLERANCE_M;
            }
        }

        solved.then_some(best_angle)
    }

    /// Integrate a full trajectory, filling the table, and report the state
    /// at the target range plus the spin-drift and Coriolis corrections.
    pub fn integrate(&mut self, params: &SolverParams) -> SolverResult {
        let mut result = SolverResult::default();

        if !(1.0..=MAX_RANGE_M as f64).contains(&params.target_range_m) {
            return result;
        }

        if self
            .integrate_to_range(params, params.target_range_m, true)
            .is_none()
        {
            return result;
        }

        let target_idx = params.target_range_m as usize;
        if target_idx >= TRAJ_TABLE_SIZE {
            return result;
        }

        let tp = self.table[target_idx];

        result.valid = true;
        result.drop_at_target_m = tp.drop_m;
        result.windage_at_target_m = tp.windage_m;
        result.tof_s = tp.tof_s;
        result.velocity_at_target_ms = tp.velocity_ms;
        result.energy_at_target_j = tp.energy_j;
        result.horizontal_range_m = params.target_range_m * params.launch_angle_rad.cos();

        // Spin drift via the Litz approximation (drift grows as TOF^1.83)
        // with a fixed SG estimate; sign follows the twist direction.
        result.spin_drift_moa = 0.0;
        if params.spin_drift_enabled && params.twist_rate_inches.abs() > 0.1 {
            let mut drift_m =
                0.0254 * 1.25 * (SPIN_DRIFT_SG + 1.2) * tp.tof_s.powf(1.83);
            if params.twist_rate_inches < 0.0 {
                drift_m = -drift_m;
            }

            let range = params.target_range_m;
            if range > 0.0 {
                result.spin_drift_moa = (drift_m / range) * RAD_TO_MOA;
            }
        }

        // Coriolis / Eötvös, constant-velocity small-arms approximation.
        result.coriolis_elev_moa = 0.0;
        result.coriolis_wind_moa = 0.0;
        if params.coriolis_enabled {
            let lat = params.coriolis_lat_rad;
            let azi = params.azimuth_rad;
            let tof = tp.tof_s;
            let range = params.target_range_m;

            let coriolis_hz = OMEGA_EARTH * range * tof * lat.sin();
            let coriolis_vt = OMEGA_EARTH * range * tof * lat.cos() * azi.sin();

            if range > 0.0 {
                result.coriolis_wind_moa = (coriolis_hz / range) * RAD_TO_MOA;
                result.coriolis_elev_moa = (coriolis_vt / range) * RAD_TO_MOA;
            }
        }

        result
    }

    /// Bounded table read; valid after the most recent table-filling
    /// integration reached `range_m`.
    pub fn point_at(&self, range_m: usize) -> Option<&TrajectoryPoint> {
        if range_m > self.max_valid_range || range_m >= TRAJ_TABLE_SIZE {
            return None;
        }
        Some(&self.table[range_m])
    }

    /// Run the RK4 loop out to `range_m`. Returns the vertical position at
    /// that range relative to the bore line, or `None` if the bullet slowed
    /// below the termination velocity first.
    fn integrate_to_range(
        &mut self,
        params: &SolverParams,
        range_m: f64,
        fill_table: bool,
    ) -> Option<f64> {
        let mut pos = Vector3::new(0.0, 0.0, 0.0);
        let mut vel = Vector3::new(
            params.muzzle_velocity_ms * params.launch_angle_rad.cos(),
            params.muzzle_velocity_ms * params.launch_angle_rad.sin(),
            0.0,
        );
        let mut t = 0.0;

        let mut last_range_index = 0usize;
        if fill_table {
            self.table[0] = TrajectoryPoint {
                drop_m: 0.0,
                windage_m: 0.0,
                velocity_ms: params.muzzle_velocity_ms,
                tof_s: 0.0,
                energy_j: 0.5
                    * params.bullet_mass_kg
                    * params.muzzle_velocity_ms
                    * params.muzzle_velocity_ms,
            };
            self.max_valid_range = 0;
        }

        let mut iteration = 0u32;

        while pos.x < range_m && iteration < MAX_SOLVER_ITERATIONS {
            iteration += 1;

            let v = vel.norm();
            if v < MIN_VELOCITY_MS {
                break;
            }

            // Adaptive timestep: finest through the transonic band, scaled
            // by velocity elsewhere, and never advancing more than
            // MAX_STEP_DISTANCE_M downrange so the table fill keeps its
            // per-meter fidelity.
            let mach = v / params.speed_of_sound;
            let mut dt = if (0.9..1.2).contains(&mach) {
                DT_MIN_S
            } else {
                0.5 / v
            };

            let dt_from_step = MAX_STEP_DISTANCE_M / v;
            if dt > dt_from_step {
                dt = dt_from_step;
            }
            dt = dt.clamp(DT_MIN_S, DT_MAX_S);

            // Classical four-stage RK4 on the (position, velocity) pair
            let k1_v = acceleration(params, vel);
            let k1_p = vel;

            let vel_k2 = vel + 0.5 * dt * k1_v;
            let k2_v = acceleration(params, vel_k2);
            let k2_p = vel_k2;

            let vel_k3 = vel + 0.5 * dt * k2_v;
            let k3_v = acceleration(params, vel_k3);
            let k3_p = vel_k3;

            let vel_k4 = vel + dt * k3_v;
            let k4_v = acceleration(params, vel_k4);
            let k4_p = vel_k4;

            pos += (dt / 6.0) * (k1_p + 2.0 * k2_p + 2.0 * k3_p + k4_p);
            vel += (dt / 6.0) * (k1_v + 2.0 * k2_v + 2.0 * k3_v + k4_v);
            t += dt;

            if fill_table {
                let current_range = pos.x as usize;
                while last_range_index < current_range
                    && last_range_index < TRAJ_TABLE_SIZE - 1
                {
                    last_range_index += 1;
                    let v_current = vel.norm();
                    self.table[last_range_index] = TrajectoryPoint {
                        drop_m: pos.y,
                        windage_m: pos.z,
                        velocity_ms: v_current,
                        tof_s: t,
                        energy_j: 0.5 * params.bullet_mass_kg * v_current * v_current,
                    };
                }
                self.max_valid_range = last_range_index;
            }
        }

        if pos.x < range_m {
            return None; // bullet never reached the target range
        }

        Some(pos.y)
    }
}

/// Acceleration on the projectile: drag along the relative air velocity
/// (bullet velocity minus wind) plus gravity. Below 1 m/s relative speed
/// only gravity acts.
fn acceleration(params: &SolverParams, vel: Vector3<f64>) -> Vector3<f64> {
    let vx_rel = vel.x + params.headwind_ms;
    let vz_rel = vel.z - params.crosswind_ms;
    let v_rel = (vx_rel * vx_rel + vel.y * vel.y + vz_rel * vz_rel).sqrt();

    if v_rel < 1.0 {
        return Vector3::new(0.0, -GRAVITY_MPS2, 0.0);
    }

    let mut decel = drag_deceleration(
        v_rel,
        params.speed_of_sound,
        params.bc,
        params.drag_model,
        params.air_density,
    );

    let mut drag_scale = params.drag_reference_scale;
    if !drag_scale.is_finite() || drag_scale <= 0.0 {
        drag_scale = 1.0;
    }
    decel *= drag_scale.clamp(0.2, 2.0);

    Vector3::new(
        -decel * (vx_rel / v_rel),
        -decel * (vel.y / v_rel) - GRAVITY_MPS2,
        -decel * (vz_rel / v_rel),
    )
}
