//! Atmospheric model: air density, speed of sound, and the 4-factor BC
//! correction, fed by barometer updates and per-field default overrides.
//!
//! Density uses the ideal gas law over the virtual temperature (Buck vapor
//! pressure approximation), so humidity is accounted for without a separate
//! vapor partial-pressure term:
//!
//! ```text
//! e_sat = 611.21 · exp((18.678 - T/234.5) · (T / (257.14 + T)))
//! T_v   = T_K · (1 + 0.378 · h · e_sat / P)
//! ρ     = P / (R_dry · T_v)
//! c     = 20.05 · sqrt(T_v)
//! ```
//!
//! The BC correction follows the Litz / Army Metro 4-factor form and is
//! computed in imperial units for reference compatibility:
//! `BC' = BC · FA · (1 + FT - FP) · FR`.

use crate::constants::*;
use crate::types::{DefaultOverrides, DiagFlags};

// Imperial conversion factors, internal to the reference formulas.
const M_TO_FT: f64 = 3.28084;
const PA_TO_INHG: f64 = 0.00029530;
const STD_PRESS_INHG: f64 = 29.5300;
const STD_TEMP_F: f64 = 59.0;

/// Current environment and derived quantities. One instance lives inside the
/// engine; every field is plain data.
#[derive(Debug, Clone)]
pub struct Atmosphere {
    pressure_pa: f64,
    temperature_c: f64,
    humidity: f64,
    altitude_m: f64,
    baro_offset_pa: f64,

    has_baro_pressure: bool,
    has_baro_temperature: bool,
    has_baro_humidity: bool,
    has_override_altitude: bool,
    has_override_pressure: bool,
    has_override_temp: bool,
    has_override_humidity: bool,

    had_invalid_input: bool,
    zero_recompute_hint: bool,
    last_bc_factor: f64,

    air_density: f64,
    speed_of_sound: f64,
    diag_flags: DiagFlags,
}

impl Default for Atmosphere {
    fn default() -> Self {
        Self::new()
    }
}

impl Atmosphere {
    /// ISA defaults; derived quantities are valid immediately.
    pub fn new() -> Self {
        let mut atmo = Atmosphere {
            pressure_pa: DEFAULT_PRESSURE_PA,
            temperature_c: DEFAULT_TEMPERATURE_C,
            humidity: DEFAULT_HUMIDITY,
            altitude_m: DEFAULT_ALTITUDE_M,
            baro_offset_pa: 0.0,
            has_baro_pressure: false,
            has_baro_temperature: false,
            has_baro_humidity: false,
            has_override_altitude: false,
            has_override_pressure: false,
            has_override_temp: false,
            has_override_humidity: false,
            had_invalid_input: false,
            zero_recompute_hint: false,
            last_bc_factor: 1.0,
            air_density: 0.0,
            speed_of_sound: 0.0,
            diag_flags: DiagFlags::empty(),
        };
        atmo.recompute();
        atmo.last_bc_factor = atmo.correct_bc(1.0);
        atmo.zero_recompute_hint = false;
        atmo
    }

    /// Reads and clears the latched "zero needs recomputation" hint.
    pub fn consume_zero_recompute_hint(&mut self) -> bool {
        let pending = self.zero_recompute_hint;
        self.zero_recompute_hint = false;
        pending
    }

    /// Ingest one barometer sample. `humidity` is `None` when the sensor
    /// did not provide one this frame.
    ///
    /// Each field is sanitized independently: non-finite values fall back to
    /// the ISA default, out-of-range values clamp, and any substitution
    /// raises the per-frame invalid-input flag.
    pub fn update_from_baro(&mut self, pressure_pa: f64, temperature_c: f64, humidity: Option<f64>) {
        self.had_invalid_input = false;

        self.has_baro_pressure = true;
        self.has_baro_temperature = true;

        let mut corrected_pressure = pressure_pa + self.baro_offset_pa;
        if !corrected_pressure.is_finite() {
            corrected_pressure = DEFAULT_PRESSURE_PA;
            self.had_invalid_input = true;
        }
        if corrected_pressure < 1000.0 {
            corrected_pressure = 1000.0;
            self.had_invalid_input = true;
        }
        if corrected_pressure > 120_000.0 {
            corrected_pressure = 120_000.0;
            self.had_invalid_input = true;
        }
        self.pressure_pa = corrected_pressure;

        let mut safe_temp = temperature_c;
        if !safe_temp.is_finite() {
            safe_temp = DEFAULT_TEMPERATURE_C;
            self.had_invalid_input = true;
        }
        if safe_temp < -80.0 {
            safe_temp = -80.0;
            self.had_invalid_input = true;
        }
        if safe_temp > 80.0 {
            safe_temp = 80.0;
            self.had_invalid_input = true;
        }
        self.temperature_c = safe_temp;

        match humidity {
            Some(h) if h.is_finite() && (0.0..=1.0).contains(&h) => {
                self.has_baro_humidity = true;
                self.humidity = h;
            }
            Some(h) if h.is_finite() => {
                self.had_invalid_input = true;
                self.has_baro_humidity = true;
                self.humidity = h.clamp(0.0, 1.0);
            }
            Some(_) => {
                // Non-finite reading: keep the default, flag the anomaly.
                self.had_invalid_input = true;
                self.humidity = DEFAULT_HUMIDITY;
            }
            None => {}
        }

        self.recompute();
    }

    /// Apply per-field overrides. Barometer data wins for fields it covers;
    /// altitude has no sensor counterpart, so its override always applies.
    pub fn apply_defaults(&mut self, ovr: &DefaultOverrides) {
        if ovr.use_altitude {
            self.has_override_altitude = true;
            self.altitude_m = ovr.altitude_m;
        }
        if ovr.use_pressure {
            self.has_override_pressure = true;
            if !self.has_baro_pressure {
                self.pressure_pa = ovr.pressure_pa;
            }
        }
        if ovr.use_temperature {
            self.has_override_temp = true;
            if !self.has_baro_temperature {
                self.temperature_c = ovr.temperature_c;
            }
        }
        if ovr.use_humidity {
            self.has_override_humidity = true;
            if !self.has_baro_humidity {
                self.humidity = ovr.humidity_fraction;
            }
        }
        self.recompute();
    }

    /// Field calibration: offset the barometer so the current reading
    /// reports as ISA standard pressure.
    pub fn calibrate_baro(&mut self) {
        self.baro_offset_pa = STD_PRESSURE_PA - (self.pressure_pa - self.baro_offset_pa);
        self.recompute();
    }

    fn recompute(&mut self) {
        let prev_density = self.air_density;
        let prev_sos = self.speed_of_sound;
        let prev_bc_factor = self.last_bc_factor;

        self.diag_flags = DiagFlags::empty();
        if !self.has_baro_pressure && !self.has_override_pressure {
            self.diag_flags |= DiagFlags::DEFAULT_PRESSURE;
        }
        if !self.has_baro_temperature && !self.has_override_temp {
            self.diag_flags |= DiagFlags::DEFAULT_TEMP;
        }
        if !self.has_baro_humidity && !self.has_override_humidity {
            self.diag_flags |= DiagFlags::DEFAULT_HUMIDITY;
        }
        if !self.has_override_altitude {
            self.diag_flags |= DiagFlags::DEFAULT_ALTITUDE;
        }

        let mut t_kelvin = self.temperature_c + KELVIN_OFFSET;
        if t_kelvin < 1.0 {
            t_kelvin = 1.0;
        }

        let mut pressure_pa = self.pressure_pa;
        if !pressure_pa.is_finite() || pressure_pa < 1000.0 {
            pressure_pa = 1000.0;
            self.had_invalid_input = true;
        }

        let mut humidity = self.humidity;
        if !humidity.is_finite() {
            humidity = DEFAULT_HUMIDITY;
            self.had_invalid_input = true;
        }
        if humidity < 0.0 {
            humidity = 0.0;
            self.had_invalid_input = true;
        }
        if humidity > 1.0 {
            humidity = 1.0;
            self.had_invalid_input = true;
        }

        // Buck saturation vapor pressure, then virtual temperature
        let e_sat = 611.21
            * ((18.678 - self.temperature_c / 234.5)
                * (self.temperature_c / (257.14 + self.temperature_c)))
                .exp();
        let e_vapor = humidity * e_sat;

        let mut t_virtual = t_kelvin * (1.0 + 0.378 * e_vapor / pressure_pa);
        if !t_virtual.is_finite() || t_virtual < 1.0 {
            t_virtual = 1.0;
            self.had_invalid_input = true;
        }

        self.air_density = pressure_pa / (R_DRY_AIR * t_virtual);
        self.speed_of_sound = 20.05 * t_virtual.sqrt();

        let current_bc_factor = self.correct_bc(1.0);
        if (current_bc_factor - prev_bc_factor).abs() >= ZERO_RECOMPUTE_BC_FACTOR_DELTA
            || (self.air_density - prev_density).abs() >= ZERO_RECOMPUTE_DENSITY_DELTA
            || (self.speed_of_sound - prev_sos).abs() >= ZERO_RECOMPUTE_SOS_DELTA
        {
            self.zero_recompute_hint = true;
        }
        self.last_bc_factor = current_bc_factor;
    }

    /// 4-factor atmospheric BC correction (Litz / Army Metro).
    pub fn correct_bc(&self, bc_standard: f64) -> f64 {
        let alt_ft = self.altitude_m * M_TO_FT;
        let press_inhg = self.pressure_pa * PA_TO_INHG;
        let temp_f = self.temperature_c * 1.8 + 32.0;

        // FA: altitude factor, clamped for extreme elevations
        let fa = (1.0 - 3.158e-5 * alt_ft).max(0.5);

        // FT: temperature factor relative to 59 °F
        let ft = (temp_f - STD_TEMP_F) / (STD_TEMP_F + 460.0);

        // FP: pressure factor relative to 29.53 inHg
        let fp = (STD_PRESS_INHG - press_inhg) / STD_PRESS_INHG;

        // FR: humidity factor, small effect around 50% RH
        let humidity_pct = self.humidity * 100.0;
        let fr = 1.0 + 2e-5 * (humidity_pct - 50.0);

        (bc_standard * fa * (1.0 + ft - fp) * fr).max(0.01)
    }

    pub fn air_density(&self) -> f64 {
        self.air_density
    }

    pub fn speed_of_sound(&self) -> f64 {
        self.speed_of_sound
    }

    pub fn pressure_pa(&self) -> f64 {
        self.pressure_pa
    }

    pub fn humidity(&self) -> f64 {
        self.humidity
    }

    pub fn diag_flags(&self) -> DiagFlags {
        self.diag_flags
    }

    /// True if any input was sanitized since the last barometer update.
    pub fn had_invalid_input(&self) -> bool {
        self.had_invalid_input
    }
}
