//! Manual wind input and its decomposition into bore-axis components.

use crate::constants::DEG_TO_RAD;

/// Holds the most recent manually-entered wind call.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindModel {
    speed_ms: f64,
    heading_deg: f64,
    is_set: bool,
}

impl WindModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// `heading_deg` is the direction the wind blows FROM, compass degrees.
    pub fn set(&mut self, speed_ms: f64, heading_deg: f64) {
        self.speed_ms = speed_ms;
        self.heading_deg = heading_deg;
        self.is_set = true;
    }

    pub fn is_set(&self) -> bool {
        self.is_set
    }

    /// Split the wind into (headwind, crosswind) relative to the firing
    /// azimuth. Headwind is positive into the shooter's face (retards the
    /// bullet); crosswind is positive blowing right-to-left. Returns (0, 0)
    /// when no wind has been entered or the speed is negligible.
    pub fn decompose(&self, azimuth_deg: f64) -> (f64, f64) {
        if !self.is_set || self.speed_ms < 0.001 {
            return (0.0, 0.0);
        }

        let angle_rad = (self.heading_deg - azimuth_deg) * DEG_TO_RAD;
        let headwind = self.speed_ms * angle_rad.cos();
        let crosswind = self.speed_ms * angle_rad.sin();
        (headwind, crosswind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_headwind() {
        let mut wind = WindModel::new();
        wind.set(10.0, 0.0); // from north, firing north

        let (headwind, crosswind) = wind.decompose(0.0);
        assert!((headwind - 10.0).abs() < 0.1);
        assert!(crosswind.abs() < 0.1);
    }

    #[test]
    fn pure_tailwind() {
        let mut wind = WindModel::new();
        wind.set(10.0, 180.0); // from south, firing north

        let (headwind, crosswind) = wind.decompose(0.0);
        assert!((headwind + 10.0).abs() < 0.1);
        assert!(crosswind.abs() < 0.1);
    }

    #[test]
    fn pure_crosswind() {
        let mut wind = WindModel::new();
        wind.set(10.0, 90.0); // from east, firing north

        let (headwind, crosswind) = wind.decompose(0.0);
        assert!(headwind.abs() < 0.1);
        assert!((crosswind.abs() - 10.0).abs() < 0.1);
    }

    #[test]
    fn unset_wind_is_zero() {
        let wind = WindModel::new();
        let (headwind, crosswind) = wind.decompose(0.0);
        assert_eq!(headwind, 0.0);
        assert_eq!(crosswind, 0.0);
        assert!(!wind.is_set());
    }

    #[test]
    fn decomposition_preserves_magnitude() {
        let mut wind = WindModel::new();
        for &(speed, heading, azimuth) in
            &[(5.0, 30.0, 275.0), (12.3, 190.0, 12.0), (0.7, 359.0, 181.5)]
        {
            wind.set(speed, heading);
            let (h, c) = wind.decompose(azimuth);
            assert!(((h * h + c * c).sqrt() - speed).abs() < 1e-9);
        }
    }
}
