pub mod linalg;

pub use linalg::*;

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 3-D position in meters, used both as the filter seed and as the
/// estimate handed to the presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl LocationData {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Euclidean distance to another location [m]
    pub fn distance_to(&self, other: &LocationData) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }

    /// Format as `x, y, z` with a decimal comma, as shown on the device screen.
    pub fn european_notation(&self) -> String {
        format!(
            "{}, {}, {}",
            decimal_comma(self.x),
            decimal_comma(self.y),
            decimal_comma(self.z)
        )
    }
}

impl fmt::Display for LocationData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}, {:.2}, {:.2}", self.x, self.y, self.z)
    }
}

fn decimal_comma(value: f64) -> String {
    format!("{:.2}", value).replace('.', ",")
}

/// One raw fix from the ranging collaborator: UWB position plus the
/// independently sensed 3-axis acceleration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    /// Position (x, y, z) [m]
    pub position: [f64; 3],
    /// Acceleration (x, y, z) [m/s²]
    pub acceleration: [f64; 3],
}

impl RawFix {
    pub fn new(position: [f64; 3], acceleration: [f64; 3]) -> Self {
        Self {
            position,
            acceleration,
        }
    }

    /// Position-only fix with zero sensed acceleration
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self::new([x, y, z], [0.0; 3])
    }

    pub fn is_finite(&self) -> bool {
        self.position
            .iter()
            .chain(self.acceleration.iter())
            .all(|v| v.is_finite())
    }

    pub fn location(&self) -> LocationData {
        LocationData::new(self.position[0], self.position[1], self.position[2])
    }

    /// Measurement vector z = [posX, posY, posZ, accX, accY, accZ]
    pub fn to_measurement(&self) -> MeasureVec {
        MeasureVec::new(
            self.position[0],
            self.position[1],
            self.position[2],
            self.acceleration[0],
            self.acceleration[1],
            self.acceleration[2],
        )
    }
}

/// Snapshot of the filter state, split into its physical components.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterState {
    /// Position [m]
    pub position: (f64, f64, f64),

    /// Velocity [m/s]
    pub velocity: (f64, f64, f64),

    /// Acceleration [m/s²]
    pub acceleration: (f64, f64, f64),

    /// Covariance trace for uncertainty
    pub covariance_trace: f64,
}

impl FilterState {
    pub fn from_parts(state: &StateVec, covariance: &StateMat) -> Self {
        Self {
            position: (state[0], state[1], state[2]),
            velocity: (state[3], state[4], state[5]),
            acceleration: (state[6], state[7], state[8]),
            covariance_trace: covariance.trace(),
        }
    }

    pub fn location(&self) -> LocationData {
        LocationData::new(self.position.0, self.position.1, self.position.2)
    }

    pub fn speed(&self) -> f64 {
        let (vx, vy, vz) = self.velocity;
        (vx * vx + vy * vy + vz * vz).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_european_notation() {
        let location = LocationData::new(1.25, 2.0, -3.1);
        assert_eq!(location.european_notation(), "1,25, 2,00, -3,10");
        assert_eq!(location.to_string(), "1.25, 2.00, -3.10");
    }

    #[test]
    fn test_raw_fix_measurement_order() {
        let fix = RawFix::new([1.0, 2.0, 3.0], [0.1, 0.2, 0.3]);
        let z = fix.to_measurement();
        assert_eq!(z, MeasureVec::new(1.0, 2.0, 3.0, 0.1, 0.2, 0.3));
        assert_eq!(fix.location(), LocationData::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_raw_fix_finite_check() {
        assert!(RawFix::at(1.0, 2.0, 3.0).is_finite());
        assert!(!RawFix::new([1.0, f64::NAN, 3.0], [0.0; 3]).is_finite());
        assert!(!RawFix::new([1.0, 2.0, 3.0], [0.0, f64::INFINITY, 0.0]).is_finite());
    }

    #[test]
    fn test_distance() {
        let a = LocationData::new(0.0, 0.0, 0.0);
        let b = LocationData::new(3.0, 4.0, 0.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-12);
    }
}
