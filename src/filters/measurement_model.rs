//! Observation model for a UWB fix plus sensed acceleration.
//!
//! z = [posX, posY, posZ, accX, accY, accZ] = H x

use crate::config::MeasurementNoiseProfile;
use crate::types::{MeasureMat, MeasureVec, ObservationMat};

/// H: positions (state 0-2) and accelerations (state 6-8) observed directly
#[rustfmt::skip]
const OBSERVATION: [f64; 54] = [
    1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
];

/// R measured on the anchor setup [m², (m/s²)²]. Position and acceleration
/// errors are correlated within their block and independent across blocks.
#[rustfmt::skip]
const MEASUREMENT_NOISE: [f64; 36] = [
    0.005,  0.0023, 0.0018, 0.0,   0.0,   0.0,
    0.0023, 0.0137, 0.0036, 0.0,   0.0,   0.0,
    0.0018, 0.0036, 0.029,  0.0,   0.0,   0.0,
    0.0,    0.0,    0.0,    0.05,  0.001, 0.001,
    0.0,    0.0,    0.0,    0.001, 0.05,  0.001,
    0.0,    0.0,    0.0,    0.001, 0.001, 0.2,
];

/// Uncorrelated alternative; acceleration treated as near-exact
const DIAGONAL_MEASUREMENT_NOISE: [f64; 6] = [0.005, 0.0137, 0.029, 0.00001, 0.00001, 0.00001];

#[derive(Clone, Debug)]
pub struct MeasurementModel {
    /// H [6x9]
    observation: ObservationMat,

    /// R [6x6]
    noise: MeasureMat,
}

impl MeasurementModel {
    pub fn new() -> Self {
        Self::with_noise(MeasureMat::from_row_slice(&MEASUREMENT_NOISE))
    }

    /// Diagonal R without cross-correlations
    pub fn diagonal() -> Self {
        Self::with_noise(MeasureMat::from_diagonal(
            &MeasureVec::from_row_slice(&DIAGONAL_MEASUREMENT_NOISE),
        ))
    }

    /// Standard H with a caller-supplied R
    pub fn with_noise(noise: MeasureMat) -> Self {
        Self {
            observation: ObservationMat::from_row_slice(&OBSERVATION),
            noise,
        }
    }

    pub fn from_profile(profile: MeasurementNoiseProfile) -> Self {
        match profile {
            MeasurementNoiseProfile::Complete => Self::new(),
            MeasurementNoiseProfile::Diagonal => Self::diagonal(),
        }
    }

    pub fn observation(&self) -> &ObservationMat {
        &self.observation
    }

    pub fn noise(&self) -> &MeasureMat {
        &self.noise
    }
}

impl Default for MeasurementModel {
    fn default() -> Self {
        Self::new()
    }
}
