//! Filter tuning.
//!
//! Defaults reproduce the tuning of the deployed tracker: a 100 ms tick and a
//! pedestrian acceleration change bound of 0.8 m/s².

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};

/// Nominal interval between UWB fixes [s]
pub const DEFAULT_TIME_DELTA: f64 = 0.1;

/// Highest acceleration change expected from a pedestrian [m/s²]
pub const DEFAULT_MAX_ACCELERATION: f64 = 0.8;

pub const DEFAULT_MAX_CONDITION_NUMBER: f64 = 1e12;

pub const DEFAULT_NUMERICAL_ERROR_ALERT_THRESHOLD: u32 = 10;

/// Process noise policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessNoiseProfile {
    /// Dense discretized constant-acceleration noise over all nine states
    Complete,
    /// Noise on the acceleration block only
    Simple,
}

/// Measurement noise policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementNoiseProfile {
    /// Empirical correlated covariance
    Complete,
    /// Uncorrelated variances, near-exact acceleration
    Diagonal,
}

/// Posterior covariance formula
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceForm {
    /// P = (I - KH) P (I - KH)^T + K R K^T
    Joseph,
    /// P = (I - KH) P
    Simple,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Time step between predictions [s]
    pub time_delta: f64,

    /// Pedestrian acceleration change bound [m/s²]
    pub max_acceleration: f64,

    /// Explicit Q scale; derived from `max_acceleration` when absent
    pub acceleration_variance: Option<f64>,

    pub process_noise: ProcessNoiseProfile,

    pub measurement_noise: MeasurementNoiseProfile,

    pub covariance_form: CovarianceForm,

    /// Innovation covariances above this condition number are rejected
    pub max_condition_number: f64,

    /// Consecutive numerical errors before the session escalates to error logs
    pub numerical_error_alert_threshold: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            time_delta: DEFAULT_TIME_DELTA,
            max_acceleration: DEFAULT_MAX_ACCELERATION,
            acceleration_variance: None,
            process_noise: ProcessNoiseProfile::Complete,
            measurement_noise: MeasurementNoiseProfile::Complete,
            covariance_form: CovarianceForm::Joseph,
            max_condition_number: DEFAULT_MAX_CONDITION_NUMBER,
            numerical_error_alert_threshold: DEFAULT_NUMERICAL_ERROR_ALERT_THRESHOLD,
        }
    }
}

impl FilterConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: FilterConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Variance of the acceleration change per tick: `(max_acceleration * dt / 2)^2`
    pub fn acceleration_variance(&self) -> f64 {
        self.acceleration_variance.unwrap_or_else(|| {
            let half_change = self.max_acceleration * self.time_delta / 2.0;
            half_change * half_change
        })
    }

    pub fn with_acceleration_variance(mut self, variance: f64) -> Self {
        self.acceleration_variance = Some(variance);
        self
    }

    pub fn validate(&self) -> TrackerResult<()> {
        if !self.time_delta.is_finite() || self.time_delta <= 0.0 {
            return Err(TrackerError::Configuration(format!(
                "time_delta must be positive, got {}",
                self.time_delta
            )));
        }
        if !self.max_acceleration.is_finite() || self.max_acceleration < 0.0 {
            return Err(TrackerError::Configuration(format!(
                "max_acceleration must be non-negative, got {}",
                self.max_acceleration
            )));
        }
        let variance = self.acceleration_variance();
        if !variance.is_finite() || variance < 0.0 {
            return Err(TrackerError::Configuration(format!(
                "acceleration_variance must be non-negative, got {}",
                variance
            )));
        }
        if !(self.max_condition_number > 1.0) {
            return Err(TrackerError::Configuration(format!(
                "max_condition_number must exceed 1, got {}",
                self.max_condition_number
            )));
        }
        Ok(())
    }
}
