//! Linear Kalman filter over the 9-state constant-acceleration model.
//!
//! One tick is `predict()` followed by `update(z)`:
//!
//! ```text
//! predict:  x = F x
//!           P = F P F^T + Q
//! update:   y = z - H x
//!           S = H P H^T + R
//!           K = P H^T S^-1
//!           x = x + K y
//!           P = (I - K H) P          (Joseph form by default)
//! ```
//!
//! Between measurements the caller may keep calling `predict()`; the
//! estimate then dead-reckons along F while P grows.

use log::debug;

use crate::config::{CovarianceForm, FilterConfig};
use crate::error::{TrackerError, TrackerResult};
use crate::filters::measurement_model::MeasurementModel;
use crate::filters::motion_model::MotionModel;
use crate::types::{
    symmetrize, FilterState, KalmanGain, LocationData, MeasureMat, MeasureVec, StateMat, StateVec,
};

pub struct KalmanFilter {
    motion: MotionModel,
    measurement: MeasurementModel,

    /// State vector [9D]
    state: StateVec,

    /// Covariance matrix [9x9]
    covariance: StateMat,

    covariance_form: CovarianceForm,
    max_condition_number: f64,

    /// Update counters
    predict_count: u64,
    update_count: u64,
}

impl KalmanFilter {
    /// Build the motion and measurement models from `config` and seed the
    /// filter at `initial_location` with zero velocity and acceleration.
    pub fn new(initial_location: LocationData, config: &FilterConfig) -> TrackerResult<Self> {
        let motion = MotionModel::new(initial_location, config)?;
        let measurement = MeasurementModel::from_profile(config.measurement_noise);
        Ok(Self::from_models(motion, measurement, config))
    }

    pub fn from_models(
        motion: MotionModel,
        measurement: MeasurementModel,
        config: &FilterConfig,
    ) -> Self {
        let (state, covariance) = motion.initial_state();
        Self {
            motion,
            measurement,
            state,
            covariance,
            covariance_form: config.covariance_form,
            max_condition_number: config.max_condition_number,
            predict_count: 0,
            update_count: 0,
        }
    }

    /// Start from an explicit state and covariance instead of the seed
    pub fn with_state(
        motion: MotionModel,
        measurement: MeasurementModel,
        state: StateVec,
        covariance: StateMat,
        config: &FilterConfig,
    ) -> TrackerResult<Self> {
        if !state.iter().chain(covariance.iter()).all(|v| v.is_finite()) {
            return Err(TrackerError::Configuration(
                "initial state and covariance must be finite".to_string(),
            ));
        }
        let mut filter = Self::from_models(motion, measurement, config);
        filter.state = state;
        filter.covariance = covariance;
        Ok(filter)
    }

    /// Time update. The control term `B u` is omitted: no control input exists.
    pub fn predict(&mut self) -> &StateVec {
        let f = self.motion.transition();
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + self.motion.process_noise();
        symmetrize(&mut self.covariance);

        self.predict_count += 1;
        &self.state
    }

    /// Measurement update with `z = [posX, posY, posZ, accX, accY, accZ]`.
    ///
    /// On error the state and covariance are left untouched.
    pub fn update(&mut self, measurement: &MeasureVec) -> TrackerResult<&StateVec> {
        if !measurement.iter().all(|v| v.is_finite()) {
            return Err(TrackerError::Input(format!(
                "measurement has non-finite components: {:?}",
                measurement.as_slice()
            )));
        }

        let h = self.measurement.observation();
        let r = self.measurement.noise();

        let innovation = measurement - h * self.state;
        let ph_t = self.covariance * h.transpose();
        let s = h * ph_t + r;
        let s_inv = self.invert_innovation_covariance(&s)?;

        let k: KalmanGain = ph_t * s_inv;
        self.state += k * innovation;

        let i_minus_kh = StateMat::identity() - k * h;
        self.covariance = match self.covariance_form {
            CovarianceForm::Joseph => {
                i_minus_kh * self.covariance * i_minus_kh.transpose() + k * r * k.transpose()
            }
            CovarianceForm::Simple => i_minus_kh * self.covariance,
        };
        symmetrize(&mut self.covariance);

        self.update_count += 1;
        debug!(
            "update #{}: innovation norm {:.4}, position ({:.3}, {:.3}, {:.3})",
            self.update_count,
            innovation.norm(),
            self.state[0],
            self.state[1],
            self.state[2]
        );
        Ok(&self.state)
    }

    /// S^-1, refusing singular or ill-conditioned S
    fn invert_innovation_covariance(&self, s: &MeasureMat) -> TrackerResult<MeasureMat> {
        if !s.iter().all(|v| v.is_finite()) {
            return Err(TrackerError::Numerical(
                "innovation covariance has non-finite entries".to_string(),
            ));
        }

        let singular_values = s.singular_values();
        let largest = singular_values.max();
        let smallest = singular_values.min();
        if smallest <= f64::EPSILON * largest {
            return Err(TrackerError::Numerical(format!(
                "innovation covariance is singular (singular values {:.3e}..{:.3e})",
                smallest, largest
            )));
        }
        let condition = largest / smallest;
        if condition > self.max_condition_number {
            return Err(TrackerError::Numerical(format!(
                "innovation covariance is ill-conditioned (condition number {:.3e})",
                condition
            )));
        }

        s.try_inverse().ok_or_else(|| {
            TrackerError::Numerical("innovation covariance is not invertible".to_string())
        })
    }

    pub fn state(&self) -> &StateVec {
        &self.state
    }

    pub fn covariance(&self) -> &StateMat {
        &self.covariance
    }

    /// Position part of the state
    pub fn location(&self) -> LocationData {
        LocationData::new(self.state[0], self.state[1], self.state[2])
    }

    pub fn get_state(&self) -> FilterState {
        FilterState::from_parts(&self.state, &self.covariance)
    }

    pub fn motion_model(&self) -> &MotionModel {
        &self.motion
    }

    pub fn measurement_model(&self) -> &MeasurementModel {
        &self.measurement
    }

    pub fn predict_count(&self) -> u64 {
        self.predict_count
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{asymmetry, RawFix, STATE_DIM};

    fn filter_at(x: f64, y: f64, z: f64) -> KalmanFilter {
        KalmanFilter::new(LocationData::new(x, y, z), &FilterConfig::default()).unwrap()
    }

    /// Deterministic high-frequency jitter in [-amplitude, amplitude]
    fn jitter(tick: usize, channel: usize, amplitude: f64) -> f64 {
        amplitude * (tick as f64 * 2.3 + channel as f64).sin()
    }

    fn assert_covariance_healthy(p: &StateMat) {
        assert!(asymmetry(p) < 1e-9, "P asymmetric by {}", asymmetry(p));
        for i in 0..STATE_DIM {
            assert!(p[(i, i)] >= 0.0, "negative variance at {}: {}", i, p[(i, i)]);
        }
        assert!(p.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_identity_predict_without_process_noise() {
        let config = FilterConfig::default().with_acceleration_variance(0.0);
        let mut kf = KalmanFilter::new(LocationData::new(1.0, 2.0, 3.0), &config).unwrap();

        for _ in 0..100 {
            kf.predict();
        }

        assert_eq!(kf.location(), LocationData::new(1.0, 2.0, 3.0));
        for i in 3..STATE_DIM {
            assert_eq!(kf.state()[i], 0.0);
        }
        assert_eq!(kf.predict_count(), 100);
    }

    #[test]
    fn test_convergence_to_fixed_position() {
        let truth = LocationData::new(1.0, 2.0, 3.0);
        let mut kf = filter_at(0.9, 2.1, 2.95);

        for tick in 1..=500 {
            kf.predict();
            let fix = RawFix::new(
                [
                    truth.x + jitter(tick, 0, 0.01),
                    truth.y + jitter(tick, 1, 0.01),
                    truth.z + jitter(tick, 2, 0.01),
                ],
                [
                    jitter(tick, 3, 0.01),
                    jitter(tick, 4, 0.01),
                    jitter(tick, 5, 0.01),
                ],
            );
            kf.update(&fix.to_measurement()).unwrap();

            if tick > 300 {
                let error = kf.location().distance_to(&truth);
                assert!(error < 0.01, "tick {}: error {}", tick, error);
            }
        }
        assert_eq!(kf.update_count(), 500);
    }

    #[test]
    fn test_covariance_symmetry_invariant() {
        for form in [CovarianceForm::Joseph, CovarianceForm::Simple] {
            let config = FilterConfig {
                covariance_form: form,
                ..Default::default()
            };
            let mut kf = KalmanFilter::new(LocationData::new(0.0, 0.0, 0.0), &config).unwrap();

            for tick in 0..3000 {
                kf.predict();
                assert_covariance_healthy(kf.covariance());

                // walk along a circle, dropping every seventh fix
                if tick % 7 == 3 {
                    continue;
                }
                let t = tick as f64 * 0.1;
                let fix = RawFix::new(
                    [
                        t.cos() + jitter(tick, 0, 0.05),
                        t.sin() + jitter(tick, 1, 0.05),
                        0.1 * t + jitter(tick, 2, 0.05),
                    ],
                    [-t.cos(), -t.sin(), jitter(tick, 5, 0.1)],
                );
                kf.update(&fix.to_measurement()).unwrap();
                assert_covariance_healthy(kf.covariance());
            }
        }
    }

    #[test]
    fn test_predict_only_dead_reckoning() {
        let config = FilterConfig::default();
        let motion = MotionModel::new(LocationData::new(1.0, -1.0, 0.5), &config).unwrap();
        let (mut x, p) = motion.initial_state();
        x[3] = 1.2; // vel x
        x[5] = -0.4; // vel z
        x[7] = 0.3; // acc y
        let mut kf =
            KalmanFilter::with_state(motion, MeasurementModel::new(), x, p, &config).unwrap();

        let mut last_trace = kf.covariance().trace();
        let steps = 2000;
        for _ in 0..steps {
            kf.predict();
            let trace = kf.covariance().trace();
            assert!(trace.is_finite());
            assert!(trace > last_trace);
            last_trace = trace;
        }

        let t = steps as f64 * config.time_delta;
        let position = kf.location();
        assert!((position.x - (1.0 + 1.2 * t)).abs() < 1e-6);
        assert!((position.y - (-1.0 + 0.5 * 0.3 * t * t)).abs() < 1e-6);
        assert!((position.z - (0.5 - 0.4 * t)).abs() < 1e-6);
        assert!(kf.state().iter().all(|v| v.is_finite()));
        assert_covariance_healthy(kf.covariance());
    }

    #[test]
    fn test_singular_innovation_keeps_predicted_state() {
        let config = FilterConfig::default().with_acceleration_variance(0.0);
        let motion = MotionModel::new(LocationData::new(0.5, 0.5, 0.5), &config).unwrap();
        let (x, _) = motion.initial_state();
        let measurement = MeasurementModel::with_noise(MeasureMat::zeros());
        let mut kf =
            KalmanFilter::with_state(motion, measurement, x, StateMat::zeros(), &config).unwrap();

        let predicted = *kf.predict();
        let predicted_covariance = *kf.covariance();

        let z = RawFix::at(1.0, 1.0, 1.0).to_measurement();
        let result = kf.update(&z);

        assert!(matches!(result, Err(TrackerError::Numerical(_))));
        assert_eq!(*kf.state(), predicted);
        assert_eq!(*kf.covariance(), predicted_covariance);
        assert_eq!(kf.update_count(), 0);
    }

    #[test]
    fn test_partially_singular_innovation_rejected() {
        let config = FilterConfig::default().with_acceleration_variance(0.0);
        let motion = MotionModel::new(LocationData::new(0.0, 0.0, 0.0), &config).unwrap();
        let (x, _) = motion.initial_state();
        // only acceleration is uncertain, so the position rows of S vanish
        let mut p = StateMat::zeros();
        for i in 6..STATE_DIM {
            p[(i, i)] = 1.0;
        }
        let measurement = MeasurementModel::with_noise(MeasureMat::zeros());
        let mut kf = KalmanFilter::with_state(motion, measurement, x, p, &config).unwrap();

        let result = kf.update(&RawFix::at(0.1, 0.0, 0.0).to_measurement());
        assert!(matches!(result, Err(TrackerError::Numerical(_))));
        assert_eq!(kf.location(), LocationData::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_ill_conditioned_innovation_rejected() {
        let config = FilterConfig {
            max_condition_number: 1e6,
            ..FilterConfig::default().with_acceleration_variance(0.0)
        };
        let motion = MotionModel::new(LocationData::new(0.0, 0.0, 0.0), &config).unwrap();
        let (x, _) = motion.initial_state();
        let mut p = StateMat::identity();
        for i in 0..3 {
            p[(i, i)] = 1e-9;
        }
        let measurement = MeasurementModel::with_noise(MeasureMat::zeros());
        let mut kf = KalmanFilter::with_state(motion, measurement, x, p, &config).unwrap();

        let err = kf
            .update(&RawFix::at(0.1, 0.0, 0.0).to_measurement())
            .unwrap_err();
        assert!(err.to_string().contains("ill-conditioned"), "{}", err);
        assert_eq!(*kf.covariance(), p);
    }

    #[test]
    fn test_end_to_end_smoothing() {
        let mut kf = filter_at(0.0, 0.0, 0.0);

        let mut priors = Vec::new();
        for x in [0.1, 0.2, 0.3] {
            priors.push(kf.predict()[0]);
            kf.update(&RawFix::at(x, 0.0, 0.0).to_measurement()).unwrap();
        }

        let prior = priors[2];
        let estimate = kf.location().x;
        assert!(estimate < 0.3, "estimate {} passed through the raw fix", estimate);
        assert!(estimate > prior, "estimate {} ignored the fix (prior {})", estimate, prior);
        // velocity picked up from the motion
        assert!(kf.state()[3] > 0.0);
    }

    #[test]
    fn test_non_finite_measurement_rejected() {
        let mut kf = filter_at(0.0, 0.0, 0.0);
        kf.predict();
        let before = *kf.state();

        let mut z = RawFix::at(0.1, 0.0, 0.0).to_measurement();
        z[4] = f64::NAN;
        assert!(matches!(kf.update(&z), Err(TrackerError::Input(_))));
        assert_eq!(*kf.state(), before);
    }

    #[test]
    fn test_with_state_rejects_non_finite() {
        let config = FilterConfig::default();
        let motion = MotionModel::new(LocationData::new(0.0, 0.0, 0.0), &config).unwrap();
        let (mut x, p) = motion.initial_state();
        x[4] = f64::INFINITY;
        let result = KalmanFilter::with_state(motion, MeasurementModel::new(), x, p, &config);
        assert!(matches!(result, Err(TrackerError::Configuration(_))));
    }

    #[test]
    fn test_get_state_snapshot() {
        let mut kf = filter_at(1.0, 2.0, 3.0);
        let snapshot = kf.get_state();
        assert_eq!(snapshot.position, (1.0, 2.0, 3.0));
        assert_eq!(snapshot.speed(), 0.0);
        assert!((snapshot.covariance_trace - 9.0).abs() < 1e-12);

        kf.predict();
        assert!(kf.get_state().covariance_trace > 9.0);
    }
}
