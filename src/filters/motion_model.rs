//! Constant-acceleration motion model
//!
//! State Vector (9D):
//! [0-2]: Position (X, Y, Z) in the UWB anchor frame (meters)
//! [3-5]: Velocity (Vx, Vy, Vz) (m/s)
//! [6-8]: Acceleration (Ax, Ay, Az) (m/s²)

use crate::config::{FilterConfig, ProcessNoiseProfile};
use crate::error::{TrackerError, TrackerResult};
use crate::types::{ControlMat, LocationData, StateClass, StateMat, StateVec, AXES};

#[derive(Clone, Debug)]
pub struct MotionModel {
    /// Seed position
    initial_location: LocationData,

    /// State transition F [9x9]
    transition: StateMat,

    /// Control matrix B [9x1], always zero
    control: ControlMat,

    /// Process noise Q [9x9]
    process_noise: StateMat,
}

impl MotionModel {
    pub fn new(initial_location: LocationData, config: &FilterConfig) -> TrackerResult<Self> {
        if !initial_location.is_finite() {
            return Err(TrackerError::Configuration(format!(
                "initial location must be finite, got ({}, {}, {})",
                initial_location.x, initial_location.y, initial_location.z
            )));
        }
        config.validate()?;

        let dt = config.time_delta;
        let variance = config.acceleration_variance();
        let process_noise = match config.process_noise {
            ProcessNoiseProfile::Complete => complete_process_noise(dt, variance),
            ProcessNoiseProfile::Simple => simple_process_noise(variance),
        };

        Ok(Self {
            initial_location,
            transition: transition_matrix(dt),
            control: ControlMat::zeros(),
            process_noise,
        })
    }

    /// x = [x0, y0, z0, 0, 0, 0, 0, 0, 0], P = I
    pub fn initial_state(&self) -> (StateVec, StateMat) {
        let mut x = StateVec::zeros();
        x[0] = self.initial_location.x;
        x[1] = self.initial_location.y;
        x[2] = self.initial_location.z;
        (x, StateMat::identity())
    }

    pub fn transition(&self) -> &StateMat {
        &self.transition
    }

    pub fn control(&self) -> &ControlMat {
        &self.control
    }

    pub fn process_noise(&self) -> &StateMat {
        &self.process_noise
    }
}

/// F for one step: pos += v*dt + 0.5*a*dt², vel += a*dt, acc carried over.
/// Axes are independent.
pub fn transition_matrix(dt: f64) -> StateMat {
    let mut f = StateMat::identity();
    for axis in 0..AXES {
        let (pos, vel, acc) = (axis, AXES + axis, 2 * AXES + axis);
        f[(pos, vel)] = dt;
        f[(pos, acc)] = 0.5 * dt * dt;
        f[(vel, acc)] = dt;
    }
    f
}

/// Noise gain of one state component to a unit acceleration change
fn noise_gain(class: StateClass, dt: f64) -> f64 {
    match class {
        StateClass::Position => 0.5 * dt * dt,
        StateClass::Velocity => dt,
        StateClass::Acceleration => 1.0,
    }
}

/// Unscaled Q entry, chosen by the classes of the two coupled components:
///
/// | pair                        | value      |
/// |-----------------------------|------------|
/// | position / position         | dt⁴ / 4    |
/// | position / velocity         | dt³ / 2    |
/// | position / acceleration     | dt² / 2    |
/// | velocity / velocity         | dt²        |
/// | velocity / acceleration     | dt         |
/// | acceleration / acceleration | 1          |
pub fn process_noise_template(row: usize, col: usize, dt: f64) -> f64 {
    noise_gain(StateClass::of(row), dt) * noise_gain(StateClass::of(col), dt)
}

/// Dense discretized constant-acceleration Q, scaled by the acceleration variance
pub fn complete_process_noise(dt: f64, acceleration_variance: f64) -> StateMat {
    StateMat::from_fn(|i, j| process_noise_template(i, j, dt)) * acceleration_variance
}

/// Q restricted to the acceleration block
pub fn simple_process_noise(acceleration_variance: f64) -> StateMat {
    StateMat::from_fn(|i, j| {
        if i >= 2 * AXES && j >= 2 * AXES {
            1.0
        } else {
            0.0
        }
    }) * acceleration_variance
}
