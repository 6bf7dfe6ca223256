//! Linear algebra type system for the UWB tracker
//!
//! Provides compile-time dimension checking and clean type aliases
//! for the 9-state constant-acceleration Kalman filter.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM: usize = 9;
pub const AXES: usize = 3;

// ===== Measurement Dimensions =====
pub const MEASURE_DIM: usize = 6; // (x, y, z, ax, ay, az)

// ===== Control Dimensions =====
pub const CONTROL_DIM: usize = 1;

// ===== State Types =====
pub type StateVec = SVector<f64, STATE_DIM>;
pub type StateMat = SMatrix<f64, STATE_DIM, STATE_DIM>;

// ===== Measurement Types =====
pub type MeasureVec = SVector<f64, MEASURE_DIM>;
pub type MeasureMat = SMatrix<f64, MEASURE_DIM, MEASURE_DIM>;

// Observation model (6×9)
pub type ObservationMat = SMatrix<f64, MEASURE_DIM, STATE_DIM>;

// Kalman gain (9×6)
pub type KalmanGain = SMatrix<f64, STATE_DIM, MEASURE_DIM>;

// Control input (9×1)
pub type ControlMat = SMatrix<f64, STATE_DIM, CONTROL_DIM>;

/// Which block of the state vector an index belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateClass {
    Position,
    Velocity,
    Acceleration,
}

impl StateClass {
    /// Classify a state index (0-2 position, 3-5 velocity, 6-8 acceleration).
    pub fn of(index: usize) -> Self {
        match index / AXES {
            0 => StateClass::Position,
            1 => StateClass::Velocity,
            _ => StateClass::Acceleration,
        }
    }
}

/// Symmetrize a square matrix in place: `M = (M + M^T) / 2`
pub fn symmetrize<const N: usize>(m: &mut SMatrix<f64, N, N>) {
    let t = m.transpose();
    *m = (&*m + t) * 0.5;
}

/// Largest absolute entry of `M - M^T`
pub fn asymmetry<const N: usize>(m: &SMatrix<f64, N, N>) -> f64 {
    (m - m.transpose()).amax()
}
