// UWB pedestrian tracker
// Linear Kalman filter smoothing of UWB position fixes with accelerometer data

pub mod config;
pub mod error;
pub mod filters;
pub mod fix_log;
pub mod session;
pub mod types;

pub use config::FilterConfig;
pub use error::{TrackerError, TrackerResult};
pub use filters::{KalmanFilter, MeasurementModel, MotionModel};
pub use session::{EstimateListener, SessionState, SessionStats, TickOutcome, TrackingSession};
pub use types::{FilterState, LocationData, RawFix};
