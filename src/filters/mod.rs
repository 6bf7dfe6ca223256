pub mod kalman;
pub mod measurement_model;
pub mod motion_model;

pub use kalman::KalmanFilter;
pub use measurement_model::MeasurementModel;
pub use motion_model::MotionModel;
