use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::filters::KalmanFilter;
use crate::types::{FilterState, LocationData, RawFix};

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Not consuming fixes
    Idle,
    /// Consuming fixes; the filter is seeded by the first one
    Tracking,
}

/// Receives every successfully updated estimate.
pub trait EstimateListener: Send + Sync {
    /// `quality_factor` comes from the ranging collaborator and is passed
    /// through untouched.
    fn on_estimate_updated(&self, estimate: LocationData, quality_factor: u8);
}

impl<F> EstimateListener for F
where
    F: Fn(LocationData, u8) + Send + Sync,
{
    fn on_estimate_updated(&self, estimate: LocationData, quality_factor: u8) {
        self(estimate, quality_factor)
    }
}

/// What a single fix did to the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Session idle, fix dropped
    Ignored,
    /// First fix of the session; the filter starts here
    Seeded(LocationData),
    /// Predict and update both ran
    Updated(LocationData),
    /// Update refused on numerical grounds, predicted state kept
    PredictedOnly(LocationData),
}

/// Session statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub start_time: Option<String>,
    pub state: SessionState,
    pub fixes_received: u64,
    pub updates_applied: u64,
    pub rejected_inputs: u64,
    pub numerical_errors: u64,
    pub consecutive_numerical_errors: u32,
    pub dead_reckoning_steps: u64,
    pub last_estimate: Option<LocationData>,
    pub last_quality_factor: Option<u8>,
}

impl SessionStats {
    fn idle() -> Self {
        SessionStats {
            session_id: String::new(),
            start_time: None,
            state: SessionState::Idle,
            fixes_received: 0,
            updates_applied: 0,
            rejected_inputs: 0,
            numerical_errors: 0,
            consecutive_numerical_errors: 0,
            dead_reckoning_steps: 0,
            last_estimate: None,
            last_quality_factor: None,
        }
    }
}

struct SessionInner {
    stats: SessionStats,
    filter: Option<KalmanFilter>,
    /// Bumped on every applied update, never reset
    update_seq: u64,
}

/// One tracking session: owns the estimator and serializes ticks.
///
/// The ranging collaborator may call [`TrackingSession::process_fix`] from its
/// own delivery thread; at most one predict+update runs at a time. The
/// listener sees updates in tick order; an update overtaken by a newer one
/// before its notification runs is not delivered.
pub struct TrackingSession {
    config: FilterConfig,
    inner: Mutex<SessionInner>,
    listener: Option<Box<dyn EstimateListener>>,
    /// Sequence number of the last update handed to the listener
    delivered: Mutex<u64>,
}

impl TrackingSession {
    /// Create new session in Idle state
    pub fn new(config: FilterConfig) -> TrackerResult<Self> {
        config.validate()?;
        Ok(TrackingSession {
            config,
            inner: Mutex::new(SessionInner {
                stats: SessionStats::idle(),
                filter: None,
                update_seq: 0,
            }),
            listener: None,
            delivered: Mutex::new(0),
        })
    }

    pub fn with_listener(mut self, listener: impl EstimateListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    fn lock(&self) -> TrackerResult<MutexGuard<'_, SessionInner>> {
        self.inner.lock().map_err(|_| {
            TrackerError::Internal("Failed to acquire session lock".to_string())
        })
    }

    /// Idle → Tracking. Each start begins with a fresh, unseeded filter.
    pub fn start(&self) -> TrackerResult<()> {
        let mut inner = self.lock()?;
        match inner.stats.state {
            SessionState::Tracking => Err(TrackerError::AlreadyRunning),
            SessionState::Idle => {
                let now = Utc::now();
                inner.stats = SessionStats {
                    session_id: format!("session_{}", now.timestamp_millis()),
                    start_time: Some(now.to_rfc3339()),
                    state: SessionState::Tracking,
                    ..SessionStats::idle()
                };
                inner.filter = None;
                info!("[{}] tracking started", inner.stats.session_id);
                Ok(())
            }
        }
    }

    /// Tracking → Idle. Drops the filter and returns the final statistics.
    pub fn stop(&self) -> TrackerResult<SessionStats> {
        let mut inner = self.lock()?;
        match inner.stats.state {
            SessionState::Idle => Err(TrackerError::NotRunning),
            SessionState::Tracking => {
                inner.stats.state = SessionState::Idle;
                inner.filter = None;
                info!(
                    "[{}] tracking stopped: {} fixes, {} updates, {} rejected, {} numerical errors",
                    inner.stats.session_id,
                    inner.stats.fixes_received,
                    inner.stats.updates_applied,
                    inner.stats.rejected_inputs,
                    inner.stats.numerical_errors
                );
                Ok(inner.stats.clone())
            }
        }
    }

    pub fn state(&self) -> TrackerResult<SessionState> {
        Ok(self.lock()?.stats.state)
    }

    pub fn is_tracking(&self) -> TrackerResult<bool> {
        Ok(self.state()? == SessionState::Tracking)
    }

    /// Run one predict/update tick for a delivered fix.
    ///
    /// Non-finite fixes are rejected with [`TrackerError::Input`] before they
    /// reach the filter. A numerically failed update is not an error for the
    /// caller: the tick reports [`TickOutcome::PredictedOnly`].
    pub fn process_fix(&self, fix: &RawFix, quality_factor: u8) -> TrackerResult<TickOutcome> {
        let (outcome, seq) = {
            let mut inner = self.lock()?;
            if inner.stats.state != SessionState::Tracking {
                return Ok(TickOutcome::Ignored);
            }
            inner.stats.fixes_received += 1;

            if !fix.is_finite() {
                inner.stats.rejected_inputs += 1;
                warn!(
                    "[{}] rejected non-finite fix {:?}",
                    inner.stats.session_id, fix
                );
                return Err(TrackerError::Input(format!(
                    "fix has non-finite components: {:?}",
                    fix
                )));
            }

            let outcome = self.tick(&mut inner, fix, quality_factor)?;
            if matches!(outcome, TickOutcome::Updated(_)) {
                inner.update_seq += 1;
            }
            (outcome, inner.update_seq)
        };

        if let TickOutcome::Updated(estimate) = outcome {
            self.notify(seq, estimate, quality_factor)?;
        }
        Ok(outcome)
    }

    /// Hand an update to the listener unless a newer one already went out.
    /// Runs outside the state lock so the listener may query the session.
    fn notify(&self, seq: u64, estimate: LocationData, quality_factor: u8) -> TrackerResult<()> {
        let Some(listener) = self.listener.as_ref() else {
            return Ok(());
        };
        let mut delivered = self.delivered.lock().map_err(|_| {
            TrackerError::Internal("Failed to acquire listener lock".to_string())
        })?;
        if seq <= *delivered {
            debug!("dropping stale estimate #{} (#{} already delivered)", seq, *delivered);
            return Ok(());
        }
        *delivered = seq;
        listener.on_estimate_updated(estimate, quality_factor);
        Ok(())
    }

    fn tick(
        &self,
        inner: &mut SessionInner,
        fix: &RawFix,
        quality_factor: u8,
    ) -> TrackerResult<TickOutcome> {
        let Some(filter) = inner.filter.as_mut() else {
            let seed = fix.location();
            match KalmanFilter::new(seed, &self.config) {
                Ok(filter) => {
                    inner.filter = Some(filter);
                    inner.stats.last_estimate = Some(seed);
                    inner.stats.last_quality_factor = Some(quality_factor);
                    info!("[{}] filter seeded at {}", inner.stats.session_id, seed);
                    return Ok(TickOutcome::Seeded(seed));
                }
                Err(e) => {
                    inner.stats.state = SessionState::Idle;
                    error!("[{}] cannot start filter: {}", inner.stats.session_id, e);
                    return Err(e);
                }
            }
        };

        filter.predict();
        let applied = filter.update(&fix.to_measurement()).map(|_| ());
        match applied {
            Ok(()) => {
                let estimate = filter.location();
                inner.stats.updates_applied += 1;
                inner.stats.consecutive_numerical_errors = 0;
                inner.stats.last_estimate = Some(estimate);
                inner.stats.last_quality_factor = Some(quality_factor);
                debug!(
                    "[{}] estimate {} (quality {})",
                    inner.stats.session_id, estimate, quality_factor
                );
                Ok(TickOutcome::Updated(estimate))
            }
            Err(TrackerError::Numerical(reason)) => {
                let estimate = filter.location();
                inner.stats.numerical_errors += 1;
                inner.stats.consecutive_numerical_errors += 1;
                inner.stats.last_estimate = Some(estimate);
                let streak = inner.stats.consecutive_numerical_errors;
                if streak >= self.config.numerical_error_alert_threshold {
                    error!(
                        "[{}] update skipped ({} in a row): {}",
                        inner.stats.session_id, streak, reason
                    );
                } else {
                    warn!("[{}] update skipped: {}", inner.stats.session_id, reason);
                }
                Ok(TickOutcome::PredictedOnly(estimate))
            }
            Err(e) => Err(e),
        }
    }

    /// Predict-only step for measurement gaps. Returns `None` while idle or
    /// before the filter has been seeded.
    pub fn dead_reckon(&self) -> TrackerResult<Option<LocationData>> {
        let mut inner = self.lock()?;
        if inner.stats.state != SessionState::Tracking {
            return Ok(None);
        }
        let Some(filter) = inner.filter.as_mut() else {
            return Ok(None);
        };
        filter.predict();
        let estimate = filter.location();
        inner.stats.dead_reckoning_steps += 1;
        inner.stats.last_estimate = Some(estimate);
        Ok(Some(estimate))
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> TrackerResult<SessionStats> {
        Ok(self.lock()?.stats.clone())
    }

    /// Full filter state, once seeded
    pub fn state_snapshot(&self) -> TrackerResult<Option<FilterState>> {
        Ok(self.lock()?.filter.as_ref().map(KalmanFilter::get_state))
    }
}
