//! Render stall detection

use crate::config::HealthSettings;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    pub consecutive_failures: u32,
    pub healthy: bool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            healthy: true,
        }
    }
}

/// Result of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// The source produced nothing new, so no progress was expected
    Idle,
    Stalling(u32),
    Unhealthy,
}

/// What the periodic check reads each tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSample {
    pub progress: u64,
    pub source_timestamp: Option<Duration>,
}

/// How a monitoring run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    Cancelled,
    Unhealthy,
}

/// Watches a tier's progress counter for stalls.
///
/// A stall is a check where the counter did not move since the previous one.
/// `max_consecutive_stalls` stalls in a row make the tier unhealthy.
#[derive(Debug)]
pub struct HealthMonitor {
    interval: Duration,
    max_consecutive_stalls: u32,
    last_progress: Option<u64>,
    last_source: Option<Duration>,
    state: HealthState,
}

impl HealthMonitor {
    pub fn new(interval: Duration, max_consecutive_stalls: u32) -> Self {
        Self {
            interval,
            max_consecutive_stalls: max_consecutive_stalls.max(1),
            last_progress: None,
            last_source: None,
            state: HealthState::default(),
        }
    }

    pub fn from_settings(settings: &HealthSettings) -> Self {
        Self::new(settings.check_interval(), settings.max_consecutive_stalls)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn reset(&mut self) {
        self.last_progress = None;
        self.last_source = None;
        self.state = HealthState::default();
    }

    /// Compare `progress` with the previous snapshot.
    ///
    /// The first observation only records a baseline.
    pub fn observe(&mut self, progress: u64) -> HealthStatus {
        let previous = self.last_progress.replace(progress);

        if previous != Some(progress) {
            if previous.is_some() && self.state.consecutive_failures > 0 {
                log::debug!(
                    "Render progress resumed after {} stalled checks",
                    self.state.consecutive_failures
                );
            }
            self.state = HealthState::default();
            return HealthStatus::Healthy;
        }

        if !self.state.healthy {
            return HealthStatus::Unhealthy;
        }

        self.state.consecutive_failures += 1;
        if self.state.consecutive_failures >= self.max_consecutive_stalls {
            self.state.healthy = false;
            log::warn!(
                "Render progress stuck at {} for {} consecutive checks",
                progress,
                self.state.consecutive_failures
            );
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Stalling(self.state.consecutive_failures)
        }
    }

    /// Like [`observe`](Self::observe), but a check where the source itself
    /// did not advance is not counted as a stall.
    pub fn observe_sample(&mut self, sample: HealthSample) -> HealthStatus {
        let previous_source = std::mem::replace(&mut self.last_source, sample.source_timestamp);

        if self.last_progress.is_some() && previous_source == sample.source_timestamp {
            self.last_progress = Some(sample.progress);
            return HealthStatus::Idle;
        }

        self.observe(sample.progress)
    }

    /// Check on every interval tick until cancelled or unhealthy
    pub async fn run<F>(mut self, cancel: CancellationToken, mut sample: F) -> HealthOutcome
    where
        F: FnMut() -> HealthSample + Send,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return HealthOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            match self.observe_sample(sample()) {
                HealthStatus::Unhealthy => return HealthOutcome::Unhealthy,
                HealthStatus::Stalling(n) => log::debug!("Render stall check {}/{}", n, self.max_consecutive_stalls),
                HealthStatus::Healthy | HealthStatus::Idle => {}
            }
        }
    }
}
