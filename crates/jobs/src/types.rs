// crates/jobs/src/types.rs
//! Configuration, errors and notifications shared by both pollers.

use std::time::Duration;

use playbook_client::config::env_non_empty;
use playbook_types::{JobId, JobSnapshot};
use thiserror::Error;

/// Time between two status fetches.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2_000);

/// Wall-clock budget for one job, measured from the moment tracking starts.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300_000);

/// `tokio::time::interval` panics on a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// What a poller does when a status fetch fails (network error, non-2xx, bad body).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorPolicy {
    /// End tracking of the job with a `PollError::Fetch`.
    Fatal,
    /// Log and try again on the next tick. Only the timeout can end tracking.
    Skip,
}

/// Settings for [`JobPoller`](crate::JobPoller) and [`MultiJobPoller`](crate::MultiJobPoller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub timeout: Duration,
    /// `None` selects the poller's own default: `Fatal` for the single-job
    /// poller, `Skip` for the multi-job poller.
    pub fetch_error_policy: Option<FetchErrorPolicy>,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            fetch_error_policy: None,
            event_capacity: 64,
        }
    }
}

impl PollerConfig {
    /// Defaults overridden by `PLAYBOOK_POLL_INTERVAL_MS` and `PLAYBOOK_POLL_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let millis = |key: &str| {
            env_non_empty(key)
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        let defaults = Self::default();
        Self {
            interval: millis("PLAYBOOK_POLL_INTERVAL_MS").unwrap_or(defaults.interval),
            timeout: millis("PLAYBOOK_POLL_TIMEOUT_MS").unwrap_or(defaults.timeout),
            ..defaults
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fetch_error_policy(mut self, policy: FetchErrorPolicy) -> Self {
        self.fetch_error_policy = Some(policy);
        self
    }

    pub(crate) fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_INTERVAL)
    }

    pub(crate) fn policy_or(&self, default: FetchErrorPolicy) -> FetchErrorPolicy {
        self.fetch_error_policy.unwrap_or(default)
    }
}

/// Why tracking of a job ended without a `completed` status.
///
/// The `Display` text is what the UI shows in its error state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("Failed to fetch job status: {0}")]
    Fetch(String),

    /// The job itself reported `failed` or `cancelled`.
    #[error("{0}")]
    JobFailed(String),

    #[error("Job timed out")]
    Timeout,
}

/// Terminal result of tracking one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(JobSnapshot),
    Failed {
        error: PollError,
        /// Last snapshot seen before the failure, if any fetch succeeded.
        last: Option<JobSnapshot>,
    },
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }

    pub fn error(&self) -> Option<&PollError> {
        match self {
            JobOutcome::Completed(_) => None,
            JobOutcome::Failed { error, .. } => Some(error),
        }
    }
}

/// Notification emitted while a job is tracked.
///
/// Every successful fetch yields one `Progress`; exactly one of `Completed`
/// or `Failed` ends a tracking session, unless it was stopped first.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Progress(JobSnapshot),
    Completed(JobSnapshot),
    Failed(PollError),
}

impl PollEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollEvent::Progress(_))
    }
}

/// A [`PollEvent`] attributed to one job of a [`MultiJobPoller`](crate::MultiJobPoller).
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPollEvent {
    pub job_id: JobId,
    pub event: PollEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let cfg = PollerConfig::default();
        assert_eq!(cfg.interval, Duration::from_millis(2000));
        assert_eq!(cfg.timeout, Duration::from_millis(300_000));
        assert_eq!(cfg.fetch_error_policy, None);
        assert_eq!(cfg.policy_or(FetchErrorPolicy::Fatal), FetchErrorPolicy::Fatal);
        assert_eq!(cfg.policy_or(FetchErrorPolicy::Skip), FetchErrorPolicy::Skip);
    }

    #[test]
    fn test_explicit_policy_wins() {
        let cfg = PollerConfig::default().with_fetch_error_policy(FetchErrorPolicy::Skip);
        assert_eq!(cfg.policy_or(FetchErrorPolicy::Fatal), FetchErrorPolicy::Skip);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let cfg = PollerConfig::default().with_interval(Duration::ZERO);
        assert_eq!(cfg.effective_interval(), Duration::from_millis(1));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("PLAYBOOK_POLL_INTERVAL_MS", "500");
        std::env::set_var("PLAYBOOK_POLL_TIMEOUT_MS", "not-a-number");
        let cfg = PollerConfig::from_env();
        assert_eq!(cfg.interval, Duration::from_millis(500));
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
        std::env::remove_var("PLAYBOOK_POLL_INTERVAL_MS");
        std::env::remove_var("PLAYBOOK_POLL_TIMEOUT_MS");
    }

    #[test]
    fn test_poll_error_messages() {
        assert_eq!(PollError::Timeout.to_string(), "Job timed out");
        assert_eq!(PollError::JobFailed("Job failed".into()).to_string(), "Job failed");
        assert_eq!(
            PollError::Fetch("API error 500: oops".into()).to_string(),
            "Failed to fetch job status: API error 500: oops"
        );
    }
}
