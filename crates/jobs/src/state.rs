// crates/jobs/src/state.rs
//! Observable poller state, published through `tokio::sync::watch`.

use std::collections::HashMap;

use playbook_types::{JobId, JobSnapshot};
use serde::Serialize;

/// Message shown between `start` and the first successful fetch.
pub const STARTING_MESSAGE: &str = "Starting...";

/// What a [`JobPoller`](crate::JobPoller) currently knows about its job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerState {
    /// Latest fetched snapshot.
    pub job: Option<JobSnapshot>,
    pub is_polling: bool,
    /// 0–100.
    pub progress: u8,
    pub progress_message: String,
    pub error: Option<String>,
}

impl PollerState {
    pub(crate) fn starting() -> Self {
        Self {
            job: None,
            is_polling: true,
            progress: 0,
            progress_message: STARTING_MESSAGE.to_string(),
            error: None,
        }
    }

    pub(crate) fn observe(&mut self, snapshot: &JobSnapshot) {
        self.progress = snapshot.progress_pct;
        if let Some(message) = &snapshot.progress_message {
            self.progress_message.clone_from(message);
        }
        self.job = Some(snapshot.clone());
    }
}

/// Aggregate view over every job a [`MultiJobPoller`](crate::MultiJobPoller) knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiPollerState {
    /// Last known snapshot per job, terminal ones included.
    pub jobs: HashMap<JobId, JobSnapshot>,
    /// Tracked jobs that have not reached a terminal state.
    pub active_count: usize,
    /// Mean `progress_pct` over `jobs`; 0 when no job is known.
    pub overall_progress: f64,
}

impl MultiPollerState {
    pub(crate) fn new(jobs: HashMap<JobId, JobSnapshot>, active_count: usize) -> Self {
        let overall_progress = overall_progress(jobs.values());
        Self {
            jobs,
            active_count,
            overall_progress,
        }
    }
}

/// Arithmetic mean of `progress_pct`, or 0 for an empty set.
pub fn overall_progress<'a>(snapshots: impl IntoIterator<Item = &'a JobSnapshot>) -> f64 {
    let (sum, count) = snapshots
        .into_iter()
        .fold((0u64, 0u64), |(sum, count), s| (sum + u64::from(s.progress_pct), count + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}
