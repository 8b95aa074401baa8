// crates/jobs/src/testing.rs
//! Scripted job source for poller tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use playbook_client::{ClientError, JobStatusSource};
use playbook_types::{JobId, JobKind, JobSnapshot, JobStatus};

/// One scripted answer to a status fetch.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Snapshot(JobSnapshot),
    Status(u16),
    /// Never answers.
    Hang,
}

/// Answers fetches from a per-job script. The last step repeats once the
/// script runs out; a job without a script hangs.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    scripts: Mutex<HashMap<JobId, VecDeque<Step>>>,
    calls: Mutex<Vec<JobId>>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(self, id: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(JobId::new(id), steps.into_iter().collect());
        self
    }

    pub(crate) fn calls_for(&self, id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == id)
            .count()
    }

    fn next_step(&self, id: &JobId) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(id) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap_or(Step::Hang),
            Some(steps) => steps.front().cloned().unwrap_or(Step::Hang),
            None => Step::Hang,
        }
    }
}

#[async_trait]
impl JobStatusSource for ScriptedSource {
    async fn fetch_status(&self, id: &JobId) -> Result<JobSnapshot, ClientError> {
        self.calls.lock().unwrap().push(id.clone());
        match self.next_step(id) {
            Step::Snapshot(s) => Ok(s),
            Step::Status(status) => Err(ClientError::Status {
                status,
                body: "scripted failure".into(),
            }),
            Step::Hang => std::future::pending().await,
        }
    }
}

pub(crate) fn snapshot(id: &str, status: JobStatus, pct: u8) -> JobSnapshot {
    let mut s = JobSnapshot::pending(id, JobKind::Report);
    s.status = status;
    s.progress_pct = pct;
    s
}

pub(crate) fn running(id: &str, pct: u8) -> Step {
    Step::Snapshot(snapshot(id, JobStatus::InProgress, pct))
}

pub(crate) fn completed(id: &str) -> Step {
    Step::Snapshot(snapshot(id, JobStatus::Completed, 100))
}

pub(crate) fn failed(id: &str, message: Option<&str>) -> Step {
    let mut s = snapshot(id, JobStatus::Failed, 30);
    s.error_message = message.map(str::to_string);
    Step::Snapshot(s)
}
