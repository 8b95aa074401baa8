// crates/jobs/src/poller.rs
//! Single-job poller.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use playbook_client::JobStatusSource;
use playbook_types::{JobId, JobSnapshot, JobStatus};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::state::PollerState;
use crate::types::{FetchErrorPolicy, JobOutcome, PollError, PollEvent, PollerConfig};

/// Resolves once with the terminal outcome of one [`JobPoller::start`] session.
///
/// Resolves to `None` when the session was stopped, reset, superseded by
/// another `start`, or the poller was dropped.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<JobOutcome>,
}

impl Completion {
    pub async fn wait(self) -> Option<JobOutcome> {
        self.rx.await.ok()
    }
}

struct Session {
    generation: u64,
    job_id: JobId,
    token: CancellationToken,
    outcome_tx: Option<oneshot::Sender<JobOutcome>>,
}

struct Inner {
    source: Arc<dyn JobStatusSource>,
    config: PollerConfig,
    policy: FetchErrorPolicy,
    session: Mutex<Option<Session>>,
    next_generation: Mutex<u64>,
    state_tx: watch::Sender<PollerState>,
    events_tx: broadcast::Sender<PollEvent>,
}

/// Tracks one job from `start` until it completes, fails, or times out.
///
/// One fetch runs immediately on `start`, then one per `interval`, never more
/// than one in flight. State changes are published on a `watch` channel and
/// notifications on a `broadcast` channel. Dropping the poller cancels the
/// polling task.
pub struct JobPoller {
    inner: Arc<Inner>,
}

impl JobPoller {
    pub fn new(source: Arc<dyn JobStatusSource>, config: PollerConfig) -> Self {
        let (state_tx, _) = watch::channel(PollerState::default());
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let policy = config.policy_or(FetchErrorPolicy::Fatal);
        Self {
            inner: Arc::new(Inner {
                source,
                config,
                policy,
                session: Mutex::new(None),
                next_generation: Mutex::new(0),
                state_tx,
                events_tx,
            }),
        }
    }

    /// Begin polling `job_id`, replacing any session already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, job_id: impl Into<JobId>) -> Completion {
        let job_id = job_id.into();
        let (outcome_tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let generation = self.inner.bump_generation();
        let deadline = Instant::now() + self.inner.config.timeout;

        {
            let mut session = self.inner.lock_session();
            if let Some(previous) = session.take() {
                tracing::debug!(
                    job_id = %previous.job_id,
                    next_job_id = %job_id,
                    "Superseding running poll session"
                );
                previous.token.cancel();
            }
            *session = Some(Session {
                generation,
                job_id: job_id.clone(),
                token: token.clone(),
                outcome_tx: Some(outcome_tx),
            });
            self.inner.state_tx.send_replace(PollerState::starting());
        }

        tracing::debug!(%job_id, "Started polling job");
        tokio::spawn(poll_session(
            Arc::clone(&self.inner),
            generation,
            job_id,
            deadline,
            token,
        ));

        Completion { rx }
    }

    /// Cancel polling and the timeout. Idempotent; emits nothing.
    pub fn stop(&self) {
        let mut session = self.inner.lock_session();
        if let Some(current) = session.take() {
            current.token.cancel();
            tracing::debug!(job_id = %current.job_id, "Stopped polling job");
        }
        self.inner.state_tx.send_if_modified(|state| {
            let was_polling = state.is_polling;
            state.is_polling = false;
            was_polling
        });
    }

    /// `stop` plus forgetting everything observed so far.
    pub fn reset(&self) {
        let mut session = self.inner.lock_session();
        if let Some(current) = session.take() {
            current.token.cancel();
        }
        self.inner.state_tx.send_replace(PollerState::default());
    }

    /// Snapshot of the observable state.
    pub fn state(&self) -> PollerState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn job(&self) -> Option<JobSnapshot> {
        self.inner.state_tx.borrow().job.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.state_tx.borrow().is_polling
    }

    pub fn progress(&self) -> u8 {
        self.inner.state_tx.borrow().progress
    }

    pub fn progress_message(&self) -> String {
        self.inner.state_tx.borrow().progress_message.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state_tx.borrow().error.clone()
    }

    /// Id of the job currently being polled.
    pub fn current_job_id(&self) -> Option<JobId> {
        self.inner.lock_session().as_ref().map(|s| s.job_id.clone())
    }

    /// Receive every state change.
    pub fn watch(&self) -> watch::Receiver<PollerState> {
        self.inner.state_tx.subscribe()
    }

    /// Receive progress and terminal notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.inner.events_tx.subscribe()
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        if let Some(current) = self.inner.lock_session().take() {
            current.token.cancel();
        }
    }
}

impl Inner {
    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_generation(&self) -> u64 {
        let mut next = self
            .next_generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *next += 1;
        *next
    }

    /// Apply a fetched snapshot. Returns `false` once the session is over.
    fn on_snapshot(&self, generation: u64, snapshot: JobSnapshot) -> bool {
        let mut session = self.lock_session();
        if !is_live(&session, generation) {
            return false;
        }

        let previous = self.state_tx.borrow().job.as_ref().map(|j| j.status);
        if let Some(prev) = previous {
            if prev != snapshot.status && !prev.can_transition_to(snapshot.status) {
                tracing::warn!(
                    job_id = %snapshot.id,
                    from = %prev,
                    to = %snapshot.status,
                    "Job reported an unexpected status transition"
                );
            }
        }

        tracing::debug!(
            job_id = %snapshot.id,
            status = %snapshot.status,
            progress = snapshot.progress_pct,
            "Polled job"
        );
        self.state_tx.send_modify(|state| state.observe(&snapshot));
        let _ = self.events_tx.send(PollEvent::Progress(snapshot.clone()));

        match snapshot.status {
            JobStatus::Pending | JobStatus::InProgress => true,
            JobStatus::Completed => {
                finish_locked(self, &mut session, JobOutcome::Completed(snapshot));
                false
            }
            JobStatus::Failed | JobStatus::Cancelled => {
                let error = PollError::JobFailed(snapshot.failure_message());
                finish_locked(
                    self,
                    &mut session,
                    JobOutcome::Failed {
                        error,
                        last: Some(snapshot),
                    },
                );
                false
            }
        }
    }

    fn fail(&self, generation: u64, error: PollError) {
        let mut session = self.lock_session();
        if !is_live(&session, generation) {
            return;
        }
        let last = self.state_tx.borrow().job.clone();
        finish_locked(self, &mut session, JobOutcome::Failed { error, last });
    }
}

fn is_live(session: &Option<Session>, generation: u64) -> bool {
    matches!(session, Some(s) if s.generation == generation)
}

/// End the live session with `outcome`. Caller holds the session lock and has
/// checked the session is live, so the outcome is delivered exactly once.
fn finish_locked(inner: &Inner, session: &mut Option<Session>, outcome: JobOutcome) {
    let Some(mut current) = session.take() else {
        return;
    };
    current.token.cancel();

    let event = match &outcome {
        JobOutcome::Completed(snapshot) => {
            tracing::info!(job_id = %current.job_id, "Job completed");
            inner.state_tx.send_modify(|state| {
                state.is_polling = false;
                state.error = None;
            });
            PollEvent::Completed(snapshot.clone())
        }
        JobOutcome::Failed { error, .. } => {
            tracing::warn!(job_id = %current.job_id, error = %error, "Job tracking ended with error");
            inner.state_tx.send_modify(|state| {
                state.is_polling = false;
                state.error = Some(error.to_string());
            });
            PollEvent::Failed(error.clone())
        }
    };

    let _ = inner.events_tx.send(event);
    if let Some(tx) = current.outcome_tx.take() {
        let _ = tx.send(outcome);
    }
}

async fn poll_session(
    inner: Arc<Inner>,
    generation: u64,
    job_id: JobId,
    deadline: Instant,
    token: CancellationToken,
) {
    let deadline = tokio::time::sleep_until(deadline);
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval(inner.config.effective_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let fetched = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = &mut deadline => {
                inner.fail(generation, PollError::Timeout);
                return;
            }
            res = async {
                ticker.tick().await;
                inner.source.fetch_status(&job_id).await
            } => res,
        };

        match fetched {
            Ok(snapshot) => {
                if !inner.on_snapshot(generation, snapshot) {
                    return;
                }
            }
            Err(e) => match inner.policy {
                FetchErrorPolicy::Fatal => {
                    inner.fail(generation, PollError::Fetch(e.to_string()));
                    return;
                }
                FetchErrorPolicy::Skip => {
                    tracing::warn!(%job_id, error = %e, "Job status fetch failed, retrying next tick");
                }
            },
        }
    }
}
