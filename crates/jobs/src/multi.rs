// crates/jobs/src/multi.rs
//! Multi-job poller: one shared polling loop over a changing set of jobs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use playbook_client::{ClientError, JobStatusSource};
use playbook_types::{JobId, JobSnapshot, JobStatus};
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::state::MultiPollerState;
use crate::types::{FetchErrorPolicy, MultiPollEvent, PollError, PollEvent, PollerConfig};

/// A job still waiting for a terminal status.
struct ActiveJob {
    generation: u64,
    /// Cancels the job's timeout task and any fetch in flight for it.
    token: CancellationToken,
    /// A fetch for this job has been issued and not yet answered.
    fetching: bool,
}

#[derive(Default)]
struct Tracked {
    snapshots: HashMap<JobId, JobSnapshot>,
    active: HashMap<JobId, ActiveJob>,
    poll_loop: Option<(u64, CancellationToken)>,
    next_generation: u64,
}

impl Tracked {
    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn is_active(&self, id: &JobId, generation: u64) -> bool {
        self.active.get(id).is_some_and(|a| a.generation == generation)
    }

    fn retire(&mut self, id: &JobId) {
        if let Some(job) = self.active.remove(id) {
            job.token.cancel();
        }
    }
}

struct Inner {
    source: Arc<dyn JobStatusSource>,
    config: PollerConfig,
    policy: FetchErrorPolicy,
    tracked: Mutex<Tracked>,
    state_tx: watch::Sender<MultiPollerState>,
    events_tx: broadcast::Sender<MultiPollEvent>,
}

/// Tracks any number of jobs with a single polling loop.
///
/// The loop starts on the first `add_job`, fetches every active job once per
/// tick (skipping jobs whose last fetch is still outstanding), and ends itself
/// when no active job remains. Each job has its own
/// timeout armed when it is added. Fetch failures are skipped by default.
pub struct MultiJobPoller {
    inner: Arc<Inner>,
}

impl MultiJobPoller {
    pub fn new(source: Arc<dyn JobStatusSource>, config: PollerConfig) -> Self {
        let (state_tx, _) = watch::channel(MultiPollerState::default());
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let policy = config.policy_or(FetchErrorPolicy::Skip);
        Self {
            inner: Arc::new(Inner {
                source,
                config,
                policy,
                tracked: Mutex::new(Tracked::default()),
                state_tx,
                events_tx,
            }),
        }
    }

    /// Start tracking `job_id`. Returns `false` if it is already tracked.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_job(&self, job_id: impl Into<JobId>) -> bool {
        let job_id = job_id.into();
        let mut tracked = self.inner.lock();
        if tracked.active.contains_key(&job_id) {
            return false;
        }

        let generation = tracked.bump();
        let token = CancellationToken::new();
        tracked.snapshots.remove(&job_id);
        tracked.active.insert(
            job_id.clone(),
            ActiveJob {
                generation,
                token: token.clone(),
                fetching: false,
            },
        );
        tokio::spawn(job_timeout(
            Arc::clone(&self.inner),
            job_id.clone(),
            generation,
            Instant::now() + self.inner.config.timeout,
            token,
        ));

        if tracked.poll_loop.is_none() {
            let loop_generation = tracked.bump();
            let loop_token = CancellationToken::new();
            tracked.poll_loop = Some((loop_generation, loop_token.clone()));
            tokio::spawn(poll_loop(Arc::clone(&self.inner), loop_generation, loop_token));
            tracing::debug!("Started shared job polling loop");
        }

        tracing::debug!(%job_id, active = tracked.active.len(), "Tracking job");
        self.inner.publish(&tracked);
        true
    }

    /// Stop tracking `job_id` without waiting for a terminal status.
    /// Nothing is cancelled server-side.
    pub fn remove_job(&self, job_id: &JobId) {
        let mut tracked = self.inner.lock();
        tracked.retire(job_id);
        tracked.snapshots.remove(job_id);
        self.inner.publish(&tracked);
    }

    /// Last known snapshot of `job_id`.
    pub fn get_job(&self, job_id: &JobId) -> Option<JobSnapshot> {
        self.inner.lock().snapshots.get(job_id).cloned()
    }

    /// Stop the loop, disarm every timeout, forget every job.
    pub fn reset_all(&self) {
        let mut tracked = self.inner.lock();
        shutdown(&mut tracked);
        tracked.snapshots.clear();
        self.inner.publish(&tracked);
    }

    pub fn state(&self) -> MultiPollerState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn jobs(&self) -> HashMap<JobId, JobSnapshot> {
        self.inner.lock().snapshots.clone()
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().active.len()
    }

    pub fn overall_progress(&self) -> f64 {
        self.inner.state_tx.borrow().overall_progress
    }

    /// Whether the shared polling loop is currently running.
    pub fn is_polling(&self) -> bool {
        self.inner.lock().poll_loop.is_some()
    }

    pub fn watch(&self) -> watch::Receiver<MultiPollerState> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MultiPollEvent> {
        self.inner.events_tx.subscribe()
    }
}

impl Drop for MultiJobPoller {
    fn drop(&mut self) {
        shutdown(&mut self.inner.lock());
    }
}

fn shutdown(tracked: &mut Tracked) {
    if let Some((_, token)) = tracked.poll_loop.take() {
        token.cancel();
    }
    for (_, job) in tracked.active.drain() {
        job.token.cancel();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, tracked: &Tracked) {
        self.state_tx.send_replace(MultiPollerState::new(
            tracked.snapshots.clone(),
            tracked.active.len(),
        ));
    }

    fn emit(&self, job_id: &JobId, event: PollEvent) {
        let _ = self.events_tx.send(MultiPollEvent {
            job_id: job_id.clone(),
            event,
        });
    }

    fn on_fetch(&self, job_id: JobId, generation: u64, result: Result<JobSnapshot, ClientError>) {
        let mut tracked = self.lock();
        if !tracked.is_active(&job_id, generation) {
            return;
        }
        if let Some(job) = tracked.active.get_mut(&job_id) {
            job.fetching = false;
        }

        match result {
            Ok(snapshot) => {
                tracing::debug!(
                    %job_id,
                    status = %snapshot.status,
                    progress = snapshot.progress_pct,
                    "Polled job"
                );
                tracked.snapshots.insert(job_id.clone(), snapshot.clone());
                self.emit(&job_id, PollEvent::Progress(snapshot.clone()));

                match snapshot.status {
                    JobStatus::Pending | JobStatus::InProgress => {}
                    JobStatus::Completed => {
                        tracked.retire(&job_id);
                        tracing::info!(%job_id, "Job completed");
                        self.emit(&job_id, PollEvent::Completed(snapshot));
                    }
                    JobStatus::Failed | JobStatus::Cancelled => {
                        tracked.retire(&job_id);
                        let error = PollError::JobFailed(snapshot.failure_message());
                        tracing::warn!(%job_id, error = %error, "Job failed");
                        self.emit(&job_id, PollEvent::Failed(error));
                    }
                }
            }
            Err(e) => match self.policy {
                FetchErrorPolicy::Skip => {
                    tracing::warn!(%job_id, error = %e, "Job status fetch failed, retrying next tick");
                    return;
                }
                FetchErrorPolicy::Fatal => {
                    tracked.retire(&job_id);
                    let error = PollError::Fetch(e.to_string());
                    tracing::warn!(%job_id, error = %error, "Job tracking ended with error");
                    self.emit(&job_id, PollEvent::Failed(error));
                }
            },
        }

        self.publish(&tracked);
    }

    fn on_timeout(&self, job_id: &JobId, generation: u64) {
        let mut tracked = self.lock();
        if !tracked.is_active(job_id, generation) {
            return;
        }
        tracked.retire(job_id);
        tracked.snapshots.remove(job_id);
        tracing::warn!(%job_id, "Job timed out");
        self.emit(job_id, PollEvent::Failed(PollError::Timeout));
        self.publish(&tracked);
    }

    /// Jobs to fetch this tick, or `None` if the loop should end. Jobs whose
    /// previous fetch is still outstanding sit this tick out.
    fn batch(&self, loop_generation: u64) -> Option<Vec<(JobId, u64, CancellationToken)>> {
        let mut tracked = self.lock();
        match &tracked.poll_loop {
            Some((generation, _)) if *generation == loop_generation => {}
            _ => return None,
        }

        if tracked.active.is_empty() {
            tracked.poll_loop = None;
            tracing::debug!("No active jobs left, stopping shared polling loop");
            return None;
        }

        Some(
            tracked
                .active
                .iter_mut()
                .filter(|(_, job)| !job.fetching)
                .map(|(id, job)| {
                    job.fetching = true;
                    (id.clone(), job.generation, job.token.clone())
                })
                .collect(),
        )
    }
}

async fn job_timeout(
    inner: Arc<Inner>,
    job_id: JobId,
    generation: u64,
    deadline: Instant,
    token: CancellationToken,
) {
    tokio::select! {
        _ = token.cancelled() => {}
        _ = tokio::time::sleep_until(deadline) => inner.on_timeout(&job_id, generation),
    }
}

type Fetched = (JobId, u64, Option<Result<JobSnapshot, ClientError>>);

/// Fetch one job unless its token is cancelled first.
async fn fetch_one(
    source: Arc<dyn JobStatusSource>,
    job_id: JobId,
    generation: u64,
    job_token: CancellationToken,
) -> Fetched {
    let result = tokio::select! {
        _ = job_token.cancelled() => None,
        res = source.fetch_status(&job_id) => Some(res),
    };
    (job_id, generation, result)
}

/// Ticks on the interval regardless of fetches still in flight, so a slow
/// job never holds back the others.
async fn poll_loop(inner: Arc<Inner>, loop_generation: u64, token: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.config.effective_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut fetches: FuturesUnordered<BoxFuture<'static, Fetched>> = FuturesUnordered::new();

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            Some((job_id, generation, result)) = fetches.next(), if !fetches.is_empty() => {
                if let Some(result) = result {
                    inner.on_fetch(job_id, generation, result);
                }
            }
            _ = ticker.tick() => {
                let Some(batch) = inner.batch(loop_generation) else {
                    return;
                };
                for (job_id, generation, job_token) in batch {
                    fetches.push(
                        fetch_one(Arc::clone(&inner.source), job_id, generation, job_token).boxed(),
                    );
                }
            }
        }
    }
}
