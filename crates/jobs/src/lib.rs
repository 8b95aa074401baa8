// crates/jobs/src/lib.rs
//! Client-side tracking of asynchronous playbook jobs.
//!
//! Provides:
//! - `JobPoller`: polls one job until it completes, fails or times out
//! - `MultiJobPoller`: one shared polling loop for a changing set of jobs
//! - `PollerState` / `MultiPollerState`: observable state for the UI
//! - `PollEvent`: progress and terminal notifications

pub mod multi;
pub mod poller;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use multi::MultiJobPoller;
pub use poller::{Completion, JobPoller};
pub use state::{MultiPollerState, PollerState};
pub use types::{
    FetchErrorPolicy, JobOutcome, MultiPollEvent, PollError, PollEvent, PollerConfig,
    DEFAULT_INTERVAL, DEFAULT_TIMEOUT,
};
