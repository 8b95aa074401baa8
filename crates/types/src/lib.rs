// crates/types/src/lib.rs
//! Wire types for the strategy playbook job service.
//!
//! Everything here is plain data: the job identifier, its kind and status,
//! and the snapshot the job service returns for a status query.

pub mod job;

pub use job::{JobId, JobKind, JobSnapshot, JobStatus, UnknownStatus, DEFAULT_FAILURE_MESSAGE};
