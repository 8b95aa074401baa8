// crates/client/src/source.rs
//! `JobStatusSource` trait defining how pollers read job state.

use async_trait::async_trait;
use playbook_types::{JobId, JobSnapshot};

use crate::error::ClientError;

/// Anything that can report the current snapshot of a job by id.
///
/// Implementations include:
/// - `HttpJobClient`: `GET /api/jobs/{id}` against the job service
/// - scripted in-memory sources in tests
#[async_trait]
pub trait JobStatusSource: Send + Sync + 'static {
    async fn fetch_status(&self, id: &JobId) -> Result<JobSnapshot, ClientError>;
}

#[async_trait]
impl<T: JobStatusSource + ?Sized> JobStatusSource for std::sync::Arc<T> {
    async fn fetch_status(&self, id: &JobId) -> Result<JobSnapshot, ClientError> {
        (**self).fetch_status(id).await
    }
}
