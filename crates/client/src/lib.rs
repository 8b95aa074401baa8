// crates/client/src/lib.rs
//! HTTP access to the playbook job service.
//!
//! - `JobStatusSource`: the seam the pollers fetch snapshots through
//! - `HttpJobClient`: reqwest implementation against `/api/jobs/{id}`
//! - `Submission`: result of POSTing to a job-creating endpoint

pub mod config;
pub mod error;
pub mod http;
pub mod source;

pub use config::ClientConfig;
pub use error::ClientError;
pub use http::{HttpJobClient, Submission};
pub use source::JobStatusSource;
