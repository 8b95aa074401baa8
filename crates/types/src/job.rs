// crates/types/src/job.rs
//! Job status model shared by the HTTP client, the pollers and the progress panel.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

/// Message reported for a failed or cancelled job that carries no `error_message`.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Job failed";

/// Opaque job identifier assigned by the job service.
///
/// The service hands out string ids, but some legacy endpoints return
/// numeric ones; both decode into the same string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct JobIdVisitor;

        impl Visitor<'_> for JobIdVisitor {
            type Value = JobId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a job id string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<JobId, E> {
                if v.is_empty() {
                    return Err(E::custom("job id must not be empty"));
                }
                Ok(JobId(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<JobId, E> {
                Ok(JobId(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<JobId, E> {
                Ok(JobId(v.to_string()))
            }
        }

        deserializer.deserialize_any(JobIdVisitor)
    }
}

/// Category of work behind a job. Informational only; unknown kinds are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobKind {
    Report,
    Analysis,
    Insight,
    #[default]
    Unknown,
    Other(String),
}

impl JobKind {
    pub fn as_str(&self) -> &str {
        match self {
            JobKind::Report => "report",
            JobKind::Analysis => "analysis",
            JobKind::Insight => "insight",
            JobKind::Unknown => "unknown",
            JobKind::Other(s) => s,
        }
    }
}

impl From<String> for JobKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "report" => JobKind::Report,
            "analysis" => JobKind::Analysis,
            "insight" => JobKind::Insight,
            "" | "unknown" => JobKind::Unknown,
            _ => JobKind::Other(value),
        }
    }
}

impl From<JobKind> for String {
    fn from(value: JobKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
///
/// `Completed`, `Failed` and `Cancelled` are terminal: once observed, a job
/// never leaves them and pollers stop fetching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    #[serde(alias = "running")]
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a job observed in `self` may legitimately be observed in `next` afterwards.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (Self::Pending, _) => true,
            (Self::InProgress, Self::Pending) => false,
            (Self::InProgress, _) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" | "running" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Latest known state of one job, as returned by `GET /api/jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
pub struct JobSnapshot {
    #[serde(alias = "job_id")]
    #[ts(type = "string")]
    pub id: JobId,

    #[serde(default, rename = "job_type", alias = "kind")]
    #[ts(type = "string")]
    pub kind: JobKind,

    pub status: JobStatus,

    /// 0–100. Values outside the range are clamped on decode.
    #[serde(
        default,
        alias = "progressPercent",
        deserialize_with = "deserialize_percent"
    )]
    pub progress_pct: u8,

    #[serde(default, alias = "progressMessage", skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,

    /// Only meaningful for `failed` and `cancelled` jobs.
    #[serde(default, alias = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Operation-owned payload, present once the job has completed.
    #[serde(default, alias = "resultSummary", skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown")]
    pub result_summary: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    /// A fresh `pending` snapshot with no progress.
    pub fn pending(id: impl Into<JobId>, kind: JobKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: JobStatus::Pending,
            progress_pct: 0,
            progress_message: None,
            error_message: None,
            result_summary: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The job's own error message, or [`DEFAULT_FAILURE_MESSAGE`] when it gave none.
    pub fn failure_message(&self) -> String {
        self.error_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_FAILURE_MESSAGE)
            .to_string()
    }
}

fn deserialize_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(match raw {
        Some(v) if v.is_finite() => v.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    })
}
