// crates/client/src/http.rs
//! reqwest-backed client for the job service REST API.

use async_trait::async_trait;
use playbook_types::{JobId, JobSnapshot};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::source::JobStatusSource;

/// Outcome of POSTing to a job-creating endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The service accepted the work and will process it in the background.
    Queued(JobId),
    /// Legacy endpoints answer synchronously with the finished result.
    Immediate(serde_json::Value),
}

#[derive(Deserialize)]
struct QueuedResponse {
    job_id: JobId,
}

/// HTTP client for `/api/jobs/{id}` and the submission endpoints.
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpJobClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = config.api_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: config.api_url.clone(),
            message: e.to_string(),
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET /api/jobs/{id}: current snapshot of one job.
    pub async fn get_job(&self, id: &JobId) -> Result<JobSnapshot, ClientError> {
        let url = self.url(&format!("api/jobs/{}", urlencoding::encode(id.as_str())));
        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;
        decode(resp).await
    }

    /// POST a JSON body to a job-creating endpoint such as
    /// `/api/strategy-report/generate`.
    ///
    /// A `{"job_id": ...}` body means the work was queued; any other
    /// successful body is treated as a synchronous result.
    pub async fn submit(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Submission, ClientError> {
        let url = self.url(path);
        tracing::debug!(%url, "Submitting job request");

        let resp = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;
        let value: serde_json::Value = decode(resp).await?;

        match value.get("job_id") {
            Some(id) if !id.is_null() => {
                let queued: QueuedResponse = serde_json::from_value(value)
                    .map_err(|e| ClientError::Decode(e.to_string()))?;
                tracing::info!(job_id = %queued.job_id, %url, "Job queued");
                Ok(Submission::Queued(queued.job_id))
            }
            _ => Ok(Submission::Immediate(value)),
        }
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

#[async_trait]
impl JobStatusSource for HttpJobClient {
    async fn fetch_status(&self, id: &JobId) -> Result<JobSnapshot, ClientError> {
        self.get_job(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playbook_types::JobStatus;
    use pretty_assertions::assert_eq;

    fn client_for(server: &mockito::ServerGuard) -> HttpJobClient {
        HttpJobClient::new(&ClientConfig {
            api_url: format!("{}/", server.url()),
            ..ClientConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_base_url() {
        let err = HttpJobClient::new(&ClientConfig {
            api_url: "not a url".into(),
            ..ClientConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, ClientError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = HttpJobClient::new(&ClientConfig {
            api_url: "http://localhost:8000///".into(),
            ..ClientConfig::default()
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/api/jobs/1"), "http://localhost:8000/api/jobs/1");
    }

    #[tokio::test]
    async fn test_get_job_decodes_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/jobs/job-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"job-1","job_type":"report","status":"in_progress","progress_pct":40}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let snap = client.fetch_status(&JobId::new("job-1")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(snap.status, JobStatus::InProgress);
        assert_eq!(snap.progress_pct, 40);
    }

    #[tokio::test]
    async fn test_get_job_encodes_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/jobs/a%2Fb")
            .with_status(200)
            .with_body(r#"{"id":"a/b","status":"pending"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let snap = client.get_job(&JobId::new("a/b")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(snap.id.as_str(), "a/b");
    }

    #[tokio::test]
    async fn test_get_job_non_success_is_status_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/jobs/job-1")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get_job(&JobId::new("job-1")).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(err.to_string(), "API error 500: internal error");
    }

    #[tokio::test]
    async fn test_get_job_bad_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/jobs/job-1")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get_job(&JobId::new("job-1")).await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn test_submit_queued() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/strategy-report/generate")
            .match_body(mockito::Matcher::Json(serde_json::json!({"account_id": 42})))
            .with_status(202)
            .with_body(r#"{"job_id":"rep-7"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let sub = client
            .submit(
                "/api/strategy-report/generate",
                &serde_json::json!({"account_id": 42}),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(sub, Submission::Queued(JobId::new("rep-7")));
    }

    #[tokio::test]
    async fn test_submit_legacy_synchronous_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/insights")
            .with_status(200)
            .with_body(r#"{"answer":"Expand into EMEA","job_id":null}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let sub = client
            .submit("api/insights", &serde_json::json!({"question": "where next?"}))
            .await
            .unwrap();

        match sub {
            Submission::Immediate(value) => assert_eq!(value["answer"], "Expand into EMEA"),
            other => panic!("expected immediate result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_numeric_job_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/competitive/compare")
            .with_status(200)
            .with_body(r#"{"job_id":314}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let sub = client
            .submit("/api/competitive/compare", &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(sub, Submission::Queued(JobId::new("314")));
    }
}
