use async_trait::async_trait;
use futures_util::StreamExt;
use log::debug;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::error::{LaunchError, PackageError, PollError};
use crate::launcher::JobRequest;
use crate::status::{normalize, ProgressSnapshot, RawStatus};

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000/api";

/// Job endpoints of the translation backend.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// `POST /jobs`, returning the task id.
    async fn submit(&self, request: &JobRequest) -> Result<String, LaunchError>;

    /// `GET /jobs/{id}/status`, already normalized.
    async fn fetch_status(&self, task_id: &str) -> Result<ProgressSnapshot, PollError>;

    /// `POST /jobs/{id}/package`, returning the server-side archive path.
    async fn package(
        &self,
        task_id: &str,
        result_path: &str,
        archive_name: Option<&str>,
    ) -> Result<String, PackageError>;

    /// URL that streams the packaged archive.
    fn download_url(&self, task_id: &str, archive_path: &str) -> Result<String, PackageError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LaunchResponse {
    #[serde(alias = "task_id")]
    task_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PackageRequest<'a> {
    result_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    archive_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageResponse {
    #[serde(alias = "zip_path", alias = "archive_path")]
    archive_path: String,
}

/// reqwest-backed implementation talking to the local backend service.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn archive_url(&self, task_id: &str, archive_path: &str) -> Result<Url, PackageError> {
        let mut url = Url::parse(&self.endpoint(&format!("/jobs/{task_id}/download")))
            .map_err(|err| PackageError::InvalidUrl(err.to_string()))?;
        url.query_pairs_mut().append_pair("archive", archive_path);
        Ok(url)
    }

    /// Stream the packaged archive into `destination`, returning bytes written.
    pub async fn download_archive(
        &self,
        task_id: &str,
        archive_path: &str,
        destination: &Path,
    ) -> Result<u64, PackageError> {
        let url = self.archive_url(task_id, archive_path)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| PackageError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = read_error_detail(response).await;
            return Err(PackageError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| PackageError::Network(err.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("archive for {} saved ({} bytes)", task_id, written);
        Ok(written)
    }
}

#[async_trait]
impl JobBackend for HttpBackend {
    async fn submit(&self, request: &JobRequest) -> Result<String, LaunchError> {
        let response = self
            .client
            .post(self.endpoint("/jobs"))
            .json(request)
            .send()
            .await
            .map_err(|err| LaunchError::Unreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = read_error_detail(response).await;
            return Err(LaunchError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response
            .json::<LaunchResponse>()
            .await
            .map_err(|err| LaunchError::MalformedResponse(err.to_string()))?;

        if body.task_id.trim().is_empty() {
            return Err(LaunchError::MalformedResponse("empty task id".into()));
        }

        Ok(body.task_id)
    }

    async fn fetch_status(&self, task_id: &str) -> Result<ProgressSnapshot, PollError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/jobs/{task_id}/status")))
            .send()
            .await
            .map_err(|err| PollError::new(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::new(format!("status endpoint returned {status}")));
        }

        let raw = response
            .json::<RawStatus>()
            .await
            .map_err(|err| PollError::new(format!("unreadable status payload: {err}")))?;

        Ok(normalize(raw))
    }

    async fn package(
        &self,
        task_id: &str,
        result_path: &str,
        archive_name: Option<&str>,
    ) -> Result<String, PackageError> {
        let response = self
            .client
            .post(self.endpoint(&format!("/jobs/{task_id}/package")))
            .json(&PackageRequest {
                result_path,
                archive_name,
            })
            .send()
            .await
            .map_err(|err| PackageError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = read_error_detail(response).await;
            return Err(PackageError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response
            .json::<PackageResponse>()
            .await
            .map_err(|err| PackageError::MalformedResponse(err.to_string()))?;

        Ok(body.archive_path)
    }

    fn download_url(&self, task_id: &str, archive_path: &str) -> Result<String, PackageError> {
        Ok(self.archive_url(task_id, archive_path)?.into())
    }
}

/// Pull a human readable reason out of an error response. The backend sends
/// `{"detail": "..."}`; anything else falls back to the raw body or status.
pub(crate) async fn read_error_detail(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error_detail(status, &body)
}

pub(crate) fn error_detail(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        match value.get("detail") {
            Some(serde_json::Value::String(detail)) => return detail.clone(),
            Some(other) if !other.is_null() => return other.to_string(),
            _ => {}
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        trimmed.to_string()
    }
}
