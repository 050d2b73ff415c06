use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::backend::read_error_detail;
use crate::error::SyncError;

const PROJECT_PAGE_SIZE: u32 = 800;
const MAX_PROJECT_PAGES: u32 = 50;

/// A collaborative translation project on the sync platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProject {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "public", alias = "is_public")]
    pub is_public: bool,
}

/// Form data for creating a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProject {
    pub name: String,
    pub source_lang: String,
    pub target_lang: String,
    pub description: String,
}

impl NewProject {
    pub fn new(
        name: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            description: "Created by mod-sync".to_string(),
        }
    }
}

/// Reference to local translated content for an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSource {
    /// Original mod, whose source-language files are pushed.
    pub mod_path: String,
    /// Generated translation mod, whose files are imported as translations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedItem {
    pub file: String,
    #[serde(default)]
    pub remote_path: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    pub file: String,
    pub error: String,
}

/// Outcome of an upload. Some items may have failed while others went through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub uploaded_count: usize,
    pub uploaded: Vec<UploadedItem>,
    pub errors: Vec<UploadFailure>,
}

impl UploadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadReport {
    pub files_synced: u64,
}

#[derive(Debug, Default, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    uploaded: Vec<UploadedItem>,
    #[serde(default)]
    errors: Vec<UploadFailure>,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    #[serde(default)]
    files_synced: u64,
}

#[derive(Debug, Serialize)]
struct DownloadRequest<'a> {
    target_mod_path: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProjectListing {
    Paged {
        results: Vec<SyncProject>,
        #[serde(rename = "pageCount", default)]
        page_count: Option<u32>,
    },
    Plain(Vec<SyncProject>),
}

/// Talks to the backend's `/sync` endpoints on behalf of the operator.
#[derive(Debug, Clone)]
pub struct SyncClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl SyncClient {
    pub fn new(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        let token = token
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.token.is_some()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/sync{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, SyncError> {
        let token = self.token.as_deref().ok_or(SyncError::Auth)?;
        Ok(builder.header(reqwest::header::AUTHORIZATION, token))
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        project_id: Option<u64>,
    ) -> Result<Response, SyncError> {
        let response = self
            .authorized(builder)?
            .send()
            .await
            .map_err(|err| SyncError::Network(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match (status, project_id) {
            (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => Err(SyncError::Auth),
            (StatusCode::NOT_FOUND, Some(id)) => Err(SyncError::NotFound(id)),
            _ => {
                let detail = read_error_detail(response).await;
                Err(SyncError::Remote {
                    status: status.as_u16(),
                    detail,
                })
            }
        }
    }

    /// Every project visible to the token, following pagination.
    pub async fn list_projects(&self) -> Result<Vec<SyncProject>, SyncError> {
        let mut projects = Vec::new();
        let mut page = 1u32;

        loop {
            let request = self.client.get(self.endpoint("/projects")).query(&[
                ("page", page.to_string()),
                ("pageSize", PROJECT_PAGE_SIZE.to_string()),
            ]);
            let listing = self
                .send(request, None)
                .await?
                .json::<ProjectListing>()
                .await
                .map_err(|err| SyncError::Network(format!("unreadable project list: {err}")))?;

            let (results, more) = match listing {
                ProjectListing::Paged {
                    results,
                    page_count,
                } => {
                    let more = page < page_count.unwrap_or(1);
                    (results, more)
                }
                ProjectListing::Plain(results) => {
                    let more = results.len() >= PROJECT_PAGE_SIZE as usize;
                    (results, more)
                }
            };

            projects.extend(results);
            if !more || page >= MAX_PROJECT_PAGES {
                break;
            }
            page += 1;
        }

        debug!("fetched {} sync projects", projects.len());
        Ok(projects)
    }

    pub async fn create_project(&self, project: &NewProject) -> Result<SyncProject, SyncError> {
        if project.name.trim().is_empty() {
            return Err(SyncError::InvalidRequest("project name is required".into()));
        }

        let request = self.client.post(self.endpoint("/projects")).json(project);
        let created = self
            .send(request, None)
            .await?
            .json::<SyncProject>()
            .await
            .map_err(|err| SyncError::Network(format!("unreadable project: {err}")))?;

        if created.id == 0 {
            return Err(SyncError::InvalidProjectId("0".into()));
        }

        info!("created sync project {} ({})", created.id, created.name);
        Ok(created)
    }

    /// Push local content. Per-file rejections are reported, not raised.
    pub async fn upload(
        &self,
        project_id: Option<u64>,
        source: &UploadSource,
    ) -> Result<UploadReport, SyncError> {
        let project_id = require_project_id(project_id)?;
        let request = self
            .client
            .post(self.endpoint(&format!("/projects/{project_id}/upload")))
            .json(source);

        let body = self
            .send(request, Some(project_id))
            .await?
            .json::<UploadResponse>()
            .await
            .map_err(|err| SyncError::Network(format!("unreadable upload result: {err}")))?;

        let report = UploadReport {
            uploaded_count: body.uploaded.len(),
            uploaded: body.uploaded,
            errors: body.errors,
        };

        if report.is_clean() {
            info!(
                "uploaded {} files to project {}",
                report.uploaded_count, project_id
            );
        } else {
            warn!(
                "uploaded {} files to project {}; {} rejected",
                report.uploaded_count,
                project_id,
                report.errors.len()
            );
        }
        Ok(report)
    }

    /// Pull the project's translations into `destination`.
    pub async fn download(
        &self,
        project_id: Option<u64>,
        destination: &str,
    ) -> Result<DownloadReport, SyncError> {
        let project_id = require_project_id(project_id)?;
        if destination.trim().is_empty() {
            return Err(SyncError::InvalidRequest(
                "a destination path is required".into(),
            ));
        }

        let request = self
            .client
            .post(self.endpoint(&format!("/projects/{project_id}/download")))
            .json(&DownloadRequest {
                target_mod_path: destination,
            });

        let body = self
            .send(request, Some(project_id))
            .await?
            .json::<DownloadResponse>()
            .await
            .map_err(|err| SyncError::Network(format!("unreadable download result: {err}")))?;

        info!(
            "synced {} files from project {} into {}",
            body.files_synced, project_id, destination
        );
        Ok(DownloadReport {
            files_synced: body.files_synced,
        })
    }
}

fn require_project_id(project_id: Option<u64>) -> Result<u64, SyncError> {
    match project_id {
        Some(0) => Err(SyncError::InvalidProjectId("0".into())),
        Some(id) => Ok(id),
        None => Err(SyncError::MissingProjectId),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_accepts_platform_field_names() {
        let project: SyncProject =
            serde_json::from_str(r#"{"id":7,"name":"Kaiserreich KO","public":true}"#).unwrap();
        assert_eq!(project.id, 7);
        assert!(project.is_public);
    }

    #[test]
    fn listing_accepts_both_shapes() {
        let paged: ProjectListing =
            serde_json::from_str(r#"{"results":[{"id":1,"name":"a"}],"pageCount":3}"#).unwrap();
        assert!(matches!(paged, ProjectListing::Paged { page_count: Some(3), .. }));

        let plain: ProjectListing = serde_json::from_str(r#"[{"id":2,"name":"b"}]"#).unwrap();
        assert!(matches!(plain, ProjectListing::Plain(ref list) if list.len() == 1));
    }

    #[test]
    fn missing_project_id_is_descriptive() {
        assert!(matches!(
            require_project_id(None),
            Err(SyncError::MissingProjectId)
        ));
        assert!(matches!(
            require_project_id(Some(0)),
            Err(SyncError::InvalidProjectId(_))
        ));
        assert_eq!(require_project_id(Some(42)).unwrap(), 42);
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let client = SyncClient::new(Client::new(), "http://localhost", Some("  ".into()));
        assert!(!client.has_credentials());
    }
}
