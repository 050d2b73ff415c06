use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::backend::JobBackend;
use crate::error::{PackageError, SyncError};
use crate::launcher::JobRequest;
use crate::settings::LocalSettings;
use crate::status::ProgressSnapshot;
use crate::sync::{SyncClient, UploadReport, UploadSource};

/// Whether a completion may run more than one post-job branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingPolicy {
    /// Also package the result after an auto-sync upload.
    #[serde(default)]
    pub package_after_sync: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    AutoSync { project_id: Option<u64> },
    Package {
        result_path: String,
        archive_name: Option<String>,
    },
    NoArtifact,
}

/// Decision table for a confirmed completion.
pub fn decide(settings: &LocalSettings, snapshot: &ProgressSnapshot) -> RouteDecision {
    if settings.enable_sync && settings.has_sync_credentials() && settings.auto_upload_sync {
        return RouteDecision::AutoSync {
            project_id: settings.sync_project().ok().flatten(),
        };
    }

    match &snapshot.result_path {
        Some(path) => RouteDecision::Package {
            result_path: path.clone(),
            archive_name: snapshot.result_archive_name.clone(),
        },
        None => RouteDecision::NoArtifact,
    }
}

/// Where the packaged archive can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadReference {
    pub task_id: String,
    pub archive_path: String,
    pub url: String,
}

#[derive(Debug)]
pub struct RouteOutcome {
    pub job_id: String,
    pub decision: RouteDecision,
    pub upload: Option<Result<UploadReport, SyncError>>,
    pub package: Option<Result<DownloadReference, PackageError>>,
    pub shutdown_requested: bool,
}

impl RouteOutcome {
    pub fn download(&self) -> Option<&DownloadReference> {
        self.package.as_ref().and_then(|result| result.as_ref().ok())
    }
}

/// Runs the post-completion branch for a job.
pub struct PostJobRouter {
    backend: Arc<dyn JobBackend>,
    http: Client,
    base_url: String,
    policy: RoutingPolicy,
}

impl PostJobRouter {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        http: Client,
        base_url: impl Into<String>,
        policy: RoutingPolicy,
    ) -> Self {
        Self {
            backend,
            http,
            base_url: base_url.into(),
            policy,
        }
    }

    /// Call once per `Completed` event.
    pub async fn route(
        &self,
        job_id: &str,
        snapshot: &ProgressSnapshot,
        settings: &LocalSettings,
        request: &JobRequest,
    ) -> RouteOutcome {
        let decision = decide(settings, snapshot);
        let mut outcome = RouteOutcome {
            job_id: job_id.to_string(),
            decision: decision.clone(),
            upload: None,
            package: None,
            shutdown_requested: request.auto_shutdown,
        };

        match decision {
            RouteDecision::AutoSync { project_id } => {
                // Text that does not parse gets reported as typed, not as missing.
                let project_id = settings.sync_project().map(|_| project_id);
                let sync = SyncClient::new(
                    self.http.clone(),
                    self.base_url.clone(),
                    Some(settings.sync_token.clone()),
                );
                let source = UploadSource {
                    mod_path: request.mod_path.clone(),
                    translation_path: snapshot.result_path.clone(),
                };
                outcome.upload = Some(match project_id {
                    Ok(project_id) => {
                        info!("auto-uploading job {} to sync project {:?}", job_id, project_id);
                        sync.upload(project_id, &source).await
                    }
                    Err(error) => {
                        warn!("auto-upload for job {} skipped: {}", job_id, error);
                        Err(error)
                    }
                });

                if self.policy.package_after_sync {
                    if let Some(path) = &snapshot.result_path {
                        outcome.package = Some(
                            self.package(job_id, path, snapshot.result_archive_name.as_deref())
                                .await,
                        );
                    }
                }
            }
            RouteDecision::Package {
                result_path,
                archive_name,
            } => {
                outcome.package = Some(
                    self.package(job_id, &result_path, archive_name.as_deref())
                        .await,
                );
            }
            RouteDecision::NoArtifact => {
                info!("job {} completed without an artifact", job_id);
            }
        }

        if outcome.shutdown_requested {
            warn!("job {} asked for shutdown on completion; leaving it to the host", job_id);
        }
        outcome
    }

    async fn package(
        &self,
        job_id: &str,
        result_path: &str,
        archive_name: Option<&str>,
    ) -> Result<DownloadReference, PackageError> {
        let archive_path = self.backend.package(job_id, result_path, archive_name).await?;
        let url = self.backend.download_url(job_id, &archive_path)?;
        info!("job {} packaged at {}", job_id, archive_path);
        Ok(DownloadReference {
            task_id: job_id.to_string(),
            archive_path,
            url,
        })
    }
}
