use log::{debug, info};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::backend::{HttpBackend, JobBackend};
use crate::config::ClientConfig;
use crate::error::{JobError, LaunchError};
use crate::launcher::{JobLauncher, JobRequest};
use crate::poller::{ChannelSink, JobEvent};
use crate::router::{PostJobRouter, RouteOutcome};
use crate::settings::LocalSettings;
use crate::status::ProgressSnapshot;
use crate::wake_lock::ResourceLockManager;

#[derive(Debug, Clone, PartialEq)]
pub enum JobPhase {
    Idle,
    Running {
        job_id: String,
        snapshot: Option<ProgressSnapshot>,
    },
    Completed {
        job_id: String,
        snapshot: ProgressSnapshot,
    },
    Failed(JobError),
}

/// Summary of the most recent routed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastResult {
    pub job_id: String,
    pub result_path: Option<String>,
    pub download_url: Option<String>,
    pub uploaded_count: Option<usize>,
}

/// Everything the front end displays, in one place.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub job: JobPhase,
    pub settings: LocalSettings,
    pub last_result: Option<LastResult>,
}

impl AppState {
    pub fn new(settings: LocalSettings) -> Self {
        Self {
            job: JobPhase::Idle,
            settings,
            last_result: None,
        }
    }

    pub fn job_started(&mut self, job_id: &str) {
        self.job = JobPhase::Running {
            job_id: job_id.to_string(),
            snapshot: None,
        };
        self.last_result = None;
    }

    /// Fold one poller event into the state. Returns `true` exactly once per
    /// job: on the transition into `Completed`.
    pub fn apply(&mut self, event: &JobEvent) -> bool {
        let current = match &self.job {
            JobPhase::Running { job_id, .. } => job_id.clone(),
            _ => {
                debug!("ignoring {} event outside a running job", event.job_id());
                return false;
            }
        };
        if event.job_id() != current {
            debug!("ignoring event for stale job {}", event.job_id());
            return false;
        }

        match event {
            JobEvent::Progress { job_id, snapshot } => {
                self.job = JobPhase::Running {
                    job_id: job_id.clone(),
                    snapshot: Some(snapshot.clone()),
                };
                false
            }
            JobEvent::Completed { job_id, snapshot } => {
                self.job = JobPhase::Completed {
                    job_id: job_id.clone(),
                    snapshot: snapshot.clone(),
                };
                true
            }
            JobEvent::Failed(error) => {
                self.job = JobPhase::Failed(error.clone());
                false
            }
        }
    }

    pub fn job_cancelled(&mut self) {
        self.job = JobPhase::Idle;
    }

    pub fn record_route(&mut self, outcome: &RouteOutcome, snapshot: &ProgressSnapshot) {
        self.last_result = Some(LastResult {
            job_id: outcome.job_id.clone(),
            result_path: snapshot.result_path.clone(),
            download_url: outcome.download().map(|reference| reference.url.clone()),
            uploaded_count: outcome
                .upload
                .as_ref()
                .and_then(|result| result.as_ref().ok())
                .map(|report| report.uploaded_count),
        });
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error("job {0} was cancelled")]
    Cancelled(String),
    #[error("job {0} stopped reporting events")]
    Disconnected(String),
}

/// Single owner of application state; drives launch → poll → route.
pub struct Session {
    state: AppState,
    launcher: JobLauncher,
    router: PostJobRouter,
    events: mpsc::UnboundedReceiver<JobEvent>,
}

impl Session {
    pub fn new(
        settings: LocalSettings,
        launcher: JobLauncher,
        router: PostJobRouter,
        events: mpsc::UnboundedReceiver<JobEvent>,
    ) -> Self {
        Self {
            state: AppState::new(settings),
            launcher,
            router,
            events,
        }
    }

    /// Wire the HTTP backend, channel sink and lock manager from config.
    pub fn from_config(
        config: &ClientConfig,
        settings: LocalSettings,
    ) -> Result<Self, reqwest::Error> {
        let backend = HttpBackend::new(config.backend_url.clone(), config.request_timeout())?;
        let http = backend.client().clone();
        let base_url = backend.base_url().to_string();
        let backend: Arc<dyn JobBackend> = Arc::new(backend);

        let locks = if config.keep_awake {
            ResourceLockManager::system()
        } else {
            ResourceLockManager::disabled()
        };
        let (sink, events) = ChannelSink::channel();

        let launcher = JobLauncher::new(
            Arc::clone(&backend),
            locks,
            Arc::new(sink),
            config.poller_options(),
        );
        let router = PostJobRouter::new(backend, http, base_url, config.routing);

        Ok(Self::new(settings, launcher, router, events))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn update_settings(&mut self, settings: LocalSettings) {
        self.state.settings = settings;
    }

    /// Launch `request` and follow it to the end. `on_progress` sees every
    /// snapshot; resolving `cancel` stops polling without a terminal event.
    pub async fn run_job<F, C>(
        &mut self,
        request: &JobRequest,
        mut on_progress: F,
        cancel: C,
    ) -> Result<RouteOutcome, RunError>
    where
        F: FnMut(&ProgressSnapshot),
        C: Future<Output = ()>,
    {
        let poller = self.launcher.launch(request).await?;
        let job_id = poller.job().id.clone();
        self.state.job_started(&job_id);
        tokio::pin!(cancel);

        loop {
            let event = tokio::select! {
                event = self.events.recv() => event,
                _ = &mut cancel => {
                    poller.cancel();
                    self.state.job_cancelled();
                    return Err(RunError::Cancelled(job_id));
                }
            };

            let Some(event) = event else {
                poller.cancel();
                self.state.job_cancelled();
                return Err(RunError::Disconnected(job_id));
            };

            if let JobEvent::Progress { snapshot, job_id: id } = &event {
                if *id == job_id {
                    on_progress(snapshot);
                }
            }

            let should_route = self.state.apply(&event);
            match &self.state.job {
                JobPhase::Completed { snapshot, .. } if should_route => {
                    let snapshot = snapshot.clone();
                    let outcome = self
                        .router
                        .route(&job_id, &snapshot, &self.state.settings, request)
                        .await;
                    self.state.record_route(&outcome, &snapshot);
                    info!("job {} finished and routed", job_id);
                    poller.wait().await;
                    return Ok(outcome);
                }
                JobPhase::Failed(error) if error.job_id == job_id => {
                    let error = error.clone();
                    poller.wait().await;
                    return Err(RunError::Job(error));
                }
                _ => {}
            }
        }
    }
}
