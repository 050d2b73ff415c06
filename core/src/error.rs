use thiserror::Error;

/// A job could not be started. No job handle exists and no lock was taken.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid job request: {0}")]
    InvalidRequest(String),
    #[error("backend rejected the job ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend returned an unexpected launch response: {0}")]
    MalformedResponse(String),
}

/// Network hiccup while polling. Retried on the next tick, never surfaced.
#[derive(Debug, Error)]
#[error("status poll failed: {message}")]
pub struct PollError {
    pub message: String,
}

impl PollError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The backend reported that the job failed. Terminal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job {job_id} failed: {message}")]
pub struct JobError {
    pub job_id: String,
    pub message: String,
}

/// Packaging or archive download after a completed job.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("packaging request failed ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("network error while packaging: {0}")]
    Network(String),
    #[error("archive write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected packaging response: {0}")]
    MalformedResponse(String),
    #[error("cannot build archive URL: {0}")]
    InvalidUrl(String),
}

/// Errors from the sync platform workflow. Surfaced per operation, never
/// retried automatically.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync credentials are missing or were rejected")]
    Auth,
    #[error("invalid project id: {0:?}")]
    InvalidProjectId(String),
    #[error("no project id configured for sync upload")]
    MissingProjectId,
    #[error("project {0} was not found on the sync platform")]
    NotFound(u64),
    #[error("invalid sync request: {0}")]
    InvalidRequest(String),
    #[error("sync platform returned an error ({status}): {detail}")]
    Remote { status: u16, detail: String },
    #[error("network error while talking to the sync platform: {0}")]
    Network(String),
}

/// Settings reconciliation and transport errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("glossary could not be parsed: {0}")]
    Glossary(#[from] serde_json::Error),
    #[error("project id must be a positive integer, got {0:?}")]
    InvalidProjectId(String),
    #[error("settings request failed ({status}): {detail}")]
    Remote { status: u16, detail: String },
    #[error("network error while syncing settings: {0}")]
    Network(String),
}

/// Listing the models a provider offers.
#[derive(Debug, Error)]
pub enum ModelListError {
    #[error("{0} has no selectable models")]
    Unsupported(String),
    #[error("an API key for {0} is required to list its models")]
    MissingKey(String),
    #[error("{0} rejected the API key")]
    Unauthorized(String),
    #[error("model listing failed ({status}): {detail}")]
    Remote { status: u16, detail: String },
    #[error("network error while listing models: {0}")]
    Network(String),
    #[error("cannot build model listing URL: {0}")]
    InvalidUrl(String),
}
