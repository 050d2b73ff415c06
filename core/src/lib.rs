pub mod backend;
pub mod config;
pub mod error;
pub mod guard;
pub mod launcher;
pub mod models;
pub mod poller;
pub mod projects;
pub mod router;
pub mod session;
pub mod settings;
pub mod status;
pub mod sync;
pub mod wake_lock;

pub use backend::{HttpBackend, JobBackend, DEFAULT_BACKEND_URL};
pub use config::ClientConfig;
pub use error::{
    JobError, LaunchError, ModelListError, PackageError, PollError, ReconcileError, SyncError,
};
pub use guard::{is_actionable, CompletionGuard, GuardPolicy, GuardVerdict};
pub use launcher::{JobLauncher, JobRequest, ModTarget, ProviderCredentials, TranslationProvider};
pub use models::ModelCatalog;
pub use poller::{
    ChannelSink, EventSink, JobEvent, JobHandle, JobPoller, PollerHandle, PollerMachine,
    PollerOptions, PollerState, TickOutcome, DEFAULT_POLL_INTERVAL,
};
pub use projects::{ProjectResolver, Resolution, ResolverMode};
pub use router::{decide, DownloadReference, PostJobRouter, RouteDecision, RouteOutcome, RoutingPolicy};
pub use session::{AppState, JobPhase, LastResult, RunError, Session};
pub use settings::{to_local, to_remote, LocalSettings, RemoteSettings, SettingsReconciler};
pub use status::{normalize, normalize_json, JobStatus, ProgressSnapshot, RawStatus};
pub use sync::{
    DownloadReport, NewProject, SyncClient, SyncProject, UploadFailure, UploadReport,
    UploadSource, UploadedItem,
};
pub use wake_lock::{LockHandle, NoopWakeLock, ResourceLockManager, SystemWakeLock, WakeLockProvider};
