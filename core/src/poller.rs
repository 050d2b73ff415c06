use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::backend::JobBackend;
use crate::error::JobError;
use crate::guard::{CompletionGuard, GuardPolicy, GuardVerdict};
use crate::status::{JobStatus, ProgressSnapshot};
use crate::wake_lock::LockHandle;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Identity of one launched job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress {
        job_id: String,
        snapshot: ProgressSnapshot,
    },
    Completed {
        job_id: String,
        snapshot: ProgressSnapshot,
    },
    Failed(JobError),
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Progress { job_id, .. } | JobEvent::Completed { job_id, .. } => job_id,
            JobEvent::Failed(error) => &error.job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress { .. })
    }
}

/// Receiver of lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: JobEvent);
}

/// Forwards events into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<JobEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: JobEvent) {
        if self.tx.send(event).is_err() {
            debug!("job event dropped; receiver closed");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl PollerState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            PollerState::Completed | PollerState::Error | PollerState::Cancelled
        )
    }
}

/// What a single successful poll decided.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Continue,
    Completed(ProgressSnapshot),
    Failed(JobError),
}

/// Pure state machine behind the poller: no timer, no I/O.
#[derive(Debug)]
pub struct PollerMachine {
    job_id: String,
    state: PollerState,
    guard: CompletionGuard,
}

impl PollerMachine {
    pub fn new(job_id: impl Into<String>, policy: GuardPolicy) -> Self {
        Self {
            job_id: job_id.into(),
            state: PollerState::Idle,
            guard: CompletionGuard::new(policy),
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn apply(&mut self, snapshot: &ProgressSnapshot) -> TickOutcome {
        if self.state.is_finished() {
            return TickOutcome::Continue;
        }
        self.state = PollerState::Running;

        match snapshot.status {
            JobStatus::Error => {
                self.state = PollerState::Error;
                TickOutcome::Failed(JobError {
                    job_id: self.job_id.clone(),
                    message: snapshot
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "backend reported an error".to_string()),
                })
            }
            JobStatus::Completed => match self.guard.evaluate(snapshot) {
                GuardVerdict::Accepted => {
                    self.state = PollerState::Completed;
                    TickOutcome::Completed(snapshot.clone())
                }
                GuardVerdict::Rejected | GuardVerdict::NotCompleted => TickOutcome::Continue,
            },
            JobStatus::Idle | JobStatus::Running => TickOutcome::Continue,
        }
    }

    fn cancel(&mut self) {
        if !self.state.is_finished() {
            self.state = PollerState::Cancelled;
        }
    }
}

struct PollerShared {
    active: AtomicBool,
    generation: AtomicU64,
    ticks: AtomicU64,
    machine: Mutex<PollerMachine>,
    lock: Mutex<Option<LockHandle>>,
    wake: Notify,
}

impl PollerShared {
    fn is_current(&self, generation: u64) -> bool {
        self.active.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    fn state(&self) -> PollerState {
        match self.machine.lock() {
            Ok(machine) => machine.state(),
            Err(poisoned) => poisoned.into_inner().state(),
        }
    }

    fn release_lock(&self) {
        let taken = match self.lock.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        // Dropping the handle releases it exactly once.
        drop(taken);
    }
}

struct ReleaseOnExit<'a>(&'a PollerShared);

impl Drop for ReleaseOnExit<'_> {
    fn drop(&mut self) {
        self.0.release_lock();
    }
}

/// Options for a poller run.
#[derive(Debug, Clone, Copy)]
pub struct PollerOptions {
    pub interval: Duration,
    pub guard: GuardPolicy,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            guard: GuardPolicy::default(),
        }
    }
}

/// Repeatedly fetches a job's status until it reaches a terminal state or is
/// cancelled. Exactly one fetch is in flight at any time.
pub struct JobPoller {
    handle: JobHandle,
    backend: Arc<dyn JobBackend>,
    sink: Arc<dyn EventSink>,
    options: PollerOptions,
    lock: Option<LockHandle>,
}

impl JobPoller {
    pub fn new(
        handle: JobHandle,
        backend: Arc<dyn JobBackend>,
        sink: Arc<dyn EventSink>,
        options: PollerOptions,
    ) -> Self {
        Self {
            handle,
            backend,
            sink,
            options,
            lock: None,
        }
    }

    /// Bind a wake lock to this poller's lifetime.
    pub fn with_lock(mut self, lock: Option<LockHandle>) -> Self {
        self.lock = lock;
        self
    }

    pub fn spawn(self) -> PollerHandle {
        let shared = Arc::new(PollerShared {
            active: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            machine: Mutex::new(PollerMachine::new(self.handle.id.clone(), self.options.guard)),
            lock: Mutex::new(self.lock),
            wake: Notify::new(),
        });

        let task_shared = Arc::clone(&shared);
        let job = self.handle.clone();
        let task = tokio::spawn(run_poll_loop(
            job,
            self.backend,
            self.sink,
            self.options.interval,
            task_shared,
        ));

        PollerHandle {
            job: self.handle,
            shared,
            task: Some(task),
        }
    }
}

async fn run_poll_loop(
    job: JobHandle,
    backend: Arc<dyn JobBackend>,
    sink: Arc<dyn EventSink>,
    interval: Duration,
    shared: Arc<PollerShared>,
) -> PollerState {
    let _release = ReleaseOnExit(&shared);
    let generation = shared.generation.load(Ordering::SeqCst);
    info!("polling job {} every {:?}", job.id, interval);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shared.wake.notified() => {}
        }

        if !shared.is_current(generation) {
            break;
        }

        let tick = shared.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let fetched = backend.fetch_status(&job.id).await;

        if !shared.is_current(generation) {
            debug!("discarding response for tick {} of cancelled job {}", tick, job.id);
            break;
        }

        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!("job {} tick {}: {}; retrying", job.id, tick, error);
                continue;
            }
        };

        let outcome = match shared.machine.lock() {
            Ok(mut machine) => machine.apply(&snapshot),
            Err(poisoned) => poisoned.into_inner().apply(&snapshot),
        };

        sink.emit(JobEvent::Progress {
            job_id: job.id.clone(),
            snapshot,
        });

        match outcome {
            TickOutcome::Continue => {}
            TickOutcome::Completed(snapshot) => {
                shared.active.store(false, Ordering::SeqCst);
                shared.release_lock();
                info!("job {} completed after {} ticks", job.id, tick);
                sink.emit(JobEvent::Completed {
                    job_id: job.id.clone(),
                    snapshot,
                });
                break;
            }
            TickOutcome::Failed(error) => {
                shared.active.store(false, Ordering::SeqCst);
                shared.release_lock();
                warn!("{}", error);
                sink.emit(JobEvent::Failed(error));
                break;
            }
        }
    }

    shared.state()
}

/// Caller's view of a running poller.
pub struct PollerHandle {
    job: JobHandle,
    shared: Arc<PollerShared>,
    task: Option<JoinHandle<PollerState>>,
}

impl PollerHandle {
    pub fn job(&self) -> &JobHandle {
        &self.job
    }

    pub fn state(&self) -> PollerState {
        self.shared.state()
    }

    /// Number of fetches issued so far.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    pub fn holds_lock(&self) -> bool {
        match self.shared.lock.lock() {
            Ok(slot) => slot.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// Stop scheduling ticks and release the lock. No terminal event is
    /// emitted; a fetch already in flight is left to finish and ignored.
    pub fn cancel(&self) {
        if !self.shared.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        match self.shared.machine.lock() {
            Ok(mut machine) => machine.cancel(),
            Err(poisoned) => poisoned.into_inner().cancel(),
        }
        self.shared.release_lock();
        self.shared.wake.notify_one();
        info!("polling for job {} cancelled", self.job.id);
    }

    /// Wait for the poll loop to exit and return its final state.
    pub async fn wait(mut self) -> PollerState {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(state) => state,
                Err(error) => {
                    warn!("poller task for {} ended abnormally: {}", self.job.id, error);
                    self.shared.release_lock();
                    PollerState::Error
                }
            },
            None => self.shared.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: JobStatus, processed: u32, total: u32) -> ProgressSnapshot {
        ProgressSnapshot::with_files(status, processed, total)
    }

    #[test]
    fn machine_starts_idle_and_runs_after_first_poll() {
        let mut machine = PollerMachine::new("job", GuardPolicy::default());
        assert_eq!(machine.state(), PollerState::Idle);
        let outcome = machine.apply(&snapshot(JobStatus::Idle, 0, 0));
        assert_eq!(outcome, TickOutcome::Continue);
        assert_eq!(machine.state(), PollerState::Running);
    }

    #[test]
    fn machine_trusts_errors_without_guard() {
        let mut machine = PollerMachine::new("job", GuardPolicy::default());
        let mut failed = snapshot(JobStatus::Error, 1, 5);
        failed.error_message = Some("disk full".into());
        let outcome = machine.apply(&failed);
        assert_eq!(
            outcome,
            TickOutcome::Failed(JobError {
                job_id: "job".into(),
                message: "disk full".into(),
            })
        );
        assert_eq!(machine.state(), PollerState::Error);
    }

    #[test]
    fn machine_holds_running_while_guard_rejects() {
        let mut machine = PollerMachine::new("job", GuardPolicy::default());
        assert_eq!(
            machine.apply(&snapshot(JobStatus::Completed, 3, 5)),
            TickOutcome::Continue
        );
        assert_eq!(machine.state(), PollerState::Running);
        assert!(matches!(
            machine.apply(&snapshot(JobStatus::Completed, 5, 5)),
            TickOutcome::Completed(_)
        ));
        assert_eq!(machine.state(), PollerState::Completed);
    }

    #[test]
    fn machine_ignores_snapshots_after_terminal_state() {
        let mut machine = PollerMachine::new("job", GuardPolicy::default());
        machine.apply(&snapshot(JobStatus::Completed, 0, 0));
        assert_eq!(
            machine.apply(&snapshot(JobStatus::Error, 0, 0)),
            TickOutcome::Continue
        );
        assert_eq!(machine.state(), PollerState::Completed);
    }

    #[test]
    fn cancel_does_not_override_terminal_state() {
        let mut machine = PollerMachine::new("job", GuardPolicy::default());
        machine.apply(&snapshot(JobStatus::Error, 0, 0));
        machine.cancel();
        assert_eq!(machine.state(), PollerState::Error);
    }
}
