//! Scripted backend and lock provider shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use mod_sync_core::{
    JobBackend, JobRequest, JobStatus, LaunchError, PackageError, PollError, ProgressSnapshot,
    ProviderCredentials, TranslationProvider, WakeLockProvider,
};

/// Replays one status per fetch. The last entry repeats once the script runs out.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<ProgressSnapshot, PollError>>>,
    last: Mutex<Option<ProgressSnapshot>>,
    submit_error: Mutex<Option<LaunchError>>,
    fetch_delay: Duration,
    pub submits: AtomicUsize,
    pub fetches: AtomicUsize,
    /// Fetches whose response has been handed back.
    pub responses: AtomicUsize,
    pub fetch_starts: Mutex<Vec<Instant>>,
    pub packages: Mutex<Vec<(String, String, Option<String>)>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<ProgressSnapshot, PollError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            submit_error: Mutex::new(None),
            fetch_delay: Duration::ZERO,
            submits: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            responses: AtomicUsize::new(0),
            fetch_starts: Mutex::new(Vec::new()),
            packages: Mutex::new(Vec::new()),
        }
    }

    pub fn statuses(statuses: Vec<ProgressSnapshot>) -> Self {
        Self::new(statuses.into_iter().map(Ok).collect())
    }

    pub fn rejecting(error: LaunchError) -> Self {
        let backend = Self::new(Vec::new());
        *backend.submit_error.lock().unwrap() = Some(error);
        backend
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }
}

#[async_trait]
impl JobBackend for ScriptedBackend {
    async fn submit(&self, _request: &JobRequest) -> Result<String, LaunchError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        match self.submit_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok("task-1".to_string()),
        }
    }

    async fn fetch_status(&self, _task_id: &str) -> Result<ProgressSnapshot, PollError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetch_starts.lock().unwrap().push(Instant::now());
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        self.responses.fetch_add(1, Ordering::SeqCst);
        match next {
            Some(Ok(snapshot)) => {
                *self.last.lock().unwrap() = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(error)) => Err(error),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| PollError::new("script exhausted")),
        }
    }

    async fn package(
        &self,
        task_id: &str,
        result_path: &str,
        archive_name: Option<&str>,
    ) -> Result<String, PackageError> {
        self.packages.lock().unwrap().push((
            task_id.to_string(),
            result_path.to_string(),
            archive_name.map(str::to_string),
        ));
        Ok(format!("{result_path}.zip"))
    }

    fn download_url(&self, task_id: &str, archive_path: &str) -> Result<String, PackageError> {
        Ok(format!("http://backend/jobs/{task_id}/download?archive={archive_path}"))
    }
}

/// Counts acquisitions and releases; refuses when `available` is false.
pub struct CountingProvider {
    pub available: bool,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    next: AtomicU64,
}

impl CountingProvider {
    pub fn new(available: bool) -> Arc<Self> {
        Arc::new(Self {
            available,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            next: AtomicU64::new(1),
        })
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl WakeLockProvider for CountingProvider {
    fn acquire(&self) -> Option<u64> {
        if !self.available {
            return None;
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Some(self.next.fetch_add(1, Ordering::SeqCst))
    }

    fn release(&self, _token: u64) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn snapshot(status: JobStatus, processed: u32, total: u32) -> ProgressSnapshot {
    ProgressSnapshot::with_files(status, processed, total)
}

pub fn request() -> JobRequest {
    JobRequest {
        mod_path: "/workshop/394360/1521695605".into(),
        mod_name: "Kaiserreich".into(),
        mod_id: "1521695605".into(),
        output_path: "/docs/Hearts of Iron IV/mod".into(),
        service: TranslationProvider::Google,
        target_lang: "ko".into(),
        vanilla_path: None,
        settings: ProviderCredentials::default(),
        glossary: BTreeMap::new(),
        auto_shutdown: false,
    }
}
