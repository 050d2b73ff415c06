use log::{debug, info, warn};
use once_cell::sync::Lazy;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Platform backend that keeps the host awake.
pub trait WakeLockProvider: Send + Sync {
    /// Returns a provider token, or `None` when the platform refuses.
    fn acquire(&self) -> Option<u64>;
    fn release(&self, token: u64);
}

/// Token for one held wake lock. Released at most once, either explicitly
/// through [`ResourceLockManager::release`] or when dropped.
pub struct LockHandle {
    token: u64,
    released: AtomicBool,
    provider: Arc<dyn WakeLockProvider>,
}

impl LockHandle {
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn release_once(&self) {
        if self
            .released
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.provider.release(self.token);
            debug!("wake lock {} released", self.token);
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("token", &self.token)
            .field("released", &self.is_released())
            .finish()
    }
}

#[derive(Clone)]
pub struct ResourceLockManager {
    provider: Arc<dyn WakeLockProvider>,
}

impl ResourceLockManager {
    pub fn new(provider: Arc<dyn WakeLockProvider>) -> Self {
        Self { provider }
    }

    /// Manager backed by the host's sleep inhibitor.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemWakeLock))
    }

    /// Manager that never holds anything.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopWakeLock))
    }

    pub fn acquire(&self) -> Option<LockHandle> {
        let token = self.provider.acquire()?;
        debug!("wake lock {} acquired", token);
        Some(LockHandle {
            token,
            released: AtomicBool::new(false),
            provider: Arc::clone(&self.provider),
        })
    }

    /// No-op for `None` and for handles that were already released.
    pub fn release(&self, handle: Option<&LockHandle>) {
        if let Some(handle) = handle {
            handle.release_once();
        }
    }
}

/// Provider that always refuses.
#[derive(Debug, Default)]
pub struct NoopWakeLock;

impl WakeLockProvider for NoopWakeLock {
    fn acquire(&self) -> Option<u64> {
        None
    }

    fn release(&self, _token: u64) {}
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

// The host only supports one inhibitor for this process.
static INHIBITOR: Lazy<Mutex<Option<(u64, Child)>>> = Lazy::new(|| Mutex::new(None));

/// Keeps the machine awake by holding an OS inhibitor process:
/// `caffeinate` on macOS, `systemd-inhibit` on Linux.
#[derive(Debug, Default)]
pub struct SystemWakeLock;

impl SystemWakeLock {
    fn inhibitor_command() -> Option<Command> {
        if cfg!(target_os = "macos") {
            let mut command = Command::new("caffeinate");
            command.arg("-i");
            Some(command)
        } else if cfg!(target_os = "linux") {
            let mut command = Command::new("systemd-inhibit");
            command.args([
                "--what=idle:sleep",
                "--who=mod-sync",
                "--why=translation job running",
                "--mode=block",
                "sleep",
                "infinity",
            ]);
            Some(command)
        } else {
            None
        }
    }
}

impl WakeLockProvider for SystemWakeLock {
    fn acquire(&self) -> Option<u64> {
        let mut slot = match INHIBITOR.lock() {
            Ok(slot) => slot,
            Err(_) => {
                warn!("wake lock registry poisoned; continuing without lock");
                return None;
            }
        };

        if slot.is_some() {
            warn!("a wake lock is already held by this process");
            return None;
        }

        let mut command = Self::inhibitor_command()?;
        let child = match command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(error) => {
                warn!("sleep inhibitor unavailable: {}", error);
                return None;
            }
        };

        let token = NEXT_TOKEN.fetch_add(1, Ordering::SeqCst);
        info!("sleep inhibitor started (pid {})", child.id());
        *slot = Some((token, child));
        Some(token)
    }

    fn release(&self, token: u64) {
        let Ok(mut slot) = INHIBITOR.lock() else {
            return;
        };

        let held = matches!(slot.as_ref(), Some((current, _)) if *current == token);
        if !held {
            return;
        }

        if let Some((_, child)) = slot.take() {
            stop_inhibitor(child);
        }
    }
}

/// Kill and reap the inhibitor. Returns `false` if either step failed.
fn stop_inhibitor(mut child: Child) -> bool {
    let mut clean = true;
    if let Err(error) = child.kill() {
        warn!("failed to stop sleep inhibitor: {}", error);
        clean = false;
    }
    match child.wait() {
        Ok(status) => debug!("sleep inhibitor exited with {}", status),
        Err(error) => {
            warn!("failed to reap sleep inhibitor: {}", error);
            clean = false;
        }
    }
    clean
}
