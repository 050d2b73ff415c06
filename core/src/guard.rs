use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::status::{JobStatus, ProgressSnapshot};

/// How long the guard keeps doubting a reported completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardPolicy {
    /// `None` keeps polling until the file counters agree.
    #[serde(default)]
    pub max_rejections: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    /// Snapshot does not claim completion.
    NotCompleted,
    /// Completion reported but files are still being written.
    Rejected,
    Accepted,
}

/// Decides whether a reported `completed` may be acted upon.
///
/// The backend flips its status to `completed` slightly before the last file
/// lands on disk, so the file counters are the source of truth.
#[derive(Debug, Clone, Default)]
pub struct CompletionGuard {
    policy: GuardPolicy,
    rejections: u32,
}

impl CompletionGuard {
    pub fn new(policy: GuardPolicy) -> Self {
        Self {
            policy,
            rejections: 0,
        }
    }

    pub fn rejections(&self) -> u32 {
        self.rejections
    }

    pub fn evaluate(&mut self, snapshot: &ProgressSnapshot) -> GuardVerdict {
        if snapshot.status != JobStatus::Completed {
            return GuardVerdict::NotCompleted;
        }

        if is_actionable(snapshot) {
            return GuardVerdict::Accepted;
        }

        if let Some(limit) = self.policy.max_rejections {
            if self.rejections >= limit {
                warn!(
                    "accepting completion after {} guarded ticks with {}/{} files",
                    self.rejections, snapshot.processed_files, snapshot.total_files
                );
                return GuardVerdict::Accepted;
            }
        }

        self.rejections += 1;
        debug!(
            "completion reported with {}/{} files processed; waiting",
            snapshot.processed_files, snapshot.total_files
        );
        GuardVerdict::Rejected
    }
}

/// `completed` is trustworthy once every file has been processed, or when the
/// job had no files to begin with.
pub fn is_actionable(snapshot: &ProgressSnapshot) -> bool {
    snapshot.status == JobStatus::Completed
        && (snapshot.total_files == 0 || snapshot.processed_files >= snapshot.total_files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(processed: u32, total: u32) -> ProgressSnapshot {
        ProgressSnapshot::with_files(JobStatus::Completed, processed, total)
    }

    #[test]
    fn rejects_every_unfinished_completion() {
        let mut guard = CompletionGuard::default();
        for total in 1..=12u32 {
            for processed in 0..total {
                assert_eq!(
                    guard.evaluate(&completed(processed, total)),
                    GuardVerdict::Rejected,
                    "{processed}/{total} must not be accepted"
                );
            }
        }
    }

    #[test]
    fn accepts_empty_job_immediately() {
        let mut guard = CompletionGuard::default();
        assert_eq!(guard.evaluate(&completed(0, 0)), GuardVerdict::Accepted);
        assert_eq!(guard.evaluate(&completed(7, 0)), GuardVerdict::Accepted);
        assert_eq!(guard.rejections(), 0);
    }

    #[test]
    fn accepts_when_counters_meet_or_overshoot() {
        let mut guard = CompletionGuard::default();
        assert_eq!(guard.evaluate(&completed(5, 5)), GuardVerdict::Accepted);
        assert_eq!(guard.evaluate(&completed(6, 5)), GuardVerdict::Accepted);
    }

    #[test]
    fn ignores_non_completed_snapshots() {
        let mut guard = CompletionGuard::default();
        let running = ProgressSnapshot::with_files(JobStatus::Running, 5, 5);
        let failed = ProgressSnapshot::with_files(JobStatus::Error, 1, 5);
        assert_eq!(guard.evaluate(&running), GuardVerdict::NotCompleted);
        assert_eq!(guard.evaluate(&failed), GuardVerdict::NotCompleted);
    }

    #[test]
    fn rejection_cap_eventually_accepts() {
        let mut guard = CompletionGuard::new(GuardPolicy {
            max_rejections: Some(2),
        });
        assert_eq!(guard.evaluate(&completed(3, 5)), GuardVerdict::Rejected);
        assert_eq!(guard.evaluate(&completed(3, 5)), GuardVerdict::Rejected);
        assert_eq!(guard.evaluate(&completed(3, 5)), GuardVerdict::Accepted);
    }

    #[test]
    fn no_cap_keeps_rejecting() {
        let mut guard = CompletionGuard::default();
        for _ in 0..1_000 {
            assert_eq!(guard.evaluate(&completed(4, 5)), GuardVerdict::Rejected);
        }
        assert_eq!(guard.rejections(), 1_000);
    }
}
