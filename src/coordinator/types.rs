//! Public types for the sync engine coordinator.

use crate::remote::RemoteError;

/// Engine lifecycle state.
///
/// Use [`super::SyncEngine::state()`] to check current state or
/// [`super::SyncEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Just created, not yet started
    Created,
    /// Reloading the persisted queue
    Loading,
    /// Queue loaded, drains may run
    Ready,
    /// Run loop active (network, timer and shutdown triggers)
    Running,
    /// Graceful shutdown in progress
    ShuttingDown,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Loading => write!(f, "Loading"),
            Self::Ready => write!(f, "Ready"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// Why a drain did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyQueue,
    /// Another drain holds the single-flight gate
    AlreadySyncing,
    Offline,
}

/// Result of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Pending items considered by the drain
    pub total: usize,
    /// Items committed and removed from the queue
    pub succeeded: usize,
    /// Items that failed individually while staging
    pub failed: usize,
}

impl BatchResult {
    /// Check if all items succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Outcome of one [`super::SyncEngine::drain()`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Skipped(SkipReason),
    Committed(BatchResult),
    /// The batch as a whole failed. The queue is unchanged apart from
    /// individual staging failures, which are recorded regardless.
    CommitFailed {
        staged: usize,
        failed: usize,
        error: RemoteError,
    },
}

impl DrainOutcome {
    /// Metric label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped(SkipReason::EmptyQueue) => "skipped_empty",
            Self::Skipped(SkipReason::AlreadySyncing) => "skipped_syncing",
            Self::Skipped(SkipReason::Offline) => "skipped_offline",
            Self::Committed(_) => "committed",
            Self::CommitFailed { .. } => "commit_failed",
        }
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}
