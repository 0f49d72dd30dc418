//! Import progress model and the single-slot progress cell.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

////////////////////////////////////////////////////////////////////////////////
// #region CopyProgress

/// Observable state of the current import operation.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyProgress {
    /// No operation has published anything yet.
    Idle,
    Scanning {
        message: String,
    },
    Ready {
        total_files: usize,
        existing_files: usize,
        files_to_copy: usize,
    },
    Copying {
        current_file: usize,
        total_files: usize,
        progress: f32,
        current_file_name: String,
        estimated_seconds_remaining: u64,
        existing_files: usize,
        files_to_copy: usize,
    },
    Complete {
        existing_files: usize,
        files_to_copy: usize,
    },
    Error {
        message: String,
    },
    Cancelled,
}

impl CopyProgress {
    /// Whether no further state follows for this operation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Error { .. } | Self::Cancelled
        )
    }

    /// Completed fraction in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        match self {
            Self::Copying { progress, .. } => *progress,
            Self::Complete { .. } => 1.0,
            _ => 0.0,
        }
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        match self {
            Self::Idle => format!("{prefix} idle"),
            Self::Scanning { message } => format!("{prefix} scanning: {message}"),
            Self::Ready {
                total_files,
                existing_files,
                files_to_copy,
            } => format!(
                "{prefix} ready total={total_files} existing={existing_files} to_copy={files_to_copy}"
            ),
            Self::Copying {
                current_file,
                total_files,
                progress,
                current_file_name,
                estimated_seconds_remaining,
                ..
            } => format!(
                "{prefix} copying {current_file}/{total_files} ({:.1}%) file={current_file_name} eta={estimated_seconds_remaining}s",
                progress * 100.0
            ),
            Self::Complete {
                existing_files,
                files_to_copy,
            } => format!("{prefix} complete copied={files_to_copy} existing={existing_files}"),
            Self::Error { message } => format!("{prefix} error: {message}"),
            Self::Cancelled => format!("{prefix} cancelled"),
        }
    }
}

impl fmt::Display for CopyProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[IMPORT]"))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Publishing

/// Destination of the engine's state updates.
pub trait ProgressSink {
    fn publish(&mut self, progress: CopyProgress);
}

/// Last-value-wins progress cell shared by the engine and its observers.
///
/// Each operation publishes through its own [`ProgressPublisher`]; starting a
/// new one bumps the generation so late writes of a superseded operation are
/// discarded.
#[derive(Debug)]
pub struct ProgressReporter {
    tx_progress: watch::Sender<CopyProgress>,
    n_generation: AtomicU64,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self {
            tx_progress: watch::Sender::new(CopyProgress::Idle),
            n_generation: AtomicU64::new(0),
        }
    }
}

impl ProgressReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Receiver that sees the current value now and every later change.
    pub fn subscribe(&self) -> watch::Receiver<CopyProgress> {
        self.tx_progress.subscribe()
    }

    /// Snapshot of the current value.
    pub fn current(&self) -> CopyProgress {
        self.tx_progress.borrow().clone()
    }

    /// Supersede any previous operation and reset the cell to `Idle`.
    pub fn begin(self: &Arc<Self>, token: CancellationToken) -> ProgressPublisher {
        let mut n_generation = 0;
        self.tx_progress.send_modify(|slot| {
            n_generation = self.n_generation.fetch_add(1, Ordering::AcqRel) + 1;
            *slot = CopyProgress::Idle;
        });
        ProgressPublisher {
            reporter: Arc::clone(self),
            n_generation,
            token,
            b_is_finished: false,
        }
    }
}

/// Write side of one operation's progress stream.
#[derive(Debug)]
pub struct ProgressPublisher {
    reporter: Arc<ProgressReporter>,
    n_generation: u64,
    token: CancellationToken,
    b_is_finished: bool,
}

impl ProgressPublisher {
    pub fn is_finished(&self) -> bool {
        self.b_is_finished
    }
}

impl ProgressSink for ProgressPublisher {
    /// Drops updates after a terminal state, non-terminal updates after
    /// cancellation, and anything once a newer operation has begun.
    fn publish(&mut self, progress: CopyProgress) {
        if self.b_is_finished {
            return;
        }
        let b_is_terminal = progress.is_terminal();
        if !b_is_terminal && self.token.is_cancelled() {
            return;
        }

        let n_generation = self.n_generation;
        let reporter = &self.reporter;
        reporter.tx_progress.send_if_modified(|slot| {
            if reporter.n_generation.load(Ordering::Acquire) != n_generation {
                return false;
            }
            *slot = progress;
            true
        });
        if b_is_terminal {
            self.b_is_finished = true;
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
