// src/progress.rs

//! Sync progress reporting
//!
//! The sync engine reports every phase change of every repository through a
//! [`SyncProgress`] implementation. Implementations include:
//! - `CliProgress`: an indicatif spinner per batch for interactive use
//! - `LogProgress`: phase changes logged through tracing
//! - `CallbackProgress`: forwards [`ProgressEvent`]s to a closure
//! - `SilentProgress`: counts only, for scripted/quiet modes
//!
//! # Example
//!
//! ```ignore
//! use fdroid_sync::progress::LogProgress;
//!
//! let progress = LogProgress::new();
//! let report = engine.with_progress(&progress).sync(&mut conn)?;
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Phase of a single repository within a sync pass
///
/// `Idle → Fetching → (NotModified | Verifying) → Parsing → Merged → Done`,
/// with `Failed` reachable from fetching, verifying and parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    NotModified,
    Verifying,
    Parsing,
    Merged,
    Done,
    Failed(String),
    Cancelled,
}

impl SyncPhase {
    /// Whether the repository has reached a final state for this pass
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_) | Self::Cancelled)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Fetching => write!(f, "fetching"),
            Self::NotModified => write!(f, "not modified"),
            Self::Verifying => write!(f, "verifying"),
            Self::Parsing => write!(f, "parsing"),
            Self::Merged => write!(f, "merged"),
            Self::Done => write!(f, "done"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Receives phase changes during a sync pass
///
/// Fetching and verification run on worker threads, so implementations must
/// be thread-safe.
pub trait SyncProgress: Send + Sync {
    /// A batch over `total` enabled repositories is starting
    fn start(&self, _total: u64) {}

    /// `repository` entered `phase`
    fn phase(&self, repository: &str, phase: &SyncPhase);

    /// The batch finished (committed or rolled back)
    fn finish(&self, _message: &str) {}
}

/// Progress sink that only counts finished repositories
#[derive(Debug, Default)]
pub struct SilentProgress {
    finished: AtomicU64,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repositories that reached a terminal phase
    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::Relaxed)
    }
}

impl SyncProgress for SilentProgress {
    fn phase(&self, _repository: &str, phase: &SyncPhase) {
        if phase.is_terminal() {
            self.finished.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Logs phase changes to tracing
///
/// Intermediate phases go to debug level, outcomes to info, failures to warn.
#[derive(Debug, Default)]
pub struct LogProgress;

impl LogProgress {
    pub fn new() -> Self {
        Self
    }
}

impl SyncProgress for LogProgress {
    fn start(&self, total: u64) {
        info!("Syncing {} repositories", total);
    }

    fn phase(&self, repository: &str, phase: &SyncPhase) {
        match phase {
            SyncPhase::Failed(reason) => warn!("{}: sync failed: {}", repository, reason),
            SyncPhase::Done | SyncPhase::NotModified | SyncPhase::Cancelled => {
                info!("{}: {}", repository, phase)
            }
            _ => debug!("{}: {}", repository, phase),
        }
    }

    fn finish(&self, message: &str) {
        info!("{}", message);
    }
}

/// Events emitted by [`CallbackProgress`]
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started { total: u64 },
    Phase { repository: String, phase: SyncPhase },
    Finished(String),
}

/// Calls a user-provided function on every progress event
pub struct CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> SyncProgress for CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn start(&self, total: u64) {
        (self.callback)(ProgressEvent::Started { total });
    }

    fn phase(&self, repository: &str, phase: &SyncPhase) {
        (self.callback)(ProgressEvent::Phase {
            repository: repository.to_string(),
            phase: phase.clone(),
        });
    }

    fn finish(&self, message: &str) {
        (self.callback)(ProgressEvent::Finished(message.to_string()));
    }
}

/// Terminal progress bar for the CLI
///
/// The bar advances once per repository reaching a terminal phase; the
/// message shows the latest phase change.
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} Syncing ({pos}/{len}) [{bar:30.green/dim}] {msg}")
            .map(|style| style.progress_chars("##-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncProgress for CliProgress {
    fn start(&self, total: u64) {
        self.bar.set_length(total);
    }

    fn phase(&self, repository: &str, phase: &SyncPhase) {
        self.bar.set_message(format!("{repository}: {phase}"));
        if phase.is_terminal() {
            self.bar.inc(1);
        }
    }

    fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
