//! Progress reporting and coarse cancellation for long-running jobs
//!
//! SWC import and export report progress through a `watch` channel and check a
//! [`CancelFlag`] between units of work (one node, one file).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub status: String,
    pub done: u64,
    pub total: u64,
}

/// Sending side of a progress channel; cheap to clone
#[derive(Clone, Default)]
pub struct ProgressReporter {
    tx: Option<Arc<watch::Sender<Progress>>>,
}

impl ProgressReporter {
    /// Create a reporter and the receiver a UI can watch
    pub fn channel() -> (Self, watch::Receiver<Progress>) {
        let (tx, rx) = watch::channel(Progress::default());
        (Self { tx: Some(Arc::new(tx)) }, rx)
    }

    /// Reporter that drops every update
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        tracing::debug!(%status, "progress");
        if let Some(tx) = &self.tx {
            tx.send_modify(|p| p.status = status);
        }
    }

    pub fn set_progress(&self, done: u64, total: u64) {
        if let Some(tx) = &self.tx {
            tx.send_modify(|p| {
                p.done = done;
                p.total = total;
            });
        }
    }
}

/// Shared cancellation request
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_updates_receiver() {
        let (reporter, rx) = ProgressReporter::channel();
        reporter.set_status("Exporting");
        reporter.set_progress(3, 10);
        let p = rx.borrow().clone();
        assert_eq!(
            p,
            Progress {
                status: "Exporting".to_string(),
                done: 3,
                total: 10
            }
        );
    }

    #[test]
    fn test_disabled_reporter_is_silent() {
        let reporter = ProgressReporter::disabled();
        reporter.set_progress(1, 2);
        reporter.set_status("ignored");
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
