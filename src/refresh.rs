//! Background refresh: the API enqueues, a single worker scrapes.
//!
//! The queue holds at most one pending job, so a burst of triggers while a
//! run is in flight collapses into one follow-up run, and runs never overlap.

use std::sync::Arc;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cache::CacheStore;
use crate::orchestrator::Orchestrator;

#[derive(Debug)]
pub(crate) struct RefreshJob {
    requested_at: chrono::DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A new run will start once the worker is free.
    Queued,
    /// A run is already waiting; this trigger is folded into it.
    AlreadyPending,
    /// The worker has stopped.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<RefreshJob>,
}

impl RefreshHandle {
    pub fn trigger(&self) -> TriggerOutcome {
        let job = RefreshJob {
            requested_at: Local::now(),
        };
        match self.tx.try_send(job) {
            Ok(()) => TriggerOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => TriggerOutcome::AlreadyPending,
            Err(mpsc::error::TrySendError::Closed(_)) => TriggerOutcome::Unavailable,
        }
    }

    /// A handle with no worker behind it; jobs pile up in the returned receiver.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::Receiver<RefreshJob>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }
}

/// Start the worker. Runs until every handle is dropped.
pub fn spawn_worker(
    orchestrator: Orchestrator,
    cache: Arc<CacheStore>,
) -> (RefreshHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<RefreshJob>(1);

    let task = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            info!(requested_at = %job.requested_at.format("%H:%M:%S"), "refresh started");
            let today = Local::now().date_naive();
            match orchestrator.refresh(today, &cache).await {
                Ok(report) => info!(
                    showings = report.snapshot.showings.len(),
                    skipped = report.skips.len(),
                    "refresh finished"
                ),
                Err(e) => error!(error = %e, "refresh finished but the cache was not written"),
            }
        }
        info!("refresh worker stopped");
    });

    (RefreshHandle { tx }, task)
}
