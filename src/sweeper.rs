//! Background removal of expired shares and abandoned uploads.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::DropError;
use crate::storage::ShareStore;
use crate::upload::UploadManager;

/// what one sweep pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_shares: usize,
    pub stale_sessions: usize,
    pub failures: usize,
}

/// periodic sweep over shares and upload sessions
pub struct Sweeper {
    shares: Arc<ShareStore>,
    uploads: Arc<UploadManager>,
    interval: Duration,
    upload_timeout: Duration,
}

impl Sweeper {
    pub fn new(
        shares: Arc<ShareStore>,
        uploads: Arc<UploadManager>,
        interval: Duration,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            shares,
            uploads,
            interval,
            upload_timeout,
        }
    }

    /// one pass: delete expired shares, then discard stale sessions
    ///
    /// Failures on individual entries are logged and counted, never fatal.
    pub async fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        match self.shares.list_expired(now).await {
            Ok(expired) => {
                for meta in expired {
                    match self.shares.delete_share(&meta.id).await {
                        Ok(()) => report.expired_shares += 1,
                        // deleted by someone else in the meantime
                        Err(DropError::NotFound) => {}
                        Err(e) => {
                            tracing::warn!(share_id = %meta.id, "Failed to delete expired share: {}", e);
                            report.failures += 1;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to list shares for expiry: {}", e);
                report.failures += 1;
            }
        }

        let stale = self.uploads.sweep_stale_at(now, self.upload_timeout).await;
        report.stale_sessions = stale.discarded;
        report.failures += stale.failed;

        report
    }

    /// start sweeping on a timer; the first pass runs immediately
    pub fn spawn(self) -> SweeperHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!("Sweeper started, interval {:?}", self.interval);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.run_once(Utc::now()).await;
                        if report.expired_shares > 0 || report.stale_sessions > 0 {
                            tracing::info!(
                                expired_shares = report.expired_shares,
                                stale_sessions = report.stale_sessions,
                                "🧹 Sweep finished"
                            );
                        }
                        if report.failures > 0 {
                            tracing::warn!(failures = report.failures, "Sweep finished with failures");
                        }
                    }
                }
            }

            tracing::debug!("Sweeper stopped");
        });

        SweeperHandle { cancel, task }
    }
}

/// handle to a running sweeper
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// stop the sweeper and wait for an in-flight pass to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("Sweeper task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
