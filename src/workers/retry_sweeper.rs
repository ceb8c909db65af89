//! Periodic sweep over refunds that are waiting on the clock
//!
//! Two queues share one sweep: failed refunds whose retry moment has
//! arrived, and delayed refunds whose disbursement date has arrived. The
//! retry window only looks back a bounded number of hours so a refund
//! that slept through many sweeps is not retried far past its moment.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::database::refund_repository::RefundRepository;
use crate::error::ErrorCode;
use crate::services::refund_orchestrator::RefundOrchestrator;
use crate::sync::KeyedMutex;

/// Counters for one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub retries_issued: usize,
    pub retries_skipped: usize,
    pub delayed_dispatched: usize,
    pub errors: usize,
}

pub struct RetrySweeper {
    refunds: Arc<dyn RefundRepository>,
    orchestrator: Arc<RefundOrchestrator>,
    locks: Arc<KeyedMutex>,
    interval_secs: u64,
    lookback_hours: i64,
    shutdown: watch::Receiver<bool>,
}

impl RetrySweeper {
    pub fn new(
        refunds: Arc<dyn RefundRepository>,
        orchestrator: Arc<RefundOrchestrator>,
        locks: Arc<KeyedMutex>,
        interval_secs: u64,
        lookback_hours: i64,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            refunds,
            orchestrator,
            locks,
            interval_secs,
            lookback_hours,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!(
            interval_secs = self.interval_secs,
            lookback_hours = self.lookback_hours,
            "retry sweeper started"
        );

        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(self.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = self.sweep_once().await;
                    if stats != SweepStats::default() {
                        info!(
                            retries_issued = stats.retries_issued,
                            retries_skipped = stats.retries_skipped,
                            delayed_dispatched = stats.delayed_dispatched,
                            errors = stats.errors,
                            "sweep pass finished"
                        );
                    }
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!("retry sweeper stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One pass over both queues. Failures on individual refunds never
    /// abort the pass.
    pub async fn sweep_once(&self) -> SweepStats {
        let mut stats = SweepStats::default();
        let now = Utc::now();
        let from = now - Duration::hours(self.lookback_hours);

        match self.refunds.find_due_for_retry(from, now).await {
            Ok(due) => {
                for refund in due {
                    match self
                        .orchestrator
                        .retry_disbursement(&refund.refund_id)
                        .await
                    {
                        Ok(_) => stats.retries_issued += 1,
                        Err(e)
                            if matches!(
                                e.error_code(),
                                ErrorCode::RetryExhausted
                                    | ErrorCode::UnacknowledgedRequest
                                    | ErrorCode::InvalidRefundState
                            ) =>
                        {
                            // Another actor got there first or the refund
                            // is no longer eligible; nothing to do
                            warn!(refund_id = %refund.refund_id, error = %e, "retry skipped");
                            stats.retries_skipped += 1;
                        }
                        Err(e) => {
                            error!(refund_id = %refund.refund_id, error = %e, "retry failed");
                            stats.errors += 1;
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "failed to load retry queue");
                stats.errors += 1;
            }
        }

        match self.refunds.find_due_for_disbursement(now).await {
            Ok(due) => {
                for refund in due {
                    match self.orchestrator.dispatch_delayed(&refund.refund_id).await {
                        Ok(_) => stats.delayed_dispatched += 1,
                        Err(e) => {
                            error!(refund_id = %refund.refund_id, error = %e, "delayed dispatch failed");
                            stats.errors += 1;
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "failed to load delayed queue");
                stats.errors += 1;
            }
        }

        // Each pass touches an arbitrary set of refund ids; drop the lock
        // cells nobody holds anymore so the map stays bounded
        self.locks.prune().await;

        stats
    }
}
