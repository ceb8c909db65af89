//! Background poller for account inquiries that outlived their request
//!
//! The validator polls inline while the caller waits, but a restart can
//! leave pending records behind. At boot the pending queue is drained
//! into this worker, which resumes each poll loop off the hot path.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::account_validation_repository::{
    AccountValidationRepository, ValidationStatus,
};
use crate::services::account_validator::AccountValidator;

/// One pending inquiry to resume
#[derive(Debug, Clone)]
pub struct PollJob {
    pub record_id: Uuid,
    pub account_number: String,
    pub poll_reference: String,
}

pub struct ValidationPoller {
    validations: Arc<dyn AccountValidationRepository>,
    validator: Arc<AccountValidator>,
    jobs: mpsc::Receiver<PollJob>,
    shutdown: watch::Receiver<bool>,
}

impl ValidationPoller {
    pub fn new(
        validations: Arc<dyn AccountValidationRepository>,
        validator: Arc<AccountValidator>,
        jobs: mpsc::Receiver<PollJob>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            validations,
            validator,
            jobs,
            shutdown,
        }
    }

    /// Load pending records into the job queue; called once at startup.
    pub async fn enqueue_pending(
        validations: &Arc<dyn AccountValidationRepository>,
        sender: &mpsc::Sender<PollJob>,
    ) {
        let pending = match validations.list_pending().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "failed to load pending validations");
                return;
            }
        };

        for record in pending {
            let Some(poll_reference) = record.poll_reference.clone() else {
                continue;
            };
            let job = PollJob {
                record_id: record.id,
                account_number: record.account_number.clone(),
                poll_reference,
            };
            if sender.send(job).await.is_err() {
                return;
            }
        }
    }

    pub async fn run(mut self) {
        info!("validation poller started");

        loop {
            tokio::select! {
                job = self.jobs.recv() => {
                    match job {
                        Some(job) => self.resume(job).await,
                        None => {
                            info!("validation poller channel closed");
                            return;
                        }
                    }
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!("validation poller stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn resume(&self, job: PollJob) {
        // The record may have completed since the job was queued
        let record = match self.validations.find_latest(&job.account_number).await {
            Ok(Some(record))
                if record.id == job.record_id && record.status == ValidationStatus::Pending =>
            {
                record
            }
            Ok(_) => return,
            Err(e) => {
                warn!(
                    account_number = %job.account_number,
                    error = %e,
                    "failed to reload validation record"
                );
                return;
            }
        };

        if let Err(e) = self
            .validator
            .poll_until_terminal(&record, &job.account_number, &job.poll_reference)
            .await
        {
            warn!(
                account_number = %job.account_number,
                error = %e,
                "resumed poll did not complete"
            );
        }
    }
}
