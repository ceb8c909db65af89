//! Provider delivery callback reconciliation
//!
//! Webhooks are the authoritative signal that a payout actually reached
//! the destination account. Each delivery is matched back to the refund
//! awaiting it, appended to the callback history, and folded into the
//! lifecycle: settled, still pending, scheduled for retry, or dead.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{info, warn};

use crate::database::refund_repository::{
    CallbackRecord, NotificationRecord, Refund, RefundRepository, RefundStatus,
};
use crate::error::{AppError, AppResult, DomainError, SecurityError};
use crate::gateway::types::{
    base_external_id, classify_failure, parse_callback, CallbackOutcome, FailureClass,
};
use crate::services::ticketing::TicketingClient;
use crate::settings::Settings;
use crate::signer::secure_eq;
use crate::sync::KeyedMutex;

/// A raw webhook delivery from the disbursement provider
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub token: String,
    pub payload: JsonValue,
}

/// How a callback resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Payout confirmed; the ticketing system was notified
    Settled,
    /// Provider still processing; nothing changed but the history
    StillPending,
    /// Unrecoverable failure or retry budget exhausted
    TerminalFailure,
    /// Transient failure; a retry is scheduled
    RetryScheduled { retry_at: DateTime<Utc> },
}

pub struct WebhookReconciler {
    refunds: Arc<dyn RefundRepository>,
    ticketing: Arc<dyn TicketingClient>,
    settings: Settings,
    locks: Arc<KeyedMutex>,
    callback_token: String,
    notify_url: String,
}

impl WebhookReconciler {
    pub fn new(
        refunds: Arc<dyn RefundRepository>,
        ticketing: Arc<dyn TicketingClient>,
        settings: Settings,
        locks: Arc<KeyedMutex>,
        callback_token: impl Into<String>,
        notify_url: impl Into<String>,
    ) -> Self {
        Self {
            refunds,
            ticketing,
            settings,
            locks,
            callback_token: callback_token.into(),
            notify_url: notify_url.into(),
        }
    }

    /// Reconcile one webhook delivery.
    ///
    /// Authentication happens before anything is read or written; a bad
    /// token leaves no trace in any history.
    pub async fn process(&self, delivery: WebhookDelivery) -> AppResult<ReconcileOutcome> {
        if !secure_eq(delivery.token.as_bytes(), self.callback_token.as_bytes()) {
            return Err(AppError::security(SecurityError::CallbackTokenMismatch));
        }

        let event = parse_callback(&delivery.payload)?;
        let refund_id = base_external_id(&event.external_id).to_string();

        let _guard = self.locks.acquire(&refund_id).await;

        let mut refund = self
            .refunds
            .find_awaiting_callback(&refund_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| {
                AppError::domain(DomainError::UnknownRefund {
                    external_id: event.external_id.clone(),
                })
            })?;

        refund.callback_history.push(CallbackRecord {
            provider: event.provider.clone(),
            external_id: event.external_id.clone(),
            outcome: event.outcome.clone(),
            raw: event.raw.clone(),
            received_at: Utc::now(),
        });

        match event.outcome {
            CallbackOutcome::Completed => self.settle(refund).await,
            CallbackOutcome::Pending => {
                let refund = self.refunds.update(&refund).await.map_err(AppError::from)?;
                info!(refund_id = %refund.refund_id, "provider still processing payout");
                Ok(ReconcileOutcome::StillPending)
            }
            CallbackOutcome::Failed { ref code } => self.handle_failure(refund, code).await,
        }
    }

    /// Completed delivery: record settlement atomically, then notify the
    /// ticketing system. The refund only reaches `done` once the
    /// notification is acknowledged; otherwise it stays in `success` so
    /// the notification can be redelivered.
    async fn settle(&self, mut refund: Refund) -> AppResult<ReconcileOutcome> {
        refund.status = RefundStatus::Success;
        refund.settled_at = Some(Utc::now());
        let mut refund = self.refunds.update(&refund).await.map_err(AppError::from)?;

        info!(refund_id = %refund.refund_id, "payout confirmed by provider");

        let acknowledged = self
            .notify_ticketing(&mut refund, "success", None)
            .await?;
        if acknowledged {
            refund.status = RefundStatus::Done;
        }
        self.refunds.update(&refund).await.map_err(AppError::from)?;

        Ok(ReconcileOutcome::Settled)
    }

    async fn handle_failure(
        &self,
        mut refund: Refund,
        code: &str,
    ) -> AppResult<ReconcileOutcome> {
        let max_attempts = self.settings.max_retry_attempts().await as usize;
        let exhausted = refund.retry_history.len() >= max_attempts;
        let terminal = classify_failure(code) == FailureClass::Terminal || exhausted;

        if terminal {
            refund.status = RefundStatus::Fail;
            refund.retry_at = None;
            let mut refund = self.refunds.update(&refund).await.map_err(AppError::from)?;

            warn!(
                refund_id = %refund.refund_id,
                failure_code = code,
                exhausted,
                "payout failed terminally"
            );

            self.notify_ticketing(&mut refund, "failed", Some(code))
                .await?;
            self.refunds.update(&refund).await.map_err(AppError::from)?;

            return Ok(ReconcileOutcome::TerminalFailure);
        }

        let interval = self.settings.retry_interval_minutes().await;
        let retry_at = Utc::now() + Duration::minutes(interval);
        refund.status = RefundStatus::Fail;
        refund.retry_at = Some(retry_at);
        let refund = self.refunds.update(&refund).await.map_err(AppError::from)?;

        warn!(
            refund_id = %refund.refund_id,
            failure_code = code,
            retry_at = %retry_at,
            "payout failed, retry scheduled"
        );

        Ok(ReconcileOutcome::RetryScheduled { retry_at })
    }

    /// Push a status notification and record the attempt on the refund.
    /// Returns whether the ticketing system acknowledged it.
    async fn notify_ticketing(
        &self,
        refund: &mut Refund,
        status: &str,
        failure_code: Option<&str>,
    ) -> AppResult<bool> {
        let payload = json!({
            "refund_id": refund.refund_id,
            "status": status,
            "amount": refund.amount,
            "settled_at": refund.settled_at,
            "failure_code": failure_code,
        });

        let response = self.ticketing.notify(&self.notify_url, &payload).await;

        refund.notification_history.push(NotificationRecord {
            url: self.notify_url.clone(),
            payload,
            response_status: response.status,
            response_body: response.body,
            acknowledged: response.acknowledged,
            sent_at: Utc::now(),
        });

        Ok(response.acknowledged)
    }
}
