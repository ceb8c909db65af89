//! Refund ledger: the aggregate root for one refund's lifecycle
//!
//! Request, callback, retry, and notification histories are append-only
//! JSON columns on the refund row; every mutation is a single atomic
//! UPDATE guarded by an optimistic version check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::gateway::types::CallbackOutcome;

/// Refund lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Awaiting a pre-disbursement verification step with the ticketing system
    PendingChecking,
    /// Verification skipped or passed; awaiting the disbursement call
    RbdApproval,
    /// Disbursement issued (or scheduled); awaiting provider confirmation
    PendingDisbursement,
    /// Provider confirmed delivery; ticketing acknowledgement outstanding
    Success,
    /// Failed; may be awaiting a scheduled retry or be terminal
    Fail,
    /// A retry was issued; awaiting the next provider confirmation
    Retry,
    /// Success acknowledged by the ticketing system
    Done,
    // Administrative side branches, never reached by the automated path
    Reject,
    OnHold,
    Cancel,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::PendingChecking => "pending_checking",
            RefundStatus::RbdApproval => "rbd_approval",
            RefundStatus::PendingDisbursement => "pending_disbursement",
            RefundStatus::Success => "success",
            RefundStatus::Fail => "fail",
            RefundStatus::Retry => "retry",
            RefundStatus::Done => "done",
            RefundStatus::Reject => "reject",
            RefundStatus::OnHold => "on_hold",
            RefundStatus::Cancel => "cancel",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending_checking" => Some(RefundStatus::PendingChecking),
            "rbd_approval" => Some(RefundStatus::RbdApproval),
            "pending_disbursement" => Some(RefundStatus::PendingDisbursement),
            "success" => Some(RefundStatus::Success),
            "fail" => Some(RefundStatus::Fail),
            "retry" => Some(RefundStatus::Retry),
            "done" => Some(RefundStatus::Done),
            "reject" => Some(RefundStatus::Reject),
            "on_hold" => Some(RefundStatus::OnHold),
            "cancel" => Some(RefundStatus::Cancel),
            _ => None,
        }
    }

    /// Terminal states admit no further automated transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RefundStatus::Done
                | RefundStatus::Reject
                | RefundStatus::OnHold
                | RefundStatus::Cancel
        )
    }

    /// Only failed refunds may be retried
    pub fn allows_retry(&self) -> bool {
        matches!(self, RefundStatus::Fail)
    }

    /// States in which a provider delivery callback is expected
    pub fn awaits_callback(&self) -> bool {
        matches!(self, RefundStatus::PendingDisbursement | RefundStatus::Retry)
    }

    /// Administrative states an operator may move a refund into
    pub fn is_administrative(&self) -> bool {
        matches!(
            self,
            RefundStatus::Reject | RefundStatus::OnHold | RefundStatus::Cancel
        )
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Amount breakdown in minor units; tax is rounded up at computation time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmountBreakdown {
    pub base: i64,
    pub fixed_fee: i64,
    pub percentage_fee: i64,
    pub tax: i64,
    pub total: i64,
}

/// Destination bank snapshot captured at creation time; immutable afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankSnapshot {
    pub bank_code: String,
    pub account_number: String,
    pub account_holder: String,
}

/// One disbursement payload sent to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisbursementAttempt {
    pub external_id: String,
    pub idempotency_key: String,
    pub payload: JsonValue,
    pub sent_at: DateTime<Utc>,
}

/// One webhook payload received from the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackRecord {
    pub provider: String,
    pub external_id: String,
    pub outcome: CallbackOutcome,
    pub raw: JsonValue,
    pub received_at: DateTime<Utc>,
}

/// One outbound notification attempt to the ticketing system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub url: String,
    pub payload: JsonValue,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub acknowledged: bool,
    pub sent_at: DateTime<Utc>,
}

/// The refund aggregate root
#[derive(Debug, Clone)]
pub struct Refund {
    pub id: Uuid,
    /// Unique external refund identifier from the ticketing platform
    pub refund_id: String,
    pub status: RefundStatus,
    /// Base amount in minor units
    pub amount: i64,
    pub breakdown: AmountBreakdown,
    pub bank_data: BankSnapshot,
    pub request_history: Vec<DisbursementAttempt>,
    pub callback_history: Vec<CallbackRecord>,
    pub retry_history: Vec<DateTime<Utc>>,
    pub notification_history: Vec<NotificationRecord>,
    pub retry_at: Option<DateTime<Utc>>,
    /// Target date for a delayed disbursement
    pub disburse_after: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    pub fn new(
        refund_id: impl Into<String>,
        amount: i64,
        breakdown: AmountBreakdown,
        bank_data: BankSnapshot,
        initial_status: RefundStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            refund_id: refund_id.into(),
            status: initial_status,
            amount,
            breakdown,
            bank_data,
            request_history: Vec::new(),
            callback_history: Vec::new(),
            retry_history: Vec::new(),
            notification_history: Vec::new(),
            retry_at: None,
            disburse_after: None,
            settled_at: None,
            version: 0,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Retry sequence number: the number of prior retry attempts
    pub fn sequence(&self) -> usize {
        self.retry_history.len()
    }

    /// Provider-facing external id for the current attempt.
    ///
    /// `{refundId}-{sequence}` once at least one retry has been recorded,
    /// otherwise the refund id unchanged.
    pub fn provider_external_id(&self) -> String {
        let sequence = self.sequence();
        if sequence > 0 {
            format!("{}-{}", self.refund_id, sequence)
        } else {
            self.refund_id.clone()
        }
    }

    /// Idempotency key for the next disbursement request.
    ///
    /// Derived from the number of callbacks received so far, not from the
    /// attempt count: a retry can never collide with an in-flight,
    /// not-yet-acknowledged request.
    pub fn next_idempotency_key(&self) -> String {
        format!("{}-{:03}", self.refund_id, self.callback_history.len() + 1)
    }

    pub fn last_request_external_id(&self) -> Option<&str> {
        self.request_history
            .last()
            .map(|attempt| attempt.external_id.as_str())
    }

    pub fn last_callback_external_id(&self) -> Option<&str> {
        self.callback_history
            .last()
            .map(|record| record.external_id.as_str())
    }

    /// True when the last issued request has no matching delivery
    /// confirmation; issuing another payout now could double-send.
    pub fn has_unacknowledged_request(&self) -> bool {
        match (
            self.last_request_external_id(),
            self.last_callback_external_id(),
        ) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(request), Some(callback)) => request != callback,
        }
    }
}

/// Persistence capability for the refund ledger
#[async_trait]
pub trait RefundRepository: Send + Sync {
    /// Insert a new refund; a duplicate refund_id yields a unique violation
    async fn insert(&self, refund: &Refund) -> Result<Refund, DatabaseError>;

    async fn find_by_refund_id(&self, refund_id: &str) -> Result<Option<Refund>, DatabaseError>;

    /// Find the refund awaiting a callback for this refund id (status
    /// pending_disbursement or retry)
    async fn find_awaiting_callback(
        &self,
        refund_id: &str,
    ) -> Result<Option<Refund>, DatabaseError>;

    /// Persist the aggregate in one atomic write. Fails with a version
    /// conflict if the row changed since it was read.
    async fn update(&self, refund: &Refund) -> Result<Refund, DatabaseError>;

    /// Failed refunds scheduled for retry inside the window
    async fn find_due_for_retry(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Refund>, DatabaseError>;

    /// Delayed refunds whose disbursement target date has arrived and that
    /// have not been sent to the provider yet
    async fn find_due_for_disbursement(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Refund>, DatabaseError>;
}

const REFUND_COLUMNS: &str = "id, refund_id, status, amount, breakdown, bank_data, \
     request_history, callback_history, retry_history, notification_history, \
     retry_at, disburse_after, settled_at, version, is_deleted, created_at, updated_at";

#[derive(Debug, FromRow)]
struct RefundRow {
    id: Uuid,
    refund_id: String,
    status: String,
    amount: i64,
    breakdown: Json<AmountBreakdown>,
    bank_data: Json<BankSnapshot>,
    request_history: Json<Vec<DisbursementAttempt>>,
    callback_history: Json<Vec<CallbackRecord>>,
    retry_history: Json<Vec<DateTime<Utc>>>,
    notification_history: Json<Vec<NotificationRecord>>,
    retry_at: Option<DateTime<Utc>>,
    disburse_after: Option<DateTime<Utc>>,
    settled_at: Option<DateTime<Utc>>,
    version: i32,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RefundRow {
    fn into_refund(self) -> Result<Refund, DatabaseError> {
        let status = RefundStatus::from_db_status(&self.status).ok_or_else(|| {
            DatabaseError::serialization(format!("unknown refund status '{}'", self.status))
        })?;

        Ok(Refund {
            id: self.id,
            refund_id: self.refund_id,
            status,
            amount: self.amount,
            breakdown: self.breakdown.0,
            bank_data: self.bank_data.0,
            request_history: self.request_history.0,
            callback_history: self.callback_history.0,
            retry_history: self.retry_history.0,
            notification_history: self.notification_history.0,
            retry_at: self.retry_at,
            disburse_after: self.disburse_after,
            settled_at: self.settled_at,
            version: self.version,
            is_deleted: self.is_deleted,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Postgres-backed refund ledger
pub struct PgRefundRepository {
    pool: PgPool,
}

impl PgRefundRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefundRepository for PgRefundRepository {
    async fn insert(&self, refund: &Refund) -> Result<Refund, DatabaseError> {
        let row = sqlx::query_as::<_, RefundRow>(&format!(
            "INSERT INTO refunds (id, refund_id, status, amount, breakdown, bank_data, \
             request_history, callback_history, retry_history, notification_history, \
             retry_at, disburse_after, settled_at, version, is_deleted) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {}",
            REFUND_COLUMNS
        ))
        .bind(refund.id)
        .bind(&refund.refund_id)
        .bind(refund.status.as_str())
        .bind(refund.amount)
        .bind(Json(&refund.breakdown))
        .bind(Json(&refund.bank_data))
        .bind(Json(&refund.request_history))
        .bind(Json(&refund.callback_history))
        .bind(Json(&refund.retry_history))
        .bind(Json(&refund.notification_history))
        .bind(refund.retry_at)
        .bind(refund.disburse_after)
        .bind(refund.settled_at)
        .bind(refund.version)
        .bind(refund.is_deleted)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.into_refund()
    }

    async fn find_by_refund_id(&self, refund_id: &str) -> Result<Option<Refund>, DatabaseError> {
        let row = sqlx::query_as::<_, RefundRow>(&format!(
            "SELECT {} FROM refunds WHERE refund_id = $1 AND is_deleted = false",
            REFUND_COLUMNS
        ))
        .bind(refund_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(RefundRow::into_refund).transpose()
    }

    async fn find_awaiting_callback(
        &self,
        refund_id: &str,
    ) -> Result<Option<Refund>, DatabaseError> {
        let row = sqlx::query_as::<_, RefundRow>(&format!(
            "SELECT {} FROM refunds \
             WHERE refund_id = $1 AND status IN ('pending_disbursement', 'retry') \
             AND is_deleted = false",
            REFUND_COLUMNS
        ))
        .bind(refund_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(RefundRow::into_refund).transpose()
    }

    async fn update(&self, refund: &Refund) -> Result<Refund, DatabaseError> {
        let row = sqlx::query_as::<_, RefundRow>(&format!(
            "UPDATE refunds SET status = $3, breakdown = $4, request_history = $5, \
             callback_history = $6, retry_history = $7, notification_history = $8, \
             retry_at = $9, disburse_after = $10, settled_at = $11, is_deleted = $12, \
             version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING {}",
            REFUND_COLUMNS
        ))
        .bind(refund.id)
        .bind(refund.version)
        .bind(refund.status.as_str())
        .bind(Json(&refund.breakdown))
        .bind(Json(&refund.request_history))
        .bind(Json(&refund.callback_history))
        .bind(Json(&refund.retry_history))
        .bind(Json(&refund.notification_history))
        .bind(refund.retry_at)
        .bind(refund.disburse_after)
        .bind(refund.settled_at)
        .bind(refund.is_deleted)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match row {
            Some(row) => row.into_refund(),
            None => Err(DatabaseError::version_conflict(
                "Refund",
                refund.refund_id.clone(),
            )),
        }
    }

    async fn find_due_for_retry(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Refund>, DatabaseError> {
        let rows = sqlx::query_as::<_, RefundRow>(&format!(
            "SELECT {} FROM refunds \
             WHERE status = 'fail' AND retry_at IS NOT NULL \
             AND retry_at >= $1 AND retry_at <= $2 AND is_deleted = false \
             ORDER BY retry_at ASC",
            REFUND_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        rows.into_iter().map(RefundRow::into_refund).collect()
    }

    async fn find_due_for_disbursement(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Refund>, DatabaseError> {
        let rows = sqlx::query_as::<_, RefundRow>(&format!(
            "SELECT {} FROM refunds \
             WHERE status = 'pending_disbursement' AND disburse_after IS NOT NULL \
             AND disburse_after <= $1 AND request_history = '[]'::jsonb \
             AND is_deleted = false \
             ORDER BY disburse_after ASC",
            REFUND_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        rows.into_iter().map(RefundRow::into_refund).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn refund() -> Refund {
        Refund::new(
            "R100",
            150_000,
            AmountBreakdown {
                base: 150_000,
                fixed_fee: 5_000,
                percentage_fee: 2_250,
                tax: 798,
                total: 158_048,
            },
            BankSnapshot {
                bank_code: "BCA".to_string(),
                account_number: "1234567890".to_string(),
                account_holder: "BUDI SANTOSO".to_string(),
            },
            RefundStatus::RbdApproval,
        )
    }

    fn push_request(refund: &mut Refund) {
        let external_id = refund.provider_external_id();
        let idempotency_key = refund.next_idempotency_key();
        refund.request_history.push(DisbursementAttempt {
            external_id,
            idempotency_key,
            payload: json!({}),
            sent_at: Utc::now(),
        });
    }

    fn push_callback(refund: &mut Refund, external_id: &str, outcome: CallbackOutcome) {
        refund.callback_history.push(CallbackRecord {
            provider: "nexadisburse".to_string(),
            external_id: external_id.to_string(),
            outcome,
            raw: json!({}),
            received_at: Utc::now(),
        });
    }

    #[test]
    fn external_id_is_plain_for_first_attempt() {
        let refund = refund();
        assert_eq!(refund.provider_external_id(), "R100");
    }

    #[test]
    fn external_id_carries_retry_sequence() {
        let mut refund = refund();
        refund.retry_history.push(Utc::now());
        refund.retry_history.push(Utc::now());
        assert_eq!(refund.provider_external_id(), "R100-2");
    }

    #[test]
    fn idempotency_key_follows_callback_count() {
        let mut refund = refund();
        assert_eq!(refund.next_idempotency_key(), "R100-001");

        push_callback(&mut refund, "R100", CallbackOutcome::Pending);
        push_callback(
            &mut refund,
            "R100",
            CallbackOutcome::Failed {
                code: "BANK_TIMEOUT".to_string(),
            },
        );
        assert_eq!(refund.next_idempotency_key(), "R100-003");
    }

    #[test]
    fn unacknowledged_request_is_detected() {
        let mut refund = refund();
        assert!(!refund.has_unacknowledged_request());

        push_request(&mut refund);
        assert!(refund.has_unacknowledged_request());

        push_callback(&mut refund, "R100", CallbackOutcome::Completed);
        assert!(!refund.has_unacknowledged_request());

        refund.retry_history.push(Utc::now());
        push_request(&mut refund);
        assert!(refund.has_unacknowledged_request());

        push_callback(&mut refund, "R100-1", CallbackOutcome::Completed);
        assert!(!refund.has_unacknowledged_request());
    }

    #[test]
    fn request_count_tracks_retry_count_at_issue_time() {
        let mut refund = refund();
        push_request(&mut refund);
        assert_eq!(refund.request_history.len() - 1, refund.retry_history.len());

        push_callback(
            &mut refund,
            "R100",
            CallbackOutcome::Failed {
                code: "BANK_TIMEOUT".to_string(),
            },
        );
        refund.retry_history.push(Utc::now());
        push_request(&mut refund);
        assert_eq!(refund.request_history.len() - 1, refund.retry_history.len());
    }

    #[test]
    fn status_round_trips_through_db_strings() {
        for status in [
            RefundStatus::PendingChecking,
            RefundStatus::RbdApproval,
            RefundStatus::PendingDisbursement,
            RefundStatus::Success,
            RefundStatus::Fail,
            RefundStatus::Retry,
            RefundStatus::Done,
            RefundStatus::Reject,
            RefundStatus::OnHold,
            RefundStatus::Cancel,
        ] {
            assert_eq!(RefundStatus::from_db_status(status.as_str()), Some(status));
        }
        assert_eq!(RefundStatus::from_db_status("nonsense"), None);
    }

    #[test]
    fn callback_states_await_callbacks() {
        assert!(RefundStatus::PendingDisbursement.awaits_callback());
        assert!(RefundStatus::Retry.awaits_callback());
        assert!(!RefundStatus::Fail.awaits_callback());
        assert!(RefundStatus::Fail.allows_retry());
        assert!(RefundStatus::Done.is_terminal());
    }
}
