use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::error::DatabaseError;

/// Lifecycle of one account validation record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Pending,
    Completed,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Completed => "completed",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(ValidationStatus::Pending),
            "completed" => Some(ValidationStatus::Completed),
            _ => None,
        }
    }
}

/// Terminal result of a completed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Success,
    Failed,
}

impl ValidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationOutcome::Success => "success",
            ValidationOutcome::Failed => "failed",
        }
    }

    pub fn from_db_outcome(outcome: &str) -> Option<Self> {
        match outcome {
            "success" => Some(ValidationOutcome::Success),
            "failed" => Some(ValidationOutcome::Failed),
            _ => None,
        }
    }
}

/// One validation of a destination account, reusable until its TTL lapses.
///
/// `consumed` marks records abandoned after a transport failure; they no
/// longer count as pending and never serve as a cache hit.
#[derive(Debug, Clone)]
pub struct AccountValidationRecord {
    pub id: Uuid,
    pub account_number: String,
    pub status: ValidationStatus,
    pub outcome: Option<ValidationOutcome>,
    pub account_name: Option<String>,
    pub poll_reference: Option<String>,
    pub raw: Option<JsonValue>,
    pub consumed: bool,
    pub checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AccountValidationRecord {
    /// A completed record may serve as a cache hit while younger than the TTL
    pub fn is_fresh(&self, ttl_days: i64, now: DateTime<Utc>) -> bool {
        if self.status != ValidationStatus::Completed || self.consumed {
            return false;
        }
        match self.checked_at {
            Some(checked_at) => now - checked_at < chrono::Duration::days(ttl_days),
            None => false,
        }
    }
}

/// One request or poll round trip against the inquiry provider
#[derive(Debug, Clone, FromRow)]
pub struct ValidationAuditEntry {
    pub id: Uuid,
    pub account_number: String,
    /// "initial" for the first inquiry, "poll" for each follow-up
    pub stage: String,
    pub attempt: i32,
    pub response: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AccountValidationRepository: Send + Sync {
    /// Most recent non-consumed record for the account, completed or pending
    async fn find_latest(
        &self,
        account_number: &str,
    ) -> Result<Option<AccountValidationRecord>, DatabaseError>;

    async fn insert_pending(
        &self,
        account_number: &str,
    ) -> Result<AccountValidationRecord, DatabaseError>;

    async fn set_poll_reference(
        &self,
        id: Uuid,
        poll_reference: &str,
    ) -> Result<(), DatabaseError>;

    async fn complete(
        &self,
        id: Uuid,
        outcome: ValidationOutcome,
        account_name: Option<&str>,
        raw: &JsonValue,
    ) -> Result<(), DatabaseError>;

    /// Abandon a record after a transport failure so it stops blocking new checks
    async fn mark_consumed(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// Pending records with a poll reference, oldest first. Used to resume
    /// in-flight inquiries after a restart.
    async fn list_pending(&self) -> Result<Vec<AccountValidationRecord>, DatabaseError>;

    async fn append_audit(
        &self,
        account_number: &str,
        stage: &str,
        attempt: i32,
        response: &JsonValue,
    ) -> Result<(), DatabaseError>;

    async fn list_audit(
        &self,
        account_number: &str,
    ) -> Result<Vec<ValidationAuditEntry>, DatabaseError>;
}

pub struct PgAccountValidationRepository {
    pool: PgPool,
}

impl PgAccountValidationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const VALIDATION_COLUMNS: &str = "id, account_number, status, outcome, account_name, \
     poll_reference, raw, consumed, checked_at, created_at";

#[derive(Debug, FromRow)]
struct ValidationRow {
    id: Uuid,
    account_number: String,
    status: String,
    outcome: Option<String>,
    account_name: Option<String>,
    poll_reference: Option<String>,
    raw: Option<JsonValue>,
    consumed: bool,
    checked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ValidationRow {
    fn into_record(self) -> Result<AccountValidationRecord, DatabaseError> {
        let status = ValidationStatus::from_db_status(&self.status).ok_or_else(|| {
            DatabaseError::serialization(format!("unknown validation status '{}'", self.status))
        })?;
        let outcome = match self.outcome.as_deref() {
            Some(raw) => Some(ValidationOutcome::from_db_outcome(raw).ok_or_else(|| {
                DatabaseError::serialization(format!("unknown validation outcome '{}'", raw))
            })?),
            None => None,
        };

        Ok(AccountValidationRecord {
            id: self.id,
            account_number: self.account_number,
            status,
            outcome,
            account_name: self.account_name,
            poll_reference: self.poll_reference,
            raw: self.raw,
            consumed: self.consumed,
            checked_at: self.checked_at,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl AccountValidationRepository for PgAccountValidationRepository {
    async fn find_latest(
        &self,
        account_number: &str,
    ) -> Result<Option<AccountValidationRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, ValidationRow>(&format!(
            "SELECT {} FROM account_validations \
             WHERE account_number = $1 AND consumed = false \
             ORDER BY created_at DESC LIMIT 1",
            VALIDATION_COLUMNS
        ))
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(ValidationRow::into_record).transpose()
    }

    async fn insert_pending(
        &self,
        account_number: &str,
    ) -> Result<AccountValidationRecord, DatabaseError> {
        let row = sqlx::query_as::<_, ValidationRow>(&format!(
            "INSERT INTO account_validations (id, account_number, status, consumed) \
             VALUES ($1, $2, 'pending', false) \
             RETURNING {}",
            VALIDATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(account_number)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.into_record()
    }

    async fn set_poll_reference(
        &self,
        id: Uuid,
        poll_reference: &str,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE account_validations SET poll_reference = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(poll_reference)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("AccountValidation", id.to_string()));
        }
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        outcome: ValidationOutcome,
        account_name: Option<&str>,
        raw: &JsonValue,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE account_validations \
             SET status = 'completed', outcome = $2, account_name = $3, raw = $4, \
                 checked_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(outcome.as_str())
        .bind(account_name)
        .bind(raw)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("AccountValidation", id.to_string()));
        }
        Ok(())
    }

    async fn mark_consumed(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE account_validations SET consumed = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("AccountValidation", id.to_string()));
        }
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<AccountValidationRecord>, DatabaseError> {
        let rows = sqlx::query_as::<_, ValidationRow>(&format!(
            "SELECT {} FROM account_validations \
             WHERE status = 'pending' AND consumed = false \
             AND poll_reference IS NOT NULL \
             ORDER BY created_at ASC",
            VALIDATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        rows.into_iter().map(ValidationRow::into_record).collect()
    }

    async fn append_audit(
        &self,
        account_number: &str,
        stage: &str,
        attempt: i32,
        response: &JsonValue,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO account_validation_audit \
             (id, account_number, stage, attempt, response) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(account_number)
        .bind(stage)
        .bind(attempt)
        .bind(response)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    async fn list_audit(
        &self,
        account_number: &str,
    ) -> Result<Vec<ValidationAuditEntry>, DatabaseError> {
        sqlx::query_as::<_, ValidationAuditEntry>(
            "SELECT id, account_number, stage, attempt, response, created_at \
             FROM account_validation_audit \
             WHERE account_number = $1 \
             ORDER BY created_at ASC",
        )
        .bind(account_number)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(status: ValidationStatus, checked_at: Option<DateTime<Utc>>) -> AccountValidationRecord {
        AccountValidationRecord {
            id: Uuid::new_v4(),
            account_number: "1234567890".to_string(),
            status,
            outcome: Some(ValidationOutcome::Success),
            account_name: Some("BUDI SANTOSO".to_string()),
            poll_reference: None,
            raw: None,
            consumed: false,
            checked_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn completed_recent_record_is_fresh() {
        let now = Utc::now();
        let rec = record(ValidationStatus::Completed, Some(now - Duration::days(2)));
        assert!(rec.is_fresh(7, now));
    }

    #[test]
    fn expired_record_is_stale() {
        let now = Utc::now();
        let rec = record(ValidationStatus::Completed, Some(now - Duration::days(8)));
        assert!(!rec.is_fresh(7, now));
    }

    #[test]
    fn pending_or_consumed_record_is_never_fresh() {
        let now = Utc::now();
        let rec = record(ValidationStatus::Pending, None);
        assert!(!rec.is_fresh(7, now));

        let mut rec = record(ValidationStatus::Completed, Some(now));
        rec.consumed = true;
        assert!(!rec.is_fresh(7, now));
    }
}
