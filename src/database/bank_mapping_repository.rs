use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::error::DatabaseError;

/// A bank known to the platform, with the provider-specific codes it maps to.
///
/// `disburse_code` routes payouts, `inquiry_code` routes account checks; a
/// bank missing either is not eligible for automated refunds.
#[derive(Debug, Clone, FromRow)]
pub struct BankMapping {
    pub id: Uuid,
    pub bank_code: String,
    pub bank_name: String,
    pub disburse_code: Option<String>,
    pub inquiry_code: Option<String>,
    pub enabled: bool,
    pub disburse_meta: Option<JsonValue>,
    pub inquiry_meta: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankMapping {
    /// Eligible for automated disbursement: enabled and mapped on both providers
    pub fn is_eligible(&self) -> bool {
        self.enabled && self.disburse_code.is_some() && self.inquiry_code.is_some()
    }
}

/// Fields written by the bank catalogue sync
#[derive(Debug, Clone)]
pub struct BankMappingUpsert {
    pub bank_code: String,
    pub bank_name: String,
    pub disburse_code: Option<String>,
    pub inquiry_code: Option<String>,
    pub disburse_meta: Option<JsonValue>,
    pub inquiry_meta: Option<JsonValue>,
}

#[async_trait]
pub trait BankMappingRepository: Send + Sync {
    async fn find_by_bank_code(
        &self,
        bank_code: &str,
    ) -> Result<Option<BankMapping>, DatabaseError>;

    async fn list(&self) -> Result<Vec<BankMapping>, DatabaseError>;

    /// Insert or refresh a mapping keyed by bank_code. The enabled flag is
    /// operator-controlled and never touched by sync.
    async fn upsert(&self, mapping: &BankMappingUpsert) -> Result<BankMapping, DatabaseError>;
}

pub struct PgBankMappingRepository {
    pool: PgPool,
}

impl PgBankMappingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BANK_COLUMNS: &str = "id, bank_code, bank_name, disburse_code, inquiry_code, \
     enabled, disburse_meta, inquiry_meta, created_at, updated_at";

#[async_trait]
impl BankMappingRepository for PgBankMappingRepository {
    async fn find_by_bank_code(
        &self,
        bank_code: &str,
    ) -> Result<Option<BankMapping>, DatabaseError> {
        sqlx::query_as::<_, BankMapping>(&format!(
            "SELECT {} FROM bank_mappings WHERE bank_code = $1",
            BANK_COLUMNS
        ))
        .bind(bank_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list(&self) -> Result<Vec<BankMapping>, DatabaseError> {
        sqlx::query_as::<_, BankMapping>(&format!(
            "SELECT {} FROM bank_mappings ORDER BY bank_code ASC",
            BANK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn upsert(&self, mapping: &BankMappingUpsert) -> Result<BankMapping, DatabaseError> {
        sqlx::query_as::<_, BankMapping>(&format!(
            "INSERT INTO bank_mappings \
             (id, bank_code, bank_name, disburse_code, inquiry_code, enabled, \
              disburse_meta, inquiry_meta) \
             VALUES ($1, $2, $3, $4, $5, true, $6, $7) \
             ON CONFLICT (bank_code) DO UPDATE SET \
               bank_name = EXCLUDED.bank_name, \
               disburse_code = EXCLUDED.disburse_code, \
               inquiry_code = EXCLUDED.inquiry_code, \
               disburse_meta = EXCLUDED.disburse_meta, \
               inquiry_meta = EXCLUDED.inquiry_meta, \
               updated_at = NOW() \
             RETURNING {}",
            BANK_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&mapping.bank_code)
        .bind(&mapping.bank_name)
        .bind(&mapping.disburse_code)
        .bind(&mapping.inquiry_code)
        .bind(&mapping.disburse_meta)
        .bind(&mapping.inquiry_meta)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
