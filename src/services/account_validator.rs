//! Destination account validation
//!
//! Validations are expensive provider calls, so completed results are
//! reused until their TTL lapses. Only one validation per account number
//! may be in flight; a second request while one is pending is rejected.
//! Every round trip against the provider lands in the audit trail.

use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::database::account_validation_repository::{
    AccountValidationRepository, AccountValidationRecord, ValidationOutcome, ValidationStatus,
};
use crate::database::bank_mapping_repository::BankMappingRepository;
use crate::error::{AppError, AppResult, DomainError};
use crate::gateway::types::{AccountCheckRequest, InquiryReply};
use crate::gateway::GatewayAdapter;
use crate::settings::Settings;
use crate::signer::Signer;
use crate::sync::KeyedMutex;

/// Caller-facing validation result, signed so downstream consumers can
/// verify it was produced here
#[derive(Debug, Clone)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub account_name: Option<String>,
    /// True when served from a previous validation inside its TTL
    pub cached: bool,
    pub signature: String,
}

/// Classify a terminal inquiry reply. An account is a valid destination
/// when it exists and is not a virtual account; the reported holder name
/// is informational.
pub fn classify_terminal(found: bool, virtual_account: bool) -> ValidationOutcome {
    if found && !virtual_account {
        ValidationOutcome::Success
    } else {
        ValidationOutcome::Failed
    }
}

pub struct AccountValidator {
    banks: Arc<dyn BankMappingRepository>,
    validations: Arc<dyn AccountValidationRepository>,
    inquirer: Arc<dyn GatewayAdapter>,
    settings: Settings,
    signer: Arc<dyn Signer>,
    locks: Arc<KeyedMutex>,
}

impl AccountValidator {
    pub fn new(
        banks: Arc<dyn BankMappingRepository>,
        validations: Arc<dyn AccountValidationRepository>,
        inquirer: Arc<dyn GatewayAdapter>,
        settings: Settings,
        signer: Arc<dyn Signer>,
        locks: Arc<KeyedMutex>,
    ) -> Self {
        Self {
            banks,
            validations,
            inquirer,
            settings,
            signer,
            locks,
        }
    }

    /// Validate a destination account, serving from cache when a fresh
    /// result exists.
    pub async fn check_account(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> AppResult<ValidationVerdict> {
        let mapping = self
            .banks
            .find_by_bank_code(bank_code)
            .await
            .map_err(AppError::from)?
            .filter(|m| m.enabled && m.inquiry_code.is_some())
            .ok_or_else(|| {
                AppError::domain(DomainError::BankNotFound {
                    bank_code: bank_code.to_string(),
                })
            })?;
        // filter() above guarantees the code is present
        let inquiry_code = mapping.inquiry_code.clone().unwrap_or_default();

        let _guard = self.locks.acquire(account_number).await;

        let ttl_days = self.settings.validation_ttl_days().await;
        if let Some(record) = self
            .validations
            .find_latest(account_number)
            .await
            .map_err(AppError::from)?
        {
            if record.is_fresh(ttl_days, chrono::Utc::now()) {
                info!(account_number, "validation served from cache");
                return self.verdict_from_record(&record, true);
            }
            if record.status == ValidationStatus::Pending {
                return Err(AppError::domain(DomainError::AlreadyChecking {
                    account_number: account_number.to_string(),
                }));
            }
        }

        let record = self
            .validations
            .insert_pending(account_number)
            .await
            .map_err(AppError::from)?;

        let reply = match self
            .inquirer
            .validate_account(&AccountCheckRequest {
                inquiry_code,
                account_number: account_number.to_string(),
            })
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                // The failed round trip is audited too, then the record is
                // abandoned so the account is not stuck "checking"
                self.audit_lossy(account_number, "initial", 1, json!({ "error": e.to_string() }))
                    .await;
                self.abandon(&record).await;
                return Err(e.into());
            }
        };

        self.audit(account_number, "initial", 1, reply_raw(&reply))
            .await?;

        match reply {
            InquiryReply::Terminal {
                found,
                virtual_account,
                account_name,
                raw,
            } => {
                self.complete(&record, found, virtual_account, account_name, raw)
                    .await
            }
            InquiryReply::Pending { poll_reference, .. } => {
                self.validations
                    .set_poll_reference(record.id, &poll_reference)
                    .await
                    .map_err(AppError::from)?;
                self.poll_until_terminal(&record, account_number, &poll_reference)
                    .await
            }
        }
    }

    /// Poll a pending inquiry to completion. Used inline after a pending
    /// initial reply and by the poller worker for records that outlived a
    /// restart.
    pub async fn poll_until_terminal(
        &self,
        record: &AccountValidationRecord,
        account_number: &str,
        poll_reference: &str,
    ) -> AppResult<ValidationVerdict> {
        let max_attempts = self.settings.poll_max_attempts().await;
        let interval = Duration::from_secs(self.settings.poll_interval_secs().await);

        for attempt in 1..=max_attempts {
            tokio::time::sleep(interval).await;

            let reply = match self.inquirer.poll_result(poll_reference).await {
                Ok(reply) => reply,
                Err(e) => {
                    self.audit_lossy(
                        account_number,
                        "poll",
                        attempt as i32,
                        json!({ "error": e.to_string() }),
                    )
                    .await;
                    self.abandon(record).await;
                    return Err(e.into());
                }
            };

            self.audit(account_number, "poll", attempt as i32, reply_raw(&reply))
                .await?;

            match reply {
                InquiryReply::Terminal {
                    found,
                    virtual_account,
                    account_name,
                    raw,
                } => {
                    return self
                        .complete(record, found, virtual_account, account_name, raw)
                        .await;
                }
                InquiryReply::Pending { .. } => continue,
            }
        }

        warn!(
            account_number,
            max_attempts, "inquiry still pending after poll budget, recording failure"
        );
        self.validations
            .complete(
                record.id,
                ValidationOutcome::Failed,
                None,
                &json!({ "reason": "poll budget exhausted" }),
            )
            .await
            .map_err(AppError::from)?;

        self.verdict(ValidationOutcome::Failed, None, false, account_number)
    }

    async fn complete(
        &self,
        record: &AccountValidationRecord,
        found: bool,
        virtual_account: bool,
        account_name: Option<String>,
        raw: JsonValue,
    ) -> AppResult<ValidationVerdict> {
        let outcome = classify_terminal(found, virtual_account);

        self.validations
            .complete(record.id, outcome, account_name.as_deref(), &raw)
            .await
            .map_err(AppError::from)?;

        info!(
            account_number = %record.account_number,
            outcome = outcome.as_str(),
            "account validation completed"
        );

        self.verdict(outcome, account_name, false, &record.account_number)
    }

    async fn abandon(&self, record: &AccountValidationRecord) {
        if let Err(e) = self.validations.mark_consumed(record.id).await {
            warn!(
                account_number = %record.account_number,
                error = %e,
                "failed to abandon validation record"
            );
        }
    }

    async fn audit(
        &self,
        account_number: &str,
        stage: &str,
        attempt: i32,
        response: JsonValue,
    ) -> AppResult<()> {
        self.validations
            .append_audit(account_number, stage, attempt, &response)
            .await
            .map_err(AppError::from)
    }

    /// Audit on an error path: the original failure is what the caller
    /// must see, so an audit write failure is only logged.
    async fn audit_lossy(
        &self,
        account_number: &str,
        stage: &str,
        attempt: i32,
        response: JsonValue,
    ) {
        if let Err(e) = self.audit(account_number, stage, attempt, response).await {
            warn!(account_number, error = %e, "failed to record audit entry");
        }
    }

    fn verdict_from_record(
        &self,
        record: &AccountValidationRecord,
        cached: bool,
    ) -> AppResult<ValidationVerdict> {
        let outcome = record.outcome.unwrap_or(ValidationOutcome::Failed);
        self.verdict(
            outcome,
            record.account_name.clone(),
            cached,
            &record.account_number,
        )
    }

    fn verdict(
        &self,
        outcome: ValidationOutcome,
        account_name: Option<String>,
        cached: bool,
        account_number: &str,
    ) -> AppResult<ValidationVerdict> {
        let message = format!("{}:{}", account_number, outcome.as_str());
        let signature = self.signer.sign(message.as_bytes())?;

        Ok(ValidationVerdict {
            valid: outcome == ValidationOutcome::Success,
            account_name,
            cached,
            signature,
        })
    }
}

fn reply_raw(reply: &InquiryReply) -> JsonValue {
    match reply {
        InquiryReply::Terminal { raw, .. } => raw.clone(),
        InquiryReply::Pending { raw, .. } => raw.clone(),
    }
}
