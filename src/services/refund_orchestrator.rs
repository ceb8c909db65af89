//! Refund lifecycle orchestration
//!
//! Creates refunds, issues disbursements, and drives retries. All work on
//! one refund is serialized through a per-refund lock, and every
//! persistence step is a single atomic write guarded by the aggregate
//! version, so a webhook arriving mid-operation can never interleave.

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::database::bank_mapping_repository::BankMappingRepository;
use crate::database::refund_repository::{
    BankSnapshot, DisbursementAttempt, Refund, RefundRepository, RefundStatus,
};
use crate::error::{AppError, AppResult, DomainError};
use crate::gateway::types::DisbursementRequest;
use crate::gateway::GatewayAdapter;
use crate::services::fees::FeePolicy;
use crate::services::ticketing::TicketingClient;
use crate::settings::Settings;
use crate::sync::KeyedMutex;

/// Inbound refund creation request
#[derive(Debug, Clone)]
pub struct CreateRefundRequest {
    pub refund_id: String,
    /// Base amount in minor units
    pub amount: i64,
    pub bank_code: String,
    pub account_number: String,
    pub account_holder: String,
    pub remark: Option<String>,
    /// When set, the refund parks in pending_checking until approved
    pub requires_checking: bool,
}

/// Creation result. A provider rejection at creation time is not an error:
/// the refund exists in `fail` state and carries the rejection message.
#[derive(Debug, Clone)]
pub struct CreateRefundResponse {
    pub refund: Refund,
    pub disbursement_issued: bool,
    pub failure: Option<String>,
}

/// Which lifecycle step a disbursement call belongs to; decides the
/// status written after the provider accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IssuePhase {
    Initial,
    Retry,
}

pub struct RefundOrchestrator {
    refunds: Arc<dyn RefundRepository>,
    banks: Arc<dyn BankMappingRepository>,
    disburser: Arc<dyn GatewayAdapter>,
    ticketing: Arc<dyn TicketingClient>,
    settings: Settings,
    fee_policy: FeePolicy,
    locks: Arc<KeyedMutex>,
    fetch_detail: bool,
}

impl RefundOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        refunds: Arc<dyn RefundRepository>,
        banks: Arc<dyn BankMappingRepository>,
        disburser: Arc<dyn GatewayAdapter>,
        ticketing: Arc<dyn TicketingClient>,
        settings: Settings,
        fee_policy: FeePolicy,
        locks: Arc<KeyedMutex>,
        fetch_detail: bool,
    ) -> Self {
        Self {
            refunds,
            banks,
            disburser,
            ticketing,
            settings,
            fee_policy,
            locks,
            fetch_detail,
        }
    }

    /// Create a refund and, unless it is parked for checking or delayed,
    /// issue its first disbursement.
    pub async fn create(&self, request: CreateRefundRequest) -> AppResult<CreateRefundResponse> {
        let _guard = self.locks.acquire(&request.refund_id).await;

        if self
            .refunds
            .find_by_refund_id(&request.refund_id)
            .await
            .map_err(AppError::from)?
            .is_some()
        {
            return Err(AppError::domain(DomainError::DuplicateRefund {
                refund_id: request.refund_id,
            }));
        }

        let mapping = self
            .banks
            .find_by_bank_code(&request.bank_code)
            .await
            .map_err(AppError::from)?
            .filter(|m| m.is_eligible())
            .ok_or_else(|| {
                AppError::domain(DomainError::BankNotFound {
                    bank_code: request.bank_code.clone(),
                })
            })?;

        let breakdown = self.fee_policy.breakdown(request.amount)?;

        // The ticketing platform is the source of truth for the refund; a
        // refund it does not know about must not be created here.
        if self.fetch_detail {
            self.ticketing
                .fetch_refund_detail(&request.refund_id)
                .await?;
        }

        let initial_status = if request.requires_checking {
            RefundStatus::PendingChecking
        } else {
            RefundStatus::RbdApproval
        };

        let refund = Refund::new(
            request.refund_id.clone(),
            request.amount,
            breakdown,
            BankSnapshot {
                bank_code: mapping
                    .disburse_code
                    .clone()
                    .unwrap_or_else(|| mapping.bank_code.clone()),
                account_number: request.account_number.clone(),
                account_holder: request.account_holder.clone(),
            },
            initial_status,
        );

        let refund = self.refunds.insert(&refund).await.map_err(|e| {
            if e.is_unique_violation() {
                AppError::domain(DomainError::DuplicateRefund {
                    refund_id: request.refund_id.clone(),
                })
            } else {
                e.into()
            }
        })?;

        info!(
            refund_id = %refund.refund_id,
            amount = refund.amount,
            status = %refund.status,
            "refund created"
        );

        if request.requires_checking {
            return Ok(CreateRefundResponse {
                refund,
                disbursement_issued: false,
                failure: None,
            });
        }

        self.start_disbursement(refund, request.remark).await
    }

    /// Approve a refund parked in pending_checking and issue its disbursement.
    pub async fn approve(&self, refund_id: &str) -> AppResult<CreateRefundResponse> {
        let _guard = self.locks.acquire(refund_id).await;

        let refund = self.find_required(refund_id).await?;
        if refund.status != RefundStatus::PendingChecking {
            return Err(AppError::domain(DomainError::InvalidState {
                refund_id: refund_id.to_string(),
                status: refund.status.as_str().to_string(),
                action: "approve",
            }));
        }

        self.start_disbursement(refund, None).await
    }

    /// Shared tail of create/approve: apply the delay policy or issue now.
    async fn start_disbursement(
        &self,
        mut refund: Refund,
        remark: Option<String>,
    ) -> AppResult<CreateRefundResponse> {
        let delay_days = self.settings.disbursement_delay_days().await;
        if delay_days > 0 {
            refund.status = RefundStatus::PendingDisbursement;
            refund.disburse_after = Some(Utc::now() + Duration::days(delay_days));
            let refund = self.refunds.update(&refund).await.map_err(AppError::from)?;

            info!(
                refund_id = %refund.refund_id,
                disburse_after = ?refund.disburse_after,
                "disbursement delayed by policy"
            );
            return Ok(CreateRefundResponse {
                refund,
                disbursement_issued: false,
                failure: None,
            });
        }

        match self
            .issue_disbursement(refund, IssuePhase::Initial, remark)
            .await
        {
            Ok(refund) => Ok(CreateRefundResponse {
                refund,
                disbursement_issued: true,
                failure: None,
            }),
            Err((refund, error)) => {
                warn!(
                    refund_id = %refund.refund_id,
                    error = %error,
                    "disbursement rejected at creation"
                );
                Ok(CreateRefundResponse {
                    refund,
                    disbursement_issued: false,
                    failure: Some(error.user_message()),
                })
            }
        }
    }

    /// Retry a failed refund. Refuses when the retry budget is exhausted or
    /// the last request is still unacknowledged.
    pub async fn retry_disbursement(&self, refund_id: &str) -> AppResult<Refund> {
        let _guard = self.locks.acquire(refund_id).await;

        let mut refund = self.find_required(refund_id).await?;

        if !refund.status.allows_retry() {
            return Err(AppError::domain(DomainError::InvalidState {
                refund_id: refund_id.to_string(),
                status: refund.status.as_str().to_string(),
                action: "retry",
            }));
        }

        let max_attempts = self.settings.max_retry_attempts().await as usize;
        if refund.retry_history.len() >= max_attempts {
            return Err(AppError::domain(DomainError::RetryExhausted {
                refund_id: refund_id.to_string(),
                attempts: refund.retry_history.len(),
            }));
        }

        if refund.has_unacknowledged_request() {
            return Err(AppError::domain(DomainError::UnacknowledgedRequest {
                refund_id: refund_id.to_string(),
            }));
        }

        refund.retry_history.push(Utc::now());
        refund.retry_at = None;

        match self
            .issue_disbursement(refund, IssuePhase::Retry, None)
            .await
        {
            Ok(refund) => {
                info!(
                    refund_id = %refund.refund_id,
                    attempt = refund.retry_history.len(),
                    "retry disbursement issued"
                );
                Ok(refund)
            }
            Err((refund, error)) => {
                warn!(
                    refund_id = %refund.refund_id,
                    attempt = refund.retry_history.len(),
                    error = %error,
                    "retry disbursement rejected"
                );
                Err(error)
            }
        }
    }

    /// Issue the disbursement for a refund whose delay window has lapsed.
    pub async fn dispatch_delayed(&self, refund_id: &str) -> AppResult<Refund> {
        let _guard = self.locks.acquire(refund_id).await;

        let refund = self.find_required(refund_id).await?;

        let due = refund.status == RefundStatus::PendingDisbursement
            && refund.request_history.is_empty()
            && refund
                .disburse_after
                .map(|at| at <= Utc::now())
                .unwrap_or(false);
        if !due {
            return Err(AppError::domain(DomainError::InvalidState {
                refund_id: refund_id.to_string(),
                status: refund.status.as_str().to_string(),
                action: "dispatch_delayed",
            }));
        }

        match self
            .issue_disbursement(refund, IssuePhase::Initial, None)
            .await
        {
            Ok(refund) => Ok(refund),
            Err((_, error)) => Err(error),
        }
    }

    /// Move a refund into an operator-controlled side state.
    pub async fn mark_administrative(
        &self,
        refund_id: &str,
        target: RefundStatus,
    ) -> AppResult<Refund> {
        if !target.is_administrative() {
            return Err(AppError::internal(format!(
                "'{}' is not an administrative state",
                target
            )));
        }

        let _guard = self.locks.acquire(refund_id).await;

        let mut refund = self.find_required(refund_id).await?;
        if refund.status.is_terminal() {
            return Err(AppError::domain(DomainError::InvalidState {
                refund_id: refund_id.to_string(),
                status: refund.status.as_str().to_string(),
                action: "mark_administrative",
            }));
        }

        refund.status = target;
        let refund = self.refunds.update(&refund).await.map_err(AppError::from)?;

        info!(refund_id = %refund.refund_id, status = %refund.status, "refund moved to administrative state");
        Ok(refund)
    }

    async fn find_required(&self, refund_id: &str) -> AppResult<Refund> {
        self.refunds
            .find_by_refund_id(refund_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| {
                AppError::domain(DomainError::RefundNotFound {
                    refund_id: refund_id.to_string(),
                })
            })
    }

    /// Send one disbursement request.
    ///
    /// Two atomic writes: the attempt is recorded before the provider call
    /// so a crash mid-call leaves an unacknowledged request on record, and
    /// the status lands after the provider answers. Returns the refund in
    /// both arms so callers can report its final state.
    async fn issue_disbursement(
        &self,
        mut refund: Refund,
        phase: IssuePhase,
        remark: Option<String>,
    ) -> Result<Refund, (Refund, AppError)> {
        if refund.has_unacknowledged_request() {
            let error = AppError::domain(DomainError::UnacknowledgedRequest {
                refund_id: refund.refund_id.clone(),
            });
            return Err((refund, error));
        }

        let external_id = refund.provider_external_id();
        let idempotency_key = refund.next_idempotency_key();

        let request = DisbursementRequest {
            external_id: external_id.clone(),
            bank_code: refund.bank_data.bank_code.clone(),
            account_number: refund.bank_data.account_number.clone(),
            account_holder: refund.bank_data.account_holder.clone(),
            amount: refund.amount,
            remark,
        };

        refund.request_history.push(DisbursementAttempt {
            external_id: external_id.clone(),
            idempotency_key: idempotency_key.clone(),
            payload: json!({
                "external_id": request.external_id,
                "bank_code": request.bank_code,
                "account_number": request.account_number,
                "account_holder": request.account_holder,
                "amount": request.amount,
                "remark": request.remark,
            }),
            sent_at: Utc::now(),
        });

        let mut refund = match self.refunds.update(&refund).await {
            Ok(refund) => refund,
            Err(e) => {
                // Nothing was sent; safe to surface without a state change
                let mut rolled_back = refund;
                rolled_back.request_history.pop();
                return Err((rolled_back, e.into()));
            }
        };

        let call = self
            .disburser
            .disbursement(&idempotency_key, &request)
            .await;

        match call {
            Ok(ack) if ack.accepted => {
                refund.status = match phase {
                    IssuePhase::Initial => RefundStatus::PendingDisbursement,
                    IssuePhase::Retry => RefundStatus::Retry,
                };
                match self.refunds.update(&refund).await {
                    Ok(refund) => {
                        info!(
                            refund_id = %refund.refund_id,
                            external_id = %external_id,
                            idempotency_key = %idempotency_key,
                            "disbursement accepted"
                        );
                        Ok(refund)
                    }
                    Err(e) => Err((refund, e.into())),
                }
            }
            Ok(ack) => {
                refund.status = RefundStatus::Fail;
                let error = AppError::internal(format!(
                    "provider rejected disbursement: {:?}",
                    ack.provider_reference
                ));
                match self.refunds.update(&refund).await {
                    Ok(refund) => Err((refund, error)),
                    Err(e) => Err((refund, e.into())),
                }
            }
            Err(gateway_error) => {
                refund.status = RefundStatus::Fail;
                let error: AppError = gateway_error.into();
                match self.refunds.update(&refund).await {
                    Ok(refund) => Err((refund, error)),
                    Err(e) => Err((refund, e.into())),
                }
            }
        }
    }
}
