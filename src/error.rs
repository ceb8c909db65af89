//! Unified error handling for the refundflow backend
//!
//! Every service call resolves to a structured `AppError` carrying an
//! application-level error code that is distinct from the transport status
//! code, so a transport-level 200 can still carry a business-level failure.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Application-level error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "DUPLICATE_REFUND")]
    DuplicateRefund,
    #[serde(rename = "BANK_NOT_FOUND")]
    BankNotFound,
    #[serde(rename = "REFUND_NOT_FOUND")]
    RefundNotFound,
    #[serde(rename = "UNKNOWN_REFUND")]
    UnknownRefund,
    #[serde(rename = "INVALID_REFUND_STATE")]
    InvalidRefundState,
    #[serde(rename = "RETRY_EXHAUSTED")]
    RetryExhausted,
    #[serde(rename = "UNACKNOWLEDGED_REQUEST")]
    UnacknowledgedRequest,
    #[serde(rename = "ALREADY_CHECKING")]
    AlreadyChecking,
    #[serde(rename = "INVALID_AMOUNT")]
    InvalidAmount,

    // Security errors (401)
    #[serde(rename = "CALLBACK_TOKEN_MISMATCH")]
    CallbackTokenMismatch,
    #[serde(rename = "SIGNATURE_MISMATCH")]
    SignatureMismatch,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 504)
    #[serde(rename = "GATEWAY_ERROR")]
    GatewayError,
    #[serde(rename = "GATEWAY_TIMEOUT")]
    GatewayTimeout,
    #[serde(rename = "TICKETING_ERROR")]
    TicketingError,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Domain-specific business logic errors; rejected synchronously, never retried
#[derive(Debug, Clone)]
pub enum DomainError {
    /// A refund with the same external refund identifier already exists
    DuplicateRefund { refund_id: String },
    /// No enabled bank mapping for the requested bank code
    BankNotFound { bank_code: String },
    /// Refund with the given external identifier does not exist
    RefundNotFound { refund_id: String },
    /// Webhook delivery could not be matched to any awaiting refund
    UnknownRefund { external_id: String },
    /// Operation is not valid in the refund's current lifecycle state
    InvalidState {
        refund_id: String,
        status: String,
        action: &'static str,
    },
    /// Retry attempt count has reached the configured maximum
    RetryExhausted { refund_id: String, attempts: usize },
    /// The last issued request has no matching callback; refuse to double-send
    UnacknowledgedRequest { refund_id: String },
    /// A validation for this account number is still in flight
    AlreadyChecking { account_number: String },
    /// Amount is invalid (non-positive or arithmetic overflow)
    InvalidAmount { amount: String, reason: String },
}

/// Security errors: rejected with no state mutation and no retry
#[derive(Debug, Clone)]
pub enum SecurityError {
    /// Webhook callback token does not match the configured secret
    CallbackTokenMismatch,
    /// Outbound envelope signature could not be produced or verified
    SignatureMismatch { message: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

/// External collaborator errors (gateway provider, ticketing system)
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Disbursement or identity-verification provider error
    Gateway {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    /// Provider call exceeded its timeout; treated as an error, never as "pending"
    Timeout { service: String, timeout_secs: u64 },
    /// Ticketing collaborator (detail fetch or notification) error
    Ticketing { message: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Security(SecurityError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Internal { message: String },
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn domain(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }

    pub fn security(err: SecurityError) -> Self {
        Self::new(AppErrorKind::Security(err))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Internal {
            message: message.into(),
        })
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to a transport status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DuplicateRefund { .. } => 409,
                DomainError::BankNotFound { .. } => 404,
                DomainError::RefundNotFound { .. } => 404,
                DomainError::UnknownRefund { .. } => 404,
                DomainError::InvalidState { .. } => 422,
                DomainError::RetryExhausted { .. } => 422,
                DomainError::UnacknowledgedRequest { .. } => 409,
                DomainError::AlreadyChecking { .. } => 409,
                DomainError::InvalidAmount { .. } => 400,
            },
            AppErrorKind::Security(_) => 401,
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { .. } => 502,
                ExternalError::Timeout { .. } => 504,
                ExternalError::Ticketing { .. } => 502,
            },
            AppErrorKind::Internal { .. } => 500,
        }
    }

    /// Get the application-level error code
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DuplicateRefund { .. } => ErrorCode::DuplicateRefund,
                DomainError::BankNotFound { .. } => ErrorCode::BankNotFound,
                DomainError::RefundNotFound { .. } => ErrorCode::RefundNotFound,
                DomainError::UnknownRefund { .. } => ErrorCode::UnknownRefund,
                DomainError::InvalidState { .. } => ErrorCode::InvalidRefundState,
                DomainError::RetryExhausted { .. } => ErrorCode::RetryExhausted,
                DomainError::UnacknowledgedRequest { .. } => ErrorCode::UnacknowledgedRequest,
                DomainError::AlreadyChecking { .. } => ErrorCode::AlreadyChecking,
                DomainError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            },
            AppErrorKind::Security(err) => match err {
                SecurityError::CallbackTokenMismatch => ErrorCode::CallbackTokenMismatch,
                SecurityError::SignatureMismatch { .. } => ErrorCode::SignatureMismatch,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { .. } => ErrorCode::GatewayError,
                ExternalError::Timeout { .. } => ErrorCode::GatewayTimeout,
                ExternalError::Ticketing { .. } => ErrorCode::TicketingError,
            },
            AppErrorKind::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Get a caller-facing error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DuplicateRefund { refund_id } => {
                    format!("Refund '{}' already exists", refund_id)
                }
                DomainError::BankNotFound { bank_code } => {
                    format!("No enabled bank mapping for bank code '{}'", bank_code)
                }
                DomainError::RefundNotFound { refund_id } => {
                    format!("Refund '{}' not found", refund_id)
                }
                DomainError::UnknownRefund { external_id } => {
                    format!(
                        "No refund awaiting a callback matches external id '{}'",
                        external_id
                    )
                }
                DomainError::InvalidState {
                    refund_id,
                    status,
                    action,
                } => {
                    format!(
                        "Refund '{}' is in state '{}'; '{}' is not allowed",
                        refund_id, status, action
                    )
                }
                DomainError::RetryExhausted {
                    refund_id,
                    attempts,
                } => {
                    format!(
                        "Refund '{}' has exhausted its retry budget ({} attempts)",
                        refund_id, attempts
                    )
                }
                DomainError::UnacknowledgedRequest { refund_id } => {
                    format!(
                        "Refund '{}' has an outstanding disbursement request awaiting confirmation",
                        refund_id
                    )
                }
                DomainError::AlreadyChecking { account_number } => {
                    format!(
                        "A validation for account '{}' is already in progress",
                        account_number
                    )
                }
                DomainError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
            },
            AppErrorKind::Security(err) => match err {
                SecurityError::CallbackTokenMismatch => "Invalid callback token".to_string(),
                SecurityError::SignatureMismatch { .. } => "Invalid signature".to_string(),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway {
                    provider,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "Gateway provider ({}) is temporarily unavailable. Please try again",
                            provider
                        )
                    } else {
                        "Gateway provider rejected the request".to_string()
                    }
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds",
                        service, timeout_secs
                    )
                }
                ExternalError::Ticketing { message } => {
                    format!("Ticketing system error: {}", message)
                }
            },
            AppErrorKind::Internal { .. } => "An unexpected error occurred".to_string(),
        }
    }

    /// Check if the failure is eligible for automatic retry
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Security(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { is_retryable, .. } => *is_retryable,
                ExternalError::Timeout { .. } => true,
                ExternalError::Ticketing { .. } => true,
            },
            AppErrorKind::Internal { .. } => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.user_message(), context),
            None => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
