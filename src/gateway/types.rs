use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::gateway::error::GatewayError;

/// Wire envelope shared by both providers: `{status, data | message}`
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEnvelope<T> {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

/// One entry of a provider's bank list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankEntry {
    pub code: String,
    pub name: String,
    /// Raw provider metadata, kept for forward compatibility
    pub raw: JsonValue,
}

/// Outbound payout instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisbursementRequest {
    /// Provider-facing external id: `{refundId}` or `{refundId}-{sequence}`
    pub external_id: String,
    pub bank_code: String,
    pub account_number: String,
    pub account_holder: String,
    /// Amount in minor units
    pub amount: i64,
    pub remark: Option<String>,
}

/// Provider acknowledgement of a disbursement request. Delivery itself is
/// confirmed later through the webhook channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisbursementAck {
    pub provider_reference: Option<String>,
    pub accepted: bool,
    pub raw: JsonValue,
}

/// Provider account balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub available: i64,
    pub currency: String,
}

/// Account inquiry request against the identity-verification provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCheckRequest {
    /// Provider-side bank code resolved through the mapping table
    pub inquiry_code: String,
    pub account_number: String,
}

/// Reply to an account inquiry or a poll of a prior inquiry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InquiryReply {
    /// The provider answered immediately
    Terminal {
        found: bool,
        virtual_account: bool,
        account_name: Option<String>,
        raw: JsonValue,
    },
    /// The provider is still resolving; poll with the reference
    Pending {
        poll_reference: String,
        raw: JsonValue,
    },
}

/// Classified outcome of a provider delivery callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallbackOutcome {
    Completed,
    Pending,
    Failed { code: String },
}

/// A parsed provider delivery callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEvent {
    pub provider: String,
    pub external_id: String,
    pub outcome: CallbackOutcome,
    pub raw: JsonValue,
}

/// Failure codes after which no automated retry is ever attempted
pub const UNRECOVERABLE_FAILURE_CODES: &[&str] = &[
    "INVALID_DESTINATION",
    "REJECTED_BY_BANK",
    "REJECTED_BY_CHANNEL",
    "TRANSFER_ERROR",
    "EMPTY_ACCOUNT_NAME",
];

/// Terminal-vs-transient classification of a provider failure code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Terminal,
    Transient,
}

pub fn classify_failure(code: &str) -> FailureClass {
    if UNRECOVERABLE_FAILURE_CODES.contains(&code) {
        FailureClass::Terminal
    } else {
        FailureClass::Transient
    }
}

/// Parse a raw webhook payload into a typed callback event.
///
/// The wire shape is `{provider, external_id, status, failure_code?}` with
/// status one of COMPLETED | PENDING | FAILED.
pub fn parse_callback(payload: &JsonValue) -> Result<CallbackEvent, GatewayError> {
    let external_id = payload
        .get("external_id")
        .and_then(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| GatewayError::ValidationError {
            message: "callback is missing external_id".to_string(),
            field: Some("external_id".to_string()),
        })?
        .to_string();

    let provider = payload
        .get("provider")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let status = payload
        .get("status")
        .and_then(|v| v.as_str())
        .ok_or_else(|| GatewayError::ValidationError {
            message: "callback is missing status".to_string(),
            field: Some("status".to_string()),
        })?;

    let outcome = match status.to_uppercase().as_str() {
        "COMPLETED" => CallbackOutcome::Completed,
        "PENDING" => CallbackOutcome::Pending,
        _ => CallbackOutcome::Failed {
            code: payload
                .get("failure_code")
                .and_then(|v| v.as_str())
                .unwrap_or("UNKNOWN")
                .to_string(),
        },
    };

    Ok(CallbackEvent {
        provider,
        external_id,
        outcome,
        raw: payload.clone(),
    })
}

/// Strip a `-{sequence}` retry suffix from a provider-facing external id.
///
/// Only an all-digit suffix is stripped; refund identifiers themselves may
/// contain dashes.
pub fn base_external_id(external_id: &str) -> &str {
    match external_id.rsplit_once('-') {
        Some((base, suffix))
            if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => external_id,
    }
}
