use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },

    #[error("Credential error: {message}")]
    CredentialError { message: String },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::ValidationError { .. } => false,
            GatewayError::NetworkError { .. } => true,
            GatewayError::Timeout { .. } => true,
            GatewayError::RateLimitError { .. } => true,
            GatewayError::ProviderError { retryable, .. } => *retryable,
            GatewayError::CredentialError { .. } => false,
        }
    }
}

impl From<GatewayError> for crate::error::AppError {
    fn from(err: GatewayError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError};

        let kind = match &err {
            GatewayError::Timeout { seconds } => AppErrorKind::External(ExternalError::Timeout {
                service: "gateway".to_string(),
                timeout_secs: *seconds,
            }),
            GatewayError::ProviderError { provider, .. } => {
                AppErrorKind::External(ExternalError::Gateway {
                    provider: provider.clone(),
                    message: err.to_string(),
                    is_retryable: err.is_retryable(),
                })
            }
            _ => AppErrorKind::External(ExternalError::Gateway {
                provider: "gateway".to_string(),
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            }),
        };

        AppError::new(kind)
    }
}
