//! Gateway credential access
//!
//! Credentials are protected by an envelope-encryption subsystem operated
//! outside this service; this module only exposes the lookup capability.
//! The environment-backed implementation is used in deployments where the
//! decrypted secrets are injected into the process environment.

use async_trait::async_trait;

use crate::error::{AppError, AppErrorKind, AppResult, InfrastructureError};

/// Resolves the API secret for a provider in a given environment
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credential(&self, provider: &str, environment: &str) -> AppResult<String>;
}

/// Reads `{PROVIDER}_{ENVIRONMENT}_API_KEY` from the process environment
pub struct EnvCredentialStore;

impl EnvCredentialStore {
    pub fn new() -> Self {
        Self
    }

    fn var_name(provider: &str, environment: &str) -> String {
        format!(
            "{}_{}_API_KEY",
            provider.to_uppercase().replace('-', "_"),
            environment.to_uppercase()
        )
    }
}

impl Default for EnvCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get_credential(&self, provider: &str, environment: &str) -> AppResult<String> {
        let name = Self::var_name(provider, environment);
        std::env::var(&name).map_err(|_| {
            AppError::new(AppErrorKind::Infrastructure(
                InfrastructureError::Configuration {
                    message: format!("missing credential variable {}", name),
                },
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_variable_name_is_normalized() {
        assert_eq!(
            EnvCredentialStore::var_name("nexa-disburse", "sandbox"),
            "NEXA_DISBURSE_SANDBOX_API_KEY"
        );
    }

    #[tokio::test]
    async fn missing_credential_is_a_configuration_error() {
        let store = EnvCredentialStore::new();
        let result = store.get_credential("no-such-provider", "sandbox").await;
        assert!(result.is_err());
    }
}
