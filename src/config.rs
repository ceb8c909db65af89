//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub ticketing: TicketingConfig,
    pub refund: RefundPolicyConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Gateway provider configuration: one endpoint for the disbursement
/// provider and one for the identity-verification (account inquiry) provider
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: String,
    pub disbursement: ProviderEndpoint,
    pub inquiry: ProviderEndpoint,
}

/// A single provider endpoint
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub name: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Ticketing collaborator configuration
#[derive(Debug, Clone)]
pub struct TicketingConfig {
    pub base_url: String,
    pub notify_url: String,
    pub timeout_secs: u64,
    /// Whether create() fetches refund detail from the ticketing system
    pub fetch_detail: bool,
}

/// Refund policy knobs that are fixed per deployment (runtime-mutable
/// settings live in the settings store instead)
#[derive(Debug, Clone)]
pub struct RefundPolicyConfig {
    /// Shared secret expected on every provider delivery callback
    pub callback_token: String,
    /// Secret for signing outbound response envelopes
    pub signing_secret: String,
    /// Fixed fee in minor units
    pub fixed_fee: i64,
    /// Percentage fee rate, e.g. "0.015"
    pub fee_rate: String,
    /// Tax rate applied on fees, e.g. "0.11"
    pub tax_rate: String,
    /// Retry sweep period in seconds
    pub sweep_interval_secs: u64,
    /// Sweep lookback window in hours
    pub sweep_lookback_hours: i64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
            ticketing: TicketingConfig::from_env()?,
            refund: RefundPolicyConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.logging.validate()?;
        self.gateway.validate()?;
        self.ticketing.validate()?;
        self.refund.validate()?;

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(GatewayConfig {
            environment: env::var("GATEWAY_ENVIRONMENT")
                .unwrap_or_else(|_| "sandbox".to_string()),
            disbursement: ProviderEndpoint::from_env("DISBURSE")?,
            inquiry: ProviderEndpoint::from_env("INQUIRY")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_environments = ["sandbox", "production"];
        if !valid_environments.contains(&self.environment.as_str()) {
            return Err(ConfigError::InvalidValue("GATEWAY_ENVIRONMENT".to_string()));
        }

        self.disbursement.validate("DISBURSE")?;
        self.inquiry.validate("INQUIRY")?;

        Ok(())
    }
}

impl ProviderEndpoint {
    fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let var = |suffix: &str| format!("{}_PROVIDER_{}", prefix, suffix);

        Ok(ProviderEndpoint {
            name: env::var(var("NAME"))
                .map_err(|_| ConfigError::MissingVariable(var("NAME")))?,
            base_url: env::var(var("BASE_URL"))
                .map_err(|_| ConfigError::MissingVariable(var("BASE_URL")))?,
            timeout_secs: env::var(var("TIMEOUT_SECS"))
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue(var("TIMEOUT_SECS")))?,
            max_retries: env::var(var("MAX_RETRIES"))
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue(var("MAX_RETRIES")))?,
        })
    }

    fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(format!(
                "{}_PROVIDER_BASE_URL must be a valid URL",
                prefix
            )));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "{}_PROVIDER_TIMEOUT_SECS cannot be 0",
                prefix
            )));
        }

        Ok(())
    }
}

impl TicketingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(TicketingConfig {
            base_url: env::var("TICKETING_BASE_URL")
                .map_err(|_| ConfigError::MissingVariable("TICKETING_BASE_URL".to_string()))?,
            notify_url: env::var("TICKETING_NOTIFY_URL")
                .map_err(|_| ConfigError::MissingVariable("TICKETING_NOTIFY_URL".to_string()))?,
            timeout_secs: env::var("TICKETING_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("TICKETING_TIMEOUT_SECS".to_string()))?,
            fetch_detail: env::var("TICKETING_FETCH_DETAIL")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("TICKETING_FETCH_DETAIL".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "TICKETING_BASE_URL must be a valid URL".to_string(),
            ));
        }

        Ok(())
    }
}

impl RefundPolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(RefundPolicyConfig {
            callback_token: env::var("CALLBACK_TOKEN")
                .map_err(|_| ConfigError::MissingVariable("CALLBACK_TOKEN".to_string()))?,
            signing_secret: env::var("SIGNING_SECRET")
                .map_err(|_| ConfigError::MissingVariable("SIGNING_SECRET".to_string()))?,
            fixed_fee: env::var("REFUND_FIXED_FEE")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("REFUND_FIXED_FEE".to_string()))?,
            fee_rate: env::var("REFUND_FEE_RATE").unwrap_or_else(|_| "0".to_string()),
            tax_rate: env::var("REFUND_TAX_RATE").unwrap_or_else(|_| "0".to_string()),
            sweep_interval_secs: env::var("RETRY_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("RETRY_SWEEP_INTERVAL_SECS".to_string()))?,
            sweep_lookback_hours: env::var("RETRY_SWEEP_LOOKBACK_HOURS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("RETRY_SWEEP_LOOKBACK_HOURS".to_string())
                })?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.callback_token.is_empty() {
            return Err(ConfigError::InvalidValue(
                "CALLBACK_TOKEN cannot be empty".to_string(),
            ));
        }

        if self.signing_secret.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SIGNING_SECRET cannot be empty".to_string(),
            ));
        }

        if self.fixed_fee < 0 {
            return Err(ConfigError::InvalidValue(
                "REFUND_FIXED_FEE cannot be negative".to_string(),
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "RETRY_SWEEP_INTERVAL_SECS cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_policy_validation_accepts_defaults() {
        let config = RefundPolicyConfig {
            callback_token: "tok".to_string(),
            signing_secret: "sec".to_string(),
            fixed_fee: 5000,
            fee_rate: "0.015".to_string(),
            tax_rate: "0.11".to_string(),
            sweep_interval_secs: 600,
            sweep_lookback_hours: 2,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_callback_token_is_rejected() {
        let config = RefundPolicyConfig {
            callback_token: "".to_string(),
            signing_secret: "sec".to_string(),
            fixed_fee: 0,
            fee_rate: "0".to_string(),
            tax_rate: "0".to_string(),
            sweep_interval_secs: 600,
            sweep_lookback_hours: 2,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn provider_endpoint_requires_http_url() {
        let endpoint = ProviderEndpoint {
            name: "nexadisburse".to_string(),
            base_url: "ftp://bad".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        };

        assert!(endpoint.validate("DISBURSE").is_err());
    }
}
