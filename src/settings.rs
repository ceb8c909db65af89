//! Runtime-tunable operational settings
//!
//! Operators adjust retry and validation knobs through the `app_settings`
//! table without a redeploy. Values are cached briefly; a missing or
//! malformed value falls back to its default.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

use crate::database::error::DatabaseError;
use crate::error::AppResult;

pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INTERVAL_MINUTES: i64 = 60;
/// Intervals shorter than this would hammer the provider; fall back to default
pub const MIN_RETRY_INTERVAL_MINUTES: i64 = 3;
pub const DEFAULT_VALIDATION_TTL_DAYS: i64 = 7;
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 6;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_DISBURSEMENT_DELAY_DAYS: i64 = 0;
pub const MAX_DISBURSEMENT_DELAY_DAYS: i64 = 30;

const CACHE_TTL: Duration = Duration::from_secs(60);

/// Raw key-value settings lookup
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, name: &str) -> AppResult<Option<String>>;
}

/// Postgres-backed store with a short-lived in-process cache
pub struct PgSettingsStore {
    pool: PgPool,
    cache: RwLock<Option<CachedSettings>>,
}

struct CachedSettings {
    values: HashMap<String, String>,
    loaded_at: Instant,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: RwLock::new(None),
        }
    }

    async fn load(&self) -> Result<HashMap<String, String>, DatabaseError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT name, value FROM app_settings")
                .fetch_all(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().collect())
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn get(&self, name: &str) -> AppResult<Option<String>> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.loaded_at.elapsed() < CACHE_TTL {
                    return Ok(cached.values.get(name).cloned());
                }
            }
        }

        let values = self.load().await?;
        let value = values.get(name).cloned();

        let mut cache = self.cache.write().await;
        *cache = Some(CachedSettings {
            values,
            loaded_at: Instant::now(),
        });

        Ok(value)
    }
}

/// Fixed settings for tests and local runs
#[derive(Default)]
pub struct InMemorySettingsStore {
    values: HashMap<String, String>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn get(&self, name: &str) -> AppResult<Option<String>> {
        Ok(self.values.get(name).cloned())
    }
}

/// Typed accessors over the raw store
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn SettingsStore>,
}

impl Settings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    async fn parsed<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        let raw = match self.store.get(name).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(setting = name, error = %e, "failed to read setting, using default");
                return None;
            }
        };
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(setting = name, value = %raw, "malformed setting value, using default");
                None
            }
        }
    }

    /// Maximum automated retry attempts per refund
    pub async fn max_retry_attempts(&self) -> u32 {
        self.parsed("max_retry_attempts")
            .await
            .unwrap_or(DEFAULT_MAX_RETRY_ATTEMPTS)
    }

    /// Minutes until a failed refund becomes eligible for retry. Values
    /// below the floor are treated as misconfiguration.
    pub async fn retry_interval_minutes(&self) -> i64 {
        let minutes: i64 = self
            .parsed("retry_interval_minutes")
            .await
            .unwrap_or(DEFAULT_RETRY_INTERVAL_MINUTES);
        if minutes < MIN_RETRY_INTERVAL_MINUTES {
            warn!(
                minutes,
                floor = MIN_RETRY_INTERVAL_MINUTES,
                "retry interval below floor, using default"
            );
            DEFAULT_RETRY_INTERVAL_MINUTES
        } else {
            minutes
        }
    }

    /// Days a completed account validation stays reusable
    pub async fn validation_ttl_days(&self) -> i64 {
        self.parsed("validation_ttl_days")
            .await
            .unwrap_or(DEFAULT_VALIDATION_TTL_DAYS)
    }

    pub async fn poll_max_attempts(&self) -> u32 {
        self.parsed("poll_max_attempts")
            .await
            .unwrap_or(DEFAULT_POLL_MAX_ATTEMPTS)
    }

    pub async fn poll_interval_secs(&self) -> u64 {
        self.parsed("poll_interval_secs")
            .await
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
    }

    /// Days to hold a new refund before disbursing; clamped to the maximum
    pub async fn disbursement_delay_days(&self) -> i64 {
        let days: i64 = self
            .parsed("disbursement_delay_days")
            .await
            .unwrap_or(DEFAULT_DISBURSEMENT_DELAY_DAYS);
        days.clamp(0, MAX_DISBURSEMENT_DELAY_DAYS)
    }
}
