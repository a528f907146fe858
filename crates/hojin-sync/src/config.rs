//! Runtime configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/hojin";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 4;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default base URL of the gBizINFO update API.
pub const DEFAULT_GBIZ_BASE_URL: &str = "https://info.gbiz.go.jp/hojin/v1/hojin/updateInfo";

/// Default per-request timeout for API pages.
pub const DEFAULT_GBIZ_TIMEOUT_SECS: u64 = 60;

/// Default timeout for a full bulk archive download (30 minutes).
pub const DEFAULT_BULK_TIMEOUT_SECS: u64 = 1800;

/// Default maximum rows held per bulk chunk.
pub const DEFAULT_BULK_CHUNK_ROWS: usize = 50_000;

/// Default lookback, in days, of the sync window ending today.
pub const DEFAULT_SYNC_LOOKBACK_DAYS: u32 = 32;

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// gBizINFO API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbizConfig {
    pub base_url: String,
    /// Sent as `X-hojinInfo-api-token`; required only when paged tables run
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    pub timeout_secs: u64,
}

/// Bulk archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConfig {
    pub timeout_secs: u64,
    pub chunk_rows: usize,
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub database: DatabaseConfig,
    pub gbiz: GbizConfig,
    pub bulk: BulkConfig,
    pub lookback_days: u32,
    /// Table catalog override; the built-in catalog is used when absent
    pub catalog_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            gbiz: GbizConfig {
                base_url: DEFAULT_GBIZ_BASE_URL.to_string(),
                api_token: None,
                timeout_secs: DEFAULT_GBIZ_TIMEOUT_SECS,
            },
            bulk: BulkConfig {
                timeout_secs: DEFAULT_BULK_TIMEOUT_SECS,
                chunk_rows: DEFAULT_BULK_CHUNK_ROWS,
            },
            lookback_days: DEFAULT_SYNC_LOOKBACK_DAYS,
            catalog_path: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl SyncConfig {
    /// Load configuration from `.env` and the environment over the defaults
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = SyncConfig {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or(defaults.database.max_connections),
                connect_timeout_secs: env_parse("DATABASE_CONNECT_TIMEOUT")
                    .unwrap_or(defaults.database.connect_timeout_secs),
            },
            gbiz: GbizConfig {
                base_url: std::env::var("GBIZ_BASE_URL").unwrap_or(defaults.gbiz.base_url),
                api_token: std::env::var("GBIZ_API_TOKEN")
                    .ok()
                    .filter(|t| !t.trim().is_empty()),
                timeout_secs: env_parse("GBIZ_TIMEOUT_SECS").unwrap_or(defaults.gbiz.timeout_secs),
            },
            bulk: BulkConfig {
                timeout_secs: env_parse("BULK_TIMEOUT_SECS").unwrap_or(defaults.bulk.timeout_secs),
                chunk_rows: env_parse("BULK_CHUNK_ROWS").unwrap_or(defaults.bulk.chunk_rows),
            },
            lookback_days: env_parse("SYNC_LOOKBACK_DAYS").unwrap_or(defaults.lookback_days),
            catalog_path: std::env::var("TABLE_CATALOG").ok().map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.gbiz.api_token = Some(token.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.gbiz.base_url = url.into();
        self
    }

    pub fn with_chunk_rows(mut self, rows: usize) -> Self {
        self.bulk.chunk_rows = rows;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }
        if self.gbiz.base_url.is_empty() {
            anyhow::bail!("gBizINFO base URL cannot be empty");
        }
        if self.bulk.chunk_rows == 0 {
            anyhow::bail!("Bulk chunk_rows must be greater than 0");
        }
        Ok(())
    }
}
