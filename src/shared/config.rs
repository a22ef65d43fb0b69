use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Performance ratio below which a freshly closed job triggers the
    /// low-performance alert.
    pub low_performance_threshold: f64,
    /// When true, a column map whose sentinel columns are out of order is
    /// accepted and special-shift columns are matched by the known type
    /// name allow-list instead of by position.
    pub allow_legacy_special_columns: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            low_performance_threshold: 0.85,
            allow_legacy_special_columns: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenv().ok();

        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgres://crewuser:@localhost:5432/crewserver".into()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            },
            server: ServerConfig {
                bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            },
            reconcile: ReconcileConfig {
                low_performance_threshold: env::var("LOW_PERFORMANCE_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.85),
                allow_legacy_special_columns: env::var("ALLOW_LEGACY_SPECIAL_COLUMNS")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false),
            },
        })
    }
}
