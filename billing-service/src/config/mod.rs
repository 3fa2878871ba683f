use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    pub common: service_core::config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl BillingConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let port = env::var("BILLING_PORT")
            .unwrap_or_else(|_| "3010".to_string())
            .parse()?;

        let database_url =
            env::var("BILLING_DATABASE_URL").unwrap_or_else(|_| "sqlite://billing.db".to_string());
        let max_connections = env::var("BILLING_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "8".to_string())
            .parse()?;
        let min_connections = env::var("BILLING_DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let log_level = env::var("BILLING_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let otlp_endpoint = env::var("BILLING_OTLP_ENDPOINT").ok();

        Ok(Self {
            common: service_core::config::Config { port },
            service_name: "billing-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level,
            otlp_endpoint,
            database: DatabaseConfig {
                url: database_url,
                max_connections,
                min_connections,
            },
        })
    }
}
