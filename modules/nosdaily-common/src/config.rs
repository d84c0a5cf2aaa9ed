use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Neo4j
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    // Relays
    pub bot_secret_key: String,
    pub relays: Vec<String>,
    pub ingest_enabled: bool,

    // Delivery
    pub batch_size: usize,
    pub delivery_interval: Duration,
    pub feed_window_hours: i64,
    pub feed_limit: usize,

    /// Upper bound for every external call (graph transaction, relay publish).
    pub call_timeout: Duration,

    // HTTP feed endpoint
    pub api_host: String,
    pub api_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            neo4j_uri: required("NEO4J_URI")?,
            neo4j_user: required("NEO4J_USER")?,
            neo4j_password: required("NEO4J_PASSWORD")?,
            bot_secret_key: required("BOT_SECRET_KEY")?,
            relays: parse_list(&required("RELAYS")?),
            ingest_enabled: parsed_or("INGEST_ENABLED", true)?,
            batch_size: parsed_or("BATCH_SIZE", 100)?,
            delivery_interval: Duration::from_secs(parsed_or("DELIVERY_INTERVAL_SECS", 3600)?),
            feed_window_hours: parsed_or("FEED_WINDOW_HOURS", 24)?,
            feed_limit: parsed_or("FEED_LIMIT", 10)?,
            call_timeout: Duration::from_secs(parsed_or("CALL_TIMEOUT_SECS", 10)?),
            api_host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: parsed_or("API_PORT", 3000)?,
        };

        if config.relays.is_empty() {
            anyhow::bail!("RELAYS must list at least one relay URL");
        }
        if config.batch_size == 0 {
            anyhow::bail!("BATCH_SIZE must be positive");
        }
        if config.delivery_interval.is_zero() {
            anyhow::bail!("DELIVERY_INTERVAL_SECS must be positive");
        }

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(5).collect();
            format!("{head}...({} chars)", val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  NEO4J_URI: {}", self.neo4j_uri);
        tracing::info!("  NEO4J_PASSWORD: {}", preview(&self.neo4j_password));
        tracing::info!("  BOT_SECRET_KEY: {}", preview(&self.bot_secret_key));
        tracing::info!("  RELAYS: {}", self.relays.join(","));
        tracing::info!(
            "  BATCH_SIZE: {}, DELIVERY_INTERVAL_SECS: {}, FEED_WINDOW_HOURS: {}, FEED_LIMIT: {}",
            self.batch_size,
            self.delivery_interval.as_secs(),
            self.feed_window_hours,
            self.feed_limit
        );
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} environment variable is required"))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_list_skips_blanks() {
        assert_eq!(
            parse_list(" wss://a.example , ,wss://b.example,"),
            vec!["wss://a.example".to_string(), "wss://b.example".to_string()]
        );
    }

    #[test]
    fn parsed_or_falls_back_when_unset() {
        let value: u64 = parsed_or("NOSDAILY_TEST_SURELY_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }
}
