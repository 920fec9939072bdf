//! Gateway configuration.
//!
//! Settings load from a YAML file with `${VAR}` / `${VAR:-default}`
//! environment interpolation. Every field has a serde default so a missing
//! file or a sparse file still yields a runnable configuration.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::resilience::{CircuitBreakerConfig, ReconnectConfig};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Venue endpoint and account.
    pub venue: VenueConfig,
    /// Per-operation deadlines.
    pub timeouts: TimeoutConfig,
    /// Pre-trade risk limits.
    pub risk: RiskConfig,
    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerSettings,
    /// Reconnect backoff schedule.
    pub reconnect: ReconnectSettings,
    /// HTTP facade settings.
    pub server: ServerConfig,
}

/// Venue connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    /// WebSocket URL of the venue protocol endpoint.
    pub url: String,
    /// Account id presented during the handshake.
    pub account: String,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:7496".to_string(),
            account: "DU000000".to_string(),
        }
    }
}

/// Per-operation deadlines, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Handshake deadline for `connect()`.
    pub connect_secs: u64,
    /// Default request/response deadline.
    pub request_secs: u64,
    /// Short deadline for the one-shot market price snapshot.
    pub market_data_secs: u64,
    /// Long deadline for historical bar downloads.
    pub historical_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 10,
            market_data_secs: 5,
            historical_secs: 30,
        }
    }
}

impl TimeoutConfig {
    /// Handshake deadline.
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    /// Default request deadline.
    #[must_use]
    pub const fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    /// Market data snapshot deadline.
    #[must_use]
    pub const fn market_data(&self) -> Duration {
        Duration::from_secs(self.market_data_secs)
    }

    /// Historical download deadline.
    #[must_use]
    pub const fn historical(&self) -> Duration {
        Duration::from_secs(self.historical_secs)
    }
}

/// Pre-trade risk limits consumed by the validation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Maximum share count per order.
    pub max_order_size: u32,
    /// Maximum notional value per order.
    pub max_order_value: Decimal,
    /// Maximum fraction of portfolio value a single position may reach.
    pub max_position_pct: Decimal,
    /// Session realized-loss threshold that halts new orders.
    pub daily_loss_limit: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_order_size: 10_000,
            max_order_value: Decimal::from(1_000_000),
            max_position_pct: Decimal::new(25, 2),
            daily_loss_limit: Decimal::from(50_000),
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before a trial attempt.
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 30,
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert into the breaker's runtime config.
    #[must_use]
    pub const fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }
}

/// Reconnect backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Base delay in milliseconds for attempt 0.
    pub base_delay_ms: u64,
    /// Doubling stops after this exponent; later delays stay flat.
    pub cap_exponent: u32,
    /// Attempts before the supervisor gives up.
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            cap_exponent: 5,
            max_attempts: 10,
        }
    }
}

impl ReconnectSettings {
    /// Convert into the reconnect policy's runtime config.
    #[must_use]
    pub const fn to_policy_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            base_delay: Duration::from_millis(self.base_delay_ms),
            cap_exponent: self.cap_exponent,
            max_attempts: self.max_attempts,
        }
    }
}

/// HTTP facade settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen port for the HTTP facade.
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { http_port: 8080 }
    }
}

static ENV_VAR_PATTERN: OnceLock<Regex> = OnceLock::new();

fn env_var_pattern() -> &'static Regex {
    ENV_VAR_PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap()
    })
}

/// Replace `${VAR}` and `${VAR:-default}` references with environment values.
fn interpolate_env_vars(content: &str) -> String {
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures<'_>| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map_or("", |m| m.as_str());
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .to_string()
}

/// Load configuration from a YAML file.
///
/// A missing file is not an error: defaults apply, logged at info.
pub fn load_config(path: &str) -> anyhow::Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let config = parse_config(&content)?;
            validate_config(&config)?;
            tracing::info!(path = %path, "configuration loaded");
            Ok(config)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path, "config file not found, using defaults");
            Ok(Config::default())
        }
        Err(err) => Err(anyhow::anyhow!("failed to read config {path}: {err}")),
    }
}

/// Parse YAML content after environment interpolation.
pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let interpolated = interpolate_env_vars(content);
    let config: Config = serde_yaml_bw::from_str(&interpolated)
        .map_err(|err| anyhow::anyhow!("failed to parse config: {err}"))?;
    Ok(config)
}

/// Reject configurations that cannot run.
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    if config.venue.url.is_empty() {
        anyhow::bail!("venue.url must not be empty");
    }
    if !config.venue.url.starts_with("ws://") && !config.venue.url.starts_with("wss://") {
        anyhow::bail!("venue.url must be a ws:// or wss:// URL");
    }
    if config.timeouts.connect_secs == 0 || config.timeouts.request_secs == 0 {
        anyhow::bail!("timeouts must be positive");
    }
    if config.risk.max_order_size == 0 {
        anyhow::bail!("risk.max_order_size must be positive");
    }
    if config.risk.max_order_value <= Decimal::ZERO {
        anyhow::bail!("risk.max_order_value must be positive");
    }
    if config.circuit_breaker.failure_threshold == 0 {
        anyhow::bail!("circuit_breaker.failure_threshold must be positive");
    }
    if config.circuit_breaker.cooldown_secs == 0 {
        anyhow::bail!("circuit_breaker.cooldown_secs must be positive");
    }
    if config.reconnect.cap_exponent > 16 {
        anyhow::bail!("reconnect.cap_exponent must be <= 16");
    }
    if config.server.http_port == 0 {
        anyhow::bail!("server.http_port must be nonzero");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.reconnect.base_delay_ms, 1_000);
    }

    #[test]
    fn parses_partial_yaml_with_defaults() {
        let yaml = r"
venue:
  url: ws://localhost:9999
timeouts:
  connect_secs: 3
";
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.venue.url, "ws://localhost:9999");
        assert_eq!(config.timeouts.connect_secs, 3);
        // untouched sections keep defaults
        assert_eq!(config.timeouts.request_secs, 10);
        assert_eq!(config.server.http_port, 8080);
    }

    #[test]
    fn interpolates_env_var_with_default() {
        let yaml = "venue:\n  url: ${VENUE_GATEWAY_TEST_URL:-ws://fallback:1}\n";
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.venue.url, "ws://fallback:1");
    }

    #[test]
    fn rejects_non_websocket_url() {
        let mut config = Config::default();
        config.venue.url = "http://example.com".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_zero_threshold() {
        let mut config = Config::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(validate_config(&config).is_err());
    }
}
