//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Which payment gateway the server charges against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayMode {
    /// Random approval with `success_rate`.
    #[default]
    Simulated,
    /// Approve every charge.
    Approve,
    /// Decline every charge.
    Decline,
}

impl std::str::FromStr for GatewayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" => Ok(GatewayMode::Simulated),
            "approve" => Ok(GatewayMode::Approve),
            "decline" => Ok(GatewayMode::Decline),
            other => Err(format!("unknown gateway mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub mode: GatewayMode,
    pub success_rate: f64,
    pub delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Simulated,
            success_rate: 0.5,
            delay: Duration::ZERO,
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; when unset the server
///   runs on the in-memory store with demo data
/// - `GATEWAY_MODE`: `simulated`, `approve` or `decline` (default: `simulated`)
/// - `GATEWAY_SUCCESS_RATE`: approval probability for `simulated` (default: `0.5`)
/// - `GATEWAY_DELAY_MS`: simulated gateway latency (default: `0`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub gateway: GatewayConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let gateway_defaults = GatewayConfig::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            gateway: GatewayConfig {
                mode: lookup("GATEWAY_MODE")
                    .and_then(|m| m.parse().ok())
                    .unwrap_or(gateway_defaults.mode),
                success_rate: lookup("GATEWAY_SUCCESS_RATE")
                    .and_then(|r| r.parse::<f64>().ok())
                    .filter(|r| (0.0..=1.0).contains(r))
                    .unwrap_or(gateway_defaults.success_rate),
                delay: lookup("GATEWAY_DELAY_MS")
                    .and_then(|d| d.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(gateway_defaults.delay),
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            gateway: GatewayConfig::default(),
        }
    }
}
