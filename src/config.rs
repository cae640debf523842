//! Application configuration loaded from environment variables.
//!
//! All configuration is loaded from environment variables with sensible
//! defaults for development. A `.env` file is read first if present.
//!
//! # Rate Limiting
//!
//! - `LIMITER_ENABLED`: Turn per-client rate limiting on or off (default: true)
//! - `LIMITER_RPS`: Sustained requests per second per client (default: 2)
//! - `LIMITER_BURST`: Bucket capacity per client (default: 4)
//! - `LIMITER_IDLE_TIMEOUT_SECS`: Forget clients idle this long (default: 180)
//! - `LIMITER_SWEEP_INTERVAL_SECS`: How often idle clients are swept (default: 60)
//! - `TRUSTED_PROXIES`: CIDR ranges whose `X-Forwarded-For` is honoured
//!
//! # Observability
//!
//! - `METRICS_PORT`: Prometheus listener port (default: 9090, 0 = disabled)

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::middleware::registry::quota_for;

/// Limiter settings read once per admission decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterConfig {
    /// Tokens added per second (may be fractional).
    pub rps: f64,
    /// Bucket capacity.
    pub burst: u32,
    pub enabled: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rps: 2.0,
            burst: 4,
            enabled: true,
        }
    }
}

impl LimiterConfig {
    /// Check values that would make a bucket impossible to build.
    pub fn validate(&self) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if !self.rps.is_finite() || self.rps <= 0.0 {
            return Err(AppError::ConfigError(format!(
                "LIMITER_RPS must be a positive number, got {}",
                self.rps
            )));
        }
        if self.burst == 0 {
            return Err(AppError::ConfigError(
                "LIMITER_BURST must be greater than 0".to_string(),
            ));
        }
        if quota_for(self).is_none() {
            return Err(AppError::ConfigError(format!(
                "LIMITER_RPS {} is outside the range a limiter can enforce",
                self.rps
            )));
        }
        Ok(())
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 4000)
    pub port: u16,

    pub limiter: LimiterConfig,

    /// Clients not seen for this long are dropped from the registry.
    pub limiter_idle_timeout: Duration,

    /// Interval between registry sweeps.
    pub limiter_sweep_interval: Duration,

    /// Trusted proxy CIDR ranges. Empty means only the socket peer is used.
    pub trusted_proxies: Vec<String>,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,

    /// Seed a demo user holding this token (26 characters) at startup.
    pub demo_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if a value does not parse or fails
    /// validation.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 4000)?,

            limiter: LimiterConfig {
                rps: Self::parse_env("LIMITER_RPS", 2.0)?,
                burst: Self::parse_env("LIMITER_BURST", 4)?,
                enabled: Self::parse_env("LIMITER_ENABLED", true)?,
            },
            limiter_idle_timeout: Duration::from_secs(Self::parse_env(
                "LIMITER_IDLE_TIMEOUT_SECS",
                180,
            )?),
            limiter_sweep_interval: Duration::from_secs(Self::parse_env(
                "LIMITER_SWEEP_INTERVAL_SECS",
                60,
            )?),
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES"),

            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
            demo_token: env::var("DEMO_TOKEN").ok().filter(|t| !t.is_empty()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    fn validate(&self) -> AppResult<()> {
        self.limiter.validate()?;

        if self.limiter_sweep_interval.is_zero() {
            return Err(AppError::ConfigError(
                "LIMITER_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if let Some(token) = &self.demo_token
            && token.len() != crate::middleware::authenticate::TOKEN_LENGTH
        {
            return Err(AppError::ConfigError(format!(
                "DEMO_TOKEN must be {} characters long",
                crate::middleware::authenticate::TOKEN_LENGTH
            )));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        (self.metrics_port > 0)
            .then(|| std::net::SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, dropping empty items.
    fn parse_list(name: &str) -> Vec<String> {
        env::var(name)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            limiter: LimiterConfig::default(),
            limiter_idle_timeout: Duration::from_secs(180),
            limiter_sweep_interval: Duration::from_secs(60),
            trusted_proxies: vec![],
            metrics_port: 9090,
            demo_token: None,
        }
    }
}
