//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::limiter::RateLimitPolicy;
use crate::tokens::TokenPolicy;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
/// Durations are expressed in seconds.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// TTL of cached entities
    pub cache_ttl: u64,
    /// TTL of negative (confirmed absent) cache entries
    pub negative_cache_ttl: u64,
    /// Background sweep interval
    pub sweep_interval: u64,
    /// Attempts allowed inside the rate-limit window
    pub rate_limit_threshold: u32,
    /// Idle time after which the attempt counter resets
    pub rate_limit_window: u64,
    /// How long a client stays limited after tripping the threshold
    pub rate_limit_punishment: u64,
    /// Idle lifetime of a rate-limit entry before the sweep drops it
    pub rate_limit_entry_ttl: u64,
    /// Validity of an issued change request
    pub token_ttl: u64,
    /// Change requests a subject may issue per issue window
    pub token_issue_limit: u32,
    /// Window the issue limit applies to
    pub token_issue_window: u64,
    /// Failed verifications before a change request is burned
    pub token_max_verify_attempts: u32,
    /// Redirect base of the password-change page
    pub change_password_url: String,
    /// Redirect base of the account-confirmation page
    pub confirm_account_url: String,
    /// Header carrying the client address when running behind a proxy
    pub ip_proxy_header: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` (default: 8080)
    /// - `CACHE_TTL` (default: 10800)
    /// - `NEGATIVE_CACHE_TTL` (default: 300)
    /// - `SWEEP_INTERVAL` (default: 60)
    /// - `RATE_LIMIT_THRESHOLD` (default: 15)
    /// - `RATE_LIMIT_WINDOW` (default: 180)
    /// - `RATE_LIMIT_PUNISHMENT` (default: 300)
    /// - `RATE_LIMIT_ENTRY_TTL` (default: 2400)
    /// - `TOKEN_TTL` (default: 600)
    /// - `TOKEN_ISSUE_LIMIT` (default: 10)
    /// - `TOKEN_ISSUE_WINDOW` (default: 3600)
    /// - `TOKEN_MAX_VERIFY_ATTEMPTS` (default: 5)
    /// - `CHANGE_PASSWORD_URL`, `CONFIRM_ACCOUNT_URL`
    /// - `IP_PROXY_HEADER` (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cache_ttl: env_or("CACHE_TTL", defaults.cache_ttl),
            negative_cache_ttl: env_or("NEGATIVE_CACHE_TTL", defaults.negative_cache_ttl),
            sweep_interval: env_or("SWEEP_INTERVAL", defaults.sweep_interval),
            rate_limit_threshold: env_or("RATE_LIMIT_THRESHOLD", defaults.rate_limit_threshold),
            rate_limit_window: env_or("RATE_LIMIT_WINDOW", defaults.rate_limit_window),
            rate_limit_punishment: env_or(
                "RATE_LIMIT_PUNISHMENT",
                defaults.rate_limit_punishment,
            ),
            rate_limit_entry_ttl: env_or("RATE_LIMIT_ENTRY_TTL", defaults.rate_limit_entry_ttl),
            token_ttl: env_or("TOKEN_TTL", defaults.token_ttl),
            token_issue_limit: env_or("TOKEN_ISSUE_LIMIT", defaults.token_issue_limit),
            token_issue_window: env_or("TOKEN_ISSUE_WINDOW", defaults.token_issue_window),
            token_max_verify_attempts: env_or(
                "TOKEN_MAX_VERIFY_ATTEMPTS",
                defaults.token_max_verify_attempts,
            ),
            change_password_url: env::var("CHANGE_PASSWORD_URL")
                .unwrap_or(defaults.change_password_url),
            confirm_account_url: env::var("CONFIRM_ACCOUNT_URL")
                .unwrap_or(defaults.confirm_account_url),
            ip_proxy_header: env::var("IP_PROXY_HEADER")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        }
    }

    /// Entity cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    /// Negative cache TTL.
    pub fn negative_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_cache_ttl)
    }

    /// Sweep interval, never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }

    /// Policy for login and other sensitive endpoints.
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            threshold: self.rate_limit_threshold,
            reset_window: Duration::from_secs(self.rate_limit_window),
            punishment: Duration::from_secs(self.rate_limit_punishment),
            entry_ttl: Duration::from_secs(self.rate_limit_entry_ttl),
        }
    }

    /// Policy for a change-request workflow redirecting to `base_url`.
    pub fn token_policy(&self, base_url: &str) -> TokenPolicy {
        TokenPolicy {
            base_url: base_url.to_string(),
            ttl: Duration::from_secs(self.token_ttl),
            max_verify_attempts: self.token_max_verify_attempts,
            issue_limit: RateLimitPolicy {
                threshold: self.token_issue_limit,
                reset_window: Duration::from_secs(self.token_issue_window),
                punishment: Duration::from_secs(self.token_issue_window),
                entry_ttl: Duration::from_secs(self.token_issue_window),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            cache_ttl: 3 * 60 * 60,
            negative_cache_ttl: 300,
            sweep_interval: 60,
            rate_limit_threshold: 15,
            rate_limit_window: 180,
            rate_limit_punishment: 300,
            rate_limit_entry_ttl: 40 * 60,
            token_ttl: 600,
            token_issue_limit: 10,
            token_issue_window: 60 * 60,
            token_max_verify_attempts: 5,
            change_password_url: "http://localhost:3000/changePassword".to_string(),
            confirm_account_url: "http://localhost:3000/confirmAccount".to_string(),
            ip_proxy_header: None,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
