//! Configuration loading for bizpass.
//!
//! Every process (resident bot, admin bot, owner bot, maintenance worker)
//! reads the same TOML file. All sections are optional; accessors on
//! [`BizpassConfig`] apply defaults so callers never deal with `Option`.
//!
//! ```toml
//! [database]
//! path = "${BIZPASS_HOME}/state.db"
//! busy_timeout_ms = 5000
//!
//! [admin]
//! ids = [1001, 1002]
//!
//! [payments]
//! provider = "telegram_stars"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};
use thiserror::Error;

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 50;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 1000;
pub const DEFAULT_RETRY_JITTER: f64 = 0.25;
pub const DEFAULT_GRACE_DAYS: u32 = 3;
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;
pub const MIN_RECONCILE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_TOKEN_TTL_HOURS: u32 = 72;
pub const MAX_TOKEN_TTL_HOURS: u32 = 24 * 30;
pub const DEFAULT_TOKEN_ATTEMPTS: u32 = 5;
pub const DEFAULT_TOKEN_LENGTH: usize = 10;
pub const DEFAULT_CURRENCY: &str = "XTR";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BizpassConfig {
    pub database: Option<DatabaseConfig>,
    pub retry: Option<RetryConfig>,
    pub admin: Option<AdminConfig>,
    pub payments: Option<PaymentsConfig>,
    pub subscriptions: Option<SubscriptionsConfig>,
    pub claim_tokens: Option<ClaimTokensConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Default, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file shared by all processes. Supports `${ENV}` and a leading `~`.
    pub path: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

/// Backoff for transient "database is locked" failures.
#[derive(Debug, Default, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub jitter_factor: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Mock,
    TelegramStars,
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Mock => "mock",
            ProviderKind::TelegramStars => "telegram_stars",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentsConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    pub currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionsConfig {
    pub grace_days: Option<u32>,
    pub reconcile_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClaimTokensConfig {
    pub ttl_hours: Option<u32>,
    pub attempts: Option<u32>,
    pub length: Option<usize>,
}

/// Resolved retry policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_RETRY_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            jitter_factor: DEFAULT_RETRY_JITTER,
        }
    }
}

/// Resolved claim token policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSettings {
    pub ttl_hours: u32,
    pub attempts: u32,
    pub length: usize,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            attempts: DEFAULT_TOKEN_ATTEMPTS,
            length: DEFAULT_TOKEN_LENGTH,
        }
    }
}

impl BizpassConfig {
    /// Load the config from the default location, if it exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        let config = Self::parse(&content).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ttl) = self.claim_tokens.as_ref().and_then(|c| c.ttl_hours)
            && !(1..=MAX_TOKEN_TTL_HOURS).contains(&ttl)
        {
            return Err(ConfigError::Invalid {
                field: "claim_tokens.ttl_hours",
                reason: format!("must be within 1..={MAX_TOKEN_TTL_HOURS}, got {ttl}"),
            });
        }
        if let Some(length) = self.claim_tokens.as_ref().and_then(|c| c.length)
            && !(6..=64).contains(&length)
        {
            return Err(ConfigError::Invalid {
                field: "claim_tokens.length",
                reason: format!("must be within 6..=64, got {length}"),
            });
        }
        if let Some(jitter) = self.retry.as_ref().and_then(|r| r.jitter_factor)
            && !(0.0..=1.0).contains(&jitter)
        {
            return Err(ConfigError::Invalid {
                field: "retry.jitter_factor",
                reason: format!("must be within 0.0..=1.0, got {jitter}"),
            });
        }
        Ok(())
    }

    /// Database file path, with `${ENV}` and `~` expanded.
    #[must_use]
    pub fn database_path(&self) -> Option<PathBuf> {
        match self.database.as_ref().and_then(|db| db.path.as_deref()) {
            Some(raw) => Some(expand_home(&expand_env_vars(raw))),
            None => default_data_dir().map(|dir| dir.join("state.db")),
        }
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(
            self.database
                .as_ref()
                .and_then(|db| db.busy_timeout_ms)
                .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
        )
    }

    #[must_use]
    pub fn retry(&self) -> RetrySettings {
        let defaults = RetrySettings::default();
        let Some(retry) = self.retry.as_ref() else {
            return defaults;
        };
        RetrySettings {
            max_attempts: retry.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            initial_delay: retry
                .initial_delay_ms
                .map_or(defaults.initial_delay, Duration::from_millis),
            max_delay: retry
                .max_delay_ms
                .map_or(defaults.max_delay, Duration::from_millis),
            jitter_factor: retry.jitter_factor.unwrap_or(defaults.jitter_factor),
        }
    }

    #[must_use]
    pub fn admin_ids(&self) -> Vec<i64> {
        self.admin
            .as_ref()
            .map(|admin| admin.ids.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn provider(&self) -> ProviderKind {
        self.payments
            .as_ref()
            .map(|payments| payments.provider)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn currency(&self) -> String {
        self.payments
            .as_ref()
            .and_then(|payments| payments.currency.clone())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
    }

    #[must_use]
    pub fn grace_days(&self) -> u32 {
        self.subscriptions
            .as_ref()
            .and_then(|subs| subs.grace_days)
            .unwrap_or(DEFAULT_GRACE_DAYS)
    }

    /// Sweep interval, never below [`MIN_RECONCILE_INTERVAL_SECS`].
    #[must_use]
    pub fn reconcile_interval(&self) -> Duration {
        let secs = self
            .subscriptions
            .as_ref()
            .and_then(|subs| subs.reconcile_interval_secs)
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS);
        Duration::from_secs(secs.max(MIN_RECONCILE_INTERVAL_SECS))
    }

    #[must_use]
    pub fn claim_tokens(&self) -> TokenSettings {
        let defaults = TokenSettings::default();
        let Some(tokens) = self.claim_tokens.as_ref() else {
            return defaults;
        };
        TokenSettings {
            ttl_hours: tokens.ttl_hours.unwrap_or(defaults.ttl_hours),
            attempts: tokens.attempts.unwrap_or(defaults.attempts),
            length: tokens.length.unwrap_or(defaults.length),
        }
    }
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if var.is_empty() {
                    out.push_str("${}");
                } else {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand_home(value: &str) -> PathBuf {
    if let Some(stripped) = value.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(value)
}

#[must_use]
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".bizpass"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    default_data_dir().map(|dir| dir.join("config.toml"))
}
