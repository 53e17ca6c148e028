//! Configuration loading.
//!
//! Settings come from TOML, with every field defaulted, followed by a few
//! environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::events::DEFAULT_LOG_CAPACITY;
use crate::retention::RetentionPolicy;

/// Exponential backoff between submission retries.
///
/// Retry `n` (1-based) waits `base * (2^n - 1)`, capped at `max`:
/// 1s, 3s, 7s, 15s, … with the default base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (1-based). Retry 0 has no delay.
    pub fn delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64
            .checked_shl(retry.min(63))
            .map_or(u64::MAX, |p| p - 1);
        let ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms.max(self.base_delay_ms));
        Duration::from_millis(ms)
    }
}

/// Event bus settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSettings {
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            log_capacity: default_log_capacity(),
        }
    }
}

/// Top-level quizgate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizgateConfig {
    /// Whether micro-quizzes wait for their section to be read.
    #[serde(default = "default_true")]
    pub gating_enabled: bool,
    /// Retries after the first failed submission write.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Locale used when the caller does not pick one.
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    #[serde(default)]
    pub events: EventSettings,
}

fn default_true() -> bool {
    true
}
fn default_retries() -> u32 {
    3
}
fn default_locale() -> String {
    "en".to_string()
}

impl Default for QuizgateConfig {
    fn default() -> Self {
        Self {
            gating_enabled: true,
            max_retries: default_retries(),
            default_locale: default_locale(),
            retention: RetentionPolicy::default(),
            backoff: BackoffPolicy::default(),
            events: EventSettings::default(),
        }
    }
}

impl QuizgateConfig {
    /// Clamp out-of-range values into their valid ranges.
    pub fn normalized(mut self) -> Self {
        self.retention.max_attempts_stored = self.retention.max_attempts_stored.max(1);
        self.events.log_capacity = self.events.log_capacity.max(1);
        self.backoff.max_delay_ms = self.backoff.max_delay_ms.max(self.backoff.base_delay_ms);
        if self.default_locale.trim().is_empty() {
            self.default_locale = default_locale();
        }
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: QuizgateConfig =
            toml::from_str(content).context("failed to parse quizgate config")?;
        Ok(config.normalized())
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("QUIZGATE_MAX_RETRIES") {
            match raw.trim().parse::<u32>() {
                Ok(n) => self.max_retries = n,
                Err(_) => tracing::warn!("ignoring QUIZGATE_MAX_RETRIES={raw}: not a number"),
            }
        }
        if let Some(locale) = lookup("QUIZGATE_LOCALE") {
            if !locale.trim().is_empty() {
                self.default_locale = locale.trim().to_string();
            }
        }
        if let Some(raw) = lookup("QUIZGATE_GATING") {
            match raw.trim().to_lowercase().as_str() {
                "on" | "true" | "1" => self.gating_enabled = true,
                "off" | "false" | "0" => self.gating_enabled = false,
                _ => tracing::warn!("ignoring QUIZGATE_GATING={raw}: expected on/off"),
            }
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `quizgate.toml` in the current directory
/// 2. `~/.config/quizgate/config.toml`
///
/// Environment overrides: `QUIZGATE_MAX_RETRIES`, `QUIZGATE_LOCALE`,
/// `QUIZGATE_GATING`.
pub fn load_config() -> Result<QuizgateConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizgateConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("quizgate.toml");
        if local.exists() {
            Some(local)
        } else {
            config_dir()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            QuizgateConfig::from_toml_str(&content)
                .with_context(|| format!("failed to load config: {}", path.display()))?
        }
        None => QuizgateConfig::default(),
    };

    config.apply_env_overrides(|name| std::env::var(name).ok());
    Ok(config.normalized())
}

fn config_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizgate"))
}
