//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TallySettings::default()`]
//! 2. If a settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)
//!
//! Nothing here logs: loading runs before the subscriber is installed, so
//! what happened is returned in [`LoadedSettings`] for the caller to report.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{RejectedOverride, Result, SettingsError};
use crate::types::{LogFormat, LogLevel, TallySettings};

/// Settings plus how they were arrived at.
#[derive(Clone, Debug, Default)]
pub struct LoadedSettings {
    /// The effective settings.
    pub settings: TallySettings,
    /// Settings file that was merged in, if one existed.
    pub file: Option<PathBuf>,
    /// Environment overrides that were set but ignored.
    pub rejected: Vec<RejectedOverride>,
}

/// Resolve the default settings file path (`~/.tally/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tally").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LoadedSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, or the merged result fails validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<LoadedSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Load settings from `path`, resolving overrides through `lookup`.
pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<LoadedSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(TallySettings::default())?;

    let (merged, file) = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        (deep_merge(defaults, user), Some(path.to_path_buf()))
    } else {
        (defaults, None)
    };

    let mut settings: TallySettings = serde_json::from_value(merged)?;
    let rejected = apply_env_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(LoadedSettings {
        settings,
        file,
        rejected,
    })
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides to loaded settings.
///
/// `PORT` and the `PG_*` family keep their conventional names; everything
/// else is namespaced under `TALLY_`. Invalid values leave the file or
/// default value in place and are returned for the caller to report.
pub fn apply_env_overrides<F>(settings: &mut TallySettings, lookup: F) -> Vec<RejectedOverride>
where
    F: Fn(&str) -> Option<String>,
{
    let mut env = EnvReader {
        lookup,
        rejected: Vec::new(),
    };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.u16_in("PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("TALLY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u64_in("TALLY_TICK_INTERVAL_MS", 10, 3_600_000) {
        settings.server.tick_interval_ms = v;
    }
    if let Some(v) = env.u64_in("TALLY_HEARTBEAT_INTERVAL_MS", 10, 3_600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.usize_in("TALLY_MAX_SEND_QUEUE", 1, 65_536) {
        settings.server.max_send_queue = v;
    }
    if let Some(v) = env.u64_in("TALLY_SHUTDOWN_TIMEOUT_MS", 0, 600_000) {
        settings.server.shutdown_timeout_ms = v;
    }

    // ── Database ────────────────────────────────────────────────────
    if let Some(v) = env.string("PG_HOST") {
        settings.database.host = Some(v);
    }
    if let Some(v) = env.u16_in("PG_PORT", 1, 65535) {
        settings.database.port = v;
    }
    if let Some(v) = env.string("PG_USER") {
        settings.database.user = Some(v);
    }
    if let Some(v) = env.string("PG_PASSWORD") {
        settings.database.password = Some(v);
    }
    if let Some(v) = env.string("PG_DATABASE") {
        settings.database.database = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.parsed(
        "TALLY_LOG_LEVEL",
        "one of trace, debug, info, warn, error",
        parse_log_level,
    ) {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("TALLY_LOG_FORMAT", "pretty or json", parse_log_format) {
        settings.logging.format = v;
    }

    env.rejected
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log level name (case-insensitive, `warning` accepted).
pub fn parse_log_level(val: &str) -> Option<LogLevel> {
    match val.to_lowercase().as_str() {
        "trace" => Some(LogLevel::Trace),
        "debug" => Some(LogLevel::Debug),
        "info" => Some(LogLevel::Info),
        "warn" | "warning" => Some(LogLevel::Warn),
        "error" => Some(LogLevel::Error),
        _ => None,
    }
}

/// Parse a log format name (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "pretty" | "text" => Some(LogFormat::Pretty),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
    rejected: Vec<RejectedOverride>,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    /// Read `name` through `parse`, remembering values it refuses.
    fn parsed<T>(
        &mut self,
        name: &'static str,
        expected: &str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            self.rejected.push(RejectedOverride {
                key: name,
                value: val,
                expected: expected.to_string(),
            });
        }
        result
    }

    fn u16_in(&mut self, name: &'static str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, &format!("integer in {min}..={max}"), |v| {
            parse_u16_range(v, min, max)
        })
    }

    fn u64_in(&mut self, name: &'static str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, &format!("integer in {min}..={max}"), |v| {
            parse_u64_range(v, min, max)
        })
    }

    fn usize_in(&mut self, name: &'static str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, &format!("integer in {min}..={max}"), |v| {
            parse_usize_range(v, min, max)
        })
    }
}
