//! Helpers for `GATEWATCH_*` environment configuration.

use std::str::FromStr;
use std::time::Duration;

/// Parse `key`, falling back to `default` when unset or malformed.
pub fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub fn string_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Boolean flag; "0", "false", "no" and "off" are false.
pub fn flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
        .unwrap_or(default)
}

pub fn millis_or(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(parse_or(key, default_ms))
}

pub fn secs_or(key: &str, default_secs: f64) -> Duration {
    let secs: f64 = parse_or(key, default_secs);
    Duration::try_from_secs_f64(secs).unwrap_or_else(|_| Duration::from_secs_f64(default_secs))
}
