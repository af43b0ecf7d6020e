//! Environment variable parsing helpers

use std::str::FromStr;

/// Parse `key`, falling back to `default` when unset or unparsable.
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    parse_env_optional(key).unwrap_or(default)
}

/// Parse `key`; `None` when unset or unparsable.
pub fn parse_env_optional<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
