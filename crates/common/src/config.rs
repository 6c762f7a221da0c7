//! Environment-variable configuration helpers shared by the pipeline
//! binaries; each component builds its config struct from these.

use std::env;
use std::str::FromStr;

/// Read a parseable value from the environment, falling back to `default`
/// when the variable is unset or malformed.
pub fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Read a required variable; `None` means the component cannot start.
pub fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}
