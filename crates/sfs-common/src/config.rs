//! Configuration lookup helpers.
//!
//! Every `elasticsearch.*` option can come from the config file or from
//! the environment. The config file wins when both are set; the
//! environment is consulted under the exact key first and then under its
//! SCREAMING_SNAKE_CASE translation (dots and dashes become underscores),
//! since most shells cannot export names containing dots.

/// Resolve a config field with environment fallback.
///
/// Returns the config value when present, otherwise the environment
/// value for `key`, otherwise `None`.
#[must_use]
pub fn field_or_env(field: Option<&str>, key: &str) -> Option<String> {
    if let Some(value) = field {
        return Some(value.to_string());
    }
    env_lookup(key)
}

/// Like [`field_or_env`] but with a default for the fully-unset case.
#[must_use]
pub fn field_or_env_or(field: Option<&str>, key: &str, default: &str) -> String {
    field_or_env(field, key).unwrap_or_else(|| default.to_string())
}

fn env_lookup(key: &str) -> Option<String> {
    if let Ok(value) = std::env::var(key) {
        return Some(value);
    }
    std::env::var(env_name(key)).ok()
}

/// Translate a dotted config key into an exportable environment name.
#[must_use]
pub fn env_name(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}
