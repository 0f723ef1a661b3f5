//! Source tracing for configuration fields.
//!
//! Every effective configuration value carries a [`SourceTrace`] describing
//! where it came from (CLI flag, environment variable, dotenv file, TOML
//! file, or built-in default), the name of that source, the raw value, and a
//! load timestamp. The core propagates these through component construction
//! and ignores them at run time; debug output masks sensitive fields.

use chrono::{DateTime, Utc};

/// Which configuration layer produced a value. Layers are listed from highest
/// to lowest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    Cli,
    Env,
    DotEnv,
    Toml,
    Default,
}

impl ConfigOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigOrigin::Cli => "cli",
            ConfigOrigin::Env => "env",
            ConfigOrigin::DotEnv => "dotenv",
            ConfigOrigin::Toml => "toml",
            ConfigOrigin::Default => "default",
        }
    }
}

/// Provenance record for one configuration field.
#[derive(Debug, Clone)]
pub struct SourceTrace {
    /// The layer the effective value came from.
    pub origin: ConfigOrigin,
    /// Source name: a file path for toml/dotenv, the variable name for env,
    /// the flag name for cli, or `"default"`.
    pub source_name: String,
    /// The raw (stringly) value as read from the source.
    pub raw_value: String,
    /// When the value was loaded.
    pub loaded_at: DateTime<Utc>,
}

impl SourceTrace {
    pub fn new(
        origin: ConfigOrigin,
        source_name: impl Into<String>,
        raw_value: impl Into<String>,
    ) -> Self {
        SourceTrace {
            origin,
            source_name: source_name.into(),
            raw_value: raw_value.into(),
            loaded_at: Utc::now(),
        }
    }
}

/// Replacement string for masked values in debug output.
pub const MASKED_VALUE: &str = "[REDACTED]";

/// Substrings that mark a field name as sensitive.
pub const SENSITIVE_FIELD_PATTERNS: &[&str] = &[
    "api_key",
    "password",
    "secret",
    "token",
    "credential",
    "private_key",
];

/// Field names exempt from masking even though they match a sensitive
/// pattern (e.g. `max_tokens` matches `token`).
pub const NON_SENSITIVE_FIELD_EXCEPTIONS: &[&str] =
    &["max_tokens", "max_content_tokens", "auth_url"];

/// Render a field's value for debug output, substituting [`MASKED_VALUE`]
/// when the field name matches a sensitive pattern.
pub fn mask_field_value(field_name: &str, value: &str) -> String {
    let lower = field_name.to_ascii_lowercase();
    if NON_SENSITIVE_FIELD_EXCEPTIONS
        .iter()
        .any(|e| lower == *e || lower.ends_with(&format!(".{}", e)))
    {
        return value.to_string();
    }
    if SENSITIVE_FIELD_PATTERNS.iter().any(|p| lower.contains(p)) {
        return MASKED_VALUE.to_string();
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_sensitive_fields() {
        assert_eq!(mask_field_value("api_key", "sk-abc"), MASKED_VALUE);
        assert_eq!(mask_field_value("leader.secret_token", "x"), MASKED_VALUE);
        assert_eq!(mask_field_value("db_password", "hunter2"), MASKED_VALUE);
    }

    #[test]
    fn exceptions_stay_visible() {
        assert_eq!(mask_field_value("max_tokens", "2048"), "2048");
        assert_eq!(mask_field_value("leader.max_tokens", "2048"), "2048");
        assert_eq!(mask_field_value("auth_url", "https://x"), "https://x");
    }

    #[test]
    fn plain_fields_stay_visible() {
        assert_eq!(mask_field_value("timeout_per_team_seconds", "300"), "300");
    }
}
