//! Logger configuration and presets.

use serde::{Deserialize, Serialize};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Single-line human-readable output.
    #[default]
    Compact,
    /// Multi-line human-readable output.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl Format {
    /// Parse a format name, falling back to [`Format::Compact`].
    #[must_use]
    pub fn parse_lossy(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `EnvFilter` directive, e.g. `"info"` or `"converge_engine=debug,info"`.
    pub level: String,
    /// Output format.
    pub format: Format,
    /// Colourise human-readable output.
    pub ansi: bool,
    /// Include the event target (module path).
    pub with_target: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            ansi: true,
            with_target: true,
        }
    }
}

impl Config {
    /// Build from `CONVERGE_LOG` (falling back to `RUST_LOG`) and
    /// `CONVERGE_LOG_FORMAT`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup("CONVERGE_LOG").or_else(|| lookup("RUST_LOG")) {
            config.level = level;
        }
        if let Some(format) = lookup("CONVERGE_LOG_FORMAT") {
            config.format = Format::parse_lossy(&format);
        }
        if config.format == Format::Json {
            config.ansi = false;
        }

        config
    }

    /// Development configuration (pretty, debug level).
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level, no colours).
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            ansi: false,
            with_target: true,
        }
    }

    /// Replace the filter directive.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_env_is_default() {
        assert_eq!(Config::from_lookup(lookup(&[])), Config::default());
    }

    #[test]
    fn converge_log_wins_over_rust_log() {
        let config = Config::from_lookup(lookup(&[
            ("CONVERGE_LOG", "converge_engine=trace"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(config.level, "converge_engine=trace");
    }

    #[test]
    fn rust_log_is_fallback() {
        let config = Config::from_lookup(lookup(&[("RUST_LOG", "warn")]));
        assert_eq!(config.level, "warn");
    }

    #[rstest]
    #[case("json", Format::Json)]
    #[case("PRETTY", Format::Pretty)]
    #[case("compact", Format::Compact)]
    #[case("logfmt", Format::Compact)]
    fn format_from_env(#[case] raw: &str, #[case] expected: Format) {
        let config = Config::from_lookup(lookup(&[("CONVERGE_LOG_FORMAT", raw)]));
        assert_eq!(config.format, expected);
    }

    #[test]
    fn json_disables_ansi() {
        let config = Config::from_lookup(lookup(&[("CONVERGE_LOG_FORMAT", "json")]));
        assert!(!config.ansi);
    }

    #[test]
    fn presets() {
        assert_eq!(Config::development().format, Format::Pretty);
        assert_eq!(Config::development().level, "debug");
        assert_eq!(Config::production().format, Format::Json);
        assert!(!Config::production().ansi);
    }

    #[test]
    fn deserializes_partial() {
        let config: Config = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.level, "info");
    }
}
