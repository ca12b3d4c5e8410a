//! Layered engine configuration: defaults, then an optional TOML file, then
//! `CONVERGE_*` environment variables.

use std::path::Path;

use converge_engine::EngineConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};

/// Prefix of the environment variables that override engine settings.
/// Nested keys use a double underscore, e.g. `CONVERGE_RETRY__MAX_ATTEMPTS`.
pub const ENV_PREFIX: &str = "CONVERGE_";

pub fn load(path: Option<&Path>) -> Result<EngineConfig, figment::Error> {
    let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));
    if let Some(path) = path {
        if !path.is_file() {
            return Err(figment::Error::from(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_without_file() {
        Jail::expect_with(|_| {
            assert_eq!(load(None)?, EngineConfig::default());
            Ok(())
        });
    }

    #[test]
    fn file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "converge.toml",
                r#"
                poll_interval = "100ms"
                dependency_timeout = "2m"

                [retry]
                max_attempts = 5
                backoff = { type = "fixed", delay = "30s" }

                [kind_retry.model]
                max_attempts = 3
                "#,
            )?;
            jail.set_env("CONVERGE_DEPENDENCY_TIMEOUT", "45s");
            jail.set_env("CONVERGE_ACCEPT_UNHEALTHY", "true");

            let config = load(Some(Path::new("converge.toml")))?;
            assert_eq!(config.poll_interval, Duration::from_millis(100));
            assert_eq!(config.dependency_timeout, Duration::from_secs(45));
            assert!(config.accept_unhealthy);
            assert_eq!(config.retry.next_delay(1), Duration::from_secs(30));
            assert_eq!(
                config.retry_for(&"model".into()).max_attempts,
                3
            );
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_an_error() {
        Jail::expect_with(|_| {
            let err = load(Some(Path::new("nope.toml"))).unwrap_err();
            assert!(err.to_string().contains("nope.toml"));
            Ok(())
        });
    }
}
