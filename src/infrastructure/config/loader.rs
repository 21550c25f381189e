use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{Config, OracleKind};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_concurrency: {0}. Must be between 1 and 64")]
    InvalidMaxConcurrency(usize),

    #[error("Invalid port_reserve_attempts: {0}. Must be at least 1")]
    InvalidReserveAttempts(u32),

    #[error("Invalid fallback port range: {0}-{1}. Start must be non-zero and not exceed end")]
    InvalidPortRange(u16, u16),

    #[error("Invalid {field}: must be greater than 0")]
    ZeroDuration { field: &'static str },

    #[error("Ready marker cannot be empty")]
    EmptyReadyMarker,

    #[error("Bind host cannot be empty")]
    EmptyBindHost,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Oracle kind '{kind}' requires '{field}' to be set")]
    MissingOracleField { kind: &'static str, field: &'static str },

    #[error("Invalid requests_per_minute: {0}. Must be at least 1")]
    InvalidOracleRate(u32),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .udpqa/config.yaml (project config)
    /// 3. .udpqa/local.yaml (project local overrides, optional)
    /// 4. Environment variables (UDPQA_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".udpqa/config.yaml"))
            .merge(Yaml::file(".udpqa/local.yaml"))
            .merge(Env::prefixed("UDPQA_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring env overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("UDPQA_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.engine.max_concurrency == 0 || config.engine.max_concurrency > 64 {
            return Err(ConfigError::InvalidMaxConcurrency(
                config.engine.max_concurrency,
            ));
        }
        if config.engine.global_deadline_secs == Some(0) {
            return Err(ConfigError::ZeroDuration {
                field: "engine.global_deadline_secs",
            });
        }

        if config.refinement.port_reserve_attempts == 0 {
            return Err(ConfigError::InvalidReserveAttempts(
                config.refinement.port_reserve_attempts,
            ));
        }

        let ports = &config.ports;
        if ports.fallback_start == 0 || ports.fallback_start > ports.fallback_end {
            return Err(ConfigError::InvalidPortRange(
                ports.fallback_start,
                ports.fallback_end,
            ));
        }

        let supervisor = &config.supervisor;
        if supervisor.bind_host.trim().is_empty() {
            return Err(ConfigError::EmptyBindHost);
        }
        if supervisor.ready_marker.is_empty() {
            return Err(ConfigError::EmptyReadyMarker);
        }
        for (field, value) in [
            ("supervisor.readiness_timeout_ms", supervisor.readiness_timeout_ms),
            ("supervisor.poll_interval_ms", supervisor.poll_interval_ms),
            ("runner.timeout_ms", config.runner.timeout_ms),
            ("oracle.timeout_ms", config.oracle.timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration { field });
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        match config.oracle.kind {
            OracleKind::None => {}
            OracleKind::Command => {
                if config.oracle.command.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::MissingOracleField {
                        kind: "command",
                        field: "oracle.command",
                    });
                }
            }
            OracleKind::Http => {
                if config.oracle.url.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::MissingOracleField {
                        kind: "http",
                        field: "oracle.url",
                    });
                }
            }
        }
        if config.oracle.requests_per_minute == 0 {
            return Err(ConfigError::InvalidOracleRate(
                config.oracle.requests_per_minute,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.engine.max_concurrency, 4);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
engine:
  max_concurrency: 8
refinement:
  max_retries: 5
ports:
  fallback_start: 50000
  fallback_end: 50100
oracle:
  kind: command
  command: ./oracle.sh
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.engine.max_concurrency, 8);
        assert_eq!(config.refinement.max_retries, 5);
        assert_eq!(config.ports.fallback_start, 50000);
        assert_eq!(config.oracle.kind, OracleKind::Command);
        assert_eq!(config.logging.level, "debug");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = Config::default();
        config.engine.max_concurrency = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConcurrency(0))
        ));
    }

    #[test]
    fn test_validate_too_much_concurrency() {
        let mut config = Config::default();
        config.engine.max_concurrency = 65;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConcurrency(65))
        ));
    }

    #[test]
    fn test_validate_zero_max_retries_is_allowed() {
        let mut config = Config::default();
        config.refinement.max_retries = 0;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_inverted_port_range() {
        let mut config = Config::default();
        config.ports.fallback_start = 41000;
        config.ports.fallback_end = 40000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPortRange(41000, 40000))
        ));
    }

    #[test]
    fn test_validate_zero_readiness_timeout() {
        let mut config = Config::default();
        config.supervisor.readiness_timeout_ms = 0;
        match ConfigLoader::validate(&config) {
            Err(ConfigError::ZeroDuration { field }) => {
                assert_eq!(field, "supervisor.readiness_timeout_ms");
            }
            other => panic!("Expected ZeroDuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_command_oracle_requires_command() {
        let mut config = Config::default();
        config.oracle.kind = OracleKind::Command;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::MissingOracleField { kind: "command", .. })
        ));
    }

    #[test]
    fn test_validate_http_oracle_requires_url() {
        let mut config = Config::default();
        config.oracle.kind = OracleKind::Http;
        config.oracle.url = Some(String::new());
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::MissingOracleField { kind: "http", .. })
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_env_override() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "refinement:\n  max_retries: 2\nengine:\n  max_concurrency: 2").unwrap();
        file.flush().unwrap();

        temp_env::with_vars(
            [
                ("UDPQA_REFINEMENT__MAX_RETRIES", Some("7")),
                ("UDPQA_SUPERVISOR__READY_MARKER", Some("LISTENING")),
            ],
            || {
                let config = ConfigLoader::load_from_file(file.path()).expect("config loads");
                assert_eq!(config.refinement.max_retries, 7, "env should win");
                assert_eq!(config.engine.max_concurrency, 2, "file value persists");
                assert_eq!(config.supervisor.ready_marker, "LISTENING");
            },
        );
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "engine:\n  max_concurrency: 5\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "engine:\n  max_concurrency: 15\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.engine.max_concurrency, 15, "Override should win");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.format,
            crate::domain::models::LogFormat::Json,
            "Base value should persist when not overridden"
        );
    }
}
