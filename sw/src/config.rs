//! Sweeper configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::controller::ControllerConfig;
use crate::detector::DetectorConfig;
use crate::retry::RetryPolicy;

/// Main sweeper configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Where run event logs are written
    #[serde(rename = "runs-dir")]
    pub runs_dir: Option<PathBuf>,

    /// Completion wait timing
    pub detector: DetectorConfig,

    /// Commit confirm-retry policy
    pub commit: RetryPolicy,

    /// Refresh confirm-retry policy for outdated targets
    pub refresh: RetryPolicy,

    pub controller: ControllerConfig,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./.sweeper.yml`, then
    /// `<config_dir>/sweeper/sweeper.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".sweeper.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sweeper").join("sweeper.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Resolved runs directory, defaulting under the user's data dir
    pub fn runs_dir(&self) -> PathBuf {
        self.runs_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sweeper")
                .join("runs")
        })
    }

    /// Parsed log level, if one is configured and valid
    pub fn log_level(&self) -> Option<tracing::Level> {
        self.log_level.as_deref().and_then(parse_log_level)
    }
}

/// Parse a level name, case-insensitively
pub fn parse_log_level(text: &str) -> Option<tracing::Level> {
    text.trim().parse().ok()
}

/// Read only the log level, before logging is set up
///
/// Errors are swallowed: a broken config file is reported properly once
/// logging exists and [`Config::load`] runs.
pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<tracing::Level> {
    let candidates: Vec<PathBuf> = match config_path {
        Some(path) => vec![path.clone()],
        None => {
            let mut paths = vec![PathBuf::from(".sweeper.yml")];
            if let Some(config_dir) = dirs::config_dir() {
                paths.push(config_dir.join("sweeper").join("sweeper.yml"));
            }
            paths
        }
    };

    candidates
        .iter()
        .filter(|p| p.exists())
        .find_map(|p| fs::read_to_string(p).ok())
        .and_then(|content| serde_yaml::from_str::<Config>(&content).ok())
        .and_then(|config| config.log_level())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.log_level.is_none());
        assert_eq!(config.detector.poll_interval_ms, 150);
        assert_eq!(config.detector.initial_timeout_ms, 20_000);
        assert_eq!(config.commit.max_attempts, 5);
        assert!(config.controller.require_transition);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug
runs-dir: /tmp/sweeps

detector:
  poll-interval-ms: 100
  deep-initial-timeout-ms: 90000

commit:
  max-attempts: 3
  retry-delay-ms: 250

refresh:
  max-attempts: 2

controller:
  require-transition: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level(), Some(tracing::Level::DEBUG));
        assert_eq!(config.runs_dir(), PathBuf::from("/tmp/sweeps"));
        assert_eq!(config.detector.poll_interval_ms, 100);
        assert_eq!(config.detector.deep_initial_timeout_ms, 90_000);
        assert_eq!(config.detector.initial_timeout_ms, 20_000);
        assert_eq!(config.commit.max_attempts, 3);
        assert_eq!(config.commit.post_act_delay_ms, 300);
        assert_eq!(config.refresh.max_attempts, 2);
        assert_eq!(config.refresh.retry_delay_ms, 500);
        assert!(!config.controller.require_transition);
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("custom.yml");
        fs::write(&path, "commit:\n  enabled: false\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(!config.commit.enabled);
        assert!(config.refresh.enabled);
    }

    #[test]
    fn test_load_explicit_path_missing_is_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_log_level() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("levels.yml");
        fs::write(&path, "log-level: WARN\n").unwrap();
        assert_eq!(load_log_level(Some(&path)), Some(tracing::Level::WARN));

        fs::write(&path, "log-level: loud\n").unwrap();
        assert_eq!(load_log_level(Some(&path)), None);
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace"), Some(tracing::Level::TRACE));
        assert_eq!(parse_log_level(" Info "), Some(tracing::Level::INFO));
        assert_eq!(parse_log_level("verbose"), None);
    }
}
