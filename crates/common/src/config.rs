//! Engine configuration loader using TOML and serde.
//!
//! Every section is optional in the file. A missing section falls back to
//! the compiled-in defaults; a present one must be complete. After loading,
//! the environment may override the initial mode and the store timeout:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `EARNGUARD_MODE` | `mode` (`BETA` / `NATURAL`) |
//! | `EARNGUARD_STORE_TIMEOUT_MS` | `store_timeout_ms` |

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mode::{Mode, ModeSnapshot, ModeThresholds, SwappableModeProvider};

/// Store calls must answer well under a second.
const MAX_STORE_TIMEOUT_MS: u64 = 1_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Constants of the raw-earnings formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarningsParams {
    /// Currency units per quality point.
    pub rate_per_point: f64,
    /// Revenue share of the baseline tier; tier multipliers are relative to it.
    pub baseline_share: f64,
}

impl Default for EarningsParams {
    fn default() -> Self {
        Self {
            rate_per_point: 0.10,
            baseline_share: 0.55,
        }
    }
}

/// Intervals of the background jobs run by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub warning_sweep_secs: u64,
    pub suspicious_scan_secs: u64,
    /// Zero disables periodic snapshot flushing.
    pub snapshot_flush_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            warning_sweep_secs: 900,
            suspicious_scan_secs: 3_600,
            snapshot_flush_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Mode active at startup.
    pub mode: Mode,
    pub store_timeout_ms: u64,
    pub earnings: EarningsParams,
    pub beta: ModeThresholds,
    pub natural: ModeThresholds,
    pub jobs: JobsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Beta,
            store_timeout_ms: 500,
            earnings: EarningsParams::default(),
            beta: ModeThresholds::beta_default(),
            natural: ModeThresholds::natural_default(),
            jobs: JobsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: EngineConfig = toml::from_str(s)?;
        Ok(cfg)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Overlays `EARNGUARD_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Overlays values from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("EARNGUARD_MODE") {
            self.mode = raw.parse().map_err(ConfigError::Invalid)?;
        }
        if let Some(raw) = lookup("EARNGUARD_STORE_TIMEOUT_MS") {
            self.store_timeout_ms = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "EARNGUARD_STORE_TIMEOUT_MS must be an integer, got {:?}",
                    raw
                ))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_timeout_ms == 0 || self.store_timeout_ms >= MAX_STORE_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "store_timeout_ms must be in 1..{}, got {}",
                MAX_STORE_TIMEOUT_MS, self.store_timeout_ms
            )));
        }
        if !(self.earnings.rate_per_point >= 0.0) {
            return Err(ConfigError::Invalid(
                "earnings.rate_per_point must be non-negative".to_string(),
            ));
        }
        if !(self.earnings.baseline_share > 0.0) {
            return Err(ConfigError::Invalid(
                "earnings.baseline_share must be positive".to_string(),
            ));
        }
        self.beta
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("beta: {}", e)))?;
        self.natural
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("natural: {}", e)))?;
        if self.jobs.warning_sweep_secs == 0 || self.jobs.suspicious_scan_secs == 0 {
            return Err(ConfigError::Invalid(
                "job intervals must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Thresholds configured for `mode`.
    #[must_use]
    pub fn thresholds_for(&self, mode: Mode) -> &ModeThresholds {
        match mode {
            Mode::Beta => &self.beta,
            Mode::Natural => &self.natural,
        }
    }

    /// Snapshot of the startup mode.
    pub fn initial_snapshot(&self) -> ModeSnapshot {
        ModeSnapshot::new(self.mode, self.thresholds_for(self.mode).clone())
    }

    /// Provider seeded with both threshold sets.
    pub fn mode_provider(&self) -> SwappableModeProvider {
        SwappableModeProvider::new(self.mode, self.beta.clone(), self.natural.clone())
    }
}

/// Load config from a TOML file path and validate it.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let s = fs::read_to_string(path.as_ref())?;
    let cfg = EngineConfig::from_toml_str(&s)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{CapFailureAction, ModeProvider};
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.mode, Mode::Beta);
        assert_eq!(cfg.earnings.rate_per_point, 0.10);
    }

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let tmp = tempfile::NamedTempFile::new().expect("temp file");
        let mut f = tmp.reopen().expect("reopen");
        write!(f, "{}", contents).expect("write");
        tmp
    }

    #[test]
    fn test_load_from_file_top_level_only() {
        let tmp = write_temp(
            r#"
            mode = "NATURAL"
            store_timeout_ms = 250
        "#,
        );
        let cfg = load_from_file(tmp.path()).expect("load");
        assert_eq!(cfg.mode, Mode::Natural);
        assert_eq!(cfg.store_timeout_ms, 250);
        // absent sections keep defaults
        assert_eq!(cfg.beta, ModeThresholds::beta_default());
        assert_eq!(cfg.natural, ModeThresholds::natural_default());
        assert_eq!(cfg.jobs, JobsConfig::default());
    }

    #[test]
    fn test_load_from_file_full_section() {
        let mut expected = EngineConfig::default();
        expected.beta.caps.per_post_cap = 25.0;
        expected.beta.caps.cap_failure_action = CapFailureAction::Block;
        expected.jobs.snapshot_flush_secs = 0;
        let text = toml::to_string(&expected).expect("serialize");
        let tmp = write_temp(&text);

        let cfg = load_from_file(tmp.path()).expect("load");
        assert_eq!(cfg, expected);
    }

    #[test]
    fn test_load_rejects_invalid_thresholds() {
        let mut bad = EngineConfig::default();
        bad.natural.diversity.penalty_multiplier = 2.0;
        let tmp = write_temp(&toml::to_string(&bad).expect("serialize"));

        let err = load_from_file(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.starts_with("natural")));
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let tmp = write_temp("mode = [");
        let err = load_from_file(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_from_file("/nonexistent/earnguard.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("EARNGUARD_MODE", "natural"),
            ("EARNGUARD_STORE_TIMEOUT_MS", "300"),
        ]
        .into_iter()
        .collect();
        let mut cfg = EngineConfig::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .expect("overrides");
        assert_eq!(cfg.mode, Mode::Natural);
        assert_eq!(cfg.store_timeout_ms, 300);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut cfg = EngineConfig::default();
        let err = cfg
            .apply_overrides(|k| (k == "EARNGUARD_STORE_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_timeout_must_be_sub_second() {
        let cfg = EngineConfig {
            store_timeout_ms: 5_000,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_provider_starts_in_configured_mode() {
        let cfg = EngineConfig {
            mode: Mode::Natural,
            ..EngineConfig::default()
        };
        let provider = cfg.mode_provider();
        assert_eq!(provider.snapshot().mode, Mode::Natural);
        assert_eq!(cfg.initial_snapshot().thresholds, cfg.natural);
    }
}
