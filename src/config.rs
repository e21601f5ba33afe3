/// Configuration module for the ziwei engine.
///
/// Handles loading, validating, and providing default configuration values
/// for ingestion (fetch/extract), persistence paths, and rule evaluation.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "ziwei.json";

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./ziwei.db".to_string()
}

fn default_corpus_dir() -> String {
    "./corpus".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_request_delay_ms() -> u64 {
    3000
}

fn default_user_agent() -> String {
    format!(
        "ziwei-lore/{} (astrology research corpus builder)",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_accept_language() -> String {
    "zh-TW,zh;q=0.9,en;q=0.8".to_string()
}

fn default_min_content_chars() -> usize {
    200
}

fn default_min_line_chars() -> usize {
    10
}

fn default_raw_sample_chars() -> usize {
    5000
}

fn default_confidence() -> f64 {
    0.5
}

fn default_consensus_weight() -> f64 {
    1.0
}

fn default_disputed_weight() -> f64 {
    0.6
}

fn default_minority_weight() -> f64 {
    0.3
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: String,

    /// Rule seed file imported at startup when the rule table is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_seed_path: Option<String>,

    /// Lunar calendar table used to convert gregorian birth records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_table_path: Option<String>,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub evaluate: EvaluateConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Pause between consecutive sources. Politeness, not throughput.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExtractConfig {
    /// A content region must exceed this many characters to be chosen.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,

    /// Lines at or below this length never count as relevant.
    #[serde(default = "default_min_line_chars")]
    pub min_line_chars: usize,

    #[serde(default = "default_raw_sample_chars")]
    pub raw_sample_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EvaluateConfig {
    /// Used when a rule carries no confidence statistic.
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,

    #[serde(default)]
    pub base_weights: BaseWeights,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct BaseWeights {
    #[serde(default = "default_consensus_weight")]
    pub consensus: f64,

    #[serde(default = "default_disputed_weight")]
    pub disputed: f64,

    #[serde(default = "default_minority_weight")]
    pub minority_view: f64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            corpus_dir: default_corpus_dir(),
            rules_seed_path: None,
            calendar_table_path: None,
            fetch: FetchConfig::default(),
            extract: ExtractConfig::default(),
            evaluate: EvaluateConfig::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_content_chars: default_min_content_chars(),
            min_line_chars: default_min_line_chars(),
            raw_sample_chars: default_raw_sample_chars(),
        }
    }
}

impl Default for EvaluateConfig {
    fn default() -> Self {
        Self {
            default_confidence: default_confidence(),
            base_weights: BaseWeights::default(),
        }
    }
}

impl Default for BaseWeights {
    fn default() -> Self {
        Self {
            consensus: default_consensus_weight(),
            disputed: default_disputed_weight(),
            minority_view: default_minority_weight(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl FetchConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to [`DEFAULT_CONFIG_PATH`].
    /// If the file does not exist, returns a default config and generates a
    /// template file for the default path only.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.fetch.timeout_secs > 0, "fetch.timeout_secs must be positive");
        anyhow::ensure!(
            !self.fetch.user_agent.trim().is_empty(),
            "fetch.user_agent must not be empty"
        );
        anyhow::ensure!(
            self.extract.min_content_chars > 0,
            "extract.min_content_chars must be positive"
        );
        anyhow::ensure!(
            self.extract.min_line_chars > 0,
            "extract.min_line_chars must be positive"
        );
        anyhow::ensure!(
            self.extract.raw_sample_chars > 0,
            "extract.raw_sample_chars must be positive"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.evaluate.default_confidence),
            "evaluate.default_confidence must be within [0, 1]"
        );

        let w = &self.evaluate.base_weights;
        for (name, value) in [
            ("consensus", w.consensus),
            ("disputed", w.disputed),
            ("minority_view", w.minority_view),
        ] {
            anyhow::ensure!(
                (0.0..=1.0).contains(&value),
                "evaluate.base_weights.{name} must be within [0, 1]"
            );
        }
        anyhow::ensure!(
            w.consensus >= w.disputed && w.disputed >= w.minority_view,
            "evaluate.base_weights must satisfy consensus >= disputed >= minority_view"
        );
        Ok(())
    }

    #[must_use]
    pub fn corpus_dir(&self) -> PathBuf {
        PathBuf::from(&self.corpus_dir)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.db_path, "./ziwei.db");
        assert_eq!(config.fetch.timeout_secs, 30);
        assert_eq!(config.fetch.request_delay(), Duration::from_secs(3));
        assert_eq!(config.extract.min_line_chars, 10);
        assert_eq!(config.evaluate.default_confidence, 0.5);
        assert!(config.fetch.user_agent.starts_with("ziwei-lore/"));
        assert!(config.rules_seed_path.is_none());
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"db_path": "./test.db", "fetch": {"timeout_secs": 5}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.db_path, "./test.db");
        assert_eq!(config.fetch.timeout_secs, 5);
        // Other fields should have defaults
        assert_eq!(config.fetch.request_delay_ms, 3000);
        assert_eq!(config.evaluate.base_weights.disputed, 0.6);
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.fetch.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_line_threshold() {
        let mut config = Config::default();
        config.extract.min_line_chars = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_line_chars"));
    }

    #[test]
    fn test_validate_weight_ordering() {
        let mut config = Config::default();
        config.evaluate.base_weights.minority_view = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_confidence_range() {
        let mut config = Config::default();
        config.evaluate.default_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_non_default_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("absent.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.db_path, default_db_path());
        assert!(!path.exists(), "template only generated for the default path");
    }

    #[test]
    fn test_load_invalid_json_falls_back() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.corpus_dir, default_corpus_dir());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.db_path, config.db_path);
        assert_eq!(parsed.fetch.user_agent, config.fetch.user_agent);
        assert_eq!(parsed.evaluate.base_weights, config.evaluate.base_weights);
    }
}
