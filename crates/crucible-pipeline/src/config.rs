//! Pipeline configuration, loaded from `crucible.toml`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crucible_types::{CrucibleError, Result};

use crate::retry::BackoffPolicy;

pub const DEFAULT_CONFIG_FILENAME: &str = "crucible.toml";

/// Read-only run configuration.
///
/// Model selectors are routed through the client's model catalog; `None`
/// leaves the choice to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub design_stage_enabled: bool,
    pub format_stage_enabled: bool,
    pub design_model: Option<String>,
    pub generate_model: Option<String>,
    pub format_model: Option<String>,
    pub design_temperature: f32,
    pub generate_temperature: f32,
    pub format_temperature: f32,
    pub max_tokens: u32,
    /// Fixed delay between generation attempts.
    pub retry_delay_ms: u64,
    /// Points charged per successful synthesis.
    pub synthesis_cost: u64,
    /// Seed for random-choice resolution; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            design_stage_enabled: true,
            format_stage_enabled: true,
            design_model: None,
            generate_model: None,
            format_model: None,
            design_temperature: 0.9,
            generate_temperature: 0.7,
            format_temperature: 0.2,
            max_tokens: 4096,
            retry_delay_ms: 1000,
            synthesis_cost: 1,
            seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| CrucibleError::Config(format!("invalid pipeline config: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Load `crucible.toml` from `dir` if present, else defaults.
    pub fn load_or_default(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(DEFAULT_CONFIG_FILENAME);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn retry_policy(&self) -> BackoffPolicy {
        match self.retry_delay_ms {
            0 => BackoffPolicy::None,
            ms => BackoffPolicy::Fixed(Duration::from_millis(ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert!(config.design_stage_enabled);
        assert!(config.format_stage_enabled);
        assert_eq!(config.retry_delay_ms, 1000);
        assert_eq!(config.synthesis_cost, 1);
        assert!(config.seed.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
design_stage_enabled = false
generate_model = "claude-sonnet-4-5-20250929"
seed = 42
"#,
        )
        .unwrap();
        assert!(!config.design_stage_enabled);
        assert!(config.format_stage_enabled);
        assert_eq!(config.generate_model.as_deref(), Some("claude-sonnet-4-5-20250929"));
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.synthesis_cost, 1);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = PipelineConfig::from_toml_str("retry_delay_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, CrucibleError::Config(_)));
    }

    #[test]
    fn load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            PipelineConfig::load_or_default(dir.path()).unwrap(),
            PipelineConfig::default()
        );

        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILENAME), "synthesis_cost = 5\n").unwrap();
        let config = PipelineConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.synthesis_cost, 5);
    }

    #[test]
    fn retry_policy_follows_delay() {
        let config = PipelineConfig {
            retry_delay_ms: 250,
            ..PipelineConfig::default()
        };
        assert_eq!(config.retry_policy(), BackoffPolicy::Fixed(Duration::from_millis(250)));

        let immediate = PipelineConfig {
            retry_delay_ms: 0,
            ..PipelineConfig::default()
        };
        assert_eq!(immediate.retry_policy(), BackoffPolicy::None);
    }
}
