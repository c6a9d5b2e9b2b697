use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::diagram::DiagramConfig;

/// Engine settings, read from a TOML file. Missing keys keep their defaults.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_horizon")]
    pub horizon: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// 0 表示不限制区域数量。
    #[serde(default = "default_max_regions")]
    pub max_regions: usize,
    #[serde(default = "default_max_instant_steps")]
    pub max_instant_steps: usize,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            seed: default_seed(),
            max_regions: default_max_regions(),
            max_instant_steps: default_max_instant_steps(),
            epsilon: default_epsilon(),
            output_dir: default_output_dir(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    pub fn diagram_config(&self) -> DiagramConfig {
        DiagramConfig {
            horizon: self.horizon,
            seed: self.seed,
            max_regions: (self.max_regions > 0).then_some(self.max_regions),
            max_instant_steps: self.max_instant_steps,
            epsilon: self.epsilon,
        }
    }
}

fn default_horizon() -> f64 {
    DiagramConfig::default().horizon
}

fn default_seed() -> u64 {
    DiagramConfig::default().seed
}

fn default_max_regions() -> usize {
    DiagramConfig::default().max_regions.unwrap_or(0)
}

fn default_max_instant_steps() -> usize {
    DiagramConfig::default().max_instant_steps
}

fn default_epsilon() -> f64 {
    DiagramConfig::default().epsilon
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let config = EngineConfig::load_from_file("/nonexistent/hpng.toml").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.diagram_config().max_regions, Some(100_000));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: EngineConfig = toml::from_str("horizon = 25.0\nmax_regions = 0\n").unwrap();
        assert_eq!(config.horizon, 25.0);
        assert_eq!(config.seed, 42);
        let diagram = config.diagram_config();
        assert_eq!(diagram.horizon, 25.0);
        assert_eq!(diagram.max_regions, None);
    }
}
