use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::model::ClimateZone;

/// Settings of the command line tool and the orchestrator, read from
/// `config.json5`. Every key is optional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Suggestions below this confidence are only offered as hints.
    pub confidence_threshold: f64,
    /// Default policy file; the built-in policy when unset.
    pub policy_file: Option<PathBuf>,
    pub energyplus: EnergyPlusConfig,
    /// Each simulation run gets a timestamped directory under this one.
    pub output_root: PathBuf,
    /// Weather file per climate zone code.
    pub weather: BTreeMap<ClimateZone, PathBuf>,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            confidence_threshold: 0.7,
            policy_file: None,
            energyplus: EnergyPlusConfig::default(),
            output_root: PathBuf::from("output"),
            weather: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyPlusConfig {
    pub executable: PathBuf,
    pub timeout_secs: u64,
}

impl Default for EnergyPlusConfig {
    fn default() -> Self {
        EnergyPlusConfig {
            executable: PathBuf::from("energyplus"),
            timeout_secs: 3600,
        }
    }
}

impl EnergyPlusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Directory for a timestamped log file; console only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".into(),
            directory: Some(PathBuf::from("logs")),
        }
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let string = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&string)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: PipelineConfig = json5::from_str(json)?;
        anyhow::ensure!(
            (0.0..=1.0).contains(&config.confidence_threshold),
            "confidence_threshold must be between 0 and 1, got {}",
            config.confidence_threshold
        );
        Ok(config)
    }

    pub fn weather_file(&self, climate_zone: &ClimateZone) -> Option<&Path> {
        self.weather.get(climate_zone).map(PathBuf::as_path)
    }
}
