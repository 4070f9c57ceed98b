//! Runner configuration, loaded from YAML.
use std::{fs, time::Duration};

use chip8::{prelude::Chip8Conf, KeyCode};
use log::debug;
use serde::Deserialize;

use crate::error::AppError;

/// How long a ROM runs when the configuration doesn't say.
const DEFAULT_RUN_TIME_MS: u64 = 3000;

/// Settings for a headless run.
///
/// ```yaml
/// clock_frequency: 700
/// fault_policy: skip
/// seed: 42
/// run_time_ms: 5000
/// held_keys: [5, 0xA]
/// ```
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Virtual machine settings, flattened into the top level.
    #[serde(flatten)]
    pub vm: Chip8Conf,
    /// Wall clock time to run the program for.
    pub run_time_ms: u64,
    /// Keys that are held down for the whole run.
    pub held_keys: Vec<KeyCode>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            vm: Chip8Conf::default(),
            run_time_ms: DEFAULT_RUN_TIME_MS,
            held_keys: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn from_file(filepath: &str) -> Result<Self, AppError> {
        let source = fs::read_to_string(filepath)?;
        let config = Self::from_yaml(&source)?;
        debug!("loaded run configuration: {config:#?}");
        Ok(config)
    }

    pub fn from_yaml(source: &str) -> Result<Self, AppError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn run_time(&self) -> Duration {
        Duration::from_millis(self.run_time_ms)
    }
}
