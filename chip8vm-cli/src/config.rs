//! Run configuration.
use chip8vm::prelude::*;
use serde::Deserialize;

use crate::error::AppError;

/// Number of 60Hz frames a program runs for when not configured.
const DEFAULT_FRAMES: u32 = 300;

/// Settings for a headless run, read from a YAML file.
///
/// VM settings sit at the top level next to the runner settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConf {
    /// How long to run the program for, in 60Hz frames.
    pub frames: u32,
    #[serde(flatten)]
    pub vm: Chip8Conf,
}

impl Default for RunConf {
    fn default() -> Self {
        Self {
            frames: DEFAULT_FRAMES,
            vm: Chip8Conf::default(),
        }
    }
}

impl RunConf {
    pub fn from_file(filepath: &str) -> Result<Self, AppError> {
        let file = std::fs::File::open(filepath)?;
        let conf: RunConf = serde_yaml::from_reader(file)?;
        log::debug!("loaded run config: {:#?}", conf);
        Ok(conf)
    }

    pub fn parse(source: &str) -> Result<Self, AppError> {
        Ok(serde_yaml::from_str(source)?)
    }
}
