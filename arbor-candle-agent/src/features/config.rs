use crate::net::TargetSync;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`StateEncoder`](super::StateEncoder).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct StateEncoderConfig {
    /// Widths of the layers. Observations pass through unchanged when empty.
    pub units: Vec<usize>,

    /// Standardizes observations with running statistics.
    pub normalize: bool,

    /// Synchronization of the target encoder. No target encoder when `None`.
    pub target_sync: Option<TargetSync>,
}

impl StateEncoderConfig {
    /// Sets the widths of the layers.
    pub fn units(mut self, units: Vec<usize>) -> Self {
        self.units = units;
        self
    }

    /// Enables the observation normalizer.
    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Sets the synchronization of the target encoder.
    pub fn target_sync(mut self, target_sync: Option<TargetSync>) -> Self {
        self.target_sync = target_sync;
        self
    }

    /// Loads [`StateEncoderConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`StateEncoderConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Configuration of [`StateActionEncoder`](super::StateActionEncoder).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct StateActionEncoderConfig {
    /// Widths of the layers embedding actions. Actions pass through when empty.
    pub action_units: Vec<usize>,

    /// Widths of the layers applied to the concatenated features.
    pub units: Vec<usize>,

    /// Synchronization of the target encoder.
    pub target_sync: Option<TargetSync>,
}

impl StateActionEncoderConfig {
    /// Sets the widths of the action layers.
    pub fn action_units(mut self, action_units: Vec<usize>) -> Self {
        self.action_units = action_units;
        self
    }

    /// Sets the widths of the merging layers.
    pub fn units(mut self, units: Vec<usize>) -> Self {
        self.units = units;
        self
    }

    /// Sets the synchronization of the target encoder.
    pub fn target_sync(mut self, target_sync: Option<TargetSync>) -> Self {
        self.target_sync = target_sync;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_state_encoder_config() -> Result<()> {
        let config = StateEncoderConfig::default()
            .units(vec![64, 32])
            .normalize(true)
            .target_sync(Some(TargetSync::Polyak { tau: 0.005 }));

        let dir = TempDir::new("state_encoder_config")?;
        let path = dir.path().join("state_encoder_config.yaml");
        config.save(&path)?;
        let config_ = StateEncoderConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
