//! Configuration of [`Trainer`](super::Trainer).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trainer`](super::Trainer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// Number of environment steps.
    pub max_steps: usize,

    /// Environment steps between two optimization steps.
    pub opt_interval: usize,

    /// Environment steps between two synchronizations of target networks.
    pub target_update_interval: usize,

    /// Initial environment steps taken with uniformly random actions.
    pub n_random_steps: usize,

    /// Environment steps between two decays of the exploration rate.
    pub decay_interval: usize,

    /// Environment step after which observation statistics are frozen.
    pub freeze_normalizers_step: Option<usize>,

    /// Environment steps between two aggregated records.
    pub record_interval: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_steps: 0,
            opt_interval: 1,
            target_update_interval: 1,
            n_random_steps: 0,
            decay_interval: 1,
            freeze_normalizers_step: None,
            record_interval: usize::MAX,
        }
    }
}

impl TrainerConfig {
    /// Sets the number of environment steps.
    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }

    /// Sets the interval of optimization steps.
    pub fn opt_interval(mut self, v: usize) -> Self {
        self.opt_interval = v;
        self
    }

    /// Sets the number of initial random steps.
    pub fn n_random_steps(mut self, v: usize) -> Self {
        self.n_random_steps = v;
        self
    }

    /// Sets the interval of target synchronizations.
    pub fn target_update_interval(mut self, v: usize) -> Self {
        self.target_update_interval = v;
        self
    }

    /// Sets the interval of exploration decay.
    pub fn decay_interval(mut self, v: usize) -> Self {
        self.decay_interval = v;
        self
    }

    /// Sets the step at which observation statistics are frozen.
    pub fn freeze_normalizers_step(mut self, v: Option<usize>) -> Self {
        self.freeze_normalizers_step = v;
        self
    }

    /// Sets the interval of aggregated records.
    pub fn record_interval(mut self, v: usize) -> Self {
        self.record_interval = v;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
