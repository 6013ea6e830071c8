use super::ActorUpdateRule;
use crate::{net::TargetSync, opt::OptimizerConfig};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Actor`](super::Actor).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ActorConfig {
    /// Update rules, combined additively.
    pub rules: Vec<ActorUpdateRule>,

    /// Widths of the hidden layers.
    pub units: Vec<usize>,

    /// Optimizer of the actor network.
    pub opt_config: OptimizerConfig,

    /// Synchronization of the target actor. No target actor when `None`.
    pub target_sync: Option<TargetSync>,

    /// Maximum global norm of gradients.
    pub max_grad_norm: Option<f64>,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            rules: vec![ActorUpdateRule::CaclaV],
            units: vec![64, 64],
            opt_config: OptimizerConfig::default(),
            target_sync: Some(TargetSync::Polyak { tau: 0.005 }),
            max_grad_norm: None,
        }
    }
}

impl ActorConfig {
    /// Sets the update rules.
    pub fn rules(mut self, v: Vec<ActorUpdateRule>) -> Self {
        self.rules = v;
        self
    }

    /// Sets the widths of the hidden layers.
    pub fn units(mut self, v: Vec<usize>) -> Self {
        self.units = v;
        self
    }

    /// Sets the optimizer.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the synchronization of the target actor.
    pub fn target_sync(mut self, v: Option<TargetSync>) -> Self {
        self.target_sync = v;
        self
    }

    /// Sets the maximum global norm of gradients.
    pub fn max_grad_norm(mut self, v: Option<f64>) -> Self {
        self.max_grad_norm = v;
        self
    }

    /// Loads [`ActorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ActorConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
