use crate::{net::TargetSync, opt::OptimizerConfig, util::CriticLoss};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Source of the bootstrap values of an estimator.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy, Default)]
pub enum Bootstrap {
    /// Every estimator bootstraps from its own target network.
    #[default]
    Own,

    /// Q bootstraps from the next-state values V computed on the same batch.
    Qv,

    /// Q bootstraps from V and V bootstraps from the largest Q value.
    Qvmax,
}

/// Configuration of [`ValueEstimator`](super::ValueEstimator).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ValueConfig {
    /// Discount factor.
    pub gamma: f64,

    /// Widths of the hidden layers.
    pub units: Vec<usize>,

    /// Optimizer of the value network.
    pub opt_config: OptimizerConfig,

    /// Predicts rewards with a separate head trained on observed rewards.
    pub split_bellman: bool,

    /// Learning rate of the reward head.
    pub lr_r: f64,

    /// Synchronization of the target network. No target network when `None`.
    pub target_sync: Option<TargetSync>,

    /// Regression loss.
    pub loss: CriticLoss,

    /// Maximum global norm of gradients.
    pub max_grad_norm: Option<f64>,
}

impl Default for ValueConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            units: vec![64, 64],
            opt_config: OptimizerConfig::default(),
            split_bellman: false,
            lr_r: 1e-3,
            target_sync: Some(TargetSync::Polyak { tau: 0.005 }),
            loss: CriticLoss::SmoothL1,
            max_grad_norm: None,
        }
    }
}

impl ValueConfig {
    /// Sets the discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
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

    /// Enables the split Bellman decomposition.
    pub fn split_bellman(mut self, v: bool) -> Self {
        self.split_bellman = v;
        self
    }

    /// Sets the learning rate of the reward head.
    pub fn lr_r(mut self, v: f64) -> Self {
        self.lr_r = v;
        self
    }

    /// Sets the synchronization of the target network.
    pub fn target_sync(mut self, v: Option<TargetSync>) -> Self {
        self.target_sync = v;
        self
    }

    /// Sets the regression loss.
    pub fn loss(mut self, v: CriticLoss) -> Self {
        self.loss = v;
        self
    }

    /// Sets the maximum global norm of gradients.
    pub fn max_grad_norm(mut self, v: Option<f64>) -> Self {
        self.max_grad_norm = v;
        self
    }

    /// Loads [`ValueConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ValueConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
