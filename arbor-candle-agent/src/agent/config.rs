//! Configuration of [`TdAgent`](super::TdAgent).
use super::ExplorationConfig;
use crate::{
    features::StateEncoderConfig,
    policy::{BasePolicyConfig, PolicyStructure},
    Device,
};
use anyhow::Result;
use arbor_core::replay_buffer::ReplayBufferConfig;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`TdAgent`](super::TdAgent).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TdAgentConfig {
    /// Device of the networks.
    pub device: Device,

    /// Seed of exploration and ensemble sampling.
    pub seed: u64,

    /// Number of transitions per optimization step.
    pub batch_size: usize,

    /// Number of stored transitions before the first optimization step.
    pub min_transitions: usize,

    /// Encoder of observations.
    pub state_encoder: StateEncoderConfig,

    /// Configuration of the plain policies of the tree.
    pub policy: BasePolicyConfig,

    /// Shape of the policy tree.
    pub structure: PolicyStructure,

    /// Exploration.
    pub exploration: ExplorationConfig,

    /// Replay buffer.
    pub replay_buffer: ReplayBufferConfig,
}

impl Default for TdAgentConfig {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            seed: 42,
            batch_size: 32,
            min_transitions: 100,
            state_encoder: StateEncoderConfig::default(),
            policy: BasePolicyConfig::default(),
            structure: PolicyStructure::Plain,
            exploration: ExplorationConfig::default(),
            replay_buffer: ReplayBufferConfig::default(),
        }
    }
}

impl TdAgentConfig {
    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the number of transitions required before optimizing.
    pub fn min_transitions(mut self, v: usize) -> Self {
        self.min_transitions = v;
        self
    }

    /// Sets the observation encoder.
    pub fn state_encoder(mut self, v: StateEncoderConfig) -> Self {
        self.state_encoder = v;
        self
    }

    /// Sets the configuration of plain policies.
    pub fn policy(mut self, v: BasePolicyConfig) -> Self {
        self.policy = v;
        self
    }

    /// Sets the shape of the policy tree.
    pub fn structure(mut self, v: PolicyStructure) -> Self {
        self.structure = v;
        self
    }

    /// Sets the exploration.
    pub fn exploration(mut self, v: ExplorationConfig) -> Self {
        self.exploration = v;
        self
    }

    /// Sets the replay buffer.
    pub fn replay_buffer(mut self, v: ReplayBufferConfig) -> Self {
        self.replay_buffer = v;
        self
    }

    /// Loads [`TdAgentConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TdAgentConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
