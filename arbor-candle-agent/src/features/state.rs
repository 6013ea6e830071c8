use super::{encoder_net, RunningNorm, StateEncoderConfig};
use crate::net::TrackedNet;
use anyhow::Result;
use candle_core::{Device, Tensor, Var};
use log::info;
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

const NORMALIZER_FILE: &str = "state_encoder_norm.yaml";

/// Maps observations to state features.
///
/// Next states are encoded by the target encoder when one is configured.
/// Without layers the encoder is the identity, optionally preceded by the
/// observation normalizer.
pub struct StateEncoder {
    obs_dim: usize,
    norm: Option<RunningNorm>,
    net: Option<TrackedNet>,
}

impl StateEncoder {
    /// Builds an encoder of `obs_dim`-dimensional observations.
    pub fn build(config: &StateEncoderConfig, obs_dim: usize, device: &Device) -> Result<Self> {
        let net = encoder_net(
            obs_dim,
            &config.units,
            "state_encoder",
            device,
            config.target_sync,
        )?;
        let norm = match config.normalize {
            true => Some(RunningNorm::new(obs_dim)),
            false => None,
        };
        info!(
            "State encoder: {} -> {}, normalize = {}, target = {:?}",
            obs_dim,
            net.as_ref().map_or(obs_dim, |n| n.out_dim()),
            config.normalize,
            config.target_sync
        );

        Ok(Self { obs_dim, norm, net })
    }

    /// Width of the state features.
    pub fn out_dim(&self) -> usize {
        self.net.as_ref().map_or(self.obs_dim, |n| n.out_dim())
    }

    /// Updates the observation statistics with an observation.
    pub fn observe(&mut self, obs: &[f32]) -> Result<()> {
        match self.norm.as_mut() {
            Some(norm) => norm.observe(obs),
            None => Ok(()),
        }
    }

    /// Stops updating the observation statistics.
    pub fn freeze_normalizers(&mut self) {
        if let Some(norm) = self.norm.as_mut() {
            info!("Freeze observation statistics after {} observations", norm.count());
            norm.freeze();
        }
    }

    fn normalize(&self, states: &Tensor) -> Result<Tensor> {
        match &self.norm {
            Some(norm) => norm.normalize(states),
            None => Ok(states.clone()),
        }
    }

    /// Encodes current states with the live encoder.
    pub fn forward(&self, states: &Tensor) -> Result<Tensor> {
        let xs = self.normalize(states)?;
        match &self.net {
            Some(net) => net.forward(&xs),
            None => Ok(xs),
        }
    }

    /// Encodes current states with the target encoder if there is one.
    ///
    /// The output is detached.
    pub fn forward_target(&self, states: &Tensor) -> Result<Tensor> {
        let xs = self.normalize(states)?;
        match &self.net {
            Some(net) => net.forward_target(&xs),
            None => Ok(xs.detach()),
        }
    }

    /// Encodes next states, with the target encoder if there is one.
    pub fn forward_next_state(&self, states: &Tensor) -> Result<Tensor> {
        let xs = self.normalize(states)?;
        match &self.net {
            Some(net) => net.forward_target(&xs),
            None => Ok(xs),
        }
    }

    /// Synchronizes the target encoder.
    pub fn update_targets(&self, step: usize) -> Result<()> {
        if let Some(net) = &self.net {
            net.update_targets(step)?;
        }
        Ok(())
    }

    /// Trainable variables, empty for the identity encoder.
    pub fn vars(&self) -> Vec<Var> {
        self.net.as_ref().map_or_else(Vec::new, |n| n.vars())
    }

    /// Saves the weights and the observation statistics in `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        if let Some(net) = &self.net {
            net.save(dir)?;
        }
        if let Some(norm) = &self.norm {
            let mut file = File::create(dir.join(NORMALIZER_FILE))?;
            file.write_all(serde_yaml::to_string(norm)?.as_bytes())?;
        }
        Ok(())
    }

    /// Loads the weights and the observation statistics from `dir`.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        if let Some(net) = self.net.as_mut() {
            net.load(dir)?;
        }
        if self.norm.is_some() {
            let rdr = BufReader::new(File::open(dir.join(NORMALIZER_FILE))?);
            self.norm = Some(serde_yaml::from_reader(rdr)?);
        }
        Ok(())
    }
}
