use super::{encoder_net, StateActionEncoderConfig};
use crate::net::TrackedNet;
use anyhow::Result;
use candle_core::{Device, Tensor, Var};
use std::path::Path;

/// Embeds a state feature together with an action.
///
/// Actions go through their own layers, are concatenated to the state
/// features and merged by a second stack of layers.
pub struct StateActionEncoder {
    action_net: Option<TrackedNet>,
    merge_net: Option<TrackedNet>,
    out_dim: usize,
}

impl StateActionEncoder {
    /// Builds an encoder of `state_dim` features and `action_dim` actions.
    pub fn build(
        config: &StateActionEncoderConfig,
        state_dim: usize,
        action_dim: usize,
        device: &Device,
    ) -> Result<Self> {
        let action_net = encoder_net(
            action_dim,
            &config.action_units,
            "sa_action",
            device,
            config.target_sync,
        )?;
        let action_out = action_net.as_ref().map_or(action_dim, |n| n.out_dim());
        let merge_net = encoder_net(
            state_dim + action_out,
            &config.units,
            "sa_merge",
            device,
            config.target_sync,
        )?;
        let out_dim = merge_net
            .as_ref()
            .map_or(state_dim + action_out, |n| n.out_dim());

        Ok(Self {
            action_net,
            merge_net,
            out_dim,
        })
    }

    /// Width of the embedding.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    fn encode(
        &self,
        state_features: &Tensor,
        actions: &Tensor,
        f: impl Fn(&TrackedNet, &Tensor) -> Result<Tensor>,
    ) -> Result<Tensor> {
        let actions = match &self.action_net {
            Some(net) => f(net, actions)?,
            None => actions.clone(),
        };
        let xs = Tensor::cat(&[state_features, &actions], 1)?;
        match &self.merge_net {
            Some(net) => f(net, &xs),
            None => Ok(xs),
        }
    }

    /// Embeds with the live encoder.
    pub fn forward(&self, state_features: &Tensor, actions: &Tensor) -> Result<Tensor> {
        self.encode(state_features, actions, |net, xs| net.forward(xs))
    }

    /// Embeds with the target encoder, the output is detached.
    pub fn forward_target(&self, state_features: &Tensor, actions: &Tensor) -> Result<Tensor> {
        let xs = self.encode(state_features, actions, |net, xs| net.forward_target(xs))?;
        Ok(xs.detach())
    }

    /// Synchronizes the target encoder.
    pub fn update_targets(&self, step: usize) -> Result<()> {
        for net in self.action_net.iter().chain(self.merge_net.iter()) {
            net.update_targets(step)?;
        }
        Ok(())
    }

    /// Trainable variables.
    pub fn vars(&self) -> Vec<Var> {
        self.action_net
            .iter()
            .chain(self.merge_net.iter())
            .flat_map(|n| n.vars())
            .collect()
    }

    /// Saves the weights in `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        for net in self.action_net.iter().chain(self.merge_net.iter()) {
            net.save(dir)?;
        }
        Ok(())
    }

    /// Loads the weights from `dir`.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        for net in self.action_net.iter_mut().chain(self.merge_net.iter_mut()) {
            net.load(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::DType;

    #[test]
    fn test_output_width() -> Result<()> {
        let sf = Tensor::zeros((5, 4), DType::F32, &Device::Cpu)?;
        let a = Tensor::zeros((5, 2), DType::F32, &Device::Cpu)?;

        let config = StateActionEncoderConfig::default();
        let encoder = StateActionEncoder::build(&config, 4, 2, &Device::Cpu)?;
        assert_eq!(encoder.out_dim(), 6);
        assert_eq!(encoder.forward(&sf, &a)?.dims(), &[5, 6]);

        let config = config.action_units(vec![3]).units(vec![16, 8]);
        let encoder = StateActionEncoder::build(&config, 4, 2, &Device::Cpu)?;
        assert_eq!(encoder.out_dim(), 8);
        assert_eq!(encoder.forward_target(&sf, &a)?.dims(), &[5, 8]);
        Ok(())
    }
}
