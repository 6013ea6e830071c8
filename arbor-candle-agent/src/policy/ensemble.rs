use super::{BasePolicyConfig, Optimized, PlainPolicy, Policy};
use crate::{batch::TransitionBatch, features::StateEncoder};
use anyhow::Result;
use arbor_core::{error::ArborError, record::Record, ActionSpace};
use candle_core::{Device, Tensor};
use log::info;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::path::Path;

/// Draws `num_samples` distinct heads out of `num_heads`, in ascending order.
pub fn sample_heads(rng: &mut impl Rng, num_heads: usize, num_samples: usize) -> Vec<usize> {
    let mut ixs = rand::seq::index::sample(rng, num_heads, num_samples.min(num_heads)).into_vec();
    ixs.sort_unstable();
    ixs
}

/// Random ensemble mixture of independently initialized plain policies.
///
/// Each call trains, or queries, a random subset of the heads on the same
/// batch and averages their errors, or their action scores.
pub struct EnsemblePolicy {
    heads: Vec<PlainPolicy>,
    num_samples: usize,
    rng: SmallRng,
}

impl EnsemblePolicy {
    /// Builds `num_heads` policies, `num_samples` of which are used per call.
    pub fn build(
        config: &BasePolicyConfig,
        num_heads: usize,
        num_samples: usize,
        space: &ActionSpace,
        encoder: &StateEncoder,
        seed: u64,
        device: &Device,
    ) -> Result<Self> {
        if num_samples == 0 || num_samples > num_heads {
            return Err(ArborError::Config(format!(
                "an ensemble of {} heads cannot sample {} of them",
                num_heads, num_samples
            ))
            .into());
        }
        let heads = (0..num_heads)
            .map(|_| PlainPolicy::build(config, space, encoder, device))
            .collect::<Result<Vec<_>>>()?;
        info!("Built ensemble: {} heads, {} per call", num_heads, num_samples);

        Ok(Self {
            heads,
            num_samples,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Number of heads.
    pub fn num_heads(&self) -> usize {
        self.heads.len()
    }

    fn mean(tensors: Vec<Tensor>) -> Result<Tensor> {
        let n = tensors.len() as f64;
        let sum = Tensor::stack(&tensors, 0)?.sum(0)?;
        Ok(sum.affine(1.0 / n, 0.0)?)
    }
}

impl Policy for EnsemblePolicy {
    fn optimize_networks(&mut self, batch: &TransitionBatch) -> Result<Optimized> {
        let ixs = sample_heads(&mut self.rng, self.heads.len(), self.num_samples);
        let mut errors = Vec::with_capacity(ixs.len());
        let mut record = Record::empty();
        for &i in ixs.iter() {
            let out = self.heads[i].optimize_networks(batch)?;
            errors.push(out.error);
            record.merge_inplace(out.record.with_prefix(&format!("head{}", i)));
        }
        Ok(Optimized {
            error: Self::mean(errors)?,
            record,
        })
    }

    fn choose_action(&mut self, state_features: &Tensor) -> Result<Tensor> {
        let ixs = sample_heads(&mut self.rng, self.heads.len(), self.num_samples);
        let scores = ixs
            .iter()
            .map(|&i| self.heads[i].choose_action(state_features))
            .collect::<Result<Vec<_>>>()?;
        Self::mean(scores)
    }

    fn calculate_tde(&self, batch: &TransitionBatch) -> Result<Tensor> {
        let tdes = self
            .heads
            .iter()
            .map(|h| h.calculate_tde(batch))
            .collect::<Result<Vec<_>>>()?;
        Self::mean(tdes)
    }

    fn update_targets(&mut self, step: usize) -> Result<()> {
        for head in self.heads.iter_mut() {
            head.update_targets(step)?;
        }
        Ok(())
    }

    fn n_actions(&self) -> usize {
        self.heads.first().map_or(0, |h| h.n_actions())
    }

    fn save(&self, dir: &Path) -> Result<()> {
        for (i, head) in self.heads.iter().enumerate() {
            head.save(&dir.join(format!("head{}", i)))?;
        }
        Ok(())
    }

    fn load(&mut self, dir: &Path) -> Result<()> {
        for (i, head) in self.heads.iter_mut().enumerate() {
            head.load(&dir.join(format!("head{}", i)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::features::StateEncoderConfig;

    #[test]
    fn test_sample_heads_is_deterministic() {
        let mut rng1 = SmallRng::seed_from_u64(7);
        let mut rng2 = SmallRng::seed_from_u64(7);
        for _ in 0..20 {
            let a = sample_heads(&mut rng1, 10, 4);
            let b = sample_heads(&mut rng2, 10, 4);
            assert_eq!(a, b);
            assert_eq!(a.len(), 4);
            assert!(a.windows(2).all(|w| w[0] < w[1]));
            assert!(a.iter().all(|&i| i < 10));
        }
        assert_eq!(sample_heads(&mut rng1, 3, 5), vec![0, 1, 2]);
    }

    #[test]
    fn test_invalid_subset_size() -> Result<()> {
        let encoder = StateEncoder::build(&StateEncoderConfig::default(), 2, &Device::Cpu)?;
        let config = BasePolicyConfig::default();
        let space = ActionSpace::Discrete(2);
        assert!(EnsemblePolicy::build(&config, 2, 3, &space, &encoder, 0, &Device::Cpu).is_err());
        assert!(EnsemblePolicy::build(&config, 2, 0, &space, &encoder, 0, &Device::Cpu).is_err());
        let ensemble = EnsemblePolicy::build(&config, 3, 2, &space, &encoder, 0, &Device::Cpu)?;
        assert_eq!(ensemble.num_heads(), 3);
        assert_eq!(ensemble.n_actions(), 2);
        Ok(())
    }
}
