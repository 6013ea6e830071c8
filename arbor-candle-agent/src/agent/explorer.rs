//! Exploration of a TD agent.
use anyhow::Result;
use arbor_core::{
    record::{Record, RecordValue},
    ActionSpace,
};
use candle_core::{Device, Tensor};
use log::info;
use rand::{distributions::WeightedIndex, rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration of [`Explorer`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ExplorationConfig {
    /// Initial probability of a uniformly random action.
    pub epsilon: f64,

    /// Multiplier of epsilon per decay.
    pub epsilon_decay: f64,

    /// Lower bound of epsilon.
    pub epsilon_min: f64,

    /// Standard deviation of Gaussian noise added to continuous actions.
    pub action_sigma: Option<f32>,

    /// Temperature of Boltzmann sampling of discrete actions.
    pub boltzmann_temperature: Option<f32>,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            epsilon_decay: 0.999,
            epsilon_min: 0.05,
            action_sigma: None,
            boltzmann_temperature: None,
        }
    }
}

impl ExplorationConfig {
    /// Sets the initial epsilon.
    pub fn epsilon(mut self, v: f64) -> Self {
        self.epsilon = v;
        self
    }

    /// Sets the decay of epsilon.
    pub fn epsilon_decay(mut self, v: f64) -> Self {
        self.epsilon_decay = v;
        self
    }

    /// Sets the lower bound of epsilon.
    pub fn epsilon_min(mut self, v: f64) -> Self {
        self.epsilon_min = v;
        self
    }

    /// Sets the scale of Gaussian action noise.
    pub fn action_sigma(mut self, v: Option<f32>) -> Self {
        self.action_sigma = v;
        self
    }

    /// Sets the Boltzmann temperature.
    pub fn boltzmann_temperature(mut self, v: Option<f32>) -> Self {
        self.boltzmann_temperature = v;
        self
    }
}

/// Perturbs the raw outputs of a policy for exploration.
pub struct Explorer {
    config: ExplorationConfig,
    epsilon: f64,
    rng: SmallRng,
}

impl Explorer {
    /// Creates an explorer.
    pub fn build(config: ExplorationConfig, seed: u64) -> Self {
        Self {
            epsilon: config.epsilon,
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Current epsilon.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Perturbed copy of `raw`, a row of action scores or a continuous action.
    ///
    /// With probability epsilon, or always when `fully_random` is set, the
    /// output is drawn uniformly within the bounds of the space.
    pub fn explore(&mut self, raw: &[f32], space: &ActionSpace, fully_random: bool) -> Result<Vec<f32>> {
        if fully_random || self.rng.gen::<f64>() < self.epsilon {
            return Ok(space.sample_raw(&mut self.rng));
        }

        match space {
            ActionSpace::Discrete(n) => match self.config.boltzmann_temperature {
                Some(t) => {
                    let ix = self.boltzmann(raw, t)?;
                    let mut out = vec![0f32; *n];
                    out[ix] = 1.0;
                    Ok(out)
                }
                None => Ok(raw.to_vec()),
            },
            ActionSpace::Box { low, high } => match self.config.action_sigma {
                Some(sigma) => {
                    let noise = Tensor::randn(0f32, sigma, raw.len(), &Device::Cpu)?.to_vec1::<f32>()?;
                    Ok(raw
                        .iter()
                        .zip(noise.iter())
                        .zip(low.iter().zip(high.iter()))
                        .map(|((a, e), (l, h))| (a + e).max(*l).min(*h))
                        .collect())
                }
                None => Ok(raw.to_vec()),
            },
        }
    }

    fn boltzmann(&mut self, raw: &[f32], temperature: f32) -> Result<usize> {
        let xs = Tensor::from_slice(raw, (1, raw.len()), &Device::Cpu)?
            .affine(1.0 / temperature.max(1e-6) as f64, 0.0)?;
        let probs = candle_nn::ops::softmax(&xs, 1)?.to_vec2::<f32>()?;
        let dist = WeightedIndex::new(&probs[0])?;
        Ok(self.rng.sample(dist))
    }

    /// Multiplies epsilon by its decay, down to its lower bound.
    pub fn decay(&mut self, step: usize) -> Record {
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        info!("step = {}, epsilon = {:.4}", step, self.epsilon);
        Record::from_slice(&[("epsilon", RecordValue::Scalar(self.epsilon as f32))])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_greedy_without_epsilon() -> Result<()> {
        let mut explorer = Explorer::build(ExplorationConfig::default().epsilon(0.0), 0);
        let raw = vec![0.1, 0.7, 0.2];
        assert_eq!(explorer.explore(&raw, &ActionSpace::Discrete(3), false)?, raw);
        Ok(())
    }

    #[test]
    fn test_fully_random_stays_in_bounds() -> Result<()> {
        let mut explorer = Explorer::build(ExplorationConfig::default().epsilon(0.0), 0);
        let space = ActionSpace::Box {
            low: vec![-2.0, 0.0],
            high: vec![2.0, 0.5],
        };
        for _ in 0..100 {
            let a = explorer.explore(&[0.0, 0.0], &space, true)?;
            assert!(a[0] >= -2.0 && a[0] <= 2.0);
            assert!(a[1] >= 0.0 && a[1] <= 0.5);
        }
        Ok(())
    }

    #[test]
    fn test_gaussian_noise_is_clipped() -> Result<()> {
        let config = ExplorationConfig::default().epsilon(0.0).action_sigma(Some(10.0));
        let mut explorer = Explorer::build(config, 0);
        let space = ActionSpace::Box {
            low: vec![-1.0],
            high: vec![1.0],
        };
        for _ in 0..50 {
            let a = explorer.explore(&[0.5], &space, false)?;
            assert!(a[0] >= -1.0 && a[0] <= 1.0);
        }
        Ok(())
    }

    #[test]
    fn test_boltzmann_picks_one_action() -> Result<()> {
        let config = ExplorationConfig::default()
            .epsilon(0.0)
            .boltzmann_temperature(Some(0.5));
        let mut explorer = Explorer::build(config, 3);
        let a = explorer.explore(&[1.0, 2.0, 3.0], &ActionSpace::Discrete(3), false)?;
        assert_eq!(a.iter().sum::<f32>(), 1.0);
        Ok(())
    }

    #[test]
    fn test_decay() {
        let config = ExplorationConfig::default()
            .epsilon(1.0)
            .epsilon_decay(0.5)
            .epsilon_min(0.2);
        let mut explorer = Explorer::build(config, 0);
        explorer.decay(1);
        assert_eq!(explorer.epsilon(), 0.5);
        explorer.decay(2);
        explorer.decay(3);
        let record = explorer.decay(4);
        assert_eq!(explorer.epsilon(), 0.2);
        assert_eq!(record.get_scalar("epsilon").unwrap(), 0.2);
    }
}
