//! Ring buffer of transitions with optional prioritized sampling.
use super::{IwScheduler, PerConfig, ReplayBufferConfig, SumTree};
use crate::{error::ArborError, ReplayBufferBase, Sample, Transition};
use anyhow::Result;
use rand::{rngs::SmallRng, Rng, SeedableRng};

/// State of prioritized experience replay.
struct PerState {
    sum_tree: SumTree,
    iw_scheduler: IwScheduler,
}

impl PerState {
    fn new(capacity: usize, per_config: &PerConfig) -> Self {
        Self {
            sum_tree: SumTree::new(capacity, per_config.alpha),
            iw_scheduler: IwScheduler::new(
                per_config.beta_0,
                per_config.beta_final,
                per_config.n_opts_final,
            ),
        }
    }
}

/// A replay buffer with uniform or prioritized sampling.
///
/// New transitions enter with the largest priority seen so far, so that each
/// of them is likely to be replayed at least once.
pub struct ReplayBuffer {
    capacity: usize,
    i: usize,
    data: Vec<Transition>,
    rng: SmallRng,
    per_state: Option<PerState>,
    use_cer: bool,
}

impl ReplayBuffer {
    /// Slot of the most recently added transition.
    fn latest(&self) -> Option<usize> {
        if self.data.is_empty() {
            None
        } else {
            Some((self.i + self.capacity - 1) % self.capacity)
        }
    }

    /// Current exponent of importance weights, `None` without prioritization.
    pub fn beta(&self) -> Option<f32> {
        self.per_state.as_ref().map(|s| s.iw_scheduler.beta())
    }

    /// Sum of the rewards of stored transitions.
    pub fn sum_rewards(&self) -> f32 {
        self.data.iter().map(|tr| tr.reward).sum()
    }

    /// Number of stored terminal transitions.
    pub fn num_terminal(&self) -> usize {
        self.data.iter().filter(|tr| tr.is_terminal()).count()
    }
}

impl ReplayBufferBase for ReplayBuffer {
    type Config = ReplayBufferConfig;

    fn build(config: &Self::Config) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            capacity,
            i: 0,
            data: Vec::with_capacity(capacity),
            rng: SmallRng::seed_from_u64(config.seed),
            per_state: config
                .per_config
                .as_ref()
                .map(|c| PerState::new(capacity, c)),
            use_cer: config.use_cer,
        }
    }

    fn add(&mut self, tr: Transition) {
        if self.data.len() < self.capacity {
            self.data.push(tr);
        } else {
            self.data[self.i] = tr;
        }
        if let Some(per_state) = self.per_state.as_mut() {
            let max_p = per_state.sum_tree.max_priority();
            per_state.sum_tree.add(self.i, max_p);
        }
        self.i = (self.i + 1) % self.capacity;
    }

    fn sample(&mut self, n: usize) -> Result<Sample> {
        if self.data.is_empty() {
            return Err(ArborError::EmptyReplayBuffer.into());
        }

        let mut ixs = match &self.per_state {
            Some(per_state) => per_state.sum_tree.sample_indices(n, &mut self.rng),
            None => {
                let len = self.data.len();
                (0..n).map(|_| self.rng.gen_range(0..len)).collect()
            }
        };
        if self.use_cer {
            if let (Some(last), Some(latest)) = (ixs.last_mut(), self.latest()) {
                *last = latest;
            }
        }

        let weights = self.per_state.as_ref().map(|per_state| {
            per_state
                .sum_tree
                .weights(&ixs, per_state.iw_scheduler.beta())
        });

        Ok(Sample {
            transitions: ixs.iter().map(|&ix| self.data[ix].clone()).collect(),
            weights,
            ixs: Some(ixs),
        })
    }

    fn update_priorities(&mut self, ixs: &[usize], priorities: &[f32]) {
        if let Some(per_state) = self.per_state.as_mut() {
            for (&ix, &p) in ixs.iter().zip(priorities.iter()) {
                per_state.sum_tree.update(ix, p);
            }
            per_state.iw_scheduler.add_n_opts();
        }
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn transition(i: usize, done: bool) -> Transition {
        Transition::new(
            vec![i as f32],
            vec![1.0, 0.0],
            i as f32,
            vec![i as f32 + 1.0],
            done,
        )
    }

    #[test]
    fn test_ring_buffer_overwrites_oldest() -> Result<()> {
        let mut buffer = ReplayBuffer::build(&ReplayBufferConfig::default().capacity(3));
        assert!(buffer.sample(1).is_err());
        (0..5).for_each(|i| buffer.add(transition(i, i == 4)));

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.sum_rewards(), 2.0 + 3.0 + 4.0);
        assert_eq!(buffer.num_terminal(), 1);
        Ok(())
    }

    #[test]
    fn test_cer_includes_latest() -> Result<()> {
        let config = ReplayBufferConfig::default().capacity(100).use_cer(true);
        let mut buffer = ReplayBuffer::build(&config);
        (0..50).for_each(|i| buffer.add(transition(i, false)));

        let sample = buffer.sample(8)?;
        assert_eq!(sample.len(), 8);
        assert_eq!(sample.transitions[7].reward, 49.0);
        assert!(sample.weights.is_none());
        Ok(())
    }

    #[test]
    fn test_prioritized_sampling() -> Result<()> {
        let config = ReplayBufferConfig::default()
            .capacity(16)
            .per_config(Some(PerConfig::default().alpha(1.0).n_opts_final(10)));
        let mut buffer = ReplayBuffer::build(&config);
        (0..4).for_each(|i| buffer.add(transition(i, false)));
        buffer.update_priorities(&[0, 1, 2, 3], &[0.0, 0.0, 0.0, 10.0]);
        assert!(buffer.beta().unwrap() > 0.4);

        let sample = buffer.sample(32)?;
        let ixs = sample.ixs.unwrap();
        let n_top = ixs.iter().filter(|&&ix| ix == 3).count();
        assert!(n_top > 28);
        let weights = sample.weights.unwrap();
        assert!(weights.iter().all(|&w| w > 0.0 && w <= 1.0));
        Ok(())
    }
}
