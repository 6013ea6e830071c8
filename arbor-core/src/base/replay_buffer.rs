//! Replay buffer interface.
use crate::Transition;
use anyhow::Result;

/// Transitions sampled from a replay buffer.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    /// Sampled transitions.
    pub transitions: Vec<Transition>,

    /// Importance weights, present for prioritized sampling.
    pub weights: Option<Vec<f32>>,

    /// Buffer slots of the sampled transitions, used to update priorities.
    pub ixs: Option<Vec<usize>>,
}

impl Sample {
    /// Number of sampled transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Returns `true` if nothing was sampled.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Interface of a replay buffer storing [`Transition`]s.
pub trait ReplayBufferBase {
    /// Configuration of the buffer.
    type Config: Clone;

    /// Builds a buffer.
    fn build(config: &Self::Config) -> Self;

    /// Stores a transition, overwriting the oldest one when full.
    fn add(&mut self, tr: Transition);

    /// Samples `n` transitions.
    ///
    /// Prioritized buffers also return importance weights and slot indices.
    fn sample(&mut self, n: usize) -> Result<Sample>;

    /// Sets the priorities of the given slots. Uniform buffers ignore it.
    fn update_priorities(&mut self, ixs: &[usize], priorities: &[f32]);

    /// Number of stored transitions.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer holds no transitions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
