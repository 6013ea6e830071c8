//! Environment.
use crate::{record::Record, Action, ActionSpace};
use anyhow::Result;

/// Outcome of one environment step.
#[derive(Debug, Clone)]
pub struct Step {
    /// Observation after the step.
    pub obs: Vec<f32>,

    /// Reward of the step.
    pub reward: f32,

    /// Episode termination flag.
    pub done: bool,

    /// Environment specific information.
    pub info: Record,
}

/// Environment consumed by the [`Trainer`](crate::Trainer).
pub trait Env {
    /// Length of observation vectors.
    fn obs_dim(&self) -> usize;

    /// Action space of the environment.
    fn action_space(&self) -> &ActionSpace;

    /// Starts a new episode and returns its first observation.
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Applies an action.
    fn step(&mut self, action: &Action) -> Result<Step>;
}
