//! Agent.
use crate::{record::Record, Action};
use anyhow::Result;
use std::path::Path;

/// The surface of a learner seen by a training loop.
pub trait Agent {
    /// Stores a transition in the replay buffer.
    ///
    /// `next_state` is discarded when `done` is set.
    fn remember(
        &mut self,
        state: &[f32],
        action: &Action,
        reward: f32,
        next_state: &[f32],
        done: bool,
    ) -> Result<()>;

    /// Samples a batch and updates every network once.
    ///
    /// Returns `None` while the replay buffer is still warming up.
    fn optimize(&mut self) -> Result<Option<Record>>;

    /// Picks an action for training, together with the raw output it was derived from.
    fn explore(&mut self, state: &[f32], fully_random: bool) -> Result<(Action, Vec<f32>)>;

    /// Picks the greedy action, together with the raw output it was derived from.
    fn exploit(&mut self, state: &[f32]) -> Result<(Action, Vec<f32>)>;

    /// Decays the exploration rate.
    fn decay_exploration(&mut self, step: usize) -> Record;

    /// Synchronizes target networks.
    fn update_targets(&mut self, step: usize) -> Result<()>;

    /// Stops the online update of observation statistics.
    fn freeze_normalizers(&mut self);

    /// Saves the parameters of every network in a directory.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Loads the parameters of every network from a directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
