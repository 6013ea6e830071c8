use crate::batch::TransitionBatch;
use anyhow::Result;
use arbor_core::record::Record;
use candle_core::Tensor;
use std::path::Path;

/// Outcome of one optimization step of a policy.
pub struct Optimized {
    /// Per-row error, `[batch, 1]`, used as the priority signal of replay.
    pub error: Tensor,

    /// Training metrics.
    pub record: Record,
}

/// A node of a policy tree.
pub trait Policy {
    /// Trains every network of the node on a batch with encoded states.
    fn optimize_networks(&mut self, batch: &TransitionBatch) -> Result<Optimized>;

    /// Scores of the flat actions for encoded states, `[batch, n_actions]`.
    ///
    /// The action of a row is the index of its largest score.
    fn choose_action(&mut self, state_features: &Tensor) -> Result<Tensor>;

    /// Per-row error of a batch without training, `[batch, 1]`.
    fn calculate_tde(&self, batch: &TransitionBatch) -> Result<Tensor>;

    /// Synchronizes the target networks.
    fn update_targets(&mut self, step: usize) -> Result<()>;

    /// Number of flat actions.
    fn n_actions(&self) -> usize;

    /// Saves the weights under `dir`.
    fn save(&self, dir: &Path) -> Result<()>;

    /// Loads the weights from `dir`.
    fn load(&mut self, dir: &Path) -> Result<()>;
}
