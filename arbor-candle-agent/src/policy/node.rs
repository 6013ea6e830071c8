use super::{
    BasePolicyConfig, EnsemblePolicy, FactoredPolicy, HierarchicalPolicy, Optimized, PlainPolicy,
    Policy, PolicyStructure,
};
use crate::{batch::TransitionBatch, features::StateEncoder};
use anyhow::Result;
use arbor_core::ActionSpace;
use candle_core::{Device, Tensor};
use std::path::Path;

/// A node of a policy tree.
pub enum PolicyNode {
    /// See [`PlainPolicy`].
    Plain(PlainPolicy),

    /// See [`EnsemblePolicy`].
    Ensemble(EnsemblePolicy),

    /// See [`HierarchicalPolicy`].
    Hierarchical(HierarchicalPolicy),

    /// See [`FactoredPolicy`].
    Factored(FactoredPolicy),
}

impl PolicyNode {
    /// Builds the tree described by `structure` over `space`.
    pub fn build(
        structure: &PolicyStructure,
        config: &BasePolicyConfig,
        space: &ActionSpace,
        encoder: &StateEncoder,
        seed: u64,
        device: &Device,
    ) -> Result<Self> {
        Ok(match structure {
            PolicyStructure::Plain => Self::Plain(PlainPolicy::build(config, space, encoder, device)?),
            PolicyStructure::Ensemble {
                num_heads,
                num_samples,
            } => Self::Ensemble(EnsemblePolicy::build(
                config,
                *num_heads,
                *num_samples,
                space,
                encoder,
                seed,
                device,
            )?),
            PolicyStructure::Hierarchical { branches } => Self::Hierarchical(
                HierarchicalPolicy::build(branches, config, space, encoder, seed, device)?,
            ),
            PolicyStructure::Factored { space: compound } => Self::Factored(
                FactoredPolicy::build(compound, config, space, encoder, device)?,
            ),
        })
    }

    fn inner(&self) -> &dyn Policy {
        match self {
            Self::Plain(p) => p,
            Self::Ensemble(p) => p,
            Self::Hierarchical(p) => p,
            Self::Factored(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Policy {
        match self {
            Self::Plain(p) => p,
            Self::Ensemble(p) => p,
            Self::Hierarchical(p) => p,
            Self::Factored(p) => p,
        }
    }
}

impl Policy for PolicyNode {
    fn optimize_networks(&mut self, batch: &TransitionBatch) -> Result<Optimized> {
        self.inner_mut().optimize_networks(batch)
    }

    fn choose_action(&mut self, state_features: &Tensor) -> Result<Tensor> {
        self.inner_mut().choose_action(state_features)
    }

    fn calculate_tde(&self, batch: &TransitionBatch) -> Result<Tensor> {
        self.inner().calculate_tde(batch)
    }

    fn update_targets(&mut self, step: usize) -> Result<()> {
        self.inner_mut().update_targets(step)
    }

    fn n_actions(&self) -> usize {
        self.inner().n_actions()
    }

    fn save(&self, dir: &Path) -> Result<()> {
        self.inner().save(dir)
    }

    fn load(&mut self, dir: &Path) -> Result<()> {
        self.inner_mut().load(dir)
    }
}
