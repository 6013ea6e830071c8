use super::{BasePolicyConfig, BranchConfig, Optimized, PlainPolicy, Policy, PolicyNode};
use crate::{
    batch::TransitionBatch,
    features::StateEncoder,
    util::{argmax_rows, column, column_to_vec, index_tensor},
};
use anyhow::Result;
use arbor_core::{error::ArborError, hierarchy::BranchLayout, record::Record, ActionSpace};
use candle_core::{Device, Tensor, D};
use log::{debug, info};
use std::{fs, path::Path};

/// A decider over `K` branches, each a policy over a contiguous range of flat actions.
///
/// A flat action `i` is trained as the high-level action `action_mapping[i]`
/// by the decider and as the low-level action `i - shift[k]` by branch `k`,
/// on the rows routed to it only. With a single branch there is no decider.
pub struct HierarchicalPolicy {
    layout: BranchLayout,
    decider: Option<Box<PlainPolicy>>,
    branches: Vec<PolicyNode>,
}

impl HierarchicalPolicy {
    /// Builds the decider and the branches.
    pub fn build(
        branches: &[BranchConfig],
        config: &BasePolicyConfig,
        space: &ActionSpace,
        encoder: &StateEncoder,
        seed: u64,
        device: &Device,
    ) -> Result<Self> {
        let n = match space {
            ActionSpace::Discrete(n) => *n,
            _ => {
                return Err(ArborError::Config(
                    "a hierarchical policy needs a discrete action space".into(),
                )
                .into())
            }
        };
        let sizes = branches.iter().map(|b| b.size).collect::<Vec<_>>();
        let layout = BranchLayout::new(&sizes)?;
        if layout.n_actions() != n {
            return Err(ArborError::Config(format!(
                "branch sizes {:?} do not sum to {} actions",
                sizes, n
            ))
            .into());
        }

        let k = layout.n_branches();
        let decider = match k {
            1 => None,
            _ => Some(Box::new(PlainPolicy::build(
                config,
                &ActionSpace::Discrete(k),
                encoder,
                device,
            )?)),
        };
        let branches = branches
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let seed = seed.wrapping_add(i as u64 + 1);
                PolicyNode::build(&b.structure, config, &ActionSpace::Discrete(b.size), encoder, seed, device)
            })
            .collect::<Result<Vec<_>>>()?;
        info!("Built hierarchical policy: branches = {:?}", sizes);

        Ok(Self {
            layout,
            decider,
            branches,
        })
    }

    /// Layout of the branches.
    pub fn layout(&self) -> &BranchLayout {
        &self.layout
    }
}

impl Policy for HierarchicalPolicy {
    fn optimize_networks(&mut self, batch: &TransitionBatch) -> Result<Optimized> {
        let (highs, lows) = self.layout.decode_batch(batch.action_argmax())?;
        let mut error = vec![0f32; batch.len()];
        let mut record = Record::empty();

        if let Some(decider) = self.decider.as_mut() {
            let view = batch.with_discrete_actions(&highs, self.layout.n_branches())?;
            let out = decider.optimize_networks(&view)?;
            for (e, d) in error.iter_mut().zip(column_to_vec(&out.error)?) {
                *e += d;
            }
            record.merge_inplace(out.record.with_prefix("decider"));
        }

        for (k, rows) in self.layout.get_masks(&highs).iter().enumerate() {
            if rows.is_empty() {
                debug!("Branch {} received no row", k);
                continue;
            }
            let branch_lows = rows.iter().map(|&r| lows[r]).collect::<Vec<_>>();
            let sub = batch
                .select_rows(rows)?
                .with_discrete_actions(&branch_lows, self.layout.size(k))?;
            let out = self.branches[k].optimize_networks(&sub)?;
            for (&r, e) in rows.iter().zip(column_to_vec(&out.error)?) {
                error[r] += e;
            }
            record.merge_inplace(out.record.with_prefix(&format!("branch{}", k)));
        }

        Ok(Optimized {
            error: column(error, batch.device())?,
            record,
        })
    }

    fn choose_action(&mut self, state_features: &Tensor) -> Result<Tensor> {
        let n_rows = state_features.dim(0)?;
        let n = self.layout.n_actions();
        let highs = match self.decider.as_mut() {
            Some(decider) => argmax_rows(&decider.choose_action(state_features)?)?,
            None => vec![0; n_rows],
        };

        // Routed slices hold softmax scores, every other entry stays zero.
        let mut scores = vec![0f32; n_rows * n];
        for (k, rows) in self.layout.get_masks(&highs).iter().enumerate() {
            if rows.is_empty() {
                continue;
            }
            let ids = index_tensor(rows, state_features.device())?;
            let xs = state_features.index_select(&ids, 0)?;
            let branch_scores = self.branches[k].choose_action(&xs)?;
            let branch_scores = candle_nn::ops::softmax(&branch_scores, D::Minus1)?.to_vec2::<f32>()?;
            let shift = self.layout.shift(k);
            for (&r, s) in rows.iter().zip(branch_scores.iter()) {
                scores[r * n + shift..r * n + shift + s.len()].copy_from_slice(s);
            }
        }
        Ok(Tensor::from_vec(scores, (n_rows, n), state_features.device())?)
    }

    fn calculate_tde(&self, batch: &TransitionBatch) -> Result<Tensor> {
        let (highs, lows) = self.layout.decode_batch(batch.action_argmax())?;
        let mut error = vec![0f32; batch.len()];

        if let Some(decider) = &self.decider {
            let view = batch.with_discrete_actions(&highs, self.layout.n_branches())?;
            for (e, d) in error.iter_mut().zip(column_to_vec(&decider.calculate_tde(&view)?)?) {
                *e += d;
            }
        }
        for (k, rows) in self.layout.get_masks(&highs).iter().enumerate() {
            if rows.is_empty() {
                continue;
            }
            let branch_lows = rows.iter().map(|&r| lows[r]).collect::<Vec<_>>();
            let sub = batch
                .select_rows(rows)?
                .with_discrete_actions(&branch_lows, self.layout.size(k))?;
            let tde = self.branches[k].calculate_tde(&sub)?;
            for (&r, e) in rows.iter().zip(column_to_vec(&tde)?) {
                error[r] += e;
            }
        }
        column(error, batch.device())
    }

    fn update_targets(&mut self, step: usize) -> Result<()> {
        if let Some(decider) = self.decider.as_mut() {
            decider.update_targets(step)?;
        }
        for branch in self.branches.iter_mut() {
            branch.update_targets(step)?;
        }
        Ok(())
    }

    fn n_actions(&self) -> usize {
        self.layout.n_actions()
    }

    fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        if let Some(decider) = &self.decider {
            decider.save(&dir.join("decider"))?;
        }
        for (k, branch) in self.branches.iter().enumerate() {
            branch.save(&dir.join(format!("branch{}", k)))?;
        }
        Ok(())
    }

    fn load(&mut self, dir: &Path) -> Result<()> {
        if let Some(decider) = self.decider.as_mut() {
            decider.load(&dir.join("decider"))?;
        }
        for (k, branch) in self.branches.iter_mut().enumerate() {
            branch.load(&dir.join(format!("branch{}", k)))?;
        }
        Ok(())
    }
}
