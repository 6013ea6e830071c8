//! Index bookkeeping of hierarchical action spaces.
//!
//! A flat `Discrete(N)` action space is cut into `K` contiguous branches of
//! sizes `n_0, ..., n_{K-1}` with `n_0 + ... + n_{K-1} = N`. Branch `k` covers
//! the flat indices `shift[k] .. shift[k] + n_k`. A flat action `i` is routed
//! to the pair `(high, low) = (action_mapping[i], i - shift[action_mapping[i]])`.
use crate::error::ArborError;
use serde::{Deserialize, Serialize};

/// Layout of the branches of one level of a hierarchical policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BranchLayout {
    sizes: Vec<usize>,
    shifts: Vec<usize>,
    action_mapping: Vec<usize>,
}

impl BranchLayout {
    /// Lays out branches of the given sizes side by side.
    pub fn new(sizes: &[usize]) -> Result<Self, ArborError> {
        if sizes.is_empty() {
            return Err(ArborError::Config(
                "a hierarchical policy needs at least one branch".into(),
            ));
        }
        if let Some(k) = sizes.iter().position(|&n| n == 0) {
            return Err(ArborError::Config(format!("branch {} has no actions", k)));
        }

        let mut shifts = Vec::with_capacity(sizes.len());
        let mut action_mapping = Vec::with_capacity(sizes.iter().sum());
        let mut shift = 0;
        for (k, &n) in sizes.iter().enumerate() {
            shifts.push(shift);
            action_mapping.extend(std::iter::repeat(k).take(n));
            shift += n;
        }

        Ok(Self {
            sizes: sizes.to_vec(),
            shifts,
            action_mapping,
        })
    }

    /// Size of the flat action space.
    pub fn n_actions(&self) -> usize {
        self.action_mapping.len()
    }

    /// Number of branches.
    pub fn n_branches(&self) -> usize {
        self.sizes.len()
    }

    /// Offset of the `k`-th branch in the flat action space.
    pub fn shift(&self, k: usize) -> usize {
        self.shifts[k]
    }

    /// Number of actions of the `k`-th branch.
    pub fn size(&self, k: usize) -> usize {
        self.sizes[k]
    }

    /// Branch index of every flat action.
    pub fn action_mapping(&self) -> &[usize] {
        &self.action_mapping
    }

    /// Splits a flat action into `(high, low)`.
    pub fn action2high_low_level(&self, action: usize) -> Result<(usize, usize), ArborError> {
        match self.action_mapping.get(action) {
            Some(&high) => Ok((high, action - self.shifts[high])),
            None => Err(ArborError::ActionOutOfRange(action, self.n_actions())),
        }
    }

    /// Joins `(high, low)` back into a flat action.
    pub fn high_low_level2action(&self, high: usize, low: usize) -> Result<usize, ArborError> {
        match self.sizes.get(high) {
            Some(&n) if low < n => Ok(self.shifts[high] + low),
            Some(&n) => Err(ArborError::ActionOutOfRange(low, n)),
            None => Err(ArborError::ActionOutOfRange(high, self.n_branches())),
        }
    }

    /// Splits a batch of flat actions into high and low level actions.
    pub fn decode_batch(&self, actions: &[u32]) -> Result<(Vec<u32>, Vec<u32>), ArborError> {
        let mut highs = Vec::with_capacity(actions.len());
        let mut lows = Vec::with_capacity(actions.len());
        for &a in actions.iter() {
            let (high, low) = self.action2high_low_level(a as usize)?;
            highs.push(high as u32);
            lows.push(low as u32);
        }
        Ok((highs, lows))
    }

    /// Rows of a batch routed to each branch, in ascending order.
    pub fn get_masks(&self, highs: &[u32]) -> Vec<Vec<usize>> {
        let mut idxs = vec![vec![]; self.n_branches()];
        for (row, &high) in highs.iter().enumerate() {
            if let Some(rows) = idxs.get_mut(high as usize) {
                rows.push(row);
            }
        }
        idxs
    }
}

/// Positions of the selected rows within the compacted non-final rows of a batch.
///
/// `non_final_mask` covers the full batch. Next states are stored only for
/// rows where it is `true`, in the same relative order. For every row of
/// `rows` that has a next state, the returned vector holds the position of
/// that next state in the compacted tensor. Terminal rows are skipped.
pub fn non_final_positions(rows: &[usize], non_final_mask: &[bool]) -> Vec<usize> {
    let mut compacted = Vec::with_capacity(non_final_mask.len());
    let mut n = 0;
    for &non_final in non_final_mask.iter() {
        compacted.push(n);
        if non_final {
            n += 1;
        }
    }
    rows.iter()
        .filter(|&&row| non_final_mask[row])
        .map(|&row| compacted[row])
        .collect()
}
