//! Batches of transitions on a device.
use crate::util::{index_tensor, one_hot};
use anyhow::{anyhow, Result};
use arbor_core::{argmax, hierarchy::non_final_positions, Sample, Transition};
use candle_core::{Device, Tensor};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A collated batch of transitions.
///
/// Next states are stored only for non-terminal rows, in the order of the
/// `true` entries of `non_final_mask`. Batches are immutable: derived fields
/// and overridden actions produce new values. Each batch carries an id that
/// is kept by views over the same rows and renewed when rows are selected.
#[derive(Clone, Debug)]
pub struct TransitionBatch {
    id: u64,
    state: Tensor,
    action: Tensor,
    action_argmax: Vec<u32>,
    reward: Tensor,
    non_final_mask: Vec<bool>,
    non_final_next_states: Option<Tensor>,
    state_features: Option<Tensor>,
    target_state_features: Option<Tensor>,
    non_final_next_state_features: Option<Tensor>,
    state_action_features: Option<Tensor>,
    weights: Option<Tensor>,
    ixs: Option<Vec<usize>>,
}

impl TransitionBatch {
    /// Collates transitions.
    pub fn from_transitions(transitions: &[Transition], device: &Device) -> Result<Self> {
        let first = transitions
            .first()
            .ok_or_else(|| anyhow!("cannot collate an empty batch"))?;
        let n = transitions.len();
        let obs_dim = first.state.len();
        let action_dim = first.action.len();

        let mut state = Vec::with_capacity(n * obs_dim);
        let mut action = Vec::with_capacity(n * action_dim);
        let mut action_argmax = Vec::with_capacity(n);
        let mut reward = Vec::with_capacity(n);
        let mut non_final_mask = Vec::with_capacity(n);
        let mut next_states = vec![];

        for tr in transitions.iter() {
            if tr.state.len() != obs_dim || tr.action.len() != action_dim {
                return Err(anyhow!("transitions of a batch must have the same shapes"));
            }
            state.extend_from_slice(&tr.state);
            action.extend_from_slice(&tr.action);
            action_argmax.push(argmax(&tr.action) as u32);
            reward.push(tr.reward);
            non_final_mask.push(tr.next_state.is_some());
            if let Some(next_state) = &tr.next_state {
                next_states.extend_from_slice(next_state);
            }
        }

        let n_non_final = non_final_mask.iter().filter(|&&m| m).count();
        let non_final_next_states = match n_non_final {
            0 => None,
            m => Some(Tensor::from_vec(next_states, (m, obs_dim), device)?),
        };

        Ok(Self {
            id: next_id(),
            state: Tensor::from_vec(state, (n, obs_dim), device)?,
            action: Tensor::from_vec(action, (n, action_dim), device)?,
            action_argmax,
            reward: Tensor::from_vec(reward, (n, 1), device)?,
            non_final_mask,
            non_final_next_states,
            state_features: None,
            target_state_features: None,
            non_final_next_state_features: None,
            state_action_features: None,
            weights: None,
            ixs: None,
        })
    }

    /// Collates a sample of a replay buffer, with its importance weights.
    pub fn from_sample(sample: &Sample, device: &Device) -> Result<Self> {
        let mut batch = Self::from_transitions(&sample.transitions, device)?;
        if let Some(weights) = &sample.weights {
            batch.weights = Some(Tensor::from_slice(weights, (weights.len(), 1), device)?);
        }
        batch.ixs = sample.ixs.clone();
        Ok(batch)
    }

    /// Sets per-row importance weights.
    pub fn with_weights(mut self, weights: Tensor) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Sets the encoded current and next states.
    pub fn with_features(
        mut self,
        state_features: Tensor,
        non_final_next_state_features: Option<Tensor>,
    ) -> Self {
        self.state_features = Some(state_features);
        self.non_final_next_state_features = non_final_next_state_features;
        self
    }

    /// Sets the current states encoded by the target encoder.
    pub fn with_target_state_features(mut self, target_state_features: Tensor) -> Self {
        self.target_state_features = Some(target_state_features.detach());
        self
    }

    /// Sets the state-action embedding of the taken actions.
    pub fn with_state_action_features(&self, state_action_features: Tensor) -> Self {
        let mut batch = self.clone();
        batch.state_action_features = Some(state_action_features);
        batch
    }

    /// A view of the same rows with discrete actions `action_argmax` out of `n`.
    ///
    /// Actions are replaced by their one-hot encodings. The state-action
    /// embedding, which depends on the old actions, is dropped.
    pub fn with_discrete_actions(&self, action_argmax: &[u32], n: usize) -> Result<Self> {
        if action_argmax.len() != self.len() {
            return Err(anyhow!(
                "{} actions given for a batch of {} rows",
                action_argmax.len(),
                self.len()
            ));
        }
        let mut batch = self.clone();
        batch.action = one_hot(action_argmax, n, self.state.device())?;
        batch.action_argmax = action_argmax.to_vec();
        batch.state_action_features = None;
        Ok(batch)
    }

    /// A new batch of the given rows.
    ///
    /// Next states of the selected non-terminal rows are looked up by their
    /// position among the non-terminal rows of this batch.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Self> {
        if let Some(&row) = rows.iter().find(|&&row| row >= self.len()) {
            return Err(anyhow!("row {} is out of a batch of {} rows", row, self.len()));
        }
        let device = self.state.device();
        let ids = index_tensor(rows, device)?;
        let select = |t: &Option<Tensor>| -> Result<Option<Tensor>> {
            match t {
                Some(t) => Ok(Some(t.index_select(&ids, 0)?)),
                None => Ok(None),
            }
        };

        let positions = non_final_positions(rows, &self.non_final_mask);
        let (non_final_next_states, non_final_next_state_features) = match positions.len() {
            0 => (None, None),
            _ => {
                let pos = index_tensor(&positions, device)?;
                let select_pos = |t: &Option<Tensor>| -> Result<Option<Tensor>> {
                    match t {
                        Some(t) => Ok(Some(t.index_select(&pos, 0)?)),
                        None => Ok(None),
                    }
                };
                (
                    select_pos(&self.non_final_next_states)?,
                    select_pos(&self.non_final_next_state_features)?,
                )
            }
        };

        Ok(Self {
            id: next_id(),
            state: self.state.index_select(&ids, 0)?,
            action: self.action.index_select(&ids, 0)?,
            action_argmax: rows.iter().map(|&r| self.action_argmax[r]).collect(),
            reward: self.reward.index_select(&ids, 0)?,
            non_final_mask: rows.iter().map(|&r| self.non_final_mask[r]).collect(),
            non_final_next_states,
            state_features: select(&self.state_features)?,
            target_state_features: select(&self.target_state_features)?,
            non_final_next_state_features,
            state_action_features: select(&self.state_action_features)?,
            weights: select(&self.weights)?,
            ixs: self
                .ixs
                .as_ref()
                .map(|ixs| rows.iter().map(|&r| ixs[r]).collect()),
        })
    }

    /// Identifier shared by views of the same rows.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.non_final_mask.len()
    }

    /// Returns `true` if the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.non_final_mask.is_empty()
    }

    /// Device of the tensors.
    pub fn device(&self) -> &Device {
        self.state.device()
    }

    /// States, `[batch, obs_dim]`.
    pub fn state(&self) -> &Tensor {
        &self.state
    }

    /// Actions, `[batch, action_dim]`.
    pub fn action(&self) -> &Tensor {
        &self.action
    }

    /// Index of the largest entry of each action.
    pub fn action_argmax(&self) -> &[u32] {
        &self.action_argmax
    }

    /// Rewards, `[batch, 1]`.
    pub fn reward(&self) -> &Tensor {
        &self.reward
    }

    /// `true` for rows with a next state.
    pub fn non_final_mask(&self) -> &[bool] {
        &self.non_final_mask
    }

    /// Next states of the non-terminal rows, `None` if every row is terminal.
    pub fn non_final_next_states(&self) -> Option<&Tensor> {
        self.non_final_next_states.as_ref()
    }

    /// Encoded states.
    pub fn state_features(&self) -> Result<&Tensor> {
        self.state_features
            .as_ref()
            .ok_or_else(|| anyhow!("state features are not computed"))
    }

    /// Current states encoded by the target encoder, detached.
    ///
    /// Falls back to the detached live features when no target encoding was set.
    pub fn target_state_features(&self) -> Result<Tensor> {
        match &self.target_state_features {
            Some(t) => Ok(t.clone()),
            None => Ok(self.state_features()?.detach()),
        }
    }

    /// Encoded next states of the non-terminal rows.
    pub fn non_final_next_state_features(&self) -> Option<&Tensor> {
        self.non_final_next_state_features.as_ref()
    }

    /// State-action embedding of the taken actions.
    pub fn state_action_features(&self) -> Result<&Tensor> {
        self.state_action_features
            .as_ref()
            .ok_or_else(|| anyhow!("state-action features are not computed"))
    }

    /// Importance weights, `[batch, 1]`.
    pub fn weights(&self) -> Option<&Tensor> {
        self.weights.as_ref()
    }

    /// Replay buffer slots of the rows.
    pub fn ixs(&self) -> Option<&[usize]> {
        self.ixs.as_deref()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::column_to_vec;

    fn transition(s: f32, a: usize, done: bool) -> Transition {
        let mut action = vec![0.0; 4];
        action[a] = 1.0;
        Transition::new(vec![s, s], action, s, vec![s + 0.5, s + 0.5], done)
    }

    #[test]
    fn test_collate() -> Result<()> {
        let trs = vec![
            transition(0.0, 1, false),
            transition(1.0, 3, true),
            transition(2.0, 0, false),
        ];
        let batch = TransitionBatch::from_transitions(&trs, &Device::Cpu)?;
        assert_eq!(batch.non_final_mask(), &[true, false, true]);
        assert_eq!(batch.action_argmax(), &[1, 3, 0]);
        assert_eq!(
            batch.non_final_next_states().unwrap().to_vec2::<f32>()?,
            vec![vec![0.5, 0.5], vec![2.5, 2.5]]
        );
        Ok(())
    }

    #[test]
    fn test_all_terminal() -> Result<()> {
        let trs = vec![transition(0.0, 1, true), transition(1.0, 2, true)];
        let batch = TransitionBatch::from_transitions(&trs, &Device::Cpu)?;
        assert!(batch.non_final_next_states().is_none());
        assert!(TransitionBatch::from_transitions(&[], &Device::Cpu).is_err());
        Ok(())
    }

    #[test]
    fn test_select_rows_rederives_next_states() -> Result<()> {
        let trs = vec![
            transition(0.0, 0, true),
            transition(1.0, 1, false),
            transition(2.0, 2, true),
            transition(3.0, 3, false),
            transition(4.0, 0, false),
        ];
        let batch = TransitionBatch::from_transitions(&trs, &Device::Cpu)?;
        let sub = batch.select_rows(&[0, 3, 4])?;

        assert_ne!(sub.id(), batch.id());
        assert_eq!(sub.non_final_mask(), &[false, true, true]);
        assert_eq!(sub.action_argmax(), &[0, 3, 0]);
        assert_eq!(column_to_vec(sub.reward())?, vec![0.0, 3.0, 4.0]);
        assert_eq!(
            sub.non_final_next_states().unwrap().to_vec2::<f32>()?,
            vec![vec![3.5, 3.5], vec![4.5, 4.5]]
        );

        let sub = batch.select_rows(&[0, 2])?;
        assert!(sub.non_final_next_states().is_none());
        assert!(batch.select_rows(&[5]).is_err());
        Ok(())
    }

    #[test]
    fn test_target_state_features() -> Result<()> {
        let trs = vec![
            transition(0.0, 0, false),
            transition(1.0, 1, true),
            transition(2.0, 2, false),
        ];
        let batch = TransitionBatch::from_transitions(&trs, &Device::Cpu)?;
        assert!(batch.target_state_features().is_err());

        let live = batch.state().clone();
        let batch = batch.with_features(live.clone(), None);
        assert_eq!(batch.target_state_features()?.to_vec2::<f32>()?, live.to_vec2::<f32>()?);

        let target = live.affine(2.0, 1.0)?;
        let batch = batch.with_target_state_features(target);
        let sub = batch.select_rows(&[2, 0])?;
        assert_eq!(
            sub.target_state_features()?.to_vec2::<f32>()?,
            vec![vec![5.0, 5.0], vec![1.0, 1.0]]
        );
        assert_eq!(
            sub.state_features()?.to_vec2::<f32>()?,
            vec![vec![2.0, 2.0], vec![0.0, 0.0]]
        );
        Ok(())
    }

    #[test]
    fn test_discrete_action_view() -> Result<()> {
        let trs = vec![transition(0.0, 3, false), transition(1.0, 2, false)];
        let batch = TransitionBatch::from_transitions(&trs, &Device::Cpu)?;
        let view = batch.with_discrete_actions(&[1, 0], 2)?;

        assert_eq!(view.id(), batch.id());
        assert_eq!(view.action_argmax(), &[1, 0]);
        assert_eq!(view.action().to_vec2::<f32>()?, vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        assert_eq!(batch.action_argmax(), &[3, 2]);
        Ok(())
    }
}
