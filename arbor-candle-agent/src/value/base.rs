use super::{Bootstrap, ValueConfig};
use crate::{
    actor::Actor,
    batch::TransitionBatch,
    features::StateActionEncoder,
    mlp::MlpConfig,
    net::{Net, TrackedNet},
    opt::Optimizer,
    util::{index_column, index_tensor, smooth_l1, weighted_mean, CriticLoss},
};
use anyhow::{anyhow, Result};
use arbor_core::{
    error::ArborError,
    record::{Record, RecordValue},
};
use candle_core::{DType, Device, Tensor, Var};
use log::{info, trace};
use std::path::Path;

/// Kind of a value estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Action values.
    Q,

    /// State values.
    V,
}

impl ValueKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Q => "q",
            Self::V => "v",
        }
    }
}

/// Collaborators read by a value estimator while computing bootstrap values.
///
/// An actor-critic Q estimator evaluates next states at the actions of the
/// target actor, embedded by the state-action encoder of its policy.
#[derive(Clone, Copy, Default)]
pub struct CriticCtx<'a> {
    /// Actor of the policy.
    pub actor: Option<&'a Actor>,

    /// State-action encoder of the policy.
    pub state_action: Option<&'a StateActionEncoder>,
}

/// A Q or V estimator trained with TD targets.
///
/// The value network regresses `gamma * V(s') + r`, where `V(s')` is zero
/// for terminal transitions and otherwise comes from a target network. With
/// the split Bellman decomposition a reward head learns `r` on its own loss,
/// the value network then regresses `gamma * V(s')` only, and both heads are
/// summed at inference.
pub struct ValueEstimator {
    kind: ValueKind,
    actor_critic: bool,
    gamma: f64,
    loss: CriticLoss,
    bootstrap: Bootstrap,
    value: TrackedNet,
    opt: Optimizer,
    reward: Option<(Net, Optimizer)>,

    // Next-state values of the latest optimized batch, stamped with its id.
    cache: Option<(u64, Tensor)>,
}

impl ValueEstimator {
    /// Builds an estimator.
    ///
    /// * `in_dim` - Width of the state features, or of the state-action
    ///   embedding for an actor-critic Q estimator.
    /// * `n_actions` - Number of outputs of a discrete Q estimator.
    /// * `shared_vars` - Variables of upstream encoders trained by the value loss.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        kind: ValueKind,
        config: &ValueConfig,
        in_dim: usize,
        n_actions: usize,
        actor_critic: bool,
        bootstrap: Bootstrap,
        shared_vars: Vec<Var>,
        device: &Device,
    ) -> Result<Self> {
        let out_dim = match (kind, actor_critic) {
            (ValueKind::Q, false) => n_actions,
            _ => 1,
        };
        let mlp_config = MlpConfig::new(in_dim, config.units.clone(), out_dim, false);
        let value = TrackedNet::build(mlp_config.clone(), kind.name(), device, config.target_sync)?;

        let mut vars = value.vars();
        vars.extend(shared_vars);
        let opt = config.opt_config.build(vars, config.max_grad_norm)?;

        let reward = match config.split_bellman {
            false => None,
            true => {
                let net = Net::build(mlp_config, &format!("{}_reward", kind.name()), device)?;
                let opt_r = config
                    .opt_config
                    .clone()
                    .learning_rate(config.lr_r)
                    .build(net.vars(), config.max_grad_norm)?;
                Some((net, opt_r))
            }
        };

        info!(
            "Built {}: in = {}, out = {}, split_bellman = {}, target = {:?}, bootstrap = {:?}",
            kind.name(),
            in_dim,
            out_dim,
            config.split_bellman,
            config.target_sync,
            bootstrap
        );

        Ok(Self {
            kind,
            actor_critic,
            gamma: config.gamma,
            loss: config.loss,
            bootstrap,
            value,
            opt,
            reward,
            cache: None,
        })
    }

    /// Kind of the estimator.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Returns `true` if a target network is used for bootstrapping.
    pub fn has_target(&self) -> bool {
        self.value.has_target()
    }

    fn name(&self) -> &'static str {
        self.kind.name()
    }

    // A discrete Q estimator has one output per action.
    fn gathers(&self) -> bool {
        self.kind == ValueKind::Q && !self.actor_critic
    }

    fn input<'b>(&self, batch: &'b TransitionBatch) -> Result<&'b Tensor> {
        match self.kind == ValueKind::Q && self.actor_critic {
            true => batch.state_action_features(),
            false => batch.state_features(),
        }
    }

    fn take_actions(&self, xs: Tensor, action_argmax: &[u32]) -> Result<Tensor> {
        match self.gathers() {
            true => Ok(xs.gather(&index_column(action_argmax, xs.device())?, 1)?),
            false => Ok(xs),
        }
    }

    /// Values of the live network, reward head included.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let v = self.value.forward(xs)?;
        match &self.reward {
            Some((net, _)) => Ok(v.add(&net.forward(xs)?)?),
            None => Ok(v),
        }
    }

    // Values of the target network, reward head included. Detached.
    fn forward_target(&self, xs: &Tensor) -> Result<Tensor> {
        let v = self.value.forward_target(xs)?;
        match &self.reward {
            Some((net, _)) => Ok(v.add(&net.forward(xs)?.detach())?),
            None => Ok(v),
        }
    }

    /// Predictions of the value network and the reward head at the taken actions.
    pub fn predict_current_state(&self, batch: &TransitionBatch) -> Result<(Tensor, Option<Tensor>)> {
        let xs = self.input(batch)?;
        let argmax = batch.action_argmax();
        let value = self.take_actions(self.value.forward(xs)?, argmax)?;
        let reward = match &self.reward {
            Some((net, _)) => Some(self.take_actions(net.forward(xs)?, argmax)?),
            None => None,
        };
        Ok((value, reward))
    }

    // Bootstrap values of encoded next states, `[n, 1]`.
    fn state_values(&self, next_state_features: &Tensor, ctx: &CriticCtx) -> Result<Tensor> {
        match (self.kind, self.actor_critic) {
            (ValueKind::V, _) => self.forward_target(next_state_features),
            (ValueKind::Q, false) => Ok(self.forward_target(next_state_features)?.max_keepdim(1)?),
            (ValueKind::Q, true) => {
                let actor = ctx
                    .actor
                    .ok_or_else(|| anyhow!("an actor-critic Q estimator needs an actor"))?;
                let state_action = ctx
                    .state_action
                    .ok_or_else(|| anyhow!("an actor-critic Q estimator needs a state-action encoder"))?;
                let actions = actor.forward_target(next_state_features)?;
                let xs = state_action.forward_target(next_state_features, &actions)?;
                self.forward_target(&xs)
            }
        }
    }

    /// Next-state values of the target network, zero for terminal rows.
    pub fn calculate_next_state_values(&self, batch: &TransitionBatch, ctx: &CriticCtx) -> Result<Tensor> {
        let zeros = Tensor::zeros((batch.len(), 1), DType::F32, batch.device())?;
        let next_state_features = match batch.non_final_next_state_features() {
            Some(xs) => xs,
            None => return Ok(zeros),
        };

        let values = self.state_values(next_state_features, ctx)?.detach();
        let positions = batch
            .non_final_mask()
            .iter()
            .enumerate()
            .filter(|(_, non_final)| **non_final)
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let ids = index_tensor(&positions, batch.device())?;
        Ok(zeros.index_add(&ids, &values, 0)?)
    }

    fn cached_next_state_values(&self, batch: &TransitionBatch) -> Result<Tensor> {
        match &self.cache {
            Some((id, values)) if *id == batch.id() => Ok(values.clone()),
            _ => Err(ArborError::StaleBootstrap(self.name().to_string()).into()),
        }
    }

    fn bootstrap_values(
        &self,
        batch: &TransitionBatch,
        ctx: &CriticCtx,
        other: Option<&ValueEstimator>,
        use_cache: bool,
    ) -> Result<Tensor> {
        let other = || {
            other.ok_or_else(|| {
                ArborError::Config(format!(
                    "{:?} bootstrap of {} needs the other estimator",
                    self.bootstrap,
                    self.name()
                ))
            })
        };
        match (self.bootstrap, self.kind) {
            (Bootstrap::Qvmax, _) => other()?.calculate_next_state_values(batch, ctx),
            (Bootstrap::Qv, ValueKind::Q) => match use_cache {
                true => other()?.cached_next_state_values(batch),
                false => other()?.calculate_next_state_values(batch, ctx),
            },
            _ => self.calculate_next_state_values(batch, ctx),
        }
    }

    /// Bootstrap values of the batch.
    ///
    /// In QV mode a Q estimator reads the values its V estimator computed
    /// while being optimized on the same batch. It fails with
    /// [`ArborError::StaleBootstrap`] when V has not been optimized on it.
    pub fn predict_next_state(
        &self,
        batch: &TransitionBatch,
        ctx: &CriticCtx,
        other: Option<&ValueEstimator>,
    ) -> Result<Tensor> {
        self.bootstrap_values(batch, ctx, other, true)
    }

    /// TD target `gamma * next + reward`. The reward is left out with split Bellman.
    pub fn calculate_updated_value_next_state(&self, reward: &Tensor, next: &Tensor) -> Result<Tensor> {
        let discounted = next.affine(self.gamma, 0.0)?;
        match self.reward {
            Some(_) => Ok(discounted),
            None => Ok(discounted.add(reward)?),
        }
    }

    /// Trains on a batch and returns the detached per-row TD error, `[batch, 1]`.
    pub fn optimize(
        &mut self,
        batch: &TransitionBatch,
        ctx: &CriticCtx,
        other: Option<&ValueEstimator>,
    ) -> Result<(Tensor, Record)> {
        let mut record = Record::empty();
        let (current, reward_pred) = self.predict_current_state(batch)?;

        let tde_r = match (reward_pred, self.reward.as_mut()) {
            (Some(pred), Some((_, opt_r))) => {
                let loss = weighted_mean(&smooth_l1(&pred, batch.reward())?, batch.weights())?;
                opt_r.backward_step(&loss)?;
                record.insert(
                    format!("loss_r_{}", self.kind.name()),
                    RecordValue::Scalar(loss.to_scalar::<f32>()?),
                );
                Some(batch.reward().sub(&pred.detach())?)
            }
            _ => None,
        };

        let next = self.predict_next_state(batch, ctx, other)?;
        if self.kind == ValueKind::V {
            self.cache = Some((batch.id(), next.clone()));
        }
        let expected = self
            .calculate_updated_value_next_state(batch.reward(), &next)?
            .detach();

        let loss = weighted_mean(&self.loss.elementwise(&current, &expected)?, batch.weights())?;
        self.opt.backward_step(&loss)?;
        let loss = loss.to_scalar::<f32>()?;
        trace!("loss_{} = {}", self.name(), loss);
        record.insert(format!("loss_{}", self.name()), RecordValue::Scalar(loss));

        let tde = expected.sub(&current.detach())?;
        let tde = match tde_r {
            Some(tde_r) => tde.add(&tde_r)?,
            None => tde,
        };
        Ok((tde, record))
    }

    /// Per-row TD error of a batch without training, `[batch, 1]`.
    ///
    /// Bootstrap values are always recomputed, so the result does not depend
    /// on which estimator was optimized last.
    pub fn calculate_tde(
        &self,
        batch: &TransitionBatch,
        ctx: &CriticCtx,
        other: Option<&ValueEstimator>,
    ) -> Result<Tensor> {
        let (current, reward_pred) = self.predict_current_state(batch)?;
        let next = self.bootstrap_values(batch, ctx, other, false)?;
        let expected = self.calculate_updated_value_next_state(batch.reward(), &next)?;
        let tde = expected.sub(&current)?;
        let tde = match reward_pred {
            Some(pred) => tde.add(&batch.reward().sub(&pred)?)?,
            None => tde,
        };
        Ok(tde.detach())
    }

    /// Target-network values of the given actions. Detached.
    ///
    /// `actions` are read by an actor-critic estimator, `action_argmax` by a
    /// discrete one.
    pub fn evaluate_target(
        &self,
        state_features: &Tensor,
        actions: &Tensor,
        action_argmax: &[u32],
        state_action: Option<&StateActionEncoder>,
    ) -> Result<Tensor> {
        match (self.kind, self.actor_critic) {
            (ValueKind::V, _) => Err(anyhow!("state values do not depend on actions")),
            (ValueKind::Q, false) => self.take_actions(self.forward_target(state_features)?, action_argmax),
            (ValueKind::Q, true) => {
                let state_action = state_action
                    .ok_or_else(|| anyhow!("an actor-critic Q estimator needs a state-action encoder"))?;
                let xs = state_action.forward_target(state_features, actions)?;
                self.forward_target(&xs)
            }
        }
    }

    /// Live values of the given actions of an actor-critic Q estimator.
    ///
    /// Gradients flow back to `actions`.
    pub fn evaluate(
        &self,
        state_features: &Tensor,
        actions: &Tensor,
        state_action: &StateActionEncoder,
    ) -> Result<Tensor> {
        if !(self.kind == ValueKind::Q && self.actor_critic) {
            return Err(anyhow!("only an actor-critic Q estimator evaluates actions"));
        }
        let xs = state_action.forward(state_features, actions)?;
        self.forward(&xs)
    }

    /// Synchronizes the target network.
    pub fn update_targets(&self, step: usize) -> Result<()> {
        if self.value.update_targets(step)? {
            trace!("Updated target of {} at step {}", self.name(), step);
        }
        Ok(())
    }

    /// Saves the weights in `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        self.value.save(dir)?;
        if let Some((net, _)) = &self.reward {
            net.save(dir, "")?;
        }
        Ok(())
    }

    /// Loads the weights from `dir`.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        self.value.load(dir)?;
        if let Some((net, _)) = self.reward.as_mut() {
            net.load(dir, "")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{net::TargetSync, util::column_to_vec};
    use arbor_core::Transition;

    fn batch(rewards: &[f32], done: &[bool]) -> Result<TransitionBatch> {
        let trs = rewards
            .iter()
            .zip(done.iter())
            .enumerate()
            .map(|(i, (&r, &d))| {
                let mut action = vec![0.0; 3];
                action[i % 3] = 1.0;
                let s = i as f32;
                Transition::new(vec![s, -s], action, r, vec![s + 1.0, -s - 1.0], d)
            })
            .collect::<Vec<_>>();
        let batch = TransitionBatch::from_transitions(&trs, &Device::Cpu)?;
        let sf = batch.state().clone();
        let nsf = batch.non_final_next_states().cloned();
        Ok(batch.with_features(sf, nsf))
    }

    fn estimator(kind: ValueKind, config: &ValueConfig, bootstrap: Bootstrap) -> Result<ValueEstimator> {
        ValueEstimator::build(kind, config, 2, 3, false, bootstrap, vec![], &Device::Cpu)
    }

    #[test]
    fn test_terminal_rows_have_zero_next_values() -> Result<()> {
        let config = ValueConfig::default().target_sync(Some(TargetSync::Hard { every: 1 }));
        let q = estimator(ValueKind::Q, &config, Bootstrap::Own)?;
        let batch = batch(&[1.0, 1.0, 1.0, 1.0], &[false, true, true, false])?;
        let next = column_to_vec(&q.calculate_next_state_values(&batch, &CriticCtx::default())?)?;
        assert_eq!(next[1], 0.0);
        assert_eq!(next[2], 0.0);

        let batch = self::batch(&[1.0, 1.0], &[true, true])?;
        let next = q.calculate_next_state_values(&batch, &CriticCtx::default())?;
        assert_eq!(next.dims(), &[2, 1]);
        assert_eq!(column_to_vec(&next)?, vec![0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_split_target_excludes_reward() -> Result<()> {
        let reward = Tensor::from_slice(&[1f32, -2.0, 5.0], (3, 1), &Device::Cpu)?;
        let next = Tensor::from_slice(&[10f32, 0.0, 4.0], (3, 1), &Device::Cpu)?;
        let config = ValueConfig::default().gamma(0.5);

        let v = estimator(ValueKind::V, &config, Bootstrap::Own)?;
        let target = column_to_vec(&v.calculate_updated_value_next_state(&reward, &next)?)?;
        assert_eq!(target, vec![6.0, -2.0, 7.0]);

        let v = estimator(ValueKind::V, &config.split_bellman(true), Bootstrap::Own)?;
        let target = column_to_vec(&v.calculate_updated_value_next_state(&reward, &next)?)?;
        assert_eq!(target, vec![5.0, 0.0, 2.0]);
        Ok(())
    }

    #[test]
    fn test_optimize_returns_tde() -> Result<()> {
        let config = ValueConfig::default().split_bellman(true);
        let mut q = estimator(ValueKind::Q, &config, Bootstrap::Own)?;
        let batch = batch(&[1.0, 0.0, -1.0], &[false, true, false])?;

        let (tde, record) = q.optimize(&batch, &CriticCtx::default(), None)?;
        assert_eq!(tde.dims(), &[3, 1]);
        assert!(record.get_scalar("loss_q").is_ok());
        assert!(record.get_scalar("loss_r_q").is_ok());
        Ok(())
    }

    #[test]
    fn test_qv_reads_the_cache_of_the_same_batch() -> Result<()> {
        let config = ValueConfig::default();
        let mut v = estimator(ValueKind::V, &config, Bootstrap::Qv)?;
        let mut q = estimator(ValueKind::Q, &config, Bootstrap::Qv)?;
        let ctx = CriticCtx::default();
        let batch = batch(&[1.0, 0.0, -1.0], &[false, true, false])?;

        let err = q.optimize(&batch, &ctx, Some(&v)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArborError>(),
            Some(ArborError::StaleBootstrap(_))
        ));

        v.optimize(&batch, &ctx, Some(&q))?;
        let cached = column_to_vec(&v.cached_next_state_values(&batch)?)?;
        assert_eq!(
            column_to_vec(&q.predict_next_state(&batch, &ctx, Some(&v))?)?,
            cached
        );
        q.optimize(&batch, &ctx, Some(&v))?;

        // Another batch, V has not seen it yet.
        let other = self::batch(&[1.0], &[false])?;
        assert!(q.optimize(&other, &ctx, Some(&v)).is_err());
        assert!(q.calculate_tde(&other, &ctx, Some(&v)).is_ok());
        Ok(())
    }
}
