use super::{ActorConfig, ActorUpdateRule, OutputHead, RowSelection};
use crate::{
    batch::TransitionBatch,
    features::StateActionEncoder,
    mlp::MlpConfig,
    net::TrackedNet,
    opt::Optimizer,
    util::{argmax_rows, column, column_to_vec, index_column, index_tensor, one_hot, smooth_l1, weighted_mean},
    value::ValueEstimator,
};
use anyhow::{anyhow, Result};
use arbor_core::{
    error::ArborError,
    record::{Record, RecordValue},
    ActionSpace,
};
use candle_core::{Device, Tensor, Var, D};
use log::{debug, info, trace};
use std::path::Path;

/// Signals an actor update reads from the critics of its policy.
#[derive(Clone, Copy, Default)]
pub struct ActorInputs<'a> {
    /// Per-row TD error of Q.
    pub tde_q: Option<&'a Tensor>,

    /// Per-row TD error of V.
    pub tde_v: Option<&'a Tensor>,

    /// Q estimator.
    pub q: Option<&'a ValueEstimator>,

    /// State-action encoder of Q.
    pub state_action: Option<&'a StateActionEncoder>,
}

/// Maps state features to actions, or to action scores in a discrete space.
pub struct Actor {
    discrete: bool,
    net: TrackedNet,
    head: OutputHead,
    rules: Vec<ActorUpdateRule>,
    opt: Optimizer,
    low: Tensor,
    high: Tensor,
}

impl Actor {
    /// Builds an actor on `in_dim` state features.
    pub fn build(config: &ActorConfig, in_dim: usize, space: &ActionSpace, device: &Device) -> Result<Self> {
        if config.rules.is_empty() {
            return Err(ArborError::Config("an actor needs at least one update rule".into()).into());
        }
        if config.rules.contains(&ActorUpdateRule::Gispg) {
            return Err(ArborError::Config("the GISPG update rule is not available".into()).into());
        }

        let n = space.dim();
        let mlp_config = MlpConfig::new(in_dim, config.units.clone(), n, false);
        let net = TrackedNet::build(mlp_config, "actor", device, config.target_sync)?;
        let opt = config.opt_config.build(net.vars(), config.max_grad_norm)?;
        let head = OutputHead::build(space, device)?;
        let (low, high) = space.bounds();
        info!(
            "Built actor: {} -> {}, rules = {:?}, target = {:?}",
            in_dim, n, config.rules, config.target_sync
        );

        Ok(Self {
            discrete: space.is_discrete(),
            net,
            head,
            rules: config.rules.clone(),
            opt,
            low: Tensor::from_vec(low, (1, n), device)?,
            high: Tensor::from_vec(high, (1, n), device)?,
        })
    }

    /// Update rules of the actor.
    pub fn rules(&self) -> &[ActorUpdateRule] {
        &self.rules
    }

    /// Output activations.
    pub fn head(&self) -> &OutputHead {
        &self.head
    }

    /// Actions of the live network. State features are detached.
    pub fn forward(&self, state_features: &Tensor) -> Result<Tensor> {
        self.head.forward(&self.net.forward(&state_features.detach())?)
    }

    /// Actions of the target network, detached.
    pub fn forward_target(&self, state_features: &Tensor) -> Result<Tensor> {
        Ok(self.head.forward(&self.net.forward_target(state_features)?)?.detach())
    }

    // Per-row regression toward the taken actions of the selected rows.
    //
    // Discrete actors use cross entropy on the scores before the sigmoid.
    fn regression_loss(
        &self,
        state_features: &Tensor,
        batch: &TransitionBatch,
        selection: &RowSelection,
    ) -> Result<Tensor> {
        let device = state_features.device();
        let ids = index_tensor(&selection.rows, device)?;
        let xs = state_features.index_select(&ids, 0)?;
        let loss = match self.discrete {
            true => {
                let argmax = selection
                    .rows
                    .iter()
                    .map(|&r| batch.action_argmax()[r])
                    .collect::<Vec<_>>();
                let logp = candle_nn::ops::log_softmax(&self.net.forward(&xs)?, D::Minus1)?;
                logp.gather(&index_column(&argmax, device)?, 1)?.neg()?
            }
            false => {
                let target = batch.action().index_select(&ids, 0)?;
                let out = self.head.forward(&self.net.forward(&xs)?)?;
                smooth_l1(&out, &target)?.mean_keepdim(1)?
            }
        };
        let weights = selection.weights.iter().map(|w| w.abs()).collect();
        weighted_mean(&loss, Some(&column(weights, device)?))
    }

    /// Per-row SPG signal: target Q of the taken action minus target Q of the
    /// greedy action of the target actor.
    ///
    /// Both terms read the target encoding of the current states. Rows with a
    /// positive advantage are regressed toward the taken action, weighted by
    /// the advantage.
    fn spg_advantage(&self, batch: &TransitionBatch, inputs: &ActorInputs) -> Result<Tensor> {
        let q = inputs
            .q
            .ok_or_else(|| ArborError::Config("SPG needs a Q estimator".into()))?;
        let state_features = &batch.target_state_features()?;
        let taken = q.evaluate_target(
            state_features,
            batch.action(),
            batch.action_argmax(),
            inputs.state_action,
        )?;

        let greedy = self.forward_target(state_features)?;
        let greedy_argmax = argmax_rows(&greedy)?;
        let greedy = match self.discrete {
            true => one_hot(&greedy_argmax, greedy.dim(1)?, greedy.device())?,
            false => greedy,
        };
        let best = q.evaluate_target(state_features, &greedy, &greedy_argmax, inputs.state_action)?;
        Ok(taken.sub(&best)?)
    }

    // Regression toward the actions moved along the gradient of Q, clipped into bounds.
    fn ddpg_loss(&self, state_features: &Tensor, inputs: &ActorInputs) -> Result<Tensor> {
        let q = inputs
            .q
            .ok_or_else(|| ArborError::Config("DDPG needs a Q estimator".into()))?;
        let state_action = inputs
            .state_action
            .ok_or_else(|| ArborError::Config("DDPG needs an actor-critic Q estimator".into()))?;

        let actions = self.forward(state_features)?.detach();
        let var = Var::from_tensor(&actions)?;
        let value = q.evaluate(state_features, var.as_tensor(), state_action)?.sum_all()?;
        let grads = value.backward()?;
        let grad = grads
            .get(var.as_tensor())
            .ok_or_else(|| anyhow!("Q does not depend on the action"))?;
        let target = actions
            .add(grad)?
            .broadcast_maximum(&self.low)?
            .broadcast_minimum(&self.high)?
            .detach();

        let out = self.forward(state_features)?;
        Ok(smooth_l1(&out, &target)?.mean_keepdim(1)?.mean_all()?)
    }

    /// Applies every update rule on a batch. Returns the summed loss.
    ///
    /// Rules selecting no row are skipped. When nothing is left to train on,
    /// the call is a no-op returning zero.
    pub fn optimize(&mut self, batch: &TransitionBatch, inputs: ActorInputs) -> Result<(f32, Record)> {
        let state_features = batch.state_features()?.detach();
        let mut losses = vec![];
        let mut n_rows = 0;

        for rule in self.rules.iter() {
            let signal = match rule {
                ActorUpdateRule::CaclaV => inputs
                    .tde_v
                    .cloned()
                    .ok_or_else(|| ArborError::Config("CACLA-V needs a V estimator".into()))?,
                ActorUpdateRule::CaclaQ => inputs
                    .tde_q
                    .cloned()
                    .ok_or_else(|| ArborError::Config("CACLA-Q needs a Q estimator".into()))?,
                ActorUpdateRule::Spg => self.spg_advantage(batch, &inputs)?,
                ActorUpdateRule::Ddpg => {
                    losses.push(self.ddpg_loss(&state_features, &inputs)?);
                    n_rows += batch.len();
                    continue;
                }
                ActorUpdateRule::Gispg => {
                    return Err(ArborError::Config("the GISPG update rule is not available".into()).into())
                }
            };

            let selection = rule.select_rows(&column_to_vec(&signal)?).unwrap_or_default();
            if selection.is_empty() {
                debug!("{}: no row selected out of {}", rule.name(), batch.len());
                continue;
            }
            n_rows += selection.len();
            losses.push(self.regression_loss(&state_features, batch, &selection)?);
        }

        debug!("Actor training batch size = {}", n_rows);
        let mut record = Record::from_scalar("actor_train_batch_size", n_rows as f32);
        let mut losses = losses.into_iter();
        let loss = match losses.next() {
            Some(first) => losses.try_fold(first, |acc, l| acc.add(&l))?,
            None => {
                debug!("No row to train the actor on");
                return Ok((0.0, record));
            }
        };

        self.opt.backward_step(&loss)?;
        let loss = loss.to_scalar::<f32>()?;
        trace!("loss_actor = {}", loss);
        record.insert("loss_actor", RecordValue::Scalar(loss));
        Ok((loss, record))
    }

    /// Synchronizes the target actor.
    pub fn update_targets(&self, step: usize) -> Result<()> {
        self.net.update_targets(step)?;
        Ok(())
    }

    /// Saves the weights in `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        self.net.save(dir)
    }

    /// Loads the weights from `dir`.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        self.net.load(dir)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use arbor_core::Transition;

    fn batch(n: usize) -> Result<TransitionBatch> {
        let trs = (0..n)
            .map(|i| {
                let s = i as f32 / n as f32;
                Transition::new(vec![s, 1.0 - s], vec![s, -s], 0.0, vec![s, s], false)
            })
            .collect::<Vec<_>>();
        let batch = TransitionBatch::from_transitions(&trs, &Device::Cpu)?;
        let sf = batch.state().clone();
        Ok(batch.with_features(sf, None))
    }

    fn space() -> ActionSpace {
        ActionSpace::Box {
            low: vec![-1.0, -1.0],
            high: vec![1.0, 1.0],
        }
    }

    #[test]
    fn test_gispg_is_rejected() {
        let config = ActorConfig::default().rules(vec![ActorUpdateRule::Gispg]);
        let err = Actor::build(&config, 2, &space(), &Device::Cpu).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ArborError>(),
            Some(ArborError::Config(_))
        ));
        assert!(Actor::build(&ActorConfig::default().rules(vec![]), 2, &space(), &Device::Cpu).is_err());
    }

    #[test]
    fn test_cacla_v_trains_on_negative_tde() -> Result<()> {
        let mut actor = Actor::build(&ActorConfig::default(), 2, &space(), &Device::Cpu)?;
        let batch = batch(5)?;
        let tde_v = column(vec![-1.0, 2.0, -0.5, 3.0, -2.0], &Device::Cpu)?;
        let inputs = ActorInputs {
            tde_v: Some(&tde_v),
            ..Default::default()
        };

        let (loss, record) = actor.optimize(&batch, inputs)?;
        assert_eq!(record.get_scalar("actor_train_batch_size")?, 3.0);
        assert!(loss > 0.0);
        assert!(record.get_scalar("loss_actor").is_ok());
        Ok(())
    }

    #[test]
    fn test_empty_selection_is_a_no_op() -> Result<()> {
        let mut actor = Actor::build(&ActorConfig::default(), 2, &space(), &Device::Cpu)?;
        let batch = batch(3)?;
        let before = actor.forward(batch.state_features()?)?.to_vec2::<f32>()?;
        let tde_v = column(vec![1.0, 0.0, 2.0], &Device::Cpu)?;
        let inputs = ActorInputs {
            tde_v: Some(&tde_v),
            ..Default::default()
        };

        let (loss, record) = actor.optimize(&batch, inputs)?;
        assert_eq!(loss, 0.0);
        assert_eq!(record.get_scalar("actor_train_batch_size")?, 0.0);
        assert!(record.get_scalar("loss_actor").is_err());
        assert_eq!(actor.forward(batch.state_features()?)?.to_vec2::<f32>()?, before);
        Ok(())
    }

    #[test]
    fn test_spg_advantage_reads_target_state_features() -> Result<()> {
        use crate::value::{Bootstrap, ValueConfig, ValueKind};

        let config = ActorConfig::default().units(vec![8]).rules(vec![ActorUpdateRule::Spg]);
        let actor = Actor::build(&config, 2, &ActionSpace::Discrete(3), &Device::Cpu)?;
        let q = ValueEstimator::build(
            ValueKind::Q,
            &ValueConfig::default().units(vec![8]),
            2,
            3,
            false,
            Bootstrap::Own,
            vec![],
            &Device::Cpu,
        )?;
        let inputs = ActorInputs {
            q: Some(&q),
            ..Default::default()
        };

        let trs = (0..4)
            .map(|i| {
                let mut action = vec![0.0; 3];
                action[i % 3] = 1.0;
                let s = i as f32 / 4.0;
                Transition::new(vec![s, 1.0 - s], action, 0.0, vec![s, s], false)
            })
            .collect::<Vec<_>>();
        let batch = TransitionBatch::from_transitions(&trs, &Device::Cpu)?;
        let target = batch.state().clone();
        let live = target.affine(3.0, -1.0)?;

        let with_target = batch
            .clone()
            .with_features(live.clone(), None)
            .with_target_state_features(target.clone());
        let reference = batch.clone().with_features(target, None);
        let live_only = batch.with_features(live, None);

        let expected = actor.spg_advantage(&reference, &inputs)?.to_vec2::<f32>()?;
        assert_eq!(actor.spg_advantage(&with_target, &inputs)?.to_vec2::<f32>()?, expected);
        assert_ne!(actor.spg_advantage(&live_only, &inputs)?.to_vec2::<f32>()?, expected);
        Ok(())
    }

    #[test]
    fn test_missing_critic_is_a_config_error() -> Result<()> {
        let config = ActorConfig::default().rules(vec![ActorUpdateRule::CaclaQ]);
        let mut actor = Actor::build(&config, 2, &space(), &Device::Cpu)?;
        assert!(actor.optimize(&batch(2)?, ActorInputs::default()).is_err());
        Ok(())
    }
}
