use super::{BasePolicyConfig, Optimized, Policy};
use crate::{
    actor::{Actor, ActorInputs, ActorUpdateRule},
    batch::TransitionBatch,
    features::{StateActionEncoder, StateEncoder},
    value::{Bootstrap, CriticCtx, ValueEstimator, ValueKind},
};
use anyhow::{anyhow, Result};
use arbor_core::{
    error::ArborError,
    record::{Record, RecordValue},
    ActionSpace,
};
use candle_core::{Device, Tensor};
use log::info;
use std::{fs, path::Path};

/// A policy owning its critics and, in actor-critic mode, an actor.
///
/// Which estimators exist follows from the configuration:
///
/// * Q is built for value-based policies, for [`Bootstrap::Qvmax`] and when
///   an update rule reads Q.
/// * V is built for QV and QVMAX bootstrapping and for CACLA-V.
///
/// V is optimized before Q, so that Q can read the bootstrap values V
/// computed on the same batch.
pub struct PlainPolicy {
    n_actions: usize,
    state_action: Option<StateActionEncoder>,
    q: Option<ValueEstimator>,
    v: Option<ValueEstimator>,
    actor: Option<Actor>,
}

impl PlainPolicy {
    /// Builds a policy on the features of `encoder`.
    pub fn build(
        config: &BasePolicyConfig,
        space: &ActionSpace,
        encoder: &StateEncoder,
        device: &Device,
    ) -> Result<Self> {
        space.validate()?;
        let ac = config.actor_critic;
        if !space.is_discrete() && !ac {
            return Err(ArborError::Config(
                "a continuous action space needs an actor-critic policy".into(),
            )
            .into());
        }

        let rules: &[ActorUpdateRule] = match ac {
            true => &config.actor.rules,
            false => &[],
        };
        let build_q = !ac || config.bootstrap == Bootstrap::Qvmax || rules.iter().any(|r| r.needs_q());
        let build_v = config.bootstrap != Bootstrap::Own || rules.iter().any(|r| r.needs_v());

        let state_dim = encoder.out_dim();
        let n_actions = space.dim();

        let state_action = match ac && build_q {
            true => Some(StateActionEncoder::build(
                &config.state_action,
                state_dim,
                n_actions,
                device,
            )?),
            false => None,
        };
        let q = match build_q {
            true => {
                let mut shared_vars = encoder.vars();
                let in_dim = match &state_action {
                    Some(sa) => {
                        shared_vars.extend(sa.vars());
                        sa.out_dim()
                    }
                    None => state_dim,
                };
                Some(ValueEstimator::build(
                    ValueKind::Q,
                    &config.critic,
                    in_dim,
                    n_actions,
                    ac,
                    config.bootstrap,
                    shared_vars,
                    device,
                )?)
            }
            false => None,
        };
        let v = match build_v {
            true => Some(ValueEstimator::build(
                ValueKind::V,
                &config.critic,
                state_dim,
                n_actions,
                ac,
                config.bootstrap,
                encoder.vars(),
                device,
            )?),
            false => None,
        };
        let actor = match ac {
            true => Some(Actor::build(&config.actor, state_dim, space, device)?),
            false => None,
        };

        info!(
            "Built plain policy: n_actions = {}, q = {}, v = {}, actor = {}",
            n_actions,
            q.is_some(),
            v.is_some(),
            actor.is_some()
        );

        Ok(Self {
            n_actions,
            state_action,
            q,
            v,
            actor,
        })
    }

    /// Q estimator.
    pub fn q(&self) -> Option<&ValueEstimator> {
        self.q.as_ref()
    }

    /// V estimator.
    pub fn v(&self) -> Option<&ValueEstimator> {
        self.v.as_ref()
    }

    /// Actor.
    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    fn embed(&self, batch: &TransitionBatch) -> Result<TransitionBatch> {
        match &self.state_action {
            Some(sa) => {
                let xs = sa.forward(batch.state_features()?, batch.action())?;
                Ok(batch.with_state_action_features(xs))
            }
            None => Ok(batch.clone()),
        }
    }

    // Absolute mean of the TD errors of the critics.
    fn critic_error(tdes: &[&Tensor]) -> Result<Tensor> {
        let (first, rest) = tdes
            .split_first()
            .ok_or_else(|| anyhow!("a policy without critics has no TD error"))?;
        let mut sum = (*first).clone();
        for tde in rest.iter() {
            sum = sum.add(tde)?;
        }
        Ok(sum.affine(1.0 / tdes.len() as f64, 0.0)?.abs()?)
    }
}

impl Policy for PlainPolicy {
    fn optimize_networks(&mut self, batch: &TransitionBatch) -> Result<Optimized> {
        let batch = self.embed(batch)?;
        let mut record = Record::empty();
        let ctx = CriticCtx {
            actor: self.actor.as_ref(),
            state_action: self.state_action.as_ref(),
        };

        let tde_v = match self.v.as_mut() {
            Some(v) => {
                let (tde, r) = v.optimize(&batch, &ctx, self.q.as_ref())?;
                record.merge_inplace(r);
                Some(tde)
            }
            None => None,
        };
        let tde_q = match self.q.as_mut() {
            Some(q) => {
                let (tde, r) = q.optimize(&batch, &ctx, self.v.as_ref())?;
                record.merge_inplace(r);
                Some(tde)
            }
            None => None,
        };

        let tdes = tde_v.iter().chain(tde_q.iter()).collect::<Vec<_>>();
        let mut error = Self::critic_error(&tdes)?;

        if let Some(actor) = self.actor.as_mut() {
            let inputs = ActorInputs {
                tde_q: tde_q.as_ref(),
                tde_v: tde_v.as_ref(),
                q: self.q.as_ref(),
                state_action: self.state_action.as_ref(),
            };
            let (loss, r) = actor.optimize(&batch, inputs)?;
            record.merge_inplace(r);
            error = error.affine(1.0, loss as f64)?;
        }

        record.insert("batch_size", RecordValue::Scalar(batch.len() as f32));
        Ok(Optimized { error, record })
    }

    fn choose_action(&mut self, state_features: &Tensor) -> Result<Tensor> {
        let scores = match (&self.actor, &self.q) {
            (Some(actor), _) => actor.forward(state_features)?,
            (None, Some(q)) => q.forward(state_features)?,
            (None, None) => return Err(anyhow!("a policy needs an actor or a Q estimator")),
        };
        Ok(scores.detach())
    }

    fn calculate_tde(&self, batch: &TransitionBatch) -> Result<Tensor> {
        let batch = self.embed(batch)?;
        let ctx = CriticCtx {
            actor: self.actor.as_ref(),
            state_action: self.state_action.as_ref(),
        };
        let tde_v = match &self.v {
            Some(v) => Some(v.calculate_tde(&batch, &ctx, self.q.as_ref())?),
            None => None,
        };
        let tde_q = match &self.q {
            Some(q) => Some(q.calculate_tde(&batch, &ctx, self.v.as_ref())?),
            None => None,
        };
        let tdes = tde_v.iter().chain(tde_q.iter()).collect::<Vec<_>>();
        Self::critic_error(&tdes)
    }

    fn update_targets(&mut self, step: usize) -> Result<()> {
        if let Some(sa) = &self.state_action {
            sa.update_targets(step)?;
        }
        for estimator in self.q.iter().chain(self.v.iter()) {
            estimator.update_targets(step)?;
        }
        if let Some(actor) = &self.actor {
            actor.update_targets(step)?;
        }
        Ok(())
    }

    fn n_actions(&self) -> usize {
        self.n_actions
    }

    fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        if let Some(sa) = &self.state_action {
            sa.save(dir)?;
        }
        for estimator in self.q.iter().chain(self.v.iter()) {
            estimator.save(dir)?;
        }
        if let Some(actor) = &self.actor {
            actor.save(dir)?;
        }
        Ok(())
    }

    fn load(&mut self, dir: &Path) -> Result<()> {
        if let Some(sa) = self.state_action.as_mut() {
            sa.load(dir)?;
        }
        for estimator in self.q.iter_mut().chain(self.v.iter_mut()) {
            estimator.load(dir)?;
        }
        if let Some(actor) = self.actor.as_mut() {
            actor.load(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{actor::ActorConfig, features::StateEncoderConfig, value::ValueConfig};

    fn encoder() -> Result<StateEncoder> {
        StateEncoder::build(&StateEncoderConfig::default(), 2, &Device::Cpu)
    }

    fn ac_config(rules: Vec<ActorUpdateRule>, bootstrap: Bootstrap) -> BasePolicyConfig {
        BasePolicyConfig::default()
            .actor_critic(true)
            .bootstrap(bootstrap)
            .actor(ActorConfig::default().rules(rules))
    }

    fn box_space() -> ActionSpace {
        ActionSpace::Box {
            low: vec![-1.0],
            high: vec![1.0],
        }
    }

    #[test]
    fn test_continuous_space_needs_actor_critic() -> Result<()> {
        let err = PlainPolicy::build(&BasePolicyConfig::default(), &box_space(), &encoder()?, &Device::Cpu)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<ArborError>(),
            Some(ArborError::Config(_))
        ));
        Ok(())
    }

    #[test]
    fn test_estimator_creation() -> Result<()> {
        let encoder = encoder()?;
        let dev = Device::Cpu;

        let p = PlainPolicy::build(&BasePolicyConfig::default(), &ActionSpace::Discrete(3), &encoder, &dev)?;
        assert!(p.q().is_some() && p.v().is_none() && p.actor().is_none());

        let config = ac_config(vec![ActorUpdateRule::CaclaV], Bootstrap::Own);
        let p = PlainPolicy::build(&config, &box_space(), &encoder, &dev)?;
        assert!(p.q().is_none() && p.v().is_some() && p.actor().is_some());

        let config = ac_config(vec![ActorUpdateRule::CaclaV], Bootstrap::Qv);
        let p = PlainPolicy::build(&config, &box_space(), &encoder, &dev)?;
        assert!(p.q().is_none() && p.v().is_some());

        let config = ac_config(vec![ActorUpdateRule::CaclaV], Bootstrap::Qvmax);
        let p = PlainPolicy::build(&config, &box_space(), &encoder, &dev)?;
        assert!(p.q().is_some() && p.v().is_some());

        let config = ac_config(vec![ActorUpdateRule::Ddpg], Bootstrap::Own);
        let p = PlainPolicy::build(&config, &box_space(), &encoder, &dev)?;
        assert!(p.q().is_some() && p.v().is_none());

        let config = BasePolicyConfig::default().bootstrap(Bootstrap::Qv);
        let p = PlainPolicy::build(&config, &ActionSpace::Discrete(3), &encoder, &dev)?;
        assert!(p.q().is_some() && p.v().is_some());
        Ok(())
    }

    #[test]
    fn test_choose_action_width() -> Result<()> {
        let encoder = encoder()?;
        let config = BasePolicyConfig::default().critic(ValueConfig::default().units(vec![8]));
        let mut p = PlainPolicy::build(&config, &ActionSpace::Discrete(4), &encoder, &Device::Cpu)?;
        let sf = Tensor::zeros((3, 2), candle_core::DType::F32, &Device::Cpu)?;
        assert_eq!(p.choose_action(&sf)?.dims(), &[3, 4]);
        Ok(())
    }
}
