use super::{BasePolicyConfig, Optimized, PlainPolicy, Policy};
use crate::{
    batch::TransitionBatch,
    features::StateEncoder,
    util::{argmax_rows, one_hot},
};
use anyhow::Result;
use arbor_core::{compound::CompoundActionSpace, error::ArborError, record::Record, ActionSpace};
use candle_core::{Device, Tensor};
use log::info;
use std::{fs, path::Path};

/// One discrete micro-policy per factor of a compound action space.
///
/// Every micro-policy trains on the full batch, with the option its factor
/// takes in each flat action as the action. Inference applies the chosen
/// option of every factor to the no-op action and maps the result back to
/// a flat index.
pub struct FactoredPolicy {
    space: CompoundActionSpace,
    micro: Vec<PlainPolicy>,
}

impl FactoredPolicy {
    /// Builds the micro-policies.
    pub fn build(
        space: &CompoundActionSpace,
        config: &BasePolicyConfig,
        action_space: &ActionSpace,
        encoder: &StateEncoder,
        device: &Device,
    ) -> Result<Self> {
        let space = CompoundActionSpace::new(space.factors().to_vec())?;
        if *action_space != ActionSpace::Discrete(space.n_actions()) {
            return Err(ArborError::Config(format!(
                "a compound space of {} actions does not match {:?}",
                space.n_actions(),
                action_space
            ))
            .into());
        }

        let micro = space
            .factors()
            .iter()
            .map(|f| PlainPolicy::build(config, &ActionSpace::Discrete(f.options.len()), encoder, device))
            .collect::<Result<Vec<_>>>()?;
        info!(
            "Built factored policy: factors = {:?}",
            space.factors().iter().map(|f| &f.name).collect::<Vec<_>>()
        );

        Ok(Self { space, micro })
    }

    /// The compound action space.
    pub fn space(&self) -> &CompoundActionSpace {
        &self.space
    }

    /// Option indices of every factor for a batch of flat actions, factor-major.
    pub fn option_indices(&self, actions: &[u32]) -> Result<Vec<Vec<u32>>> {
        let mut options = vec![Vec::with_capacity(actions.len()); self.micro.len()];
        for &a in actions.iter() {
            let action = self.space.action(a as usize)?;
            for (k, opts) in options.iter_mut().enumerate() {
                opts.push(self.space.option_index(k, &action)? as u32);
            }
        }
        Ok(options)
    }

    fn factor_views(&self, batch: &TransitionBatch) -> Result<Vec<TransitionBatch>> {
        self.option_indices(batch.action_argmax())?
            .iter()
            .zip(self.space.factors().iter())
            .map(|(opts, f)| batch.with_discrete_actions(opts, f.options.len()))
            .collect()
    }
}

impl Policy for FactoredPolicy {
    fn optimize_networks(&mut self, batch: &TransitionBatch) -> Result<Optimized> {
        let views = self.factor_views(batch)?;
        let mut errors = vec![];
        let mut record = Record::empty();
        for ((micro, view), factor) in self.micro.iter_mut().zip(views.iter()).zip(self.space.factors()) {
            let out = micro.optimize_networks(view)?;
            errors.push(out.error);
            record.merge_inplace(out.record.with_prefix(&factor.name));
        }
        let n = errors.len() as f64;
        let error = Tensor::stack(&errors, 0)?.sum(0)?.affine(1.0 / n, 0.0)?;
        Ok(Optimized { error, record })
    }

    fn choose_action(&mut self, state_features: &Tensor) -> Result<Tensor> {
        let n_rows = state_features.dim(0)?;
        let mut choices = Vec::with_capacity(self.micro.len());
        for micro in self.micro.iter_mut() {
            choices.push(argmax_rows(&micro.choose_action(state_features)?)?);
        }

        let actions = (0..n_rows)
            .map(|r| {
                let option_idxs = choices.iter().map(|c| c[r] as usize).collect::<Vec<_>>();
                self.space.apply_options(&option_idxs)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let idxs = self
            .space
            .dicts2idxs(&actions)?
            .into_iter()
            .map(|i| i as u32)
            .collect::<Vec<_>>();
        one_hot(&idxs, self.space.n_actions(), state_features.device())
    }

    fn calculate_tde(&self, batch: &TransitionBatch) -> Result<Tensor> {
        let views = self.factor_views(batch)?;
        let tdes = self
            .micro
            .iter()
            .zip(views.iter())
            .map(|(micro, view)| micro.calculate_tde(view))
            .collect::<Result<Vec<_>>>()?;
        let n = tdes.len() as f64;
        Ok(Tensor::stack(&tdes, 0)?.sum(0)?.affine(1.0 / n, 0.0)?)
    }

    fn update_targets(&mut self, step: usize) -> Result<()> {
        for micro in self.micro.iter_mut() {
            micro.update_targets(step)?;
        }
        Ok(())
    }

    fn n_actions(&self) -> usize {
        self.space.n_actions()
    }

    fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        for (micro, factor) in self.micro.iter().zip(self.space.factors()) {
            micro.save(&dir.join(&factor.name))?;
        }
        Ok(())
    }

    fn load(&mut self, dir: &Path) -> Result<()> {
        for (micro, factor) in self.micro.iter_mut().zip(self.space.factors()) {
            micro.load(&dir.join(&factor.name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::features::StateEncoderConfig;

    #[test]
    fn test_option_indices() -> Result<()> {
        let space = CompoundActionSpace::minerl_move(&[-10.0, 0.0, 10.0], &[0.0])?;
        let encoder = StateEncoder::build(&StateEncoderConfig::default(), 2, &Device::Cpu)?;
        let n = space.n_actions();
        let policy = FactoredPolicy::build(
            &space,
            &BasePolicyConfig::default(),
            &ActionSpace::Discrete(n),
            &encoder,
            &Device::Cpu,
        )?;

        let actions = (0..n as u32).collect::<Vec<_>>();
        let options = policy.option_indices(&actions)?;
        assert_eq!(options.len(), space.factors().len());
        for (i, _) in actions.iter().enumerate() {
            let option_idxs = options.iter().map(|o| o[i] as usize).collect::<Vec<_>>();
            let action = space.apply_options(&option_idxs)?;
            assert_eq!(space.dict2idx(&action)?, i);
        }
        Ok(())
    }

    #[test]
    fn test_size_mismatch() -> Result<()> {
        let space = CompoundActionSpace::minerl_move(&[0.0], &[0.0])?;
        let encoder = StateEncoder::build(&StateEncoderConfig::default(), 2, &Device::Cpu)?;
        let result = FactoredPolicy::build(
            &space,
            &BasePolicyConfig::default(),
            &ActionSpace::Discrete(space.n_actions() + 1),
            &encoder,
            &Device::Cpu,
        );
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_choose_action_is_one_hot() -> Result<()> {
        let space = CompoundActionSpace::minerl_move(&[-10.0, 10.0], &[0.0])?;
        let encoder = StateEncoder::build(&StateEncoderConfig::default(), 2, &Device::Cpu)?;
        let n = space.n_actions();
        let mut policy = FactoredPolicy::build(
            &space,
            &BasePolicyConfig::default(),
            &ActionSpace::Discrete(n),
            &encoder,
            &Device::Cpu,
        )?;
        let sf = Tensor::from_slice(&[0.1f32, 0.2, -0.3, 0.4], (2, 2), &Device::Cpu)?;
        let scores = policy.choose_action(&sf)?.to_vec2::<f32>()?;
        for row in scores.iter() {
            assert_eq!(row.len(), n);
            assert_eq!(row.iter().sum::<f32>(), 1.0);
        }
        Ok(())
    }
}
