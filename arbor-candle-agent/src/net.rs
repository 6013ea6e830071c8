//! Networks with target mirrors.
use crate::{
    mlp::{Mlp, MlpConfig},
    util::{hard_copy, track},
};
use anyhow::Result;
use arbor_core::error::ArborError;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use log::trace;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a target network follows its live network.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub enum TargetSync {
    /// Blends `target = (1 - tau) * target + tau * live` on every update.
    Polyak {
        /// Blending coefficient.
        tau: f64,
    },

    /// Copies the live network every `every` steps.
    Hard {
        /// Interval of hard copies in steps.
        every: usize,
    },
}

impl TargetSync {
    /// Fails with [`ArborError::Config`] unless `0 < tau <= 1` or `every > 0`.
    pub fn validate(&self) -> Result<(), ArborError> {
        match *self {
            Self::Polyak { tau } if !(tau > 0.0 && tau <= 1.0) => Err(ArborError::Config(format!(
                "Polyak tau must be in (0, 1], got {}",
                tau
            ))),
            Self::Hard { every: 0 } => Err(ArborError::Config(
                "hard target sync interval must be positive".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Synchronizes `dest` with `src` at `step`. Returns `true` if `dest` changed.
    pub fn sync(&self, dest: &VarMap, src: &VarMap, step: usize) -> Result<bool> {
        match *self {
            Self::Polyak { tau } => {
                track(dest, src, tau)?;
                Ok(true)
            }
            Self::Hard { every } => {
                if every > 0 && step % every == 0 {
                    hard_copy(dest, src)?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}

/// An MLP owning its variables.
pub struct Net {
    config: MlpConfig,
    prefix: String,
    device: Device,
    varmap: VarMap,
    mlp: Mlp,
}

impl Net {
    /// Builds a network with freshly initialized variables named under `prefix`.
    pub fn build(config: MlpConfig, prefix: &str, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let mlp = Mlp::build(vb.pp(prefix), config.clone())?;

        Ok(Self {
            config,
            prefix: prefix.to_string(),
            device: device.clone(),
            varmap,
            mlp,
        })
    }

    /// Structural clone holding a copy of the current weights.
    pub fn duplicate(&self) -> Result<Self> {
        let net = Self::build(self.config.clone(), &self.prefix, &self.device)?;
        hard_copy(&net.varmap, &self.varmap)?;
        Ok(net)
    }

    /// Forward pass.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.mlp.forward(xs)
    }

    /// Trainable variables.
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Variables by name.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Output dimension.
    pub fn out_dim(&self) -> usize {
        self.config.out_dim()
    }

    fn path(&self, dir: &Path, suffix: &str) -> std::path::PathBuf {
        dir.join(format!("{}{}", self.prefix, suffix))
            .with_extension("pt")
    }

    /// Saves the weights in `dir`.
    pub fn save(&self, dir: &Path, suffix: &str) -> Result<()> {
        let path = self.path(dir, suffix);
        self.varmap.save(&path)?;
        trace!("Saved {:?}", path);
        Ok(())
    }

    /// Loads the weights from `dir`.
    pub fn load(&mut self, dir: &Path, suffix: &str) -> Result<()> {
        let path = self.path(dir, suffix);
        self.varmap.load(&path)?;
        trace!("Loaded {:?}", path);
        Ok(())
    }
}

/// A live network and, if synchronization is configured, its target mirror.
///
/// The target never receives gradients: its variables are owned by a
/// separate [`VarMap`] no optimizer knows of, and its outputs are detached.
pub struct TrackedNet {
    live: Net,
    target: Option<Net>,
    sync: Option<TargetSync>,
}

impl TrackedNet {
    /// Builds a live network and its target, a copy taken at construction.
    pub fn build(
        config: MlpConfig,
        prefix: &str,
        device: &Device,
        sync: Option<TargetSync>,
    ) -> Result<Self> {
        if let Some(sync) = &sync {
            sync.validate()?;
        }
        let live = Net::build(config, prefix, device)?;
        let target = match sync {
            Some(_) => Some(live.duplicate()?),
            None => None,
        };
        Ok(Self { live, target, sync })
    }

    /// Forward pass of the live network.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.live.forward(xs)
    }

    /// Forward pass of the target network, or of the live one without a target.
    ///
    /// The output is detached in both cases.
    pub fn forward_target(&self, xs: &Tensor) -> Result<Tensor> {
        match &self.target {
            Some(target) => Ok(target.forward(xs)?.detach()),
            None => Ok(self.live.forward(xs)?.detach()),
        }
    }

    /// Synchronizes the target at `step`. Returns `true` if it changed.
    pub fn update_targets(&self, step: usize) -> Result<bool> {
        match (&self.target, &self.sync) {
            (Some(target), Some(sync)) => sync.sync(target.varmap(), self.live.varmap(), step),
            _ => Ok(false),
        }
    }

    /// Returns `true` if a target network exists.
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    /// The live network.
    pub fn live(&self) -> &Net {
        &self.live
    }

    /// The target network.
    pub fn target(&self) -> Option<&Net> {
        self.target.as_ref()
    }

    /// Trainable variables of the live network.
    pub fn vars(&self) -> Vec<Var> {
        self.live.vars()
    }

    /// Output dimension.
    pub fn out_dim(&self) -> usize {
        self.live.out_dim()
    }

    /// Saves the live and target weights in `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        self.live.save(dir, "")?;
        if let Some(target) = &self.target {
            target.save(dir, "_tgt")?;
        }
        Ok(())
    }

    /// Loads the live and target weights from `dir`.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        self.live.load(dir, "")?;
        if let Some(target) = self.target.as_mut() {
            target.load(dir, "_tgt")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params(net: &Net) -> Vec<(String, Vec<f32>)> {
        let data = net.varmap().data().lock().unwrap();
        let mut ps = data
            .iter()
            .map(|(k, v)| (k.clone(), v.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap()))
            .collect::<Vec<_>>();
        ps.sort_by(|a, b| a.0.cmp(&b.0));
        ps
    }

    fn perturb(net: &Net) -> Result<()> {
        for var in net.vars() {
            let t = var.as_tensor().affine(1.5, 0.25)?;
            var.set(&t)?;
        }
        Ok(())
    }

    #[test]
    fn test_target_is_exact_clone_at_construction() -> Result<()> {
        let config = MlpConfig::new(3, vec![8], 2, false);
        let net = TrackedNet::build(config, "q", &Device::Cpu, Some(TargetSync::Hard { every: 4 }))?;
        assert_eq!(params(net.live()), params(net.target().unwrap()));
        Ok(())
    }

    #[test]
    fn test_hard_update() -> Result<()> {
        let config = MlpConfig::new(3, vec![8], 2, false);
        let net = TrackedNet::build(config, "q", &Device::Cpu, Some(TargetSync::Hard { every: 4 }))?;
        perturb(net.live())?;

        assert!(!net.update_targets(3)?);
        assert_ne!(params(net.live()), params(net.target().unwrap()));
        assert!(net.update_targets(8)?);
        assert_eq!(params(net.live()), params(net.target().unwrap()));
        Ok(())
    }

    #[test]
    fn test_polyak_update() -> Result<()> {
        let tau = 0.1;
        let config = MlpConfig::new(3, vec![8], 2, false);
        let net = TrackedNet::build(config, "v", &Device::Cpu, Some(TargetSync::Polyak { tau }))?;
        perturb(net.live())?;
        let live = params(net.live());
        let old = params(net.target().unwrap());

        assert!(net.update_targets(1)?);
        let new = params(net.target().unwrap());
        for ((_, n), ((_, o), (_, l))) in new.iter().zip(old.iter().zip(live.iter())) {
            for (n, (o, l)) in n.iter().zip(o.iter().zip(l.iter())) {
                let expected = (1.0 - tau as f32) * o + tau as f32 * l;
                assert!((n - expected).abs() < 1e-5);
            }
        }
        Ok(())
    }

    #[test]
    fn test_invalid_sync_is_rejected() -> Result<()> {
        for sync in [
            TargetSync::Hard { every: 0 },
            TargetSync::Polyak { tau: 0.0 },
            TargetSync::Polyak { tau: -0.5 },
            TargetSync::Polyak { tau: 1.5 },
            TargetSync::Polyak { tau: f64::NAN },
        ] {
            let config = MlpConfig::new(3, vec![8], 2, false);
            let err = match TrackedNet::build(config, "q", &Device::Cpu, Some(sync)) {
                Ok(_) => panic!("{:?} was accepted", sync),
                Err(err) => err,
            };
            assert!(matches!(err.downcast_ref::<ArborError>(), Some(ArborError::Config(_))));
        }

        assert!(TargetSync::Polyak { tau: 1.0 }.validate().is_ok());
        assert!(TargetSync::Hard { every: 1 }.validate().is_ok());
        Ok(())
    }

    #[test]
    fn test_forward_target_without_target_uses_live() -> Result<()> {
        let config = MlpConfig::new(2, vec![], 1, false);
        let net = TrackedNet::build(config, "v", &Device::Cpu, None)?;
        let x = Tensor::from_slice(&[1f32, -1.0], (1, 2), &Device::Cpu)?;
        assert!(!net.has_target());
        assert_eq!(
            net.forward(&x)?.to_vec2::<f32>()?,
            net.forward_target(&x)?.to_vec2::<f32>()?
        );
        assert!(!net.update_targets(1)?);
        Ok(())
    }
}
