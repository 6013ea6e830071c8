//! Optimizers.
use anyhow::Result;
use candle_core::{backprop::GradStore, Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};
use candle_optimisers::adam::{Adam, ParamsAdam};
use serde::{Deserialize, Serialize};

/// Configuration of optimizer for training neural networks.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// AdamW optimizer.
    AdamW {
        /// Learning rate.
        lr: f64,
        /// Decay rate of the first moment.
        #[serde(default = "default_beta1")]
        beta1: f64,
        /// Decay rate of the second moment.
        #[serde(default = "default_beta2")]
        beta2: f64,
        /// Numerical stabilizer.
        #[serde(default = "default_eps")]
        eps: f64,
        /// Decoupled weight decay.
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },
}

fn default_beta1() -> f64 {
    ParamsAdamW::default().beta1
}

fn default_beta2() -> f64 {
    ParamsAdamW::default().beta2
}

fn default_eps() -> f64 {
    ParamsAdamW::default().eps
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

impl OptimizerConfig {
    /// Constructs an optimizer over `vars`.
    ///
    /// When `max_grad_norm` is given, gradients are rescaled so that their
    /// global L2 norm does not exceed it before every step.
    pub fn build(&self, vars: Vec<Var>, max_grad_norm: Option<f64>) -> Result<Optimizer> {
        let inner = match &self {
            OptimizerConfig::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let params = ParamsAdamW {
                    lr: *lr,
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    weight_decay: *weight_decay,
                };
                Inner::AdamW(AdamW::new(vars.clone(), params)?)
            }
            OptimizerConfig::Adam { lr } => {
                let params = ParamsAdam {
                    lr: *lr,
                    ..ParamsAdam::default()
                };
                Inner::Adam(Adam::new(vars.clone(), params)?)
            }
        };
        Ok(Optimizer {
            inner,
            vars,
            max_grad_norm,
        })
    }

    /// Overrides the learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::AdamW {
                beta1,
                beta2,
                eps,
                weight_decay,
                ..
            } => Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            },
            Self::Adam { .. } => Self::Adam { lr },
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam { lr: 1e-3 }
    }
}

enum Inner {
    AdamW(AdamW),
    Adam(Adam),
}

/// An optimizer bound to a set of variables.
pub struct Optimizer {
    inner: Inner,
    vars: Vec<Var>,
    max_grad_norm: Option<f64>,
}

impl Optimizer {
    /// Computes gradients of `loss`, clips them if configured and applies a step.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let mut grads = loss.backward()?;
        if let Some(max_norm) = self.max_grad_norm {
            clip_grad_norm(&mut grads, &self.vars, max_norm)?;
        }
        self.step(&grads)
    }

    /// Applies a step with precomputed gradients.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        match &mut self.inner {
            Inner::AdamW(opt) => Ok(opt.step(grads)?),
            Inner::Adam(opt) => Ok(opt.step(grads)?),
        }
    }
}

/// Rescales the gradients of `vars` to a global norm of at most `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f64) -> Result<f64> {
    let mut sq = 0f64;
    for var in vars.iter() {
        if let Some(g) = grads.get(var.as_tensor()) {
            sq += g.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let norm = sq.sqrt();

    if norm > max_norm {
        let scale = max_norm / (norm + 1e-6);
        for var in vars.iter() {
            let g = match grads.get(var.as_tensor()) {
                Some(g) => g.affine(scale, 0.0)?,
                None => continue,
            };
            grads.insert(var.as_tensor(), g);
        }
    }
    Ok(norm)
}
