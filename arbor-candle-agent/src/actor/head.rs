//! Output activations of actors.
use anyhow::Result;
use arbor_core::ActionSpace;
use candle_core::{Device, Tensor};

/// Squashing function of an output dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Squash {
    /// Logistic function.
    Sigmoid,

    /// Hyperbolic tangent.
    Tanh,

    /// Rectified linear unit.
    Relu,

    /// No squashing.
    Linear,
}

/// Activation of one output dimension: `scale * squash(x) + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimActivation {
    /// Squashing function.
    pub squash: Squash,

    /// Multiplier of the squashed value.
    pub scale: f32,

    /// Offset of the scaled value.
    pub offset: f32,
}

impl DimActivation {
    fn new(squash: Squash, scale: f32, offset: f32) -> Self {
        Self {
            squash,
            scale,
            offset,
        }
    }

    /// Activation mapping onto `[low, high]`.
    ///
    /// * `[0, inf)` uses ReLU and `(-inf, 0]` a negated ReLU.
    /// * Finite bounds with one of them at zero use a scaled sigmoid.
    /// * Other finite bounds use a scaled and shifted tanh.
    /// * Remaining ranges are left linear.
    pub fn from_bounds(low: f32, high: f32) -> Self {
        let finite = low.is_finite() && high.is_finite();
        if low == 0.0 && high == f32::INFINITY {
            Self::new(Squash::Relu, 1.0, 0.0)
        } else if low == f32::NEG_INFINITY && high == 0.0 {
            Self::new(Squash::Relu, -1.0, 0.0)
        } else if finite && low != high && (low == 0.0 || high == 0.0) {
            Self::new(Squash::Sigmoid, high + low, 0.0)
        } else if finite {
            Self::new(Squash::Tanh, (high - low) / 2.0, (high + low) / 2.0)
        } else {
            Self::new(Squash::Linear, 1.0, 0.0)
        }
    }
}

/// Per-dimension output activation, assigned once from the bounds of an action space.
///
/// Discrete spaces have scores in `[0, 1]`, hence a sigmoid on every output.
pub struct OutputHead {
    dims: Vec<DimActivation>,

    // Per squashing function, scales and offsets that are zero outside its dimensions.
    groups: Vec<(Squash, Tensor, Tensor)>,
}

impl OutputHead {
    /// Builds the head of an action space.
    pub fn build(space: &ActionSpace, device: &Device) -> Result<Self> {
        let (low, high) = space.bounds();
        let dims = low
            .iter()
            .zip(high.iter())
            .map(|(&l, &h)| DimActivation::from_bounds(l, h))
            .collect::<Vec<_>>();

        let n = dims.len();
        let mut groups = vec![];
        for squash in [Squash::Sigmoid, Squash::Tanh, Squash::Relu, Squash::Linear] {
            if !dims.iter().any(|d| d.squash == squash) {
                continue;
            }
            let (scale, offset): (Vec<f32>, Vec<f32>) = dims
                .iter()
                .map(|d| match d.squash == squash {
                    true => (d.scale, d.offset),
                    false => (0.0, 0.0),
                })
                .unzip();
            groups.push((
                squash,
                Tensor::from_vec(scale, (1, n), device)?,
                Tensor::from_vec(offset, (1, n), device)?,
            ));
        }

        Ok(Self { dims, groups })
    }

    /// Activations of the output dimensions.
    pub fn activations(&self) -> &[DimActivation] {
        &self.dims
    }

    /// Applies the activations to a `[batch, dim]` tensor.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut out: Option<Tensor> = None;
        for (squash, scale, offset) in self.groups.iter() {
            let ys = match squash {
                Squash::Sigmoid => candle_nn::ops::sigmoid(xs)?,
                Squash::Tanh => xs.tanh()?,
                Squash::Relu => xs.relu()?,
                Squash::Linear => xs.clone(),
            };
            let ys = ys.broadcast_mul(scale)?.broadcast_add(offset)?;
            out = Some(match out {
                Some(acc) => acc.add(&ys)?,
                None => ys,
            });
        }
        match out {
            Some(out) => Ok(out),
            None => Ok(xs.clone()),
        }
    }
}
