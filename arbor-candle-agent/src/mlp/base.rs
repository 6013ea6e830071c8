use super::MlpConfig;
use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

/// Returns vector of linear modules from [`MlpConfig`].
fn create_linear_layers(vs: VarBuilder, config: &MlpConfig) -> Result<Vec<Linear>> {
    let dims = std::iter::once(config.in_dim)
        .chain(config.units.iter().copied())
        .chain(std::iter::once(config.out_dim))
        .collect::<Vec<_>>();

    dims.windows(2)
        .enumerate()
        .map(|(i, w)| Ok(linear(w[0], w[1], vs.pp(format!("ln{}", i)))?))
        .collect()
}

/// Multilayer perceptron with ReLU activation function.
pub struct Mlp {
    config: MlpConfig,
    device: Device,
    layers: Vec<Linear>,
}

impl Mlp {
    /// Builds the layers under the `mlp` prefix of `vs`.
    pub fn build(vs: VarBuilder, config: MlpConfig) -> Result<Self> {
        let device = vs.device().clone();
        let layers = create_linear_layers(vs.pp("mlp"), &config)?;

        Ok(Self {
            config,
            device,
            layers,
        })
    }

    /// Forward pass on a `[batch, in_dim]` tensor.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.to_device(&self.device)?;
        let n_layers = self.layers.len();

        for layer in self.layers.iter().take(n_layers - 1) {
            xs = layer.forward(&xs)?.relu()?;
        }
        let xs = self.layers[n_layers - 1].forward(&xs)?;

        match self.config.activation_out {
            false => Ok(xs),
            true => Ok(xs.relu()?),
        }
    }

    /// Configuration of the network.
    pub fn config(&self) -> &MlpConfig {
        &self.config
    }
}
