//! Feature extractors shared by the estimators of a policy tree.
//!
//! [`StateEncoder`] maps observations to state features and is shared by every
//! policy of an agent. [`StateActionEncoder`] embeds a state feature together
//! with an action and is owned by each actor-critic policy, because the width
//! of actions differs between the nodes of a hierarchy.
mod config;
mod normalizer;
mod state;
mod state_action;
use crate::{
    mlp::MlpConfig,
    net::{TargetSync, TrackedNet},
};
use anyhow::Result;
use candle_core::Device;
pub use config::{StateActionEncoderConfig, StateEncoderConfig};
pub use normalizer::RunningNorm;
pub use state::StateEncoder;
pub use state_action::StateActionEncoder;

/// Builds a ReLU encoder whose last entry of `units` is the output width.
///
/// Returns `None` for empty `units`, in which case inputs pass through.
fn encoder_net(
    in_dim: usize,
    units: &[usize],
    prefix: &str,
    device: &Device,
    sync: Option<TargetSync>,
) -> Result<Option<TrackedNet>> {
    match units.split_last() {
        None => Ok(None),
        Some((&out_dim, hidden)) => {
            let config = MlpConfig::new(in_dim, hidden.to_vec(), out_dim, true);
            Ok(Some(TrackedNet::build(config, prefix, device, sync)?))
        }
    }
}
