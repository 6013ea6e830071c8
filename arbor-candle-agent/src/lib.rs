//! Value estimators, actors and policy trees implemented with
//! [candle](https://crates.io/crates/candle-core).
//!
//! A [`TdAgent`](agent::TdAgent) owns a shared [`StateEncoder`](features::StateEncoder),
//! a replay buffer and a [`PolicyNode`](policy::PolicyNode) tree. Plain policies
//! in the tree train Q/V estimators with TD targets and, for continuous or
//! actor-critic nodes, an [`Actor`](actor::Actor) updated by CACLA, DDPG or SPG.
pub mod actor;
pub mod agent;
pub mod batch;
pub mod features;
pub mod mlp;
pub mod net;
pub mod opt;
pub mod policy;
pub mod util;
pub mod value;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The GPU with the given ordinal.
    Cuda(usize),
}

impl TryFrom<Device> for candle_core::Device {
    type Error = candle_core::Error;

    fn try_from(device: Device) -> Result<Self, Self::Error> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}
