//! Replay buffer of transitions.
//!
//! [`ReplayBuffer`] samples uniformly, or proportionally to `priority^alpha`
//! when a [`PerConfig`] is given. Priorities are set by the learner after
//! each optimization step from the magnitude of the TD error.
mod base;
mod config;
mod iw_scheduler;
mod sum_tree;

pub use base::ReplayBuffer;
pub use config::{PerConfig, ReplayBufferConfig};
pub use iw_scheduler::IwScheduler;
use sum_tree::SumTree;
