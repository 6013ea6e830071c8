//! Actor and its update rules.
mod base;
mod config;
mod head;
mod rule;
pub use base::{Actor, ActorInputs};
pub use config::ActorConfig;
pub use head::{DimActivation, OutputHead, Squash};
pub use rule::{ActorUpdateRule, RowSelection};
