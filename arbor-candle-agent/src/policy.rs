//! Policies and their composition into trees.
//!
//! Every node implements [`Policy`]. A [`PlainPolicy`] owns its critics and
//! actor, an [`EnsemblePolicy`] bags plain policies, a [`HierarchicalPolicy`]
//! routes batch rows to branches by their flat action, and a
//! [`FactoredPolicy`] trains one micro-policy per factor of a compound action
//! space. Trees are described by [`PolicyStructure`] and built into
//! [`PolicyNode`]s.
mod base;
mod config;
mod ensemble;
mod factored;
mod hierarchical;
mod node;
mod plain;
pub use base::{Optimized, Policy};
pub use config::{BasePolicyConfig, BranchConfig, PolicyStructure};
pub use ensemble::{sample_heads, EnsemblePolicy};
pub use factored::FactoredPolicy;
pub use hierarchical::HierarchicalPolicy;
pub use node::PolicyNode;
pub use plain::PlainPolicy;
