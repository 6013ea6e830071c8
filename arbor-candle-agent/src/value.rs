//! Value estimators and their TD-target pipeline.
mod base;
mod config;
pub use base::{CriticCtx, ValueEstimator, ValueKind};
pub use config::{Bootstrap, ValueConfig};
