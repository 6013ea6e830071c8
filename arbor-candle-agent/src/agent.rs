//! TD agent.
mod base;
mod config;
mod explorer;
pub use base::TdAgent;
pub use config::TdAgentConfig;
pub use explorer::{ExplorationConfig, Explorer};
