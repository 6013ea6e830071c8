//! Errors in the library.
use thiserror::Error;

/// Errors raised by the training core.
#[derive(Error, Debug)]
pub enum ArborError {
    /// An invalid combination of settings, detected at construction time.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A flat action index outside of the action space.
    #[error("Action index {0} is out of range for an action space of size {1}")]
    ActionOutOfRange(usize, usize),

    /// Sampling was requested from a replay buffer holding no transitions.
    #[error("Replay buffer is empty")]
    EmptyReplayBuffer,

    /// A bootstrap value was read from a cache filled for another batch.
    #[error("Bootstrap cache of {0} is stale: V must be optimized on the same batch before Q")]
    StaleBootstrap(String),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}
