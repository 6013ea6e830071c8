//! Interfaces between the learner, the environment and the replay buffer.
mod agent;
mod env;
mod replay_buffer;
pub use agent::Agent;
pub use env::{Env, Step};
pub use replay_buffer::{ReplayBufferBase, Sample};
