#![warn(missing_docs)]
//! Backend-agnostic building blocks of a temporal-difference training core.
//!
//! This crate holds everything that does not touch tensors:
//!
//! * [`Transition`] and the [`ReplayBuffer`](replay_buffer::ReplayBuffer) with
//!   uniform, prioritized and combined experience replay.
//! * [`ActionSpace`] descriptors and the index bookkeeping of hierarchical
//!   action spaces in [`hierarchy`].
//! * Compound MineRL-like action spaces in [`compound`].
//! * The [`Agent`] and [`Env`] interfaces and a synchronous [`Trainer`].
//! * [`Record`](record::Record)s of training metrics.
pub mod compound;
pub mod error;
pub mod hierarchy;
pub mod record;
pub mod replay_buffer;

mod base;
pub use base::{Agent, Env, ReplayBufferBase, Sample, Step};

mod space;
pub use space::{argmax, Action, ActionSpace};

mod transition;
pub use transition::Transition;

mod trainer;
pub use trainer::{Trainer, TrainerConfig};
