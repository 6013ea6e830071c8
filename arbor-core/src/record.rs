//! Records of training metrics.
//!
//! Every optimization step returns a [`Record`] of scalar metrics such as
//! `loss_q` or `actor_train_batch_size`. A [`RecordStorage`] collects them
//! over a window of steps and summarizes them for logging.
mod base;
mod storage;

pub use base::{Record, RecordValue};
pub use storage::RecordStorage;
