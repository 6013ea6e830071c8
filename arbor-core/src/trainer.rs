//! Train an [`Agent`] in an [`Env`].
mod config;
use crate::{
    record::{Record, RecordStorage, RecordValue},
    Agent, Env,
};
use anyhow::Result;
use chrono::Local;
pub use config::TrainerConfig;
use log::{debug, info};

/// Runs the synchronous interaction and optimization loop.
///
/// Each environment step explores an action, stores the transition, and
/// optimizes every `opt_interval` steps. Target networks are synchronized
/// every `target_update_interval` steps, the networks themselves decide
/// whether to copy or blend.
pub struct Trainer {
    config: TrainerConfig,
    storage: RecordStorage,
    episode_return: f32,
    n_episodes: usize,
}

impl Trainer {
    /// Builds a trainer.
    pub fn build(config: TrainerConfig) -> Self {
        Self {
            config,
            storage: RecordStorage::new(),
            episode_return: 0.0,
            n_episodes: 0,
        }
    }

    /// Number of finished episodes.
    pub fn n_episodes(&self) -> usize {
        self.n_episodes
    }

    /// Trains the agent and returns the aggregated records.
    pub fn train<E: Env, A: Agent>(&mut self, env: &mut E, agent: &mut A) -> Result<Vec<Record>> {
        let mut records = vec![];
        let mut state = env.reset()?;

        for step in 1..=self.config.max_steps {
            let fully_random = step <= self.config.n_random_steps;
            let (action, _) = agent.explore(&state, fully_random)?;
            let outcome = env.step(&action)?;
            agent.remember(&state, &action, outcome.reward, &outcome.obs, outcome.done)?;
            self.episode_return += outcome.reward;

            if step % self.config.opt_interval.max(1) == 0 {
                if let Some(record) = agent.optimize()? {
                    self.storage.store(record);
                }
            }
            if step % self.config.target_update_interval.max(1) == 0 {
                agent.update_targets(step)?;
            }

            if step % self.config.decay_interval.max(1) == 0 {
                self.storage.store(agent.decay_exploration(step));
            }
            if self.config.freeze_normalizers_step == Some(step) {
                info!("Freezing observation statistics at step {}", step);
                agent.freeze_normalizers();
            }

            state = if outcome.done {
                debug!("Episode {} returned {}", self.n_episodes, self.episode_return);
                self.storage
                    .store(Record::from_scalar("episode_return", self.episode_return));
                self.n_episodes += 1;
                self.episode_return = 0.0;
                env.reset()?
            } else {
                outcome.obs
            };

            if step % self.config.record_interval.max(1) == 0 {
                records.push(self.flush(step));
            }
        }

        if !self.storage.is_empty() {
            records.push(self.flush(self.config.max_steps));
        }
        Ok(records)
    }

    fn flush(&mut self, step: usize) -> Record {
        let mut record = self.storage.aggregate();
        record.insert("step", RecordValue::Scalar(step as f32));
        record.insert("datetime", RecordValue::DateTime(Local::now()));
        info!(
            "step = {}, episodes = {}, return = {:?}",
            step,
            self.n_episodes,
            record.get_scalar("episode_return_mean").ok()
        );
        record
    }
}
