//! TD agent.
use super::{Explorer, TdAgentConfig};
use crate::{
    batch::TransitionBatch,
    features::StateEncoder,
    policy::{Policy, PolicyNode},
    util::column_to_vec,
};
use anyhow::Result;
use arbor_core::{
    error::ArborError,
    record::{Record, RecordValue},
    replay_buffer::ReplayBuffer,
    Action, ActionSpace, Agent, ReplayBufferBase, Transition,
};
use candle_core::{Device, Tensor};
use log::{info, trace};
use std::{fs, path::Path};

/// Small constant added to absolute errors to get replay priorities.
const PRIORITY_EPS: f32 = 1e-4;

/// An agent owning the observation encoder, a policy tree and its replay buffer.
pub struct TdAgent {
    space: ActionSpace,
    device: Device,
    batch_size: usize,
    min_transitions: usize,
    encoder: StateEncoder,
    policy: PolicyNode,
    buffer: ReplayBuffer,
    explorer: Explorer,
    n_opts: usize,
}

impl TdAgent {
    /// Builds an agent for `obs_dim`-dimensional observations and actions in `space`.
    ///
    /// Fails with [`ArborError::Config`] if the batch size or the warm-up
    /// size is zero.
    pub fn build(config: TdAgentConfig, obs_dim: usize, space: ActionSpace) -> Result<Self> {
        space.validate()?;
        if config.batch_size == 0 || config.min_transitions == 0 {
            return Err(ArborError::Config(format!(
                "batch_size ({}) and min_transitions ({}) must be positive",
                config.batch_size, config.min_transitions
            ))
            .into());
        }
        let device: Device = config.device.try_into()?;
        let encoder = StateEncoder::build(&config.state_encoder, obs_dim, &device)?;
        let policy = PolicyNode::build(
            &config.structure,
            &config.policy,
            &space,
            &encoder,
            config.seed,
            &device,
        )?;
        let buffer = ReplayBuffer::build(&config.replay_buffer);
        let explorer = Explorer::build(config.exploration.clone(), config.seed);
        info!(
            "Built agent: obs_dim = {}, actions = {:?}, batch_size = {}",
            obs_dim, space, config.batch_size
        );

        Ok(Self {
            space,
            device,
            batch_size: config.batch_size,
            min_transitions: config.min_transitions,
            encoder,
            policy,
            buffer,
            explorer,
            n_opts: 0,
        })
    }

    /// The policy tree.
    pub fn policy(&self) -> &PolicyNode {
        &self.policy
    }

    /// Number of stored transitions.
    pub fn len_buffer(&self) -> usize {
        self.buffer.len()
    }

    /// Number of optimization steps so far.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Encodes the states of a batch.
    ///
    /// Current states are encoded by the live and the target encoder, next
    /// states by the target encoder.
    pub fn encode(&self, batch: TransitionBatch) -> Result<TransitionBatch> {
        let state_features = self.encoder.forward(batch.state())?;
        let target_state_features = self.encoder.forward_target(batch.state())?;
        let next_state_features = match batch.non_final_next_states() {
            Some(xs) => Some(self.encoder.forward_next_state(xs)?),
            None => None,
        };
        Ok(batch
            .with_features(state_features, next_state_features)
            .with_target_state_features(target_state_features))
    }

    /// Per-transition error without training, e.g. to initialize priorities.
    pub fn calculate_tde(&self, transitions: &[Transition]) -> Result<Vec<f32>> {
        let batch = self.encode(TransitionBatch::from_transitions(transitions, &self.device)?)?;
        column_to_vec(&self.policy.calculate_tde(&batch)?)
    }

    fn scores(&mut self, state: &[f32]) -> Result<Vec<f32>> {
        let xs = Tensor::from_slice(state, (1, state.len()), &self.device)?;
        let state_features = self.encoder.forward(&xs)?;
        let scores = self.policy.choose_action(&state_features)?;
        Ok(scores.squeeze(0)?.to_vec1::<f32>()?)
    }
}

impl Agent for TdAgent {
    fn remember(
        &mut self,
        state: &[f32],
        action: &Action,
        reward: f32,
        next_state: &[f32],
        done: bool,
    ) -> Result<()> {
        let action = self.space.encode(action)?;
        self.encoder.observe(state)?;
        self.buffer.add(Transition::new(
            state.to_vec(),
            action,
            reward,
            next_state.to_vec(),
            done,
        ));
        Ok(())
    }

    fn optimize(&mut self) -> Result<Option<Record>> {
        if self.buffer.len() < self.min_transitions {
            return Ok(None);
        }

        let n = self.batch_size.min(self.buffer.len());
        let sample = self.buffer.sample(n)?;
        let batch = self.encode(TransitionBatch::from_sample(&sample, &self.device)?)?;
        let out = self.policy.optimize_networks(&batch)?;

        let error = column_to_vec(&out.error)?;
        if let Some(ixs) = batch.ixs() {
            let priorities = error
                .iter()
                .map(|e| e.abs() + PRIORITY_EPS)
                .collect::<Vec<_>>();
            self.buffer.update_priorities(ixs, &priorities);
        }
        self.n_opts += 1;

        let mean_error = error.iter().sum::<f32>() / error.len() as f32;
        trace!("n_opts = {}, mean error = {}", self.n_opts, mean_error);
        let mut record = out.record;
        record.insert("td_error", RecordValue::Scalar(mean_error));
        Ok(Some(record))
    }

    fn explore(&mut self, state: &[f32], fully_random: bool) -> Result<(Action, Vec<f32>)> {
        let scores = match fully_random {
            true => vec![0.0; self.space.dim()],
            false => self.scores(state)?,
        };
        let raw = self.explorer.explore(&scores, &self.space, fully_random)?;
        Ok((self.space.decode(&raw), raw))
    }

    fn exploit(&mut self, state: &[f32]) -> Result<(Action, Vec<f32>)> {
        let raw = self.scores(state)?;
        Ok((self.space.decode(&raw), raw))
    }

    fn decay_exploration(&mut self, step: usize) -> Record {
        self.explorer.decay(step)
    }

    fn update_targets(&mut self, step: usize) -> Result<()> {
        self.encoder.update_targets(step)?;
        self.policy.update_targets(step)
    }

    fn freeze_normalizers(&mut self) {
        self.encoder.freeze_normalizers();
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.encoder.save(path)?;
        self.policy.save(&path.join("policy"))?;
        info!("Saved parameters in {:?}", path);
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.encoder.load(path)?;
        self.policy.load(&path.join("policy"))?;
        info!("Loaded parameters from {:?}", path);
        Ok(())
    }
}
