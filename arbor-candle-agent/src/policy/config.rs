use crate::{actor::ActorConfig, features::StateActionEncoderConfig, value::{Bootstrap, ValueConfig}};
use anyhow::Result;
use arbor_core::compound::CompoundActionSpace;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration shared by every plain policy of a tree.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct BasePolicyConfig {
    /// Trains an actor. Required for continuous action spaces.
    pub actor_critic: bool,

    /// Source of bootstrap values of the critics.
    pub bootstrap: Bootstrap,

    /// Configuration of Q and V.
    pub critic: ValueConfig,

    /// Configuration of the actor, read when `actor_critic` is set.
    pub actor: ActorConfig,

    /// Embedding of states and actions of an actor-critic Q.
    pub state_action: StateActionEncoderConfig,
}

impl Default for BasePolicyConfig {
    fn default() -> Self {
        Self {
            actor_critic: false,
            bootstrap: Bootstrap::Own,
            critic: ValueConfig::default(),
            actor: ActorConfig::default(),
            state_action: StateActionEncoderConfig::default(),
        }
    }
}

impl BasePolicyConfig {
    /// Enables the actor.
    pub fn actor_critic(mut self, v: bool) -> Self {
        self.actor_critic = v;
        self
    }

    /// Sets the source of bootstrap values.
    pub fn bootstrap(mut self, v: Bootstrap) -> Self {
        self.bootstrap = v;
        self
    }

    /// Sets the configuration of the critics.
    pub fn critic(mut self, v: ValueConfig) -> Self {
        self.critic = v;
        self
    }

    /// Sets the configuration of the actor.
    pub fn actor(mut self, v: ActorConfig) -> Self {
        self.actor = v;
        self
    }

    /// Sets the state-action encoder.
    pub fn state_action(mut self, v: StateActionEncoderConfig) -> Self {
        self.state_action = v;
        self
    }

    /// Loads [`BasePolicyConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`BasePolicyConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Shape of a policy tree.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub enum PolicyStructure {
    /// A single plain policy.
    #[default]
    Plain,

    /// Random ensemble mixture of plain policies.
    Ensemble {
        /// Number of policies.
        num_heads: usize,

        /// Number of policies used per call.
        num_samples: usize,
    },

    /// A decider over branches of contiguous flat actions.
    Hierarchical {
        /// Branches, in the order of their flat action ranges.
        branches: Vec<BranchConfig>,
    },

    /// One micro-policy per factor of a compound action space.
    Factored {
        /// The compound action space.
        space: CompoundActionSpace,
    },
}

/// A branch of a hierarchical policy.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct BranchConfig {
    /// Number of flat actions of the branch.
    pub size: usize,

    /// Shape of the policy of the branch.
    pub structure: PolicyStructure,
}

impl BranchConfig {
    /// A plain branch of `size` actions.
    pub fn plain(size: usize) -> Self {
        Self {
            size,
            structure: PolicyStructure::Plain,
        }
    }
}
