//! Transitions stored in the replay buffer.

/// One environment step as seen by the learner.
///
/// `next_state` is `None` for terminal transitions. Such transitions never
/// reach a target network, their bootstrap value is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation before the step.
    pub state: Vec<f32>,

    /// Action taken, one-hot for discrete spaces.
    pub action: Vec<f32>,

    /// Reward received.
    pub reward: f32,

    /// Observation after the step, `None` when the episode terminated.
    pub next_state: Option<Vec<f32>>,

    /// Episode termination flag.
    pub done: bool,
}

impl Transition {
    /// Creates a transition, dropping `next_state` when `done` is set.
    pub fn new(
        state: Vec<f32>,
        action: Vec<f32>,
        reward: f32,
        next_state: Vec<f32>,
        done: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state: if done { None } else { Some(next_state) },
            done,
        }
    }

    /// Returns `true` if the transition ends an episode.
    pub fn is_terminal(&self) -> bool {
        self.next_state.is_none()
    }
}
