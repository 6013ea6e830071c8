//! Action spaces and actions.
use crate::error::ArborError;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Descriptor of the action space of an environment.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ActionSpace {
    /// `n` mutually exclusive actions, encoded one-hot in transitions.
    Discrete(usize),

    /// A real vector with per-dimension bounds. Bounds may be infinite.
    Box {
        /// Lower bounds.
        low: Vec<f32>,
        /// Upper bounds.
        high: Vec<f32>,
    },
}

/// An action taken in an environment.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Index of a discrete action.
    Discrete(usize),

    /// A continuous action vector.
    Continuous(Vec<f32>),
}

impl ActionSpace {
    /// Checks the descriptor is well formed.
    pub fn validate(&self) -> Result<(), ArborError> {
        match self {
            Self::Discrete(0) => Err(ArborError::Config(
                "a discrete action space needs at least one action".into(),
            )),
            Self::Discrete(_) => Ok(()),
            Self::Box { low, high } => {
                if low.is_empty() || low.len() != high.len() {
                    return Err(ArborError::Config(format!(
                        "bounds of a box action space must be non-empty and of equal length, got {} and {}",
                        low.len(),
                        high.len()
                    )));
                }
                match low.iter().zip(high.iter()).position(|(l, h)| !(l <= h)) {
                    Some(i) => Err(ArborError::Config(format!(
                        "dimension {} has low {} above high {}",
                        i, low[i], high[i]
                    ))),
                    None => Ok(()),
                }
            }
        }
    }

    /// Returns `true` for a discrete space.
    pub fn is_discrete(&self) -> bool {
        matches!(self, Self::Discrete(_))
    }

    /// Width of the action vector stored in a transition.
    pub fn dim(&self) -> usize {
        match self {
            Self::Discrete(n) => *n,
            Self::Box { low, .. } => low.len(),
        }
    }

    /// Per-dimension bounds. A discrete space is treated as scores in `[0, 1]`.
    pub fn bounds(&self) -> (Vec<f32>, Vec<f32>) {
        match self {
            Self::Discrete(n) => (vec![0.0; *n], vec![1.0; *n]),
            Self::Box { low, high } => (low.clone(), high.clone()),
        }
    }

    /// Encodes an action as the vector stored in a transition.
    pub fn encode(&self, action: &Action) -> Result<Vec<f32>, ArborError> {
        match (self, action) {
            (Self::Discrete(n), Action::Discrete(a)) => {
                if a >= n {
                    return Err(ArborError::ActionOutOfRange(*a, *n));
                }
                let mut v = vec![0f32; *n];
                v[*a] = 1.0;
                Ok(v)
            }
            (Self::Box { low, .. }, Action::Continuous(v)) if v.len() == low.len() => Ok(v.clone()),
            _ => Err(ArborError::Config(format!(
                "action {:?} does not belong to {:?}",
                action, self
            ))),
        }
    }

    /// Converts a raw output row, e.g. Q-values or actor outputs, into an action.
    pub fn decode(&self, raw: &[f32]) -> Action {
        match self {
            Self::Discrete(_) => Action::Discrete(argmax(raw)),
            Self::Box { low, high } => Action::Continuous(
                raw.iter()
                    .zip(low.iter().zip(high.iter()))
                    .map(|(v, (l, h))| v.max(*l).min(*h))
                    .collect(),
            ),
        }
    }

    /// Draws uniform random scores within the bounds.
    ///
    /// Infinite bounds are clamped to `[-1, 1]` before sampling.
    pub fn sample_raw(&self, rng: &mut impl Rng) -> Vec<f32> {
        let (low, high) = self.bounds();
        low.iter()
            .zip(high.iter())
            .map(|(l, h)| {
                let l = if l.is_finite() { *l } else { -1.0 };
                let h = if h.is_finite() { *h } else { 1.0 };
                if l < h {
                    rng.gen_range(l..h)
                } else {
                    l
                }
            })
            .collect()
    }
}

/// Index of the largest value, the first one on ties.
pub fn argmax(xs: &[f32]) -> usize {
    xs.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(im, m), (i, &x)| {
            if x > m {
                (i, x)
            } else {
                (im, m)
            }
        })
        .0
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_validate() {
        assert!(ActionSpace::Discrete(0).validate().is_err());
        assert!(ActionSpace::Discrete(3).validate().is_ok());
        let space = ActionSpace::Box {
            low: vec![0.0, -1.0],
            high: vec![1.0],
        };
        assert!(space.validate().is_err());
        let space = ActionSpace::Box {
            low: vec![2.0],
            high: vec![1.0],
        };
        assert!(space.validate().is_err());
    }

    #[test]
    fn test_encode_decode() -> anyhow::Result<()> {
        let space = ActionSpace::Discrete(4);
        assert_eq!(space.encode(&Action::Discrete(2))?, vec![0.0, 0.0, 1.0, 0.0]);
        assert!(space.encode(&Action::Discrete(4)).is_err());
        assert_eq!(space.decode(&[0.1, 0.7, 0.7, 0.2]), Action::Discrete(1));

        let space = ActionSpace::Box {
            low: vec![-1.0, 0.0],
            high: vec![1.0, f32::INFINITY],
        };
        assert_eq!(
            space.decode(&[2.0, 5.0]),
            Action::Continuous(vec![1.0, 5.0])
        );
        let mut rng = SmallRng::seed_from_u64(42);
        let raw = space.sample_raw(&mut rng);
        assert!(raw[0] >= -1.0 && raw[0] < 1.0);
        assert!(raw[1] >= 0.0 && raw[1] < 1.0);
        Ok(())
    }
}
