//! Compound action spaces built from independent factors.
//!
//! Movement in MineRL-like environments bundles several sub-choices into one
//! action: attack or not, strafe left or right, walk forward or back, jump,
//! and turn the camera. Each sub-choice is a [`ActionFactor`] with a vocabulary
//! of [`ActionOption`]s. The flat action space is the cartesian product of the
//! vocabularies, enumerated with the first factor as the most significant digit.
use crate::error::ArborError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One option of a factor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ActionOption {
    /// Leaves the no-op action untouched.
    None,

    /// Presses a key, e.g. `attack` or `forward`.
    Key(String),

    /// Turns the camera horizontally by the given angle.
    CameraX(f32),

    /// Turns the camera vertically by the given angle.
    CameraY(f32),
}

/// A named vocabulary of options.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ActionFactor {
    /// Name of the factor, used to label records.
    pub name: String,

    /// Options of the factor.
    pub options: Vec<ActionOption>,
}

impl ActionFactor {
    /// Creates a factor.
    pub fn new(name: impl Into<String>, options: Vec<ActionOption>) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    /// Creates a factor of a "none" option followed by the given keys.
    pub fn keys(name: impl Into<String>, keys: &[&str]) -> Self {
        let options = std::iter::once(ActionOption::None)
            .chain(keys.iter().map(|k| ActionOption::Key(k.to_string())))
            .collect();
        Self::new(name, options)
    }
}

/// A structured action: pressed keys and a camera turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructuredAction {
    /// Key states, `1` for pressed.
    pub keys: BTreeMap<String, u8>,

    /// Horizontal and vertical camera angles.
    pub camera: [f32; 2],
}

impl StructuredAction {
    fn apply(&mut self, option: &ActionOption) {
        match option {
            ActionOption::None => {}
            ActionOption::Key(k) => {
                self.keys.insert(k.clone(), 1);
            }
            ActionOption::CameraX(v) => self.camera[0] = *v,
            ActionOption::CameraY(v) => self.camera[1] = *v,
        }
    }

    fn matches(&self, option: &ActionOption) -> bool {
        match option {
            ActionOption::None => false,
            ActionOption::Key(k) => self.keys.get(k).map_or(false, |&v| v == 1),
            ActionOption::CameraX(v) => self.camera[0] == *v,
            ActionOption::CameraY(v) => self.camera[1] == *v,
        }
    }
}

/// The cartesian product of several factors.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CompoundActionSpace {
    factors: Vec<ActionFactor>,
}

impl CompoundActionSpace {
    /// Creates a compound action space.
    ///
    /// Fails if a factor is empty, holds more than one "none" option, or
    /// claims a key or camera axis already claimed by another factor.
    pub fn new(factors: Vec<ActionFactor>) -> Result<Self, ArborError> {
        let mut claimed = BTreeSet::new();
        for factor in factors.iter() {
            if factor.options.is_empty() {
                return Err(ArborError::Config(format!(
                    "factor '{}' has no options",
                    factor.name
                )));
            }
            let n_none = factor
                .options
                .iter()
                .filter(|o| matches!(o, ActionOption::None))
                .count();
            if n_none > 1 {
                return Err(ArborError::Config(format!(
                    "factor '{}' has {} none options",
                    factor.name, n_none
                )));
            }

            let mut own = BTreeSet::new();
            for option in factor.options.iter() {
                let key = match option {
                    ActionOption::None => continue,
                    ActionOption::Key(k) => k.clone(),
                    ActionOption::CameraX(_) => "camera_x".to_string(),
                    ActionOption::CameraY(_) => "camera_y".to_string(),
                };
                own.insert(key);
            }
            if let Some(key) = own.intersection(&claimed).next() {
                return Err(ArborError::Config(format!(
                    "'{}' is claimed by factor '{}' and an earlier factor",
                    key, factor.name
                )));
            }
            claimed.extend(own);
        }
        Ok(Self { factors })
    }

    /// Movement factors of MineRL with the given camera angles.
    pub fn minerl_move(camera_x: &[f32], camera_y: &[f32]) -> Result<Self, ArborError> {
        Self::new(vec![
            ActionFactor::keys("attack", &["attack"]),
            ActionFactor::keys("lateral", &["left", "right"]),
            ActionFactor::keys("straight", &["forward", "back"]),
            ActionFactor::keys("jump", &["jump"]),
            ActionFactor::new(
                "camera_x",
                camera_x.iter().map(|&v| ActionOption::CameraX(v)).collect(),
            ),
            ActionFactor::new(
                "camera_y",
                camera_y.iter().map(|&v| ActionOption::CameraY(v)).collect(),
            ),
        ])
    }

    /// Factors of the space.
    pub fn factors(&self) -> &[ActionFactor] {
        &self.factors
    }

    /// Size of the flat action space.
    pub fn n_actions(&self) -> usize {
        self.factors.iter().map(|f| f.options.len()).product()
    }

    /// The structured action with no key pressed and no camera turn.
    pub fn noop(&self) -> StructuredAction {
        let keys = self
            .factors
            .iter()
            .flat_map(|f| f.options.iter())
            .filter_map(|o| match o {
                ActionOption::Key(k) => Some((k.clone(), 0)),
                _ => None,
            })
            .collect();
        StructuredAction {
            keys,
            camera: [0.0, 0.0],
        }
    }

    /// Applies one chosen option per factor onto the no-op action.
    pub fn apply_options(&self, option_idxs: &[usize]) -> Result<StructuredAction, ArborError> {
        let mut action = self.noop();
        for (factor, &ix) in self.factors.iter().zip(option_idxs.iter()) {
            match factor.options.get(ix) {
                Some(option) => action.apply(option),
                None => return Err(ArborError::ActionOutOfRange(ix, factor.options.len())),
            }
        }
        Ok(action)
    }

    /// Index of the option of factor `k` that is active in `action`.
    ///
    /// The first matching option wins. When none matches, the "none" option is used.
    pub fn option_index(&self, k: usize, action: &StructuredAction) -> Result<usize, ArborError> {
        let factor = &self.factors[k];
        let mut none_ix = None;
        for (ix, option) in factor.options.iter().enumerate() {
            if matches!(option, ActionOption::None) {
                none_ix = Some(ix);
            } else if action.matches(option) {
                return Ok(ix);
            }
        }
        none_ix.ok_or_else(|| {
            ArborError::Config(format!(
                "action {:?} selects no option of factor '{}'",
                action, factor.name
            ))
        })
    }

    /// Structured action of a flat index.
    pub fn action(&self, idx: usize) -> Result<StructuredAction, ArborError> {
        let n = self.n_actions();
        if idx >= n {
            return Err(ArborError::ActionOutOfRange(idx, n));
        }
        let mut option_idxs = vec![0; self.factors.len()];
        let mut rest = idx;
        for (k, factor) in self.factors.iter().enumerate().rev() {
            let m = factor.options.len();
            option_idxs[k] = rest % m;
            rest /= m;
        }
        self.apply_options(&option_idxs)
    }

    /// Flat index of a structured action.
    pub fn dict2idx(&self, action: &StructuredAction) -> Result<usize, ArborError> {
        let mut idx = 0;
        for (k, factor) in self.factors.iter().enumerate() {
            idx = idx * factor.options.len() + self.option_index(k, action)?;
        }
        Ok(idx)
    }

    /// Flat indices of a batch of structured actions.
    pub fn dicts2idxs(&self, actions: &[StructuredAction]) -> Result<Vec<usize>, ArborError> {
        actions.iter().map(|a| self.dict2idx(a)).collect()
    }

    /// All structured actions in flat index order.
    pub fn all_actions(&self) -> Result<Vec<StructuredAction>, ArborError> {
        self.factors
            .iter()
            .map(|f| 0..f.options.len())
            .multi_cartesian_product()
            .map(|option_idxs| self.apply_options(&option_idxs))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn space() -> CompoundActionSpace {
        CompoundActionSpace::minerl_move(&[-10.0, 0.0, 10.0], &[-10.0, 0.0, 10.0]).unwrap()
    }

    #[test]
    fn test_flat_index_roundtrip() -> anyhow::Result<()> {
        let space = space();
        assert_eq!(space.n_actions(), 2 * 3 * 3 * 2 * 3 * 3);

        let actions = space.all_actions()?;
        let idxs = space.dicts2idxs(&actions)?;
        assert_eq!(idxs, (0..space.n_actions()).collect::<Vec<_>>());
        for idx in [0, 17, 100, space.n_actions() - 1] {
            assert_eq!(space.dict2idx(&space.action(idx)?)?, idx);
        }
        assert!(space.action(space.n_actions()).is_err());
        Ok(())
    }

    #[test]
    fn test_option_index() -> anyhow::Result<()> {
        let space = space();
        let action = space.apply_options(&[1, 2, 0, 1, 2, 1])?;
        assert_eq!(action.keys["attack"], 1);
        assert_eq!(action.keys["right"], 1);
        assert_eq!(action.keys["forward"], 0);
        assert_eq!(action.camera, [10.0, 0.0]);

        assert_eq!(space.option_index(0, &action)?, 1);
        assert_eq!(space.option_index(1, &action)?, 2);
        assert_eq!(space.option_index(2, &action)?, 0);
        assert_eq!(space.option_index(4, &action)?, 2);
        Ok(())
    }

    #[test]
    fn test_overlapping_keys_rejected() {
        let factors = vec![
            ActionFactor::keys("a", &["attack", "jump"]),
            ActionFactor::keys("b", &["jump"]),
        ];
        assert!(CompoundActionSpace::new(factors).is_err());

        let factors = vec![
            ActionFactor::new("x", vec![ActionOption::CameraX(0.0)]),
            ActionFactor::new("x2", vec![ActionOption::CameraX(1.0)]),
        ];
        assert!(CompoundActionSpace::new(factors).is_err());
    }
}
