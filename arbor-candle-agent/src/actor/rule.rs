use serde::{Deserialize, Serialize};

/// Policy-improvement rule of an actor.
///
/// Several rules may be combined, their losses are summed.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum ActorUpdateRule {
    /// Regresses taken actions of rows whose V TD error is negative.
    CaclaV,

    /// Regresses taken actions of rows whose Q TD error is negative,
    /// weighted by the error.
    CaclaQ,

    /// Follows the gradient of Q with respect to the action on every row.
    Ddpg,

    /// Regresses taken actions that the target Q rates above the greedy
    /// action of the target actor, weighted by the advantage.
    Spg,

    /// Gradient-informed SPG. Not implemented, rejected when building an actor.
    Gispg,
}

/// Rows chosen by an update rule and their sample weights.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSelection {
    /// Selected rows, ascending.
    pub rows: Vec<usize>,

    /// Sample weight of each selected row.
    pub weights: Vec<f32>,
}

impl RowSelection {
    /// Number of selected rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if no row was selected.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn filter(signal: &[f32], keep: impl Fn(f32) -> bool, weight: impl Fn(f32) -> f32) -> Self {
        let (rows, weights) = signal
            .iter()
            .enumerate()
            .filter(|(_, s)| keep(**s))
            .map(|(i, s)| (i, weight(*s)))
            .unzip();
        Self { rows, weights }
    }
}

impl ActorUpdateRule {
    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CaclaV => "cacla_v",
            Self::CaclaQ => "cacla_q",
            Self::Ddpg => "ddpg",
            Self::Spg => "spg",
            Self::Gispg => "gispg",
        }
    }

    /// Returns `true` if the rule reads a Q estimator.
    pub fn needs_q(&self) -> bool {
        !matches!(self, Self::CaclaV)
    }

    /// Returns `true` if the rule reads a V estimator.
    pub fn needs_v(&self) -> bool {
        matches!(self, Self::CaclaV)
    }

    /// Selects rows from the per-row signal of the rule.
    ///
    /// The signal is the V TD error for CACLA-V, the Q TD error for CACLA-Q
    /// and the advantage of the taken action for SPG. DDPG trains on every
    /// row with unit weight. Returns `None` for GISPG.
    pub fn select_rows(&self, signal: &[f32]) -> Option<RowSelection> {
        match self {
            Self::CaclaV => Some(RowSelection::filter(signal, |s| s < 0.0, |_| -1.0)),
            Self::CaclaQ => Some(RowSelection::filter(signal, |s| s < 0.0, |s| s)),
            Self::Spg => Some(RowSelection::filter(signal, |s| s > 0.0, |s| s)),
            Self::Ddpg => Some(RowSelection::filter(signal, |_| true, |_| 1.0)),
            Self::Gispg => None,
        }
    }
}
