//! Convergence predicates evaluated by iterable operators at the end of a
//! round.

use serde::{Deserialize, Serialize};

/// How the change of a round-carried parameter is measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceMode {
    /// `max |old - new| <= epsilon`.
    #[default]
    Absolute,

    /// `max |(old - new) / old| < epsilon`.
    ///
    /// A coordinate whose previous value is exactly zero has no defined
    /// relative change; such a step is never considered converged.
    Relative,
}

impl ConvergenceMode {
    /// Returns `true` if moving from `old` to `new` is within `epsilon`.
    ///
    /// Both slices must have the same length.
    pub fn has_converged(self, epsilon: f64, old: &[f64], new: &[f64]) -> bool {
        debug_assert_eq!(old.len(), new.len());

        match self {
            Self::Absolute => old
                .iter()
                .zip(new)
                .all(|(old, new)| (old - new).abs() <= epsilon),
            Self::Relative => old
                .iter()
                .zip(new)
                .all(|(old, new)| *old != 0.0 && ((old - new) / old).abs() < epsilon),
        }
    }
}
