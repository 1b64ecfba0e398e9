//! Run states and outcomes.

use std::time::Duration;

use parcel_sync_parcel::TransformSummary;
use strum_macros::{AsRefStr, Display};

use crate::freshness::UpdateDecision;

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum RunState {
    Idle,
    CheckingFreshness,
    UpToDate,
    Extracting,
    /// The extract had no rows; the destination is left untouched.
    EmptyExtract,
    Parsing,
    Loading,
    NotifyingSuccess,
    Error,
}

impl RunState {
    /// Whether a run may move from `self` to `next`.
    ///
    /// Any state may fail into [`RunState::Error`]; every terminal state
    /// returns to [`RunState::Idle`].
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::CheckingFreshness)
                | (Self::CheckingFreshness, Self::UpToDate | Self::Extracting)
                | (Self::Extracting, Self::Parsing | Self::EmptyExtract)
                | (Self::Parsing, Self::Loading)
                | (Self::Loading, Self::NotifyingSuccess)
                | (
                    Self::UpToDate | Self::EmptyExtract | Self::NotifyingSuccess | Self::Error,
                    Self::Idle
                )
        ) || (matches!(next, Self::Error) && !matches!(self, Self::Idle | Self::Error))
    }
}

/// Counters from a completed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Rows in the extract.
    pub extracted: u64,
    /// Staged rows that received ownership fields.
    pub updated: u64,
    /// Rows appended to the destination.
    pub appended: u64,
    pub transform: TransformSummary,
    pub runtime: Duration,
}

/// How a run ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Local data already matches the remote.
    UpToDate(UpdateDecision),
    /// The destination was replaced.
    Updated(RunReport),
    /// The extract had no rows. The destination was not touched.
    EmptyExtract,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [
            RunState::Idle,
            RunState::CheckingFreshness,
            RunState::Extracting,
            RunState::Parsing,
            RunState::Loading,
            RunState::NotifyingSuccess,
            RunState::Idle,
        ];
        assert!(path.windows(2).all(|w| w[0].can_transition_to(w[1])));
    }

    #[test]
    fn short_circuits_are_allowed() {
        assert!(RunState::CheckingFreshness.can_transition_to(RunState::UpToDate));
        assert!(RunState::UpToDate.can_transition_to(RunState::Idle));
        assert!(RunState::Extracting.can_transition_to(RunState::EmptyExtract));
        assert!(RunState::EmptyExtract.can_transition_to(RunState::Idle));
    }

    #[test]
    fn any_active_state_can_fail() {
        for state in [
            RunState::CheckingFreshness,
            RunState::UpToDate,
            RunState::Extracting,
            RunState::EmptyExtract,
            RunState::Parsing,
            RunState::Loading,
            RunState::NotifyingSuccess,
        ] {
            assert!(state.can_transition_to(RunState::Error), "{state}");
        }
        assert!(RunState::Error.can_transition_to(RunState::Idle));
    }

    #[test]
    fn skipping_steps_is_not_allowed() {
        assert!(!RunState::Idle.can_transition_to(RunState::Loading));
        assert!(!RunState::Extracting.can_transition_to(RunState::Loading));
        assert!(!RunState::EmptyExtract.can_transition_to(RunState::Parsing));
        assert!(!RunState::UpToDate.can_transition_to(RunState::Extracting));
    }
}
