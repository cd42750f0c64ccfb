use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::location::{BlockCondition, PlaceholderId, SaccadeLoc};
use crate::phase::TrialPhase;

/// Independent variables for one trial. Fixed once the trial starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrialParameters {
    pub saccade_loc: SaccadeLoc,
    pub cue_loc: PlaceholderId,
    /// Offset into the six placeholders nearest the saccade location.
    pub target_loc: u8,
    pub block_condition: BlockCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("target_loc {target_loc} with saccade_loc {saccade_loc} falls outside the placeholders")]
    TargetOutOfRange {
        target_loc: u8,
        saccade_loc: SaccadeLoc,
    },
}

/// Locations computed from `TrialParameters` at trial setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivedLocations {
    /// Fixation point that lights up when the saccade signal appears.
    pub saccade_signal_loc: SaccadeLoc,
    /// Fixation point whose boundary counts as a wrong saccade.
    pub wrong_saccade_loc: SaccadeLoc,
    pub target_location: PlaceholderId,
}

impl DerivedLocations {
    /// Targets are drawn from the six placeholders closest to the saccade
    /// location, so lower saccades shift the offset down by one row.
    pub fn derive(params: &TrialParameters) -> Result<Self, LocationError> {
        let saccade_signal_loc = match params.block_condition {
            BlockCondition::Pro => params.saccade_loc,
            BlockCondition::Anti => params.saccade_loc.opposite(),
        };
        let shift = match params.saccade_loc {
            SaccadeLoc::Upper => 0,
            SaccadeLoc::Lower => 2,
        };
        let target_location = params
            .target_loc
            .checked_add(shift)
            .and_then(PlaceholderId::new)
            .ok_or(LocationError::TargetOutOfRange {
                target_loc: params.target_loc,
                saccade_loc: params.saccade_loc,
            })?;
        Ok(Self {
            saccade_signal_loc,
            wrong_saccade_loc: saccade_signal_loc.opposite(),
            target_location,
        })
    }
}

/// Participant behaviour that ends a trial early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    #[error("gaze left the fixation boundary")]
    BrokeFixation,
    #[error("no saccade reached the signalled location in time")]
    MissedSaccade,
    #[error("saccade landed on the wrong fixation point")]
    WrongSaccade,
    #[error("response key pressed before the target")]
    EarlyResponse,
}

impl AbortReason {
    pub const ALL: [AbortReason; 4] = [
        AbortReason::BrokeFixation,
        AbortReason::MissedSaccade,
        AbortReason::WrongSaccade,
        AbortReason::EarlyResponse,
    ];

    /// Admonishment shown to the participant.
    pub fn message(&self) -> &'static str {
        match self {
            AbortReason::BrokeFixation => "Eyes moved! Please keep your eyes on the fixation point.",
            AbortReason::MissedSaccade => "Too slow! Look at the signalled point as soon as it appears.",
            AbortReason::WrongSaccade => "Wrong location! Look at the point the block rules ask for.",
            AbortReason::EarlyResponse => "Too early! Wait for the target before responding.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::BrokeFixation => "broke_fixation",
            AbortReason::MissedSaccade => "missed_saccade",
            AbortReason::WrongSaccade => "wrong_saccade",
            AbortReason::EarlyResponse => "early_response",
        }
    }
}

/// Recorded result per completed trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub block_num: usize,
    pub trial_num: usize,
    pub block_condition: BlockCondition,
    pub saccade_loc: SaccadeLoc,
    pub saccade_signal_loc: SaccadeLoc,
    pub cue_loc: PlaceholderId,
    pub target_loc: u8,
    pub target_location: PlaceholderId,
    pub responded: bool,
    /// Milliseconds from target onset; `None` when the window ran out.
    pub rt_ms: Option<f64>,
}

/// One aborted trial, persisted for offline analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub participant_id: String,
    pub block_num: usize,
    pub trial_num: usize,
    pub block_condition: BlockCondition,
    pub saccade_loc: SaccadeLoc,
    pub cue_loc: PlaceholderId,
    pub target_loc: u8,
    pub target_location: PlaceholderId,
    pub phase: TrialPhase,
    pub reason: AbortReason,
    pub elapsed_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(saccade_loc: SaccadeLoc, block_condition: BlockCondition, target_loc: u8) -> TrialParameters {
        TrialParameters {
            saccade_loc,
            cue_loc: PlaceholderId::new(4).unwrap(),
            target_loc,
            block_condition,
        }
    }

    #[test]
    fn upper_pro_targets_unshifted() {
        let d = DerivedLocations::derive(&params(SaccadeLoc::Upper, BlockCondition::Pro, 3)).unwrap();
        assert_eq!(d.saccade_signal_loc, SaccadeLoc::Upper);
        assert_eq!(d.wrong_saccade_loc, SaccadeLoc::Lower);
        assert_eq!(d.target_location.get(), 3);
    }

    #[test]
    fn lower_anti_signals_upper_and_shifts_target() {
        let d = DerivedLocations::derive(&params(SaccadeLoc::Lower, BlockCondition::Anti, 4)).unwrap();
        assert_eq!(d.saccade_signal_loc, SaccadeLoc::Upper);
        assert_eq!(d.wrong_saccade_loc, SaccadeLoc::Lower);
        assert_eq!(d.target_location.get(), 6);
    }

    #[test]
    fn lower_pro_signals_lower() {
        let d = DerivedLocations::derive(&params(SaccadeLoc::Lower, BlockCondition::Pro, 1)).unwrap();
        assert_eq!(d.saccade_signal_loc, SaccadeLoc::Lower);
        assert_eq!(d.wrong_saccade_loc, SaccadeLoc::Upper);
    }

    #[test]
    fn out_of_range_target_is_rejected() {
        let err = DerivedLocations::derive(&params(SaccadeLoc::Lower, BlockCondition::Pro, 7)).unwrap_err();
        assert_eq!(
            err,
            LocationError::TargetOutOfRange {
                target_loc: 7,
                saccade_loc: SaccadeLoc::Lower
            }
        );
        assert!(DerivedLocations::derive(&params(SaccadeLoc::Upper, BlockCondition::Pro, 0)).is_err());
    }

    #[test]
    fn abort_reasons_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&AbortReason::EarlyResponse).unwrap(),
            "\"early_response\""
        );
        for reason in AbortReason::ALL {
            assert_eq!(
                serde_json::to_string(&reason).unwrap(),
                format!("\"{}\"", reason.as_str())
            );
        }
    }

    fn any_saccade_loc() -> impl Strategy<Value = SaccadeLoc> {
        prop_oneof![Just(SaccadeLoc::Upper), Just(SaccadeLoc::Lower)]
    }

    fn any_condition() -> impl Strategy<Value = BlockCondition> {
        prop_oneof![Just(BlockCondition::Pro), Just(BlockCondition::Anti)]
    }

    proptest! {
        #[test]
        fn signal_and_wrong_locations_always_differ(
            loc in any_saccade_loc(),
            cond in any_condition(),
            target in 1u8..=6,
        ) {
            let d = DerivedLocations::derive(&params(loc, cond, target)).unwrap();
            prop_assert_ne!(d.saccade_signal_loc, d.wrong_saccade_loc);
            prop_assert_eq!(d.saccade_signal_loc == loc, cond == BlockCondition::Pro);
        }

        #[test]
        fn target_shift_depends_only_on_saccade_loc(
            loc in any_saccade_loc(),
            cond in any_condition(),
            target in 1u8..=6,
        ) {
            let d = DerivedLocations::derive(&params(loc, cond, target)).unwrap();
            let expected = if loc == SaccadeLoc::Lower { target + 2 } else { target };
            prop_assert_eq!(d.target_location.get(), expected);
        }
    }
}
