use serde::{Deserialize, Serialize};
use std::fmt;

/// Defines experiment phases and behavior
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn allows_input(&self) -> bool;
    fn next(&self) -> Option<Self>;

    fn is_running(&self) -> bool {
        false
    }
    fn is_finished(&self) -> bool {
        false
    }
}

/// Screens the participant moves through over a session.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Welcome,
    Trials,
    BlockBreak,
    Debrief,
}

impl Phase for SessionPhase {
    fn allows_input(&self) -> bool {
        !matches!(self, Self::Debrief)
    }

    /// `Trials` always moves to `BlockBreak`; whoever owns the block list
    /// decides to jump to `Debrief` instead once no blocks remain.
    fn next(&self) -> Option<Self> {
        use SessionPhase::*;
        Some(match self {
            Welcome => Trials,
            Trials => BlockBreak,
            BlockBreak => Trials,
            Debrief => return None,
        })
    }

    fn is_running(&self) -> bool {
        matches!(self, Self::Trials)
    }

    fn is_finished(&self) -> bool {
        matches!(self, Self::Debrief)
    }
}

/// The five phases of a single trial, in presentation order.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialPhase {
    #[default]
    Fixation,
    Cue,
    PostCueFixation,
    Saccade,
    Target,
}

impl TrialPhase {
    /// Phases during which gaze must stay on the central fixation point.
    pub fn holds_center(&self) -> bool {
        matches!(self, Self::Fixation | Self::Cue | Self::PostCueFixation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixation => "fixation",
            Self::Cue => "cue",
            Self::PostCueFixation => "post_cue_fixation",
            Self::Saccade => "saccade",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Phase for TrialPhase {
    fn allows_input(&self) -> bool {
        matches!(self, Self::Target)
    }

    fn next(&self) -> Option<Self> {
        use TrialPhase::*;
        Some(match self {
            Fixation => Cue,
            Cue => PostCueFixation,
            PostCueFixation => Saccade,
            Saccade => Target,
            Target => return None,
        })
    }

    fn is_running(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_phases_run_linearly_to_target() {
        let mut seen = vec![TrialPhase::default()];
        while let Some(next) = seen.last().and_then(|p| p.next()) {
            seen.push(next);
        }
        assert_eq!(
            seen,
            vec![
                TrialPhase::Fixation,
                TrialPhase::Cue,
                TrialPhase::PostCueFixation,
                TrialPhase::Saccade,
                TrialPhase::Target,
            ]
        );
    }

    #[test]
    fn only_target_accepts_responses() {
        assert!(TrialPhase::Target.allows_input());
        assert!(!TrialPhase::Saccade.allows_input());
        assert!(TrialPhase::PostCueFixation.holds_center());
        assert!(!TrialPhase::Saccade.holds_center());
    }

    #[test]
    fn block_break_returns_to_trials() {
        assert_eq!(SessionPhase::Welcome.next(), Some(SessionPhase::Trials));
        assert_eq!(SessionPhase::BlockBreak.next(), Some(SessionPhase::Trials));
        assert_eq!(SessionPhase::Debrief.next(), None);
        assert!(!SessionPhase::Debrief.allows_input());
    }
}
