use ior_core::{AbortReason, DerivedLocations, FixationPoint, TrialPhase};

use crate::env::{EyeEvent, GazeOracle, ResponseKey, ResponseKeys};

const POSITION: &[EyeEvent] = &[EyeEvent::GazePosition];
const LANDING: &[EyeEvent] = &[EyeEvent::GazePosition, EyeEvent::SaccadeEnd];

/// Mutable facts about a running trial. Timestamps are timer nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrialState {
    pub phase: TrialPhase,
    pub saccade_made: bool,
    pub saccade_at: Option<u64>,
    pub target_onset: Option<u64>,
    pub abort: Option<AbortReason>,
}

impl TrialState {
    pub fn target_visible(&self) -> bool {
        self.target_onset.is_some()
    }

    /// Whether a keypress is a response rather than an anticipation.
    pub fn accepts_response(&self) -> bool {
        self.phase == TrialPhase::Target && self.target_visible()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conformance {
    Holding,
    /// Gaze reached the signalled fixation during the saccade phase.
    SaccadeLanded,
}

/// One per-frame behaviour check.
///
/// Keys are checked first, so an anticipatory press aborts with
/// `EarlyResponse` whatever the eyes are doing. Gaze is then tested against
/// the boundary the current phase requires: the centre while fixating, the
/// signalled point (then the wrong one) while saccading, and the signalled
/// point again while waiting for the target. Gaze that is in neither outer
/// boundary during the saccade phase is not a violation; only the saccade
/// deadline can turn that into `MissedSaccade`.
///
/// A state that already carries an abort reason returns it untouched
/// without polling anything.
pub fn monitor<E>(
    state: &TrialState,
    locations: &DerivedLocations,
    key: ResponseKey,
    env: &mut E,
) -> Result<Conformance, AbortReason>
where
    E: GazeOracle + ResponseKeys + ?Sized,
{
    if let Some(reason) = state.abort {
        return Err(reason);
    }
    if !state.accepts_response() && env.pressed(key) {
        return Err(AbortReason::EarlyResponse);
    }

    let signal = FixationPoint::from(locations.saccade_signal_loc);
    match state.phase {
        phase if phase.holds_center() => {
            if env.within(FixationPoint::Middle, POSITION) {
                Ok(Conformance::Holding)
            } else {
                Err(AbortReason::BrokeFixation)
            }
        }
        TrialPhase::Saccade => {
            if env.within(signal, LANDING) {
                Ok(Conformance::SaccadeLanded)
            } else if env.within(FixationPoint::from(locations.wrong_saccade_loc), LANDING) {
                Err(AbortReason::WrongSaccade)
            } else {
                Ok(Conformance::Holding)
            }
        }
        _ => {
            if env.within(signal, POSITION) {
                Ok(Conformance::Holding)
            } else {
                Err(AbortReason::BrokeFixation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ior_core::{PlaceholderId, SaccadeLoc};

    /// Gaze parked on one fixation point (or nowhere), plus a key latch.
    struct Probe {
        gaze: Option<FixationPoint>,
        key_down: bool,
        queried: Vec<(FixationPoint, Vec<EyeEvent>)>,
    }

    impl Probe {
        fn at(gaze: Option<FixationPoint>) -> Self {
            Self {
                gaze,
                key_down: false,
                queried: Vec::new(),
            }
        }
    }

    impl GazeOracle for Probe {
        fn within(&mut self, point: FixationPoint, events: &[EyeEvent]) -> bool {
            self.queried.push((point, events.to_vec()));
            self.gaze == Some(point)
        }
    }

    impl ResponseKeys for Probe {
        fn pressed(&mut self, _key: ResponseKey) -> bool {
            std::mem::take(&mut self.key_down)
        }
    }

    fn locations() -> DerivedLocations {
        DerivedLocations {
            saccade_signal_loc: SaccadeLoc::Upper,
            wrong_saccade_loc: SaccadeLoc::Lower,
            target_location: PlaceholderId::new(3).unwrap(),
        }
    }

    fn in_phase(phase: TrialPhase) -> TrialState {
        TrialState {
            phase,
            ..TrialState::default()
        }
    }

    #[test]
    fn centre_must_hold_through_cue() {
        for phase in [TrialPhase::Fixation, TrialPhase::Cue, TrialPhase::PostCueFixation] {
            let mut ok = Probe::at(Some(FixationPoint::Middle));
            assert_eq!(
                monitor(&in_phase(phase), &locations(), ResponseKey::Space, &mut ok),
                Ok(Conformance::Holding)
            );
            assert_eq!(ok.queried, vec![(FixationPoint::Middle, POSITION.to_vec())]);

            let mut away = Probe::at(Some(FixationPoint::Upper));
            assert_eq!(
                monitor(&in_phase(phase), &locations(), ResponseKey::Space, &mut away),
                Err(AbortReason::BrokeFixation)
            );
        }
    }

    #[test]
    fn keypress_beats_gaze_before_target() {
        let mut probe = Probe::at(Some(FixationPoint::Middle));
        probe.key_down = true;
        assert_eq!(
            monitor(&in_phase(TrialPhase::Cue), &locations(), ResponseKey::Space, &mut probe),
            Err(AbortReason::EarlyResponse)
        );
        assert!(probe.queried.is_empty());
    }

    #[test]
    fn saccade_phase_distinguishes_landing_sites() {
        let state = in_phase(TrialPhase::Saccade);
        let mut right = Probe::at(Some(FixationPoint::Upper));
        assert_eq!(
            monitor(&state, &locations(), ResponseKey::Space, &mut right),
            Ok(Conformance::SaccadeLanded)
        );
        assert_eq!(right.queried[0].1, LANDING.to_vec());

        let mut wrong = Probe::at(Some(FixationPoint::Lower));
        assert_eq!(
            monitor(&state, &locations(), ResponseKey::Space, &mut wrong),
            Err(AbortReason::WrongSaccade)
        );

        for gaze in [Some(FixationPoint::Middle), None] {
            let mut undecided = Probe::at(gaze);
            assert_eq!(
                monitor(&state, &locations(), ResponseKey::Space, &mut undecided),
                Ok(Conformance::Holding)
            );
        }
    }

    #[test]
    fn target_phase_holds_the_signalled_point() {
        let waiting = in_phase(TrialPhase::Target);
        let mut drifted = Probe::at(Some(FixationPoint::Middle));
        assert_eq!(
            monitor(&waiting, &locations(), ResponseKey::Space, &mut drifted),
            Err(AbortReason::BrokeFixation)
        );

        // Before the target is drawn a press is still an anticipation.
        let mut eager = Probe::at(Some(FixationPoint::Upper));
        eager.key_down = true;
        assert_eq!(
            monitor(&waiting, &locations(), ResponseKey::Space, &mut eager),
            Err(AbortReason::EarlyResponse)
        );

        let shown = TrialState {
            target_onset: Some(1),
            ..waiting
        };
        let mut responding = Probe::at(Some(FixationPoint::Upper));
        responding.key_down = true;
        assert_eq!(
            monitor(&shown, &locations(), ResponseKey::Space, &mut responding),
            Ok(Conformance::Holding)
        );
        assert!(responding.key_down, "key left for the response collector");
    }

    #[test]
    fn aborted_state_is_terminal() {
        let state = TrialState {
            abort: Some(AbortReason::WrongSaccade),
            ..in_phase(TrialPhase::Saccade)
        };
        let mut probe = Probe::at(Some(FixationPoint::Upper));
        probe.key_down = true;
        assert_eq!(
            monitor(&state, &locations(), ResponseKey::Space, &mut probe),
            Err(AbortReason::WrongSaccade)
        );
        assert!(probe.queried.is_empty());
        assert!(probe.key_down);
    }
}
