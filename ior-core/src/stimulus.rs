use ior_cache::intern_text;

use crate::location::{FixationPoint, PlaceholderId, SaccadeLoc};
use crate::phase::TrialPhase;

/// Defines stimuli and their render data
pub trait Stimulus: Clone + Send + Sync + std::fmt::Debug {
    fn cache_id(&self) -> usize;
    fn is_text(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub enum StimulusType {
    /// Square outline; cued placeholders get the thick stroke.
    Placeholder { cued: bool },
    FixationCross { cued: bool },
    /// Small annulus shown at the target placeholder.
    Target,
    Text { content: String },
}

impl Stimulus for StimulusType {
    fn cache_id(&self) -> usize {
        match self {
            StimulusType::Placeholder { cued: false } => 0,
            StimulusType::Placeholder { cued: true } => 1,
            StimulusType::FixationCross { cued: false } => 2,
            StimulusType::FixationCross { cued: true } => 3,
            StimulusType::Target => 4,
            StimulusType::Text { content } => Self::SHAPE_COUNT + intern_text(content),
        }
    }

    fn is_text(&self) -> bool {
        matches!(self, StimulusType::Text { .. })
    }
}

impl StimulusType {
    pub const SHAPE_COUNT: usize = 5;
}

/// Where a stimulus is drawn, resolved to pixels through a `Layout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Placeholder(PlaceholderId),
    Fixation(FixationPoint),
}

/// Everything on screen during one trial phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    /// Cue flag per placeholder, indexed by `PlaceholderId::slot`.
    pub placeholders: [bool; PlaceholderId::COUNT],
    /// Cue flag per fixation point, indexed by `FixationPoint::index`.
    pub fixations: [bool; 3],
    pub target: Option<PlaceholderId>,
}

impl DisplayState {
    /// Placeholders and fixations only, nothing cued.
    pub fn neutral() -> Self {
        Self {
            placeholders: [false; PlaceholderId::COUNT],
            fixations: [false; 3],
            target: None,
        }
    }

    /// The cue placeholder is thickened only in `Cue`, the saccade signal
    /// fixation only in `Saccade`, and the target appears only in `Target`
    /// once `target_visible` is set.
    pub fn compose(
        phase: TrialPhase,
        target_visible: bool,
        cue_loc: PlaceholderId,
        saccade_signal_loc: SaccadeLoc,
        target_location: PlaceholderId,
    ) -> Self {
        let mut state = Self::neutral();
        if phase == TrialPhase::Cue {
            state.placeholders[cue_loc.slot()] = true;
        }
        if phase == TrialPhase::Saccade {
            state.fixations[FixationPoint::from(saccade_signal_loc).index()] = true;
        }
        if phase == TrialPhase::Target && target_visible {
            state.target = Some(target_location);
        }
        state
    }

    pub fn stimuli(&self) -> impl Iterator<Item = (StimulusType, Anchor)> + '_ {
        let placeholders = PlaceholderId::all().map(|id| {
            (
                StimulusType::Placeholder {
                    cued: self.placeholders[id.slot()],
                },
                Anchor::Placeholder(id),
            )
        });
        let fixations = FixationPoint::ALL.into_iter().map(|p| {
            (
                StimulusType::FixationCross {
                    cued: self.fixations[p.index()],
                },
                Anchor::Fixation(p),
            )
        });
        let target = self
            .target
            .map(|id| (StimulusType::Target, Anchor::Placeholder(id)));
        placeholders.chain(fixations).chain(target)
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Anything that can put a trial's display on screen.
pub trait Presenter {
    fn present(&mut self, display: &DisplayState);
    /// Replaces the trial display with a full-screen message.
    fn show_message(&mut self, text: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> PlaceholderId {
        PlaceholderId::new(n).unwrap()
    }

    #[test]
    fn cue_is_drawn_only_during_cue_phase() {
        for phase in [
            TrialPhase::Fixation,
            TrialPhase::PostCueFixation,
            TrialPhase::Saccade,
            TrialPhase::Target,
        ] {
            let d = DisplayState::compose(phase, true, id(4), SaccadeLoc::Upper, id(3));
            assert!(d.placeholders.iter().all(|c| !c), "{phase:?}");
        }
        let d = DisplayState::compose(TrialPhase::Cue, false, id(4), SaccadeLoc::Upper, id(3));
        assert_eq!(
            d.placeholders,
            [false, false, false, true, false, false, false, false]
        );
        assert_eq!(d.fixations, [false; 3]);
        assert_eq!(d.target, None);
    }

    #[test]
    fn signal_fixation_is_cued_during_saccade() {
        let d = DisplayState::compose(TrialPhase::Saccade, false, id(4), SaccadeLoc::Lower, id(5));
        assert_eq!(d.fixations, [false, false, true]);
        assert_eq!(d.target, None);
    }

    #[test]
    fn target_waits_for_visibility() {
        let hidden = DisplayState::compose(TrialPhase::Target, false, id(4), SaccadeLoc::Lower, id(5));
        assert_eq!(hidden, DisplayState::neutral());
        let shown = DisplayState::compose(TrialPhase::Target, true, id(4), SaccadeLoc::Lower, id(5));
        assert_eq!(shown.target, Some(id(5)));
        assert_eq!(shown.stimuli().count(), 12);
        assert_eq!(
            shown.stimuli().last(),
            Some((StimulusType::Target, Anchor::Placeholder(id(5))))
        );
    }

    #[test]
    fn text_ids_follow_shapes() {
        let text = StimulusType::Text {
            content: "Too slow!".into(),
        };
        assert!(text.is_text());
        assert!(text.cache_id() >= StimulusType::SHAPE_COUNT);
        assert_eq!(StimulusType::Target.cache_id(), 4);
    }
}
