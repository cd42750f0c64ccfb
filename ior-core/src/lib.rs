pub mod layout;
pub mod location;
pub mod phase;
pub mod stimulus;
pub mod trial;

pub use layout::{Boundary, Layout};
pub use location::{BlockCondition, FixationPoint, PlaceholderId, SaccadeLoc};
pub use phase::{Phase, SessionPhase, TrialPhase};
pub use stimulus::{Anchor, DisplayState, Presenter, Stimulus, StimulusType};
pub use trial::{
    AbortReason, DerivedLocations, ErrorRecord, LocationError, TrialParameters, TrialResult,
};
