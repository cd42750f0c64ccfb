//! Capabilities a trial borrows from its host: eye tracker, keyboard,
//! response timing, display and error storage.

use std::time::Duration;

use ior_core::{ErrorRecord, FixationPoint, Presenter};
use serde::{Deserialize, Serialize};

/// Kinds of eye-tracker event a boundary test may consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EyeEvent {
    /// Latest raw gaze sample.
    GazePosition,
    /// Landing point of the most recent saccade.
    SaccadeEnd,
}

pub trait GazeOracle {
    /// Whether gaze currently satisfies the boundary around `point`, judged
    /// on the listed event kinds only.
    fn within(&mut self, point: FixationPoint, events: &[EyeEvent]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKey {
    #[default]
    Space,
    Enter,
}

impl ResponseKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKey::Space => "space",
            ResponseKey::Enter => "enter",
        }
    }
}

pub trait ResponseKeys {
    /// Whether `key` went down since the previous poll.
    fn pressed(&mut self, key: ResponseKey) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponsePoll {
    Pending,
    Responded { rt: Duration },
    Expired,
}

pub trait ResponseCollector {
    /// Arms collection; RT is measured from this call.
    fn begin(&mut self, key: ResponseKey, window: Duration);
    fn poll(&mut self) -> ResponsePoll;
}

pub trait ErrorSink {
    fn persist(&mut self, record: &ErrorRecord) -> anyhow::Result<()>;
}

impl ErrorSink for Vec<ErrorRecord> {
    fn persist(&mut self, record: &ErrorRecord) -> anyhow::Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Everything a running trial talks to, bundled.
pub trait TrialEnvironment: GazeOracle + ResponseKeys + ResponseCollector + Presenter {}

impl<E> TrialEnvironment for E where E: GazeOracle + ResponseKeys + ResponseCollector + Presenter {}
