use std::time::Duration;

use ior_core::{DerivedLocations, LocationError, TrialParameters};
use ior_timing::{EventLabel, EventSchedule};

use crate::config::TimingConfig;

/// A trial ready to run: its parameters plus the locations derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trial {
    pub block_num: usize,
    pub trial_num: usize,
    pub params: TrialParameters,
    pub locations: DerivedLocations,
}

impl Trial {
    pub fn new(
        block_num: usize,
        trial_num: usize,
        params: TrialParameters,
    ) -> Result<Self, LocationError> {
        Ok(Self {
            block_num,
            trial_num,
            params,
            locations: DerivedLocations::derive(&params)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialDurations {
    pub fixation: Duration,
    pub cue: Duration,
    pub cue_signal_isi: Duration,
    pub saccade_timeout: Duration,
    pub saccade_target_soa: Duration,
    pub response_timeout: Duration,
}

impl TrialDurations {
    pub fn schedule(&self) -> EventSchedule {
        EventSchedule::new()
            .then(EventLabel::CueOnset, self.fixation)
            .then(EventLabel::CueOffset, self.cue)
            .then(EventLabel::SaccadeSignalOnset, self.cue_signal_isi)
            .then(EventLabel::SaccadeTimeout, self.saccade_timeout)
    }
}

impl From<&TimingConfig> for TrialDurations {
    fn from(t: &TimingConfig) -> Self {
        Self {
            fixation: Duration::from_millis(t.fixation_ms),
            cue: Duration::from_millis(t.cue_ms),
            cue_signal_isi: Duration::from_millis(t.cue_signal_isi_ms),
            saccade_timeout: Duration::from_millis(t.saccade_timeout_ms),
            saccade_target_soa: Duration::from_millis(t.saccade_target_soa_ms),
            response_timeout: Duration::from_millis(t.response_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ior_core::{BlockCondition, PlaceholderId, SaccadeLoc};

    #[test]
    fn default_timing_builds_cumulative_schedule() {
        let schedule = TrialDurations::from(&TimingConfig::default()).schedule();
        let offsets: Vec<_> = schedule.iter().map(|(_, at)| at.as_millis()).collect();
        assert_eq!(offsets, vec![500, 800, 1100, 1700]);
    }

    #[test]
    fn trial_derives_locations_once() {
        let params = TrialParameters {
            saccade_loc: SaccadeLoc::Lower,
            cue_loc: PlaceholderId::new(5).unwrap(),
            target_loc: 4,
            block_condition: BlockCondition::Anti,
        };
        let trial = Trial::new(1, 3, params).unwrap();
        assert_eq!(trial.locations.target_location.get(), 6);
        assert_eq!(trial.locations.saccade_signal_loc, SaccadeLoc::Upper);
    }
}
