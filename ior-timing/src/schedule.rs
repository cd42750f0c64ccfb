use std::fmt;
use std::time::Duration;

use crate::timer::Timer;

/// Named moments in a trial, in the order they occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventLabel {
    CueOnset,
    CueOffset,
    SaccadeSignalOnset,
    SaccadeTimeout,
}

impl EventLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLabel::CueOnset => "cue_onset",
            EventLabel::CueOffset => "cue_offset",
            EventLabel::SaccadeSignalOnset => "saccade_signal_onset",
            EventLabel::SaccadeTimeout => "saccade_timeout",
        }
    }
}

impl fmt::Display for EventLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered event offsets from trial start. Each entry is registered as a
/// delay after the previous one and stored as the cumulative offset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSchedule {
    events: Vec<(EventLabel, Duration)>,
}

impl EventSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `label` at `delay` after the last registered event.
    pub fn then(mut self, label: EventLabel, delay: Duration) -> Self {
        let base = self.events.last().map_or(Duration::ZERO, |(_, at)| *at);
        self.events.push((label, base + delay));
        self
    }

    pub fn offset(&self, label: EventLabel) -> Option<Duration> {
        self.events
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, at)| *at)
    }

    /// Whether `label`'s offset has been reached after `elapsed`. Labels that
    /// were never scheduled never pass.
    pub fn passed(&self, label: EventLabel, elapsed: Duration) -> bool {
        self.offset(label).is_some_and(|at| elapsed >= at)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(EventLabel, Duration)> {
        self.events.iter()
    }
}

/// Per-trial event ticket service: a schedule anchored at a trial's start.
#[derive(Debug, Clone)]
pub struct TrialClock<T: Timer<Timestamp = u64>> {
    timer: T,
    start: u64,
    schedule: EventSchedule,
}

impl<T: Timer<Timestamp = u64>> TrialClock<T> {
    pub fn start(timer: T, schedule: EventSchedule) -> Self {
        let start = timer.now();
        Self {
            timer,
            start,
            schedule,
        }
    }

    pub fn now(&self) -> u64 {
        self.timer.now()
    }

    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed(self.start)
    }

    pub fn passed(&self, label: EventLabel) -> bool {
        self.schedule.passed(label, self.elapsed())
    }

    pub fn schedule(&self) -> &EventSchedule {
        &self.schedule
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualTimer;

    fn schedule() -> EventSchedule {
        EventSchedule::new()
            .then(EventLabel::CueOnset, Duration::from_millis(500))
            .then(EventLabel::CueOffset, Duration::from_millis(300))
            .then(EventLabel::SaccadeSignalOnset, Duration::from_millis(300))
            .then(EventLabel::SaccadeTimeout, Duration::from_millis(600))
    }

    #[test]
    fn offsets_are_cumulative() {
        let s = schedule();
        assert_eq!(s.offset(EventLabel::CueOnset), Some(Duration::from_millis(500)));
        assert_eq!(s.offset(EventLabel::CueOffset), Some(Duration::from_millis(800)));
        assert_eq!(
            s.offset(EventLabel::SaccadeSignalOnset),
            Some(Duration::from_millis(1100))
        );
        assert_eq!(
            s.offset(EventLabel::SaccadeTimeout),
            Some(Duration::from_millis(1700))
        );
    }

    #[test]
    fn unscheduled_label_never_passes() {
        let s = EventSchedule::new().then(EventLabel::CueOnset, Duration::from_millis(10));
        assert!(!s.passed(EventLabel::SaccadeTimeout, Duration::from_secs(60)));
    }

    #[test]
    fn clock_is_anchored_at_trial_start() {
        let timer = ManualTimer::new();
        timer.advance_ms(10_000);
        let clock = TrialClock::start(timer.clone(), schedule());
        assert!(!clock.passed(EventLabel::CueOnset));

        timer.advance_ms(499);
        assert!(!clock.passed(EventLabel::CueOnset));
        timer.advance_ms(1);
        assert!(clock.passed(EventLabel::CueOnset));
        assert!(!clock.passed(EventLabel::CueOffset));
        assert_eq!(clock.elapsed(), Duration::from_millis(500));
    }
}
