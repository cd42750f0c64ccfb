use std::time::Duration;

use ior_core::{AbortReason, DisplayState, ErrorRecord, Phase, Presenter, TrialPhase, TrialResult};
use ior_timing::{EventLabel, Timer, TrialClock};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::env::{ResponseKey, ResponsePoll, TrialEnvironment};
use super::monitor::{Conformance, TrialState, monitor};
use super::trial::{Trial, TrialDurations};

/// A trial ended by participant behaviour. Carries enough context to log
/// it and to put the same parameters back in the queue.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "trial {} of block {} aborted during {phase}: {reason}",
    .trial.trial_num,
    .trial.block_num
)]
pub struct TrialAborted {
    pub reason: AbortReason,
    pub phase: TrialPhase,
    pub trial: Trial,
    pub elapsed: Duration,
}

impl TrialAborted {
    pub fn record(&self, participant_id: &str) -> ErrorRecord {
        let p = &self.trial.params;
        ErrorRecord {
            participant_id: participant_id.to_owned(),
            block_num: self.trial.block_num,
            trial_num: self.trial.trial_num,
            block_condition: p.block_condition,
            saccade_loc: p.saccade_loc,
            cue_loc: p.cue_loc,
            target_loc: p.target_loc,
            target_location: self.trial.locations.target_location,
            phase: self.phase,
            reason: self.reason,
            elapsed_ms: self.elapsed.as_secs_f64() * 1e3,
        }
    }
}

pub type TrialOutcome = Result<TrialResult, TrialAborted>;

#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    Running(TrialPhase),
    Finished(TrialOutcome),
}

/// Steps one trial through fixation, cue, post-cue fixation, saccade and
/// target, one call to [`TrialMachine::tick`] per frame.
pub struct TrialMachine<T: Timer<Timestamp = u64>> {
    trial: Trial,
    clock: TrialClock<T>,
    durations: TrialDurations,
    key: ResponseKey,
    state: TrialState,
    finished: Option<TrialOutcome>,
}

impl<T: Timer<Timestamp = u64>> TrialMachine<T> {
    /// Anchors the schedule at the current time and draws the fixation display.
    pub fn start<P: Presenter + ?Sized>(
        trial: Trial,
        timer: T,
        durations: TrialDurations,
        key: ResponseKey,
        presenter: &mut P,
    ) -> Self {
        let clock = TrialClock::start(timer, durations.schedule());
        let machine = Self {
            trial,
            clock,
            durations,
            key,
            state: TrialState::default(),
            finished: None,
        };
        info!(
            block = trial.block_num,
            trial = trial.trial_num,
            condition = %trial.params.block_condition,
            saccade_loc = %trial.params.saccade_loc,
            cue_loc = %trial.params.cue_loc,
            target_location = %trial.locations.target_location,
            "trial started"
        );
        presenter.present(&machine.display());
        machine
    }

    pub fn trial(&self) -> &Trial {
        &self.trial
    }

    pub fn state(&self) -> &TrialState {
        &self.state
    }

    pub fn phase(&self) -> TrialPhase {
        self.state.phase
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    pub fn display(&self) -> DisplayState {
        DisplayState::compose(
            self.state.phase,
            self.state.target_visible(),
            self.trial.params.cue_loc,
            self.trial.locations.saccade_signal_loc,
            self.trial.locations.target_location,
        )
    }

    /// Advances the trial by one frame. Once finished, keeps returning the
    /// same outcome without touching the environment.
    pub fn tick<E: TrialEnvironment + ?Sized>(&mut self, env: &mut E) -> Tick {
        if let Some(done) = &self.finished {
            return Tick::Finished(done.clone());
        }
        let outcome = match self.step(env) {
            Ok(None) => return Tick::Running(self.state.phase),
            Ok(Some(result)) => {
                info!(
                    block = result.block_num,
                    trial = result.trial_num,
                    rt_ms = ?result.rt_ms,
                    "trial completed"
                );
                Ok(result)
            }
            Err(reason) => Err(self.abort(reason)),
        };
        self.finished = Some(outcome.clone());
        Tick::Finished(outcome)
    }

    /// Ticks until the trial finishes, sleeping `frame` between ticks.
    pub fn run<E: TrialEnvironment + ?Sized>(
        mut self,
        env: &mut E,
        frame: Duration,
    ) -> TrialOutcome {
        loop {
            match self.tick(env) {
                Tick::Finished(outcome) => return outcome,
                Tick::Running(_) => self.clock.timer().sleep(frame),
            }
        }
    }

    fn step<E: TrialEnvironment + ?Sized>(
        &mut self,
        env: &mut E,
    ) -> Result<Option<TrialResult>, AbortReason> {
        self.advance_scheduled(env);
        match self.state.phase {
            TrialPhase::Saccade => {
                if self.clock.passed(EventLabel::SaccadeTimeout) {
                    return Err(AbortReason::MissedSaccade);
                }
                let check = monitor(&self.state, &self.trial.locations, self.key, env)?;
                if check == Conformance::SaccadeLanded {
                    self.state.saccade_made = true;
                    self.state.saccade_at = Some(self.clock.now());
                    self.enter(TrialPhase::Target, env);
                }
                Ok(None)
            }
            TrialPhase::Target => self.step_target(env),
            _ => {
                monitor(&self.state, &self.trial.locations, self.key, env)?;
                Ok(None)
            }
        }
    }

    /// Moves through every time-gated transition whose deadline has passed.
    fn advance_scheduled<E: TrialEnvironment + ?Sized>(&mut self, env: &mut E) {
        loop {
            let gate = match self.state.phase {
                TrialPhase::Fixation => EventLabel::CueOnset,
                TrialPhase::Cue => EventLabel::CueOffset,
                TrialPhase::PostCueFixation => EventLabel::SaccadeSignalOnset,
                TrialPhase::Saccade | TrialPhase::Target => return,
            };
            if !self.clock.passed(gate) {
                return;
            }
            match self.state.phase.next() {
                Some(next) => self.enter(next, env),
                None => return,
            }
        }
    }

    fn step_target<E: TrialEnvironment + ?Sized>(
        &mut self,
        env: &mut E,
    ) -> Result<Option<TrialResult>, AbortReason> {
        monitor(&self.state, &self.trial.locations, self.key, env)?;

        let now = self.clock.now();
        let saccade_at = *self.state.saccade_at.get_or_insert(now);
        let since_saccade = Duration::from_nanos(now.saturating_sub(saccade_at));

        if !self.state.target_visible() {
            if since_saccade >= self.durations.saccade_target_soa {
                self.state.target_onset = Some(now);
                env.present(&self.display());
                let window = self.durations.response_timeout.saturating_sub(since_saccade);
                env.begin(self.key, window);
                debug!(window_ms = window.as_millis() as u64, "target presented");
            }
            return Ok(None);
        }

        match env.poll() {
            ResponsePoll::Responded { rt } => Ok(Some(self.result(Some(rt)))),
            ResponsePoll::Expired => Ok(Some(self.result(None))),
            ResponsePoll::Pending if since_saccade >= self.durations.response_timeout => {
                Ok(Some(self.result(None)))
            }
            ResponsePoll::Pending => Ok(None),
        }
    }

    fn enter<P: Presenter + ?Sized>(&mut self, phase: TrialPhase, presenter: &mut P) {
        debug!(
            from = %self.state.phase,
            to = %phase,
            elapsed_ms = self.clock.elapsed().as_millis() as u64,
            "phase transition"
        );
        self.state.phase = phase;
        presenter.present(&self.display());
    }

    fn abort(&mut self, reason: AbortReason) -> TrialAborted {
        self.state.abort.get_or_insert(reason);
        let aborted = TrialAborted {
            reason,
            phase: self.state.phase,
            trial: self.trial,
            elapsed: self.clock.elapsed(),
        };
        warn!(
            block = self.trial.block_num,
            trial = self.trial.trial_num,
            phase = %aborted.phase,
            reason = reason.as_str(),
            "trial aborted"
        );
        aborted
    }

    fn result(&self, rt: Option<Duration>) -> TrialResult {
        let p = &self.trial.params;
        TrialResult {
            block_num: self.trial.block_num,
            trial_num: self.trial.trial_num,
            block_condition: p.block_condition,
            saccade_loc: p.saccade_loc,
            saccade_signal_loc: self.trial.locations.saccade_signal_loc,
            cue_loc: p.cue_loc,
            target_loc: p.target_loc,
            target_location: self.trial.locations.target_location,
            responded: rt.is_some(),
            rt_ms: rt.map(|d| d.as_secs_f64() * 1e3),
        }
    }
}
