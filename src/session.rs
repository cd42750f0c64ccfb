use std::time::Duration;

use anyhow::Result;
use ior_core::{BlockCondition, DisplayState, Phase, SessionPhase, TrialPhase, TrialResult};
use ior_experiment::{
    BlockRunner, ConfigError, ErrorSink, ExperimentConfig, ResponseKey, Tick, TrialDurations,
    TrialEnvironment, TrialMachine,
};
use ior_timing::Timer;
use rand::Rng;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pause {
    /// Admonishment after an abort.
    Feedback,
    /// Neutral display between trials.
    Iti,
}

/// Drives a whole session, one call to [`Session::frame`] per display frame.
/// The participant presses the response key to leave the welcome and break
/// screens; everything else is timed.
pub struct Session<T: Timer<Timestamp = u64>, R: Rng, S: ErrorSink> {
    phase: SessionPhase,
    runner: BlockRunner<R>,
    sink: S,
    timer: T,
    durations: TrialDurations,
    key: ResponseKey,
    feedback: Duration,
    iti: Duration,
    trial: Option<TrialMachine<T>>,
    pause: Option<(Pause, u64)>,
}

impl<T: Timer<Timestamp = u64>, R: Rng, S: ErrorSink> Session<T, R, S> {
    pub fn new(config: &ExperimentConfig, timer: T, rng: R, sink: S) -> Result<Self, ConfigError> {
        Ok(Self {
            phase: SessionPhase::default(),
            runner: BlockRunner::new(&config.session, rng)?,
            sink,
            timer,
            durations: TrialDurations::from(&config.timing),
            key: config.session.response_key,
            feedback: Duration::from_millis(config.timing.feedback_ms),
            iti: Duration::from_millis(config.timing.inter_trial_interval_ms),
            trial: None,
            pause: None,
        })
    }

    /// Puts the welcome screen up.
    pub fn start<E: TrialEnvironment + ?Sized>(&mut self, env: &mut E) {
        let text = welcome_text(self.runner.next_condition(), self.key);
        env.show_message(&text);
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn trial_phase(&self) -> Option<TrialPhase> {
        self.trial.as_ref().map(|t| t.phase())
    }

    pub fn results(&self) -> &[TrialResult] {
        self.runner.results()
    }

    pub fn frame<E: TrialEnvironment + ?Sized>(&mut self, env: &mut E) -> Result<SessionPhase> {
        match self.phase {
            phase if phase.is_running() => self.run_trials(env)?,
            phase if phase.allows_input() => {
                if env.pressed(self.key) {
                    self.begin_block(env)?;
                }
            }
            _ => {}
        }
        Ok(self.phase)
    }

    fn begin_block<E: TrialEnvironment + ?Sized>(&mut self, env: &mut E) -> Result<()> {
        match self.runner.start_next_block()? {
            Some(_) => {
                self.phase = SessionPhase::Trials;
                self.next_trial(env);
            }
            None => self.finish(env),
        }
        Ok(())
    }

    fn run_trials<E: TrialEnvironment + ?Sized>(&mut self, env: &mut E) -> Result<()> {
        if let Some((pause, until)) = self.pause {
            // presses during a pause belong to no trial
            while env.pressed(self.key) {}
            if self.timer.now() < until {
                return Ok(());
            }
            match pause {
                Pause::Feedback => self.pause_for(Pause::Iti, env),
                Pause::Iti => {
                    self.pause = None;
                    self.next_trial(env);
                }
            }
            return Ok(());
        }

        let Some(machine) = self.trial.as_mut() else {
            self.next_trial(env);
            return Ok(());
        };
        if let Tick::Finished(outcome) = machine.tick(env) {
            self.trial = None;
            match self.runner.record(outcome, env, &mut self.sink)? {
                Some(_) => self.pause_for(Pause::Feedback, env),
                None => self.pause_for(Pause::Iti, env),
            }
        }
        Ok(())
    }

    fn pause_for<E: TrialEnvironment + ?Sized>(&mut self, pause: Pause, env: &mut E) {
        let length = match pause {
            Pause::Feedback => self.feedback,
            Pause::Iti => {
                env.present(&DisplayState::neutral());
                self.iti
            }
        };
        self.pause = Some((pause, self.timer.now() + length.as_nanos() as u64));
    }

    fn next_trial<E: TrialEnvironment + ?Sized>(&mut self, env: &mut E) {
        match self.runner.next_trial() {
            Some(trial) => {
                let (current, total) = self.runner.progress();
                debug!(current, total, "next trial");
                self.trial = Some(TrialMachine::start(
                    trial,
                    self.timer.clone(),
                    self.durations.clone(),
                    self.key,
                    env,
                ));
            }
            None => self.end_block(env),
        }
    }

    fn end_block<E: TrialEnvironment + ?Sized>(&mut self, env: &mut E) {
        let block = self.runner.block_num();
        info!(
            block,
            aborts = self.runner.aborts_in_block(),
            completed = self.runner.results().len(),
            "block finished"
        );
        match self.runner.next_condition() {
            Some(next) => {
                self.phase = SessionPhase::BlockBreak;
                let text = break_text(block, self.runner.total_blocks(), next, self.key);
                env.show_message(&text);
            }
            None => self.finish(env),
        }
    }

    fn finish<E: TrialEnvironment + ?Sized>(&mut self, env: &mut E) {
        self.phase = SessionPhase::Debrief;
        info!(trials = self.runner.results().len(), "session finished");
        env.show_message("The session is complete.\nThank you for taking part!");
    }
}

fn instructions(condition: BlockCondition) -> &'static str {
    match condition {
        BlockCondition::Pro => "When a cross above or below thickens,\nlook at that cross.",
        BlockCondition::Anti => {
            "When a cross above or below thickens,\nlook at the cross on the opposite side."
        }
    }
}

fn welcome_text(first: Option<BlockCondition>, key: ResponseKey) -> String {
    let how = first.map(instructions).unwrap_or_default();
    format!(
        "Keep your eyes on the centre cross.\n{how}\nThen press {} as soon as the circle appears.\n\nPress {} to begin.",
        key.as_str(),
        key.as_str()
    )
}

fn break_text(done: usize, total: usize, next: BlockCondition, key: ResponseKey) -> String {
    format!(
        "Block {done} of {total} complete. Take a short break.\n\nNext block:\n{}\n\nPress {} to continue.",
        instructions(next),
        key.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ior_core::{AbortReason, ErrorRecord, FixationPoint, Presenter, SaccadeLoc};
    use ior_experiment::{EyeEvent, GazeOracle, ResponseCollector, ResponseKeys, ResponsePoll};
    use ior_timing::ManualTimer;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// A compliant participant: looks wherever the display signals and
    /// answers every target after a fixed delay.
    struct Participant {
        timer: ManualTimer,
        gaze: FixationPoint,
        presses: u32,
        armed_at: Option<u64>,
        messages: Vec<String>,
    }

    impl Participant {
        fn new(timer: &ManualTimer) -> Self {
            Self {
                timer: timer.clone(),
                gaze: FixationPoint::Middle,
                presses: 0,
                armed_at: None,
                messages: Vec::new(),
            }
        }
    }

    impl GazeOracle for Participant {
        fn within(&mut self, point: FixationPoint, _: &[EyeEvent]) -> bool {
            self.gaze == point
        }
    }

    impl ResponseKeys for Participant {
        fn pressed(&mut self, _: ResponseKey) -> bool {
            let down = self.presses > 0;
            self.presses = self.presses.saturating_sub(1);
            down
        }
    }

    impl ResponseCollector for Participant {
        fn begin(&mut self, _: ResponseKey, _: Duration) {
            self.armed_at = Some(self.timer.now());
        }

        fn poll(&mut self) -> ResponsePoll {
            match self.armed_at {
                Some(at) if self.timer.elapsed(at) >= Duration::from_millis(350) => {
                    self.armed_at = None;
                    self.gaze = FixationPoint::Middle;
                    ResponsePoll::Responded {
                        rt: Duration::from_millis(350),
                    }
                }
                _ => ResponsePoll::Pending,
            }
        }
    }

    impl Presenter for Participant {
        fn present(&mut self, display: &DisplayState) {
            if let Some(i) = display.fixations.iter().position(|cued| *cued) {
                self.gaze = FixationPoint::ALL[i];
            }
        }

        fn show_message(&mut self, text: &str) {
            self.gaze = FixationPoint::Middle;
            self.messages.push(text.to_owned());
        }
    }

    fn config() -> ExperimentConfig {
        let mut config = ExperimentConfig::default();
        config.session.saccade_locs = vec![SaccadeLoc::Upper];
        config.session.cue_locs = vec![3];
        config.session.target_locs = vec![1, 2];
        config
    }

    type TestSession = Session<ManualTimer, StdRng, Vec<ErrorRecord>>;

    fn session(timer: &ManualTimer) -> TestSession {
        Session::new(&config(), timer.clone(), StdRng::seed_from_u64(11), Vec::new()).unwrap()
    }

    /// Runs frames of 1ms until `phase` is reached, pressing the key on
    /// input screens.
    fn run_until(
        s: &mut TestSession,
        p: &mut Participant,
        timer: &ManualTimer,
        phase: SessionPhase,
    ) {
        for _ in 0..200_000 {
            if s.phase() == phase {
                return;
            }
            if !s.phase().is_running() && s.phase().allows_input() {
                p.presses = 1;
            }
            s.frame(p).unwrap();
            timer.advance_ms(1);
        }
        panic!("never reached {phase:?}");
    }

    #[test]
    fn session_walks_every_screen() {
        let timer = ManualTimer::new();
        let mut p = Participant::new(&timer);
        let mut s = session(&timer);
        s.start(&mut p);
        assert!(p.messages[0].contains("look at that cross"));
        assert_eq!(s.phase(), SessionPhase::Welcome);

        run_until(&mut s, &mut p, &timer, SessionPhase::BlockBreak);
        assert_eq!(s.results().len(), 2);
        let last = p.messages.last().unwrap();
        assert!(last.contains("Block 1 of 2"));
        assert!(last.contains("opposite side"));

        run_until(&mut s, &mut p, &timer, SessionPhase::Debrief);
        assert_eq!(s.results().len(), 4);
        assert!(s.results().iter().all(|r| r.responded));
        let conditions: Vec<_> = s.results().iter().map(|r| r.block_condition).collect();
        assert_eq!(
            conditions,
            vec![
                BlockCondition::Pro,
                BlockCondition::Pro,
                BlockCondition::Anti,
                BlockCondition::Anti
            ]
        );
        assert!(p.messages.last().unwrap().contains("Thank you"));

        // nothing moves once debriefed
        p.presses = 5;
        assert_eq!(s.frame(&mut p).unwrap(), SessionPhase::Debrief);
    }

    #[test]
    fn abort_shows_feedback_then_retries() {
        let timer = ManualTimer::new();
        let mut p = Participant::new(&timer);
        let mut s = session(&timer);
        s.start(&mut p);
        p.presses = 1;
        s.frame(&mut p).unwrap();
        assert_eq!(s.trial_phase(), Some(TrialPhase::Fixation));

        // anticipatory press
        p.presses = 1;
        timer.advance_ms(10);
        s.frame(&mut p).unwrap();
        assert_eq!(s.trial_phase(), None);
        assert_eq!(
            p.messages.last().map(String::as_str),
            Some(AbortReason::EarlyResponse.message())
        );
        assert_eq!(s.sink.len(), 1);

        // still in feedback a moment later, key presses ignored
        timer.advance_ms(500);
        p.presses = 3;
        s.frame(&mut p).unwrap();
        assert_eq!(s.trial_phase(), None);
        assert_eq!(p.presses, 0);

        run_until(&mut s, &mut p, &timer, SessionPhase::BlockBreak);
        assert_eq!(s.results().len(), 2);
        assert_eq!(s.sink.len(), 1);
    }
}
