use std::collections::VecDeque;

use anyhow::Context;
use ior_core::{
    AbortReason, BlockCondition, LocationError, PlaceholderId, Presenter, SaccadeLoc,
    TrialParameters, TrialResult,
};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::config::{ConfigError, SessionConfig};
use crate::env::ErrorSink;
use crate::state::TrialOutcome;
use crate::trial::Trial;

/// Independent variables crossed within every block.
#[derive(Debug, Clone, PartialEq)]
pub struct Factors {
    pub saccade_locs: Vec<SaccadeLoc>,
    pub cue_locs: Vec<PlaceholderId>,
    pub target_locs: Vec<u8>,
    pub repetitions: usize,
}

impl Factors {
    pub fn from_session(session: &SessionConfig) -> Result<Self, ConfigError> {
        let cue_locs = session
            .cue_locs
            .iter()
            .map(|c| {
                PlaceholderId::new(*c)
                    .ok_or_else(|| ConfigError::Invalid(format!("cue_loc {c} is not a placeholder")))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            saccade_locs: session.saccade_locs.clone(),
            cue_locs,
            target_locs: session.target_locs.clone(),
            repetitions: session.repetitions,
        })
    }

    pub fn trials_per_block(&self) -> usize {
        self.saccade_locs.len() * self.cue_locs.len() * self.target_locs.len() * self.repetitions
    }

    /// Full crossing for `condition`, in factor order.
    pub fn crossed(&self, condition: BlockCondition) -> Vec<TrialParameters> {
        let mut out = Vec::with_capacity(self.trials_per_block());
        for _ in 0..self.repetitions {
            for &saccade_loc in &self.saccade_locs {
                for &cue_loc in &self.cue_locs {
                    for &target_loc in &self.target_locs {
                        out.push(TrialParameters {
                            saccade_loc,
                            cue_loc,
                            target_loc,
                            block_condition: condition,
                        });
                    }
                }
            }
        }
        out
    }
}

/// Runs blocks of trials in order. Aborted trials go back into the current
/// block at a random position among the trials still waiting, so a block
/// ends only when every parameter set has a completed result.
pub struct BlockRunner<R: Rng> {
    rng: R,
    participant_id: String,
    factors: Factors,
    blocks: VecDeque<BlockCondition>,
    block_num: usize,
    condition: Option<BlockCondition>,
    queue: VecDeque<Trial>,
    in_flight: Option<Trial>,
    completed_in_block: usize,
    aborts_in_block: usize,
    results: Vec<TrialResult>,
}

impl<R: Rng> BlockRunner<R> {
    pub fn new(session: &SessionConfig, rng: R) -> Result<Self, ConfigError> {
        Ok(Self {
            rng,
            participant_id: session.participant_id.clone(),
            factors: Factors::from_session(session)?,
            blocks: session.blocks.iter().copied().collect(),
            block_num: 0,
            condition: None,
            queue: VecDeque::new(),
            in_flight: None,
            completed_in_block: 0,
            aborts_in_block: 0,
            results: Vec::new(),
        })
    }

    /// Starts the next block, if any remain, with a freshly shuffled list.
    pub fn start_next_block(&mut self) -> Result<Option<BlockCondition>, LocationError> {
        let Some(condition) = self.blocks.pop_front() else {
            self.condition = None;
            return Ok(None);
        };
        let block_num = self.block_num + 1;
        let mut trials = self
            .factors
            .crossed(condition)
            .into_iter()
            .map(|params| Trial::new(block_num, 0, params))
            .collect::<Result<Vec<_>, _>>()?;
        trials.shuffle(&mut self.rng);

        self.block_num = block_num;
        self.condition = Some(condition);
        self.queue = trials.into();
        self.in_flight = None;
        self.completed_in_block = 0;
        self.aborts_in_block = 0;
        info!(
            block = self.block_num,
            condition = %condition,
            trials = self.queue.len(),
            "block started"
        );
        Ok(Some(condition))
    }

    /// Pops the next trial of the current block. Trial numbers count
    /// completed trials, so a requeued trial's number is reused.
    pub fn next_trial(&mut self) -> Option<Trial> {
        let trial = Trial {
            trial_num: self.completed_in_block + 1,
            ..self.queue.pop_front()?
        };
        self.in_flight = Some(trial);
        Some(trial)
    }

    /// Files a finished trial. On abort the participant sees the matching
    /// admonishment, the error is persisted, and the parameters are requeued.
    pub fn record<P, S>(
        &mut self,
        outcome: TrialOutcome,
        presenter: &mut P,
        sink: &mut S,
    ) -> anyhow::Result<Option<AbortReason>>
    where
        P: Presenter + ?Sized,
        S: ErrorSink + ?Sized,
    {
        self.in_flight = None;
        match outcome {
            Ok(result) => {
                self.completed_in_block += 1;
                self.results.push(result);
                Ok(None)
            }
            Err(aborted) => {
                presenter.show_message(aborted.reason.message());
                sink.persist(&aborted.record(&self.participant_id))
                    .with_context(|| format!("persisting {aborted}"))?;
                let at = self.rng.random_range(0..=self.queue.len());
                self.queue.insert(at, aborted.trial);
                self.aborts_in_block += 1;
                warn!(
                    block = self.block_num,
                    reason = aborted.reason.as_str(),
                    requeued_at = at,
                    remaining = self.queue.len(),
                    "trial requeued"
                );
                Ok(Some(aborted.reason))
            }
        }
    }

    pub fn block_done(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_none()
    }

    pub fn has_more_blocks(&self) -> bool {
        !self.blocks.is_empty()
    }

    /// Condition of the block `start_next_block` would start.
    pub fn next_condition(&self) -> Option<BlockCondition> {
        self.blocks.front().copied()
    }

    pub fn total_blocks(&self) -> usize {
        self.block_num + self.blocks.len()
    }

    pub fn block_num(&self) -> usize {
        self.block_num
    }

    pub fn condition(&self) -> Option<BlockCondition> {
        self.condition
    }

    pub fn remaining_in_block(&self) -> usize {
        self.queue.len()
    }

    pub fn aborts_in_block(&self) -> usize {
        self.aborts_in_block
    }

    /// Progress through the current block as (current trial, block size).
    pub fn progress(&self) -> (usize, usize) {
        (self.completed_in_block + 1, self.factors.trials_per_block())
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn default_design_crosses_48_trials() {
        let factors = Factors::from_session(&SessionConfig::default()).unwrap();
        let trials = factors.crossed(BlockCondition::Pro);
        assert_eq!(trials.len(), 48);
        assert_eq!(factors.trials_per_block(), 48);
        let unique: HashSet<_> = trials.iter().collect();
        assert_eq!(unique.len(), 48);
        assert!(trials.iter().all(|t| t.block_condition == BlockCondition::Pro));
    }

    #[test]
    fn blocks_run_in_configured_order() {
        let mut runner = BlockRunner::new(&SessionConfig::default(), StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(runner.next_condition(), Some(BlockCondition::Pro));
        assert_eq!(runner.total_blocks(), 2);
        assert_eq!(runner.start_next_block().unwrap(), Some(BlockCondition::Pro));
        assert_eq!(runner.next_condition(), Some(BlockCondition::Anti));
        assert_eq!(runner.total_blocks(), 2);
        assert!(runner.has_more_blocks());
        assert_eq!(runner.start_next_block().unwrap(), Some(BlockCondition::Anti));
        assert_eq!(runner.block_num(), 2);
        assert_eq!(runner.start_next_block().unwrap(), None);
        assert_eq!(runner.condition(), None);
    }

    #[test]
    fn next_trial_numbers_follow_completions() {
        let mut runner = BlockRunner::new(&SessionConfig::default(), StdRng::seed_from_u64(7)).unwrap();
        runner.start_next_block().unwrap();
        let first = runner.next_trial().unwrap();
        assert_eq!((first.block_num, first.trial_num), (1, 1));
        assert_eq!(runner.remaining_in_block(), 47);
        assert!(!runner.block_done());
    }
}
