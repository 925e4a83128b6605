//! Round-robin turn scheduling.
//!
//! The scheduler only counts: which speaker is next, how many turns have been taken, when a
//! round completes and whether the moderator is due. The arena drives it after every append.

use serde::{Deserialize, Serialize};

/// When the moderator is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationPeriod {
    /// After every individual turn.
    Turn,
    /// After every speaker has spoken once.
    #[default]
    Round,
}

/// What happened when a turn was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnCompletion {
    /// Number of turns taken so far, this one included.
    pub turns_taken: usize,
    pub round_completed: bool,
    pub moderation_due: bool,
    pub budget_exhausted: bool,
}

#[derive(Debug, Clone)]
pub struct TurnScheduler {
    num_speakers: usize,
    max_steps: usize,
    period: ModerationPeriod,
    next_speaker: usize,
    turns_taken: usize,
}

impl TurnScheduler {
    pub fn new(num_speakers: usize, max_steps: usize, period: ModerationPeriod) -> Self {
        Self {
            num_speakers,
            max_steps,
            period,
            next_speaker: 0,
            turns_taken: 0,
        }
    }

    /// Index of the speaker whose turn it is, or `None` once the step budget is spent.
    pub fn next_speaker(&self) -> Option<usize> {
        if self.num_speakers == 0 || self.budget_exhausted() {
            None
        } else {
            Some(self.next_speaker)
        }
    }

    /// Record that the current speaker took its turn and advance.
    pub fn complete_turn(&mut self) -> TurnCompletion {
        self.turns_taken += 1;
        self.next_speaker = (self.next_speaker + 1) % self.num_speakers.max(1);

        let round_completed = self.next_speaker == 0;
        let moderation_due = match self.period {
            ModerationPeriod::Turn => true,
            ModerationPeriod::Round => round_completed,
        };

        TurnCompletion {
            turns_taken: self.turns_taken,
            round_completed,
            moderation_due,
            budget_exhausted: self.budget_exhausted(),
        }
    }

    pub fn budget_exhausted(&self) -> bool {
        self.turns_taken >= self.max_steps
    }

    pub fn turns_taken(&self) -> usize {
        self.turns_taken
    }

    /// Number of fully completed rounds.
    pub fn rounds_completed(&self) -> usize {
        self.turns_taken / self.num_speakers.max(1)
    }

    pub fn period(&self) -> ModerationPeriod {
        self.period
    }

    pub fn reset(&mut self) {
        self.next_speaker = 0;
        self.turns_taken = 0;
    }
}
