//! Turn-dependent role framing.
//!
//! A speaking actor carries three role descriptions and switches between them as the
//! conversation grows, so a long two-party dialog can change direction mid-run (for example
//! a shopper noticing a second product) without restarting. Optional visual references
//! switch at the same point.
//!
//! The switch is driven by the prompt length `L`: one framing segment, every transcript
//! entry, and the trailing request segment. With a transition turn `T`:
//!
//! | `L`                    | phase                     | visual      |
//! |------------------------|---------------------------|-------------|
//! | `L <= 2T - 1`          | [`TransitionPhase::Before`] | primary   |
//! | `L == 2T` or `2T + 1`  | [`TransitionPhase::At`]     | secondary |
//! | `L > 2T + 1`           | [`TransitionPhase::After`]  | secondary |
//!
//! ```
//! use dialogarena::framing::{select_phase, TransitionPhase};
//!
//! assert_eq!(select_phase(5, 3), TransitionPhase::Before);
//! assert_eq!(select_phase(6, 3), TransitionPhase::At);
//! assert_eq!(select_phase(7, 3), TransitionPhase::At);
//! assert_eq!(select_phase(8, 3), TransitionPhase::After);
//! ```

use crate::dialogarena::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which of the three role descriptions is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPhase {
    Before,
    At,
    After,
}

impl fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionPhase::Before => write!(f, "before_transition"),
            TransitionPhase::At => write!(f, "at_transition"),
            TransitionPhase::After => write!(f, "after_transition"),
        }
    }
}

/// Number of prompt segments an actor sees for a transcript of `transcript_len` entries:
/// the framing segment, the transcript itself, and the request segment.
pub fn prompt_length(transcript_len: usize) -> usize {
    transcript_len + 2
}

/// Select the active phase for a prompt of `prompt_len` segments.
///
/// `transition_turn` is validated to be positive when a [`RoleFraming`] is built, so this
/// function is total.
pub fn select_phase(prompt_len: usize, transition_turn: u32) -> TransitionPhase {
    let boundary = 2 * transition_turn as usize;
    if prompt_len < boundary {
        TransitionPhase::Before
    } else if prompt_len <= boundary + 1 {
        TransitionPhase::At
    } else {
        TransitionPhase::After
    }
}

/// Optional pair of images shown to an actor: `primary` before the transition,
/// `secondary` from the transition onwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisualRefs {
    pub primary: Option<PathBuf>,
    pub secondary: Option<PathBuf>,
}

impl VisualRefs {
    pub fn for_phase(&self, phase: TransitionPhase) -> Option<&Path> {
        match phase {
            TransitionPhase::Before => self.primary.as_deref(),
            TransitionPhase::At | TransitionPhase::After => self.secondary.as_deref(),
        }
    }
}

/// The three role descriptions of an actor plus the message-count threshold between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFraming {
    before_transition: String,
    at_transition: String,
    after_transition: String,
    transition_turn: u32,
    visuals: VisualRefs,
}

impl RoleFraming {
    /// Build a framing, rejecting blank descriptions and non-positive transition turns.
    pub fn new(
        before_transition: impl Into<String>,
        at_transition: impl Into<String>,
        after_transition: impl Into<String>,
        transition_turn: i64,
    ) -> Result<Self, ConfigError> {
        let before_transition = before_transition.into();
        let at_transition = at_transition.into();
        let after_transition = after_transition.into();

        for (slot, text) in [
            ("before_transition", &before_transition),
            ("at_transition", &at_transition),
            ("after_transition", &after_transition),
        ] {
            if text.trim().is_empty() {
                return Err(ConfigError::MissingFraming(slot.to_string()));
            }
        }

        let transition_turn = u32::try_from(transition_turn)
            .ok()
            .filter(|t| *t > 0)
            .ok_or(ConfigError::InvalidTransitionTurn(transition_turn))?;

        Ok(Self {
            before_transition,
            at_transition,
            after_transition,
            transition_turn,
            visuals: VisualRefs::default(),
        })
    }

    /// A framing that uses the same description in every phase (moderators).
    pub fn constant(role_desc: impl Into<String>, transition_turn: i64) -> Result<Self, ConfigError> {
        let role_desc = role_desc.into();
        Self::new(role_desc.clone(), role_desc.clone(), role_desc, transition_turn)
    }

    pub fn with_visuals(mut self, primary: Option<PathBuf>, secondary: Option<PathBuf>) -> Self {
        self.visuals = VisualRefs { primary, secondary };
        self
    }

    pub fn transition_turn(&self) -> u32 {
        self.transition_turn
    }

    pub fn visuals(&self) -> &VisualRefs {
        &self.visuals
    }

    /// Phase active for an actor about to speak after `transcript_len` entries.
    pub fn phase_for(&self, transcript_len: usize) -> TransitionPhase {
        select_phase(prompt_length(transcript_len), self.transition_turn)
    }

    pub fn role_desc(&self, phase: TransitionPhase) -> &str {
        match phase {
            TransitionPhase::Before => &self.before_transition,
            TransitionPhase::At => &self.at_transition,
            TransitionPhase::After => &self.after_transition,
        }
    }

    pub fn visual(&self, phase: TransitionPhase) -> Option<&Path> {
        self.visuals.for_phase(phase)
    }
}
