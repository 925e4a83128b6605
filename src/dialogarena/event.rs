//! Arena event system.
//!
//! Implement [`EventHandler`] to observe a run as it happens: run start, each speaker's turn,
//! every appended line, degraded actors, moderator decisions and the final stop reason.
//!
//! The trait has a single async method with a no-op default, so handlers only need to match
//! the variants they care about. Attach one with
//! [`Arena::with_event_handler`](crate::Arena::with_event_handler).
//!
//! [`LoggingEventHandler`] ships with the crate and writes each event through the `log`
//! facade, which is how a finished line gets "shown" while a run is in progress.
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use dialogarena::event::{ArenaEvent, EventHandler};
//!
//! struct PrintLines;
//!
//! #[async_trait]
//! impl EventHandler for PrintLines {
//!     async fn on_arena_event(&self, event: &ArenaEvent) {
//!         if let ArenaEvent::MessageAppended { speaker, content, .. } = event {
//!             println!("{}: {}", speaker, content);
//!         }
//!     }
//! }
//! ```

use crate::dialogarena::actor::ModeratorDecision;
use crate::dialogarena::arena::StopReason;
use crate::dialogarena::framing::TransitionPhase;
use crate::dialogarena::scheduler::ModerationPeriod;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;

/// Events emitted by an [`Arena`](crate::Arena) during a run.
///
/// Every variant carries `arena_id` so one handler can follow several concurrent runs.
#[derive(Debug, Clone)]
pub enum ArenaEvent {
    /// Fired once before the first turn.
    RunStarted {
        arena_id: String,
        /// Speaking actors in turn order.
        speakers: Vec<String>,
        max_steps: usize,
        moderation_period: ModerationPeriod,
    },

    /// Fired before an actor is asked for its line.
    TurnStarted {
        arena_id: String,
        /// Zero-based index of the turn about to be taken.
        turn: usize,
        speaker: String,
        /// Framing phase the speaker is about to use.
        phase: TransitionPhase,
    },

    /// Fired after a line was appended to the transcript.
    MessageAppended {
        arena_id: String,
        turn: usize,
        speaker: String,
        content: Arc<str>,
    },

    /// A speaking actor's backend was exhausted and it spoke the sentinel.
    ActorDegraded { arena_id: String, speaker: String },

    /// The moderator was consulted at a cadence point.
    ModeratorConsulted {
        arena_id: String,
        /// Number of turns taken when the moderator was asked.
        turns_taken: usize,
        decision: ModeratorDecision,
    },

    /// Fired once when the run stops, for any reason.
    RunCompleted {
        arena_id: String,
        stop_reason: StopReason,
        turns_taken: usize,
        total_tokens_used: usize,
    },
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_arena_event(&self, _event: &ArenaEvent) {}
}

/// Writes every event to the `log` facade: lines and lifecycle at `info`, degradations at
/// `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_arena_event(&self, event: &ArenaEvent) {
        match event {
            ArenaEvent::RunStarted {
                arena_id,
                speakers,
                max_steps,
                moderation_period,
            } => info!(
                "[{}] run started: speakers={:?} max_steps={} moderation={:?}",
                arena_id, speakers, max_steps, moderation_period
            ),
            ArenaEvent::TurnStarted { .. } => {}
            ArenaEvent::MessageAppended {
                arena_id,
                turn,
                speaker,
                content,
            } => info!("[{}] #{} {}: {}", arena_id, turn, speaker, content),
            ArenaEvent::ActorDegraded { arena_id, speaker } => {
                warn!("[{}] {} degraded to end-of-conversation", arena_id, speaker)
            }
            ArenaEvent::ModeratorConsulted {
                arena_id,
                turns_taken,
                decision,
            } => info!(
                "[{}] moderator after {} turn(s): {:?}",
                arena_id, turns_taken, decision
            ),
            ArenaEvent::RunCompleted {
                arena_id,
                stop_reason,
                turns_taken,
                total_tokens_used,
            } => info!(
                "[{}] run completed: {} after {} turn(s), {} tokens",
                arena_id, stop_reason, turns_taken, total_tokens_used
            ),
        }
    }
}
