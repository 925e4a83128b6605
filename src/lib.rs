//! # dialogarena
//!
//! dialogarena runs turn-based conversations between LLM-backed actors, built for generating
//! synthetic shopping dialogs: a seller and a shopper talk in strict alternation while a
//! moderator decides when the conversation has reached its goal.
//!
//! The crate provides:
//!
//! * **Transcripts**: [`Transcript`] is the append-only log every actor observes
//! * **Transition-turn framing**: [`RoleFraming`] switches each actor's role description
//!   (and optional reference image) once the conversation reaches a configured length, so a
//!   dialog can change direction mid-run
//! * **Degrading actors**: [`Actor::act`] retries a failing backend with jittered exponential
//!   backoff and finally speaks the run's [`Sentinel`] instead of failing the run
//! * **Moderation**: [`Actor::is_terminal`] asks a yes/no terminal condition every turn or
//!   every round
//! * **Arenas**: [`Arena`] wires speakers, moderator, scheduling and a step budget together;
//!   [`run_many`] runs independent arenas concurrently
//! * **Backends**: the [`Backend`] trait, with [`clients::openai::OpenAIChat`] included
//!
//! ## Example
//!
//! ```rust,no_run
//! use dialogarena::{Actor, Arena, LoggingEventHandler, ModerationPeriod, RoleFraming};
//! use dialogarena::clients::openai::OpenAIChat;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     dialogarena::init_logger();
//!
//!     let api_key = std::env::var("OPENAI_API_KEY")?;
//!     let backend = Arc::new(OpenAIChat::new(&api_key, "gpt-4o-mini"));
//!
//!     let seller = Actor::speaking(
//!         "Seller",
//!         RoleFraming::new(
//!             "Greet the customer and ask what they need.",
//!             "Point out the new sofa collection.",
//!             "Help the customer decide.",
//!             3,
//!         )?,
//!         backend.clone(),
//!     )?;
//!     let shopper = Actor::speaking(
//!         "Shopper",
//!         RoleFraming::new(
//!             "You are looking for a floor lamp.",
//!             "You notice a sofa you like.",
//!             "Decide whether to buy the sofa.",
//!             3,
//!         )?,
//!         backend.clone(),
//!     )?;
//!     let moderator = Actor::moderator(
//!         "You watch a conversation in a furniture store.",
//!         "Has the shopper made a final decision? Answer yes or no.",
//!         backend,
//!     )?;
//!
//!     let mut arena = Arena::new(vec![seller, shopper], moderator)?
//!         .with_global_prompt("A furniture store on a quiet afternoon.")
//!         .with_max_steps(10)
//!         .with_moderation_period(ModerationPeriod::Round)
//!         .with_event_handler(Arc::new(LoggingEventHandler));
//!
//!     let outcome = arena.run().await;
//!     println!("{} after {} turns", outcome.stop_reason, outcome.turns_taken);
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through the `log` facade. Call [`init_logger`] to install `env_logger`
//! and control verbosity with `RUST_LOG` (e.g. `RUST_LOG=dialogarena=debug` to see retries
//! and phase selection).

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// ```rust
/// dialogarena::init_logger();
/// dialogarena::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

pub mod dialogarena;

// Re-exporting key items for easier external access.
pub use dialogarena::actor::{
    is_affirmative, Actor, ActorRole, Dispatch, ModeratorDecision, TerminationCause,
};
pub use dialogarena::arena::{run_many, Arena, ArenaError, RunOutcome, StopReason};
pub use dialogarena::backend::{Backend, BackendError, TokenUsage};
pub use dialogarena::config::{
    ActorConfig, ArenaConfig, BackendConfig, ConfigError, ModeratorConfig, RunConfig,
};
pub use dialogarena::event::{ArenaEvent, EventHandler, LoggingEventHandler};
pub use dialogarena::framing::{select_phase, RoleFraming, TransitionPhase, VisualRefs};
pub use dialogarena::message::{
    Message, Transcript, TranscriptRecord, TurnIndex, END_OF_MESSAGE, MODERATOR_NAME, SYSTEM_NAME,
};
pub use dialogarena::prompt::{ImageAttachment, Prompt, Segment};
pub use dialogarena::retry::{query_with_retry, Exhausted, RetryPolicy};
pub use dialogarena::scheduler::{ModerationPeriod, TurnScheduler};
pub use dialogarena::sentinel::Sentinel;

pub use dialogarena::{
    actor, arena, backend, clients, config, event, framing, message, prompt, retry, scheduler,
    sentinel,
};
