//! The arena: one conversation between speaking actors, watched by a moderator.
//!
//! A run proceeds in strict round-robin order. After every appended line the arena
//!
//! 1. stops if the line is the run's [`Sentinel`] (an actor degraded),
//! 2. consults the moderator if the [`ModerationPeriod`] says it is due,
//! 3. stops once `max_steps` turns have been taken.
//!
//! Each actor's backend call is awaited before its line is appended, so an actor always sees
//! every line appended before its turn.
//!
//! # Example
//!
//! ```rust,no_run
//! use dialogarena::{Arena, ArenaConfig, LoggingEventHandler};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = ArenaConfig::from_path("store_dialog.json")?;
//! let mut arena = Arena::from_config_openai(&config)?
//!     .with_event_handler(Arc::new(LoggingEventHandler));
//!
//! let outcome = arena.run().await;
//! println!("stopped: {} after {} turns", outcome.stop_reason, outcome.turns_taken);
//! for record in outcome.records() {
//!     println!("{}: {}", record.speaker_name, record.content);
//! }
//! # Ok(())
//! # }
//! ```

use crate::dialogarena::actor::{Actor, Dispatch, ModeratorDecision, TerminationCause};
use crate::dialogarena::backend::Backend;
use crate::dialogarena::clients::openai::OpenAIChat;
use crate::dialogarena::config::{ArenaConfig, ConfigError, RunConfig};
use crate::dialogarena::event::{ArenaEvent, EventHandler};
use crate::dialogarena::message::{Transcript, TranscriptRecord, MODERATOR_NAME};
use crate::dialogarena::retry::RetryPolicy;
use crate::dialogarena::scheduler::{ModerationPeriod, TurnScheduler};
use crate::dialogarena::sentinel::Sentinel;
use futures_util::future::join_all;
use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The moderator answered its terminal condition affirmatively.
    ModeratorDecision,
    /// The moderator's backend was exhausted.
    ModeratorUnavailable,
    /// A speaking actor's backend was exhausted and it spoke the sentinel.
    EndOfConversationSignal,
    /// `max_steps` turns were taken.
    StepBudgetExhausted,
}

impl From<TerminationCause> for StopReason {
    fn from(cause: TerminationCause) -> Self {
        match cause {
            TerminationCause::Affirmative => StopReason::ModeratorDecision,
            TerminationCause::ModeratorUnavailable => StopReason::ModeratorUnavailable,
            TerminationCause::EndOfConversationSignal => StopReason::EndOfConversationSignal,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::ModeratorDecision => write!(f, "moderator decision"),
            StopReason::ModeratorUnavailable => write!(f, "moderator unavailable"),
            StopReason::EndOfConversationSignal => write!(f, "end-of-conversation signal"),
            StopReason::StepBudgetExhausted => write!(f, "step budget exhausted"),
        }
    }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub arena_id: String,
    pub transcript: Transcript,
    pub stop_reason: StopReason,
    pub turns_taken: usize,
    /// Sum of the usage reported by backends for successful calls, 0 if none report it.
    pub total_tokens_used: usize,
    /// The sentinel this run used; a trailing entry equal to it marks a degraded actor.
    pub sentinel: Sentinel,
}

impl RunOutcome {
    pub fn records(&self) -> Vec<TranscriptRecord> {
        self.transcript.records()
    }

    /// Whether the run ended because a participant could not continue.
    pub fn ended_by_failure(&self) -> bool {
        matches!(
            self.stop_reason,
            StopReason::EndOfConversationSignal | StopReason::ModeratorUnavailable
        )
    }
}

#[derive(Debug)]
pub enum ArenaError {
    Config(ConfigError),
    /// The async runtime could not be created, or an arena task panicked.
    Runtime(String),
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArenaError::Config(err) => write!(f, "Arena configuration error: {}", err),
            ArenaError::Runtime(msg) => write!(f, "Arena runtime error: {}", msg),
        }
    }
}

impl Error for ArenaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ArenaError::Config(err) => Some(err),
            ArenaError::Runtime(_) => None,
        }
    }
}

impl From<ConfigError> for ArenaError {
    fn from(err: ConfigError) -> Self {
        ArenaError::Config(err)
    }
}

pub struct Arena {
    id: String,
    speakers: Vec<Actor>,
    moderator: Actor,
    global_prompt: Option<String>,
    max_steps: usize,
    moderation_period: ModerationPeriod,
    dispatch: Dispatch,
    sentinel: Sentinel,
    transcript: Transcript,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl Arena {
    /// Assemble an arena. Speakers take turns in the given order.
    pub fn new(speakers: Vec<Actor>, moderator: Actor) -> Result<Self, ConfigError> {
        if speakers.is_empty() {
            return Err(ConfigError::NoSpeakers);
        }
        if !moderator.is_moderator() {
            return Err(ConfigError::NotAModerator(moderator.name().to_string()));
        }

        let mut seen = HashSet::new();
        for speaker in &speakers {
            if speaker.is_moderator() {
                return Err(ConfigError::ModeratorAsSpeaker(speaker.name().to_string()));
            }
            if !seen.insert(speaker.name().to_string()) {
                return Err(ConfigError::DuplicateSpeaker(speaker.name().to_string()));
            }
        }

        let run = RunConfig::default();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            speakers,
            moderator,
            global_prompt: None,
            max_steps: run.max_steps,
            moderation_period: run.moderation_period,
            dispatch: Dispatch::Inline,
            sentinel: Sentinel::generate(),
            transcript: Transcript::new(),
            event_handler: None,
        })
    }

    /// Build an arena from configuration, asking `backend_for` for each actor's backend.
    ///
    /// The factory receives the actor name and its `max_tokens` override, if any.
    pub fn from_config<F>(config: &ArenaConfig, mut backend_for: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str, Option<u32>) -> Result<Arc<dyn Backend>, ConfigError>,
    {
        let mut speakers = Vec::with_capacity(config.speakers.len());
        for actor_config in &config.speakers {
            let backend = backend_for(&actor_config.name, actor_config.max_tokens)?;
            speakers.push(Actor::from_config(actor_config, backend)?);
        }

        let moderator_backend = backend_for(MODERATOR_NAME, config.moderator.max_tokens)?;
        let moderator = Actor::moderator_from_config(&config.moderator, moderator_backend)?;

        let mut arena = Self::new(speakers, moderator)?.with_run_config(config.run.clone())?;
        if let Some(global_prompt) = &config.global_prompt {
            arena = arena.with_global_prompt(global_prompt.clone());
        }
        Ok(arena)
    }

    /// Build an arena whose actors each get their own [`OpenAIChat`] backend.
    pub fn from_config_openai(config: &ArenaConfig) -> Result<Self, ConfigError> {
        Self::from_config(config, |_, max_tokens| {
            let mut backend_config = config.backend.clone();
            if let Some(max_tokens) = max_tokens {
                backend_config.max_tokens = max_tokens;
            }
            Ok(Arc::new(OpenAIChat::from_config(&backend_config)?) as Arc<dyn Backend>)
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Shared framing for every speaker that does not already carry its own.
    pub fn with_global_prompt(mut self, global_prompt: impl Into<String>) -> Self {
        let global_prompt = global_prompt.into();
        for speaker in &mut self.speakers {
            speaker.set_global_prompt_if_unset(&global_prompt);
        }
        self.global_prompt = Some(global_prompt);
        self
    }

    /// Apply step budget, moderation cadence and retry policy in one go.
    pub fn with_run_config(mut self, run: RunConfig) -> Result<Self, ConfigError> {
        run.retry.validate()?;
        self.max_steps = run.max_steps;
        self.moderation_period = run.moderation_period;
        Ok(self.with_retry_policy(run.retry))
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_moderation_period(mut self, period: ModerationPeriod) -> Self {
        self.moderation_period = period;
        self
    }

    /// Give every actor, the moderator included, the same retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        for speaker in &mut self.speakers {
            speaker.set_retry_policy(retry.clone());
        }
        self.moderator.set_retry_policy(retry);
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn speakers(&self) -> &[Actor] {
        &self.speakers
    }

    pub fn moderator(&self) -> &Actor {
        &self.moderator
    }

    pub fn global_prompt(&self) -> Option<&str> {
        self.global_prompt.as_deref()
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn moderation_period(&self) -> ModerationPeriod {
        self.moderation_period
    }

    /// Sentinel of the current (or most recent) run.
    pub fn sentinel(&self) -> &Sentinel {
        &self.sentinel
    }

    /// Transcript of the current (or most recent) run.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Clear the transcript, draw a fresh sentinel and reset every actor's backend.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.sentinel = Sentinel::generate();
        for speaker in &self.speakers {
            speaker.reset();
        }
        self.moderator.reset();
    }

    async fn emit(&self, event: ArenaEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_arena_event(&event).await;
        }
    }

    /// Run one conversation from an empty transcript until a stop condition holds.
    ///
    /// Never fails: backend failures degrade into the sentinel or a moderator-unavailable
    /// stop.
    pub async fn run(&mut self) -> RunOutcome {
        self.reset();
        let sentinel = self.sentinel.clone();
        let mut scheduler =
            TurnScheduler::new(self.speakers.len(), self.max_steps, self.moderation_period);
        let mut total_tokens_used = 0;

        self.emit(ArenaEvent::RunStarted {
            arena_id: self.id.clone(),
            speakers: self.speakers.iter().map(|s| s.name().to_string()).collect(),
            max_steps: self.max_steps,
            moderation_period: self.moderation_period,
        })
        .await;

        let stop_reason = loop {
            let Some(index) = scheduler.next_speaker() else {
                break StopReason::StepBudgetExhausted;
            };
            let turn = scheduler.turns_taken();
            let speaker = &self.speakers[index];
            let speaker_name = speaker.name().to_string();

            self.emit(ArenaEvent::TurnStarted {
                arena_id: self.id.clone(),
                turn,
                speaker: speaker_name.clone(),
                phase: speaker.phase_for(self.transcript.len()),
            })
            .await;

            let line = speaker.act(&self.transcript, &sentinel, self.dispatch).await;
            let degraded = sentinel.matches(&line);
            if !degraded {
                total_tokens_used += tokens_of(speaker);
            }

            let content = Arc::clone(&self.transcript.append(speaker_name.clone(), line).content);
            self.emit(ArenaEvent::MessageAppended {
                arena_id: self.id.clone(),
                turn,
                speaker: speaker_name.clone(),
                content,
            })
            .await;

            let completion = scheduler.complete_turn();

            if degraded {
                self.emit(ArenaEvent::ActorDegraded {
                    arena_id: self.id.clone(),
                    speaker: speaker_name,
                })
                .await;
                break StopReason::EndOfConversationSignal;
            }

            if completion.moderation_due {
                // The moderator role is checked in `Arena::new`.
                let decision = self
                    .moderator
                    .is_terminal(&self.transcript, &sentinel, self.dispatch)
                    .await
                    .unwrap_or(ModeratorDecision::Terminate(
                        TerminationCause::ModeratorUnavailable,
                    ));
                if decision != ModeratorDecision::Terminate(TerminationCause::ModeratorUnavailable) {
                    total_tokens_used += tokens_of(&self.moderator);
                }

                self.emit(ArenaEvent::ModeratorConsulted {
                    arena_id: self.id.clone(),
                    turns_taken: completion.turns_taken,
                    decision,
                })
                .await;

                if let ModeratorDecision::Terminate(cause) = decision {
                    break StopReason::from(cause);
                }
            }
        };

        let turns_taken = scheduler.turns_taken();
        self.emit(ArenaEvent::RunCompleted {
            arena_id: self.id.clone(),
            stop_reason,
            turns_taken,
            total_tokens_used,
        })
        .await;

        RunOutcome {
            arena_id: self.id.clone(),
            transcript: self.transcript.clone(),
            stop_reason,
            turns_taken,
            total_tokens_used,
            sentinel,
        }
    }

    /// Drive [`Arena::run`] to completion on a private current-thread runtime.
    ///
    /// Must not be called from inside an async runtime; use `run().await` there.
    pub fn run_blocking(&mut self) -> Result<RunOutcome, ArenaError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(ArenaError::Runtime(
                "run_blocking called from within an async runtime; await run() instead"
                    .to_string(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ArenaError::Runtime(e.to_string()))?;
        Ok(runtime.block_on(self.run()))
    }
}

fn tokens_of(actor: &Actor) -> usize {
    actor
        .backend()
        .take_usage()
        .map(|usage| usage.total_tokens)
        .unwrap_or(0)
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("speakers", &self.speakers)
            .field("moderator", &self.moderator)
            .field("max_steps", &self.max_steps)
            .field("moderation_period", &self.moderation_period)
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

/// Run independent arenas concurrently, one tokio task each.
///
/// Results come back in input order. A task that panics is reported as
/// [`ArenaError::Runtime`] without affecting the others.
pub async fn run_many(arenas: Vec<Arena>) -> Vec<Result<RunOutcome, ArenaError>> {
    let handles = arenas.into_iter().map(|mut arena| {
        tokio::spawn(async move { arena.run().await })
    });

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.map_err(|e| ArenaError::Runtime(format!("arena task failed: {}", e))))
        .collect()
}
