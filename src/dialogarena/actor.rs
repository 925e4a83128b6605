//! Actors: named participants that turn a transcript into their next line.
//!
//! An [`Actor`] pairs a [`RoleFraming`] with a [`Backend`]. Every call renders a fresh
//! prompt from the transcript it is handed, so actors keep no conversational state of their
//! own beyond whatever the backend remembers (cleared by [`Actor::reset`]).
//!
//! Two roles exist:
//!
//! - **Speaking** actors take turns. [`Actor::act`] never fails: when the backend keeps
//!   failing past the retry budget the actor speaks the run's [`Sentinel`] instead.
//! - The **moderator** never speaks into the transcript. [`Actor::is_terminal`] asks its
//!   terminal condition as a yes/no question and reads an affirmative answer as "stop".
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use dialogarena::backend::{Backend, BackendError};
//! use dialogarena::prompt::Prompt;
//! use dialogarena::{Actor, Dispatch, RoleFraming, Sentinel, Transcript};
//! use std::sync::Arc;
//!
//! struct Canned;
//!
//! #[async_trait]
//! impl Backend for Canned {
//!     async fn query(&self, _prompt: &Prompt) -> Result<String, BackendError> {
//!         Ok("Seller: Welcome in!<EOS>".to_string())
//!     }
//!     fn model_name(&self) -> &str {
//!         "canned"
//!     }
//! }
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! # rt.block_on(async {
//! let framing = RoleFraming::new("Greet.", "Pitch sofas.", "Close.", 3).unwrap();
//! let seller = Actor::speaking("Seller", framing, Arc::new(Canned)).unwrap();
//!
//! let line = seller
//!     .act(&Transcript::new(), &Sentinel::generate(), Dispatch::Inline)
//!     .await;
//! assert_eq!(line, "Welcome in!");
//! # });
//! ```

use crate::dialogarena::backend::Backend;
use crate::dialogarena::config::{ActorConfig, ConfigError, ModeratorConfig};
use crate::dialogarena::framing::{RoleFraming, TransitionPhase};
use crate::dialogarena::message::{Message, Transcript, MODERATOR_NAME, SYSTEM_NAME};
use crate::dialogarena::prompt::{assemble, clean_response, ImageAttachment, Prompt};
use crate::dialogarena::retry::{query_with_retry, Exhausted, RetryPolicy};
use crate::dialogarena::sentinel::Sentinel;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

lazy_static! {
    static ref AFFIRMATIVE: Regex =
        Regex::new(r"(?i)^\s*(yes|y|yea|yeah|yep|yup|sure|ok|okay|alright)\b").unwrap();
}

/// Whether a moderator answer begins with an affirmative word.
///
/// The match is case-insensitive and whole-word: "Yes.", "yep, done" and "OK" are
/// affirmative; "Not yet", "yesterday" and "no" are not.
pub fn is_affirmative(response: &str) -> bool {
    AFFIRMATIVE.is_match(response.trim())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorRole {
    Speaking,
    Moderator { terminal_condition: String },
}

/// How an actor awaits its backend.
///
/// `Spawned` moves the call onto its own tokio task; the caller still awaits it before the
/// transcript is touched, so ordering is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    #[default]
    Inline,
    Spawned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// The last transcript entry is the run's sentinel.
    EndOfConversationSignal,
    /// The moderator's own backend failed past the retry budget.
    ModeratorUnavailable,
    /// The moderator answered the terminal condition affirmatively.
    Affirmative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeratorDecision {
    Continue,
    Terminate(TerminationCause),
}

impl ModeratorDecision {
    pub fn is_terminate(&self) -> bool {
        matches!(self, ModeratorDecision::Terminate(_))
    }
}

pub struct Actor {
    name: String,
    framing: RoleFraming,
    global_prompt: Option<String>,
    backend: Arc<dyn Backend>,
    retry: RetryPolicy,
    role: ActorRole,
}

fn validate_name(name: String) -> Result<String, ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::EmptyName);
    }
    if name == SYSTEM_NAME {
        return Err(ConfigError::ReservedName(name));
    }
    Ok(name)
}

impl Actor {
    /// Create a speaking actor.
    pub fn speaking(
        name: impl Into<String>,
        framing: RoleFraming,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            name: validate_name(name.into())?,
            framing,
            global_prompt: None,
            backend,
            retry: RetryPolicy::default(),
            role: ActorRole::Speaking,
        })
    }

    /// Create the moderator. It is always named [`MODERATOR_NAME`] and uses one role
    /// description for every phase.
    pub fn moderator(
        role_desc: impl Into<String>,
        terminal_condition: impl Into<String>,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, ConfigError> {
        let terminal_condition = terminal_condition.into();
        if terminal_condition.trim().is_empty() {
            return Err(ConfigError::MissingFraming("terminal_condition".to_string()));
        }
        Ok(Self {
            name: MODERATOR_NAME.to_string(),
            framing: RoleFraming::constant(role_desc, 1)?,
            global_prompt: None,
            backend,
            retry: RetryPolicy::default(),
            role: ActorRole::Moderator { terminal_condition },
        })
    }

    pub fn from_config(config: &ActorConfig, backend: Arc<dyn Backend>) -> Result<Self, ConfigError> {
        let framing = RoleFraming::new(
            config.role_desc.clone(),
            config.role_desc_in_transition_turn.clone(),
            config.role_desc_after_transition_turn.clone(),
            config.transition_turn,
        )?
        .with_visuals(config.visual_path.clone(), config.second_visual_path.clone());

        let mut actor = Self::speaking(config.name.clone(), framing, backend)?;
        actor.global_prompt = config.global_prompt.clone();
        Ok(actor)
    }

    pub fn moderator_from_config(
        config: &ModeratorConfig,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, ConfigError> {
        let mut moderator = Self::moderator(
            config.role_desc.clone(),
            config.terminal_condition.clone(),
            backend,
        )?;
        moderator.framing = RoleFraming::constant(config.role_desc.clone(), config.transition_turn)?;
        Ok(moderator)
    }

    pub fn with_global_prompt(mut self, global_prompt: impl Into<String>) -> Self {
        self.global_prompt = Some(global_prompt.into());
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn set_global_prompt_if_unset(&mut self, global_prompt: &str) {
        if self.global_prompt.is_none() {
            self.global_prompt = Some(global_prompt.to_string());
        }
    }

    pub(crate) fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &ActorRole {
        &self.role
    }

    pub fn is_moderator(&self) -> bool {
        matches!(self.role, ActorRole::Moderator { .. })
    }

    pub fn framing(&self) -> &RoleFraming {
        &self.framing
    }

    pub fn global_prompt(&self) -> Option<&str> {
        self.global_prompt.as_deref()
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Phase this actor would speak in after `transcript_len` entries.
    pub fn phase_for(&self, transcript_len: usize) -> TransitionPhase {
        self.framing.phase_for(transcript_len)
    }

    /// Render the prompt this actor would send for `transcript`, loading the phase's visual
    /// reference if one is configured.
    pub async fn prompt_for(&self, transcript: &Transcript, request: Option<&Message>) -> Prompt {
        let mut prompt = assemble(
            &self.name,
            &self.framing,
            self.global_prompt.as_deref(),
            transcript,
            request,
        );
        if let Some(path) = self.framing.visual(prompt.phase) {
            prompt.image = ImageAttachment::load(path).await;
        }
        prompt
    }

    /// Produce this actor's next line. Degrades to `sentinel` when the backend is exhausted.
    pub async fn act(&self, transcript: &Transcript, sentinel: &Sentinel, dispatch: Dispatch) -> String {
        let prompt = self.prompt_for(transcript, None).await;
        debug!(
            "'{}' speaking in phase {} (prompt length {})",
            self.name,
            prompt.phase,
            prompt.len()
        );

        match self.query(prompt, dispatch).await {
            Ok(raw) => clean_response(&self.name, &raw),
            Err(exhausted) => {
                warn!(
                    "'{}' could not produce a line, ending the conversation: {}",
                    self.name, exhausted
                );
                sentinel.as_str().to_string()
            }
        }
    }

    /// Decide whether the conversation should stop.
    ///
    /// A trailing sentinel terminates without consulting the backend. Otherwise the terminal
    /// condition is asked as a system request; an affirmative answer terminates, anything
    /// else continues, and an exhausted backend terminates.
    pub async fn is_terminal(
        &self,
        transcript: &Transcript,
        sentinel: &Sentinel,
        dispatch: Dispatch,
    ) -> Result<ModeratorDecision, ConfigError> {
        let terminal_condition = match &self.role {
            ActorRole::Moderator { terminal_condition } => terminal_condition,
            ActorRole::Speaking => return Err(ConfigError::NotAModerator(self.name.clone())),
        };

        if transcript
            .last()
            .is_some_and(|last| sentinel.matches(&last.content))
        {
            return Ok(ModeratorDecision::Terminate(
                TerminationCause::EndOfConversationSignal,
            ));
        }

        let request = Message::out_of_band(self.name.clone(), terminal_condition.clone());
        let prompt = self.prompt_for(transcript, Some(&request)).await;

        match self.query(prompt, dispatch).await {
            Ok(raw) => {
                let answer = clean_response(&self.name, &raw);
                debug!("Moderator answered: {:?}", answer);
                if is_affirmative(&answer) {
                    Ok(ModeratorDecision::Terminate(TerminationCause::Affirmative))
                } else {
                    Ok(ModeratorDecision::Continue)
                }
            }
            Err(exhausted) => {
                warn!("Moderator unavailable, ending the conversation: {}", exhausted);
                Ok(ModeratorDecision::Terminate(
                    TerminationCause::ModeratorUnavailable,
                ))
            }
        }
    }

    /// Clear backend memory so the actor can join a fresh run.
    pub fn reset(&self) {
        self.backend.reset();
    }

    /// Export this actor as an [`ActorConfig`]. Moderators export their constant framing.
    pub fn to_config(&self) -> ActorConfig {
        let visuals = self.framing.visuals();
        ActorConfig {
            name: self.name.clone(),
            role_desc: self.framing.role_desc(TransitionPhase::Before).to_string(),
            role_desc_in_transition_turn: self.framing.role_desc(TransitionPhase::At).to_string(),
            role_desc_after_transition_turn: self
                .framing
                .role_desc(TransitionPhase::After)
                .to_string(),
            transition_turn: i64::from(self.framing.transition_turn()),
            global_prompt: self.global_prompt.clone(),
            visual_path: visuals.primary.clone(),
            second_visual_path: visuals.secondary.clone(),
            max_tokens: None,
        }
    }

    pub fn to_moderator_config(&self) -> Result<ModeratorConfig, ConfigError> {
        match &self.role {
            ActorRole::Moderator { terminal_condition } => Ok(ModeratorConfig {
                role_desc: self.framing.role_desc(TransitionPhase::Before).to_string(),
                terminal_condition: terminal_condition.clone(),
                transition_turn: i64::from(self.framing.transition_turn()),
                max_tokens: None,
            }),
            ActorRole::Speaking => Err(ConfigError::NotAModerator(self.name.clone())),
        }
    }

    async fn query(&self, prompt: Prompt, dispatch: Dispatch) -> Result<String, Exhausted> {
        match dispatch {
            Dispatch::Inline => query_with_retry(self.backend.as_ref(), &prompt, &self.retry).await,
            Dispatch::Spawned => {
                let backend = Arc::clone(&self.backend);
                let retry = self.retry.clone();
                let handle = tokio::spawn(async move {
                    query_with_retry(backend.as_ref(), &prompt, &retry).await
                });
                handle.await.unwrap_or_else(|join_err| {
                    Err(Exhausted {
                        attempts: 0,
                        last_error: format!("backend task failed: {}", join_err),
                    })
                })
            }
        }
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("model", &self.backend.model_name())
            .field("transition_turn", &self.framing.transition_turn())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_answers() {
        for answer in ["yes", "Yes.", "  YEP, we're done", "y", "okay then", "Alright", "sure!"] {
            assert!(is_affirmative(answer), "{:?} should be affirmative", answer);
        }
    }

    #[test]
    fn non_affirmative_answers() {
        for answer in ["no", "Not yet", "yesterday was busy", "", "maybe", "they said yes"] {
            assert!(!is_affirmative(answer), "{:?} should not be affirmative", answer);
        }
    }
}
