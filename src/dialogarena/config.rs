//! Configuration for dialogarena runs.
//!
//! All configuration structs are plain data that callers can build in code. They also
//! implement serde's `Deserialize`/`Serialize` so the prompt-preparation step that produces
//! role descriptions can hand a whole run over as JSON.
//!
//! Validation does not happen here: an [`ActorConfig`] is turned into an
//! [`Actor`](crate::Actor) by [`Actor::from_config`](crate::Actor::from_config), which
//! rejects invalid transition turns, reserved names and missing framings with a
//! [`ConfigError`].
//!
//! # Example
//!
//! ```rust
//! use dialogarena::config::ArenaConfig;
//!
//! let config = ArenaConfig::from_json_str(r#"{
//!     "global_prompt": "A furniture store on a quiet afternoon.",
//!     "speakers": [
//!         {
//!             "name": "Seller",
//!             "role_desc": "Greet the customer.",
//!             "role_desc_in_transition_turn": "Introduce the new sofa line.",
//!             "role_desc_after_transition_turn": "Help close the sale.",
//!             "transition_turn": 3
//!         },
//!         {
//!             "name": "Shopper",
//!             "role_before": "You want a lamp.",
//!             "role_at_transition": "You notice the sofas.",
//!             "role_after_transition": "Decide on a sofa.",
//!             "transition_turn": 3
//!         }
//!     ],
//!     "moderator": {
//!         "role_desc": "You watch the conversation.",
//!         "terminal_condition": "Has the shopper made a final decision? Answer yes or no."
//!     },
//!     "run": { "max_steps": 10, "moderation_period": "round" }
//! }"#).unwrap();
//!
//! assert_eq!(config.speakers.len(), 2);
//! assert_eq!(config.speakers[1].role_desc, "You want a lamp.");
//! assert_eq!(config.run.max_steps, 10);
//! assert_eq!(config.backend.model, "gpt-4o-mini");
//! ```

use crate::dialogarena::retry::RetryPolicy;
use crate::dialogarena::scheduler::ModerationPeriod;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors detected while constructing actors, arenas or retry policies.
///
/// These are always fatal: invalid configuration is never silently coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The transition turn must be a positive number of messages.
    InvalidTransitionTurn(i64),
    /// An ordinary actor tried to use the reserved system speaker name.
    ReservedName(String),
    /// Actor names may not be blank.
    EmptyName,
    /// A required role description is blank. Carries the framing slot name.
    MissingFraming(String),
    /// An arena needs at least one speaking actor.
    NoSpeakers,
    /// Two speaking actors share a name.
    DuplicateSpeaker(String),
    /// `is_terminal` was called on, or a moderator slot was filled with, a speaking actor.
    NotAModerator(String),
    /// A moderator actor was placed in the speaker list.
    ModeratorAsSpeaker(String),
    /// Retry policy parameters are out of range.
    InvalidRetryPolicy(String),
    /// The environment variable named by [`BackendConfig::api_key_env`] is unset or empty.
    MissingApiKey(String),
    /// A configuration document could not be parsed.
    Parse(String),
    /// A configuration file could not be read.
    Io(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidTransitionTurn(turn) => {
                write!(f, "Invalid transition turn {} (must be > 0)", turn)
            }
            ConfigError::ReservedName(name) => {
                write!(f, "Actor name '{}' is reserved for the system", name)
            }
            ConfigError::EmptyName => write!(f, "Actor name must not be empty"),
            ConfigError::MissingFraming(which) => {
                write!(f, "Missing required role framing: {}", which)
            }
            ConfigError::NoSpeakers => write!(f, "Arena requires at least one speaking actor"),
            ConfigError::DuplicateSpeaker(name) => {
                write!(f, "Speaker '{}' is registered more than once", name)
            }
            ConfigError::NotAModerator(name) => write!(f, "Actor '{}' is not a moderator", name),
            ConfigError::ModeratorAsSpeaker(name) => {
                write!(f, "Moderator '{}' cannot take speaking turns", name)
            }
            ConfigError::InvalidRetryPolicy(msg) => write!(f, "Invalid retry policy: {}", msg),
            ConfigError::MissingApiKey(var) => {
                write!(f, "API key environment variable '{}' is not set", var)
            }
            ConfigError::Parse(msg) => write!(f, "Failed to parse configuration: {}", msg),
            ConfigError::Io(msg) => write!(f, "Failed to read configuration: {}", msg),
        }
    }
}

impl Error for ConfigError {}

/// Construction parameters for a speaking actor.
///
/// Field names follow the role-description files produced upstream; the shorter
/// `role_before` / `role_at_transition` / `role_after_transition` spellings are accepted as
/// aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorConfig {
    pub name: String,

    #[serde(alias = "role_before")]
    pub role_desc: String,

    #[serde(alias = "role_at_transition")]
    pub role_desc_in_transition_turn: String,

    #[serde(alias = "role_after_transition")]
    pub role_desc_after_transition_turn: String,

    /// Message-count threshold at which framing switches. Must be > 0.
    pub transition_turn: i64,

    /// Shared framing common to every actor of a run. An arena-level global prompt fills
    /// this in when left empty.
    #[serde(default, alias = "global_framing", skip_serializing_if = "Option::is_none")]
    pub global_prompt: Option<String>,

    #[serde(default, alias = "visual_ref_primary", skip_serializing_if = "Option::is_none")]
    pub visual_path: Option<PathBuf>,

    #[serde(default, alias = "visual_ref_secondary", skip_serializing_if = "Option::is_none")]
    pub second_visual_path: Option<PathBuf>,

    /// Per-actor override of [`BackendConfig::max_tokens`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Construction parameters for the moderator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeratorConfig {
    #[serde(alias = "role")]
    pub role_desc: String,

    /// Yes/no question asked of the moderator after each cadence point.
    pub terminal_condition: String,

    /// Only affects which (identical) framing slot is reported in logs. Defaults to 1.
    #[serde(default = "default_moderator_transition_turn")]
    pub transition_turn: i64,

    /// Per-moderator override of [`BackendConfig::max_tokens`]. A yes/no answer needs few.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_moderator_transition_turn() -> i64 {
    1
}

/// Parameters for the bundled [`OpenAIChat`](crate::clients::openai::OpenAIChat) backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Fold consecutive lines from other speakers into a single `user` message.
    pub merge_other_agents_as_one_user: bool,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 256,
            merge_other_agents_as_one_user: true,
            base_url: "https://api.openai.com".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Scheduling parameters of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Step budget counted in individual turns, not rounds.
    pub max_steps: usize,
    pub moderation_period: ModerationPeriod,
    pub retry: RetryPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: 30,
            moderation_period: ModerationPeriod::Round,
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything needed to assemble one [`Arena`](crate::Arena).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    #[serde(default, alias = "global_framing", skip_serializing_if = "Option::is_none")]
    pub global_prompt: Option<String>,

    /// Speaking actors in turn order.
    pub speakers: Vec<ActorConfig>,

    pub moderator: ModeratorConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub backend: BackendConfig,
}

impl ArenaConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_defaults_follow_the_playground() {
        let backend = BackendConfig::default();
        assert_eq!(backend.temperature, 0.7);
        assert_eq!(backend.max_tokens, 256);
        assert!(backend.merge_other_agents_as_one_user);
    }

    #[test]
    fn run_config_accepts_turn_cadence() {
        let run: RunConfig =
            serde_json::from_str(r#"{"max_steps": 4, "moderation_period": "turn"}"#).unwrap();
        assert_eq!(run.max_steps, 4);
        assert_eq!(run.moderation_period, ModerationPeriod::Turn);
        assert_eq!(run.retry, RetryPolicy::default());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = ArenaConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
