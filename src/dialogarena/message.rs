//! Transcript data model.
//!
//! Every line spoken during a run is captured as a [`Message`] and appended to the shared
//! [`Transcript`]. The transcript is the only observation handed to actors and to the
//! moderator, so its ordering is the turn order of the conversation.
//!
//! # Example
//!
//! ```
//! use dialogarena::message::{Transcript, TurnIndex};
//!
//! let mut transcript = Transcript::new();
//! transcript.append("Seller", "Welcome in! Looking for anything special?");
//! transcript.append("Shopper", "Just browsing the jackets.");
//!
//! assert_eq!(transcript.len(), 2);
//! assert_eq!(transcript.messages()[1].speaker_name, "Shopper");
//! assert_eq!(transcript.messages()[1].turn, TurnIndex::At(1));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Speaker name reserved for the system/narrator. Ordinary actors may not use it.
pub const SYSTEM_NAME: &str = "System";

/// Name every moderator actor is created with.
pub const MODERATOR_NAME: &str = "Moderator";

/// End-of-message marker appended to non-system lines inside prompts.
///
/// Backends are asked to stop on it, and it is stripped from responses.
pub const END_OF_MESSAGE: &str = "<EOS>";

/// Position of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnIndex {
    /// Zero-based turn number assigned by the transcript on append.
    At(usize),
    /// Synthetic message that never entered the transcript (e.g. a moderator request).
    OutOfBand,
}

/// A single immutable transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Name of the speaking actor, or [`SYSTEM_NAME`] for narrator lines.
    pub speaker_name: String,

    /// The utterance. Stored as `Arc<str>` so cloning transcripts stays cheap.
    pub content: Arc<str>,

    /// Turn the message was recorded in.
    pub turn: TurnIndex,

    /// UTC timestamp recorded when the message was created.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a synthetic message that is not part of any transcript.
    ///
    /// Used for system-directed requests such as the moderator's terminal condition.
    pub fn out_of_band(speaker_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            speaker_name: speaker_name.into(),
            content: Arc::from(content.into().as_str()),
            turn: TurnIndex::OutOfBand,
            timestamp: Utc::now(),
        }
    }

    /// Whether this line was spoken by the system/narrator.
    pub fn is_system(&self) -> bool {
        self.speaker_name == SYSTEM_NAME
    }
}

/// Serializable `{speaker_name, content}` view of a transcript entry handed to callers
/// that persist finished runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub speaker_name: String,
    pub content: String,
}

/// Append-only, ordered log of a conversation.
///
/// There is no way to edit or remove an entry once appended; [`Transcript::clear`] only
/// exists so an arena can be reused for a fresh run.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new entry, assigning it the next turn index.
    pub fn append(&mut self, speaker_name: impl Into<String>, content: impl Into<String>) -> &Message {
        let turn = TurnIndex::At(self.messages.len());
        self.messages.push(Message {
            speaker_name: speaker_name.into(),
            content: Arc::from(content.into().as_str()),
            turn,
            timestamp: Utc::now(),
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Export the transcript as plain `{speaker_name, content}` records.
    pub fn records(&self) -> Vec<TranscriptRecord> {
        self.messages
            .iter()
            .map(|m| TranscriptRecord {
                speaker_name: m.speaker_name.clone(),
                content: m.content.to_string(),
            })
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }
}
