//! End-of-conversation sentinel.
//!
//! When an actor can no longer produce a line (its backend exhausted every retry) it speaks
//! the sentinel instead. The moderator treats a trailing sentinel as an unconditional stop.
//!
//! The token embeds a random v4 UUID generated when the [`Sentinel`] is created, so neither a
//! model nor user-supplied text can trigger it by accident. An arena generates one per run
//! and passes it explicitly to every actor call.

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Fixed marker that prefixes every sentinel token.
pub const END_OF_CONVERSATION_MARKER: &str = "<<<<<<END_OF_CONVERSATION>>>>>>";

/// Reserved utterance signalling that the conversation cannot continue.
#[derive(Clone, PartialEq, Eq)]
pub struct Sentinel {
    token: Arc<str>,
}

impl Sentinel {
    /// Generate a fresh, unguessable sentinel.
    pub fn generate() -> Self {
        let token = format!("{}{}", END_OF_CONVERSATION_MARKER, Uuid::new_v4());
        Self {
            token: Arc::from(token.as_str()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Whether `content` is exactly this sentinel.
    ///
    /// A line that merely contains the marker, or a sentinel from another run, does not match.
    pub fn matches(&self, content: &str) -> bool {
        content == &*self.token
    }
}

impl Default for Sentinel {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Debug for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sentinel").field(&self.as_str()).finish()
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_unique_per_generation() {
        let a = Sentinel::generate();
        let b = Sentinel::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with(END_OF_CONVERSATION_MARKER));
    }

    #[test]
    fn matching_is_exact() {
        let sentinel = Sentinel::generate();
        assert!(sentinel.matches(sentinel.as_str()));
        assert!(!sentinel.matches(END_OF_CONVERSATION_MARKER));
        assert!(!sentinel.matches(&format!("{} ", sentinel)));
        assert!(!sentinel.matches(Sentinel::generate().as_str()));
    }
}
