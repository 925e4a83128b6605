//! The pluggable text-generation seam.
//!
//! A [`Backend`] turns a rendered [`Prompt`] into raw text. It never retries and never
//! cleans up the response; both are done by [`Actor`](crate::Actor) so every backend
//! gets identical semantics.
//!
//! Implementations must be `Send + Sync`: arenas hold them behind `Arc<dyn Backend>` and
//! may call them from a spawned task.
//!
//! ```rust
//! use async_trait::async_trait;
//! use dialogarena::backend::{Backend, BackendError};
//! use dialogarena::prompt::Prompt;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Backend for Echo {
//!     async fn query(&self, prompt: &Prompt) -> Result<String, BackendError> {
//!         Ok(prompt.segments.last().map(|s| s.text.clone()).unwrap_or_default())
//!     }
//!
//!     fn model_name(&self) -> &str {
//!         "echo"
//!     }
//! }
//! ```

use crate::dialogarena::prompt::Prompt;
use async_trait::async_trait;
use std::error::Error;
use std::sync::Mutex;

/// Error type backends report. Any error is treated as retryable.
pub type BackendError = Box<dyn Error + Send + Sync>;

/// Token accounting for a single backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Produce one raw response for `prompt`.
    async fn query(&self, prompt: &Prompt) -> Result<String, BackendError>;

    fn model_name(&self) -> &str;

    /// Drop any state kept between calls. Stateless backends keep the no-op default.
    fn reset(&self) {}

    /// Slot where the backend records the usage of its most recent successful call.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }

    fn last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|usage| *usage))
    }

    /// Remove and return the recorded usage, so each call is accounted at most once.
    fn take_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|mut usage| usage.take()))
    }
}
