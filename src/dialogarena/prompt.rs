//! Prompt assembly and response cleanup.
//!
//! A [`Prompt`] is a backend-neutral, ordered list of `(speaker, text)` segments:
//!
//! 1. a system segment with the (optional) global framing, the actor's name and its
//!    currently active role description,
//! 2. one segment per transcript entry, non-system lines terminated with [`END_OF_MESSAGE`],
//! 3. a trailing system request: either "Now you speak, {name}." or an explicit request such
//!    as the moderator's terminal condition.
//!
//! Backends decide how to map segments onto their own chat roles.

use crate::dialogarena::framing::{prompt_length, RoleFraming, TransitionPhase};
use crate::dialogarena::message::{Message, Transcript, END_OF_MESSAGE, SYSTEM_NAME};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use std::path::Path;

lazy_static! {
    static ref BRACKETED_SPEAKER_PREFIX: Regex = Regex::new(r"^\s*\[.*\]:").unwrap();
    static ref TRAILING_END_OF_MESSAGE: Regex =
        Regex::new(&format!("{}$", regex::escape(END_OF_MESSAGE))).unwrap();
}

/// One line of a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub speaker: String,
    pub text: String,
}

impl Segment {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.speaker == SYSTEM_NAME
    }
}

/// A base64-encoded image shown alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub media_type: String,
    pub base64_data: String,
}

impl ImageAttachment {
    pub fn from_bytes(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            base64_data: STANDARD.encode(bytes),
        }
    }

    /// Read and encode an image file.
    ///
    /// Returns `None` (and logs a warning) when the file cannot be read; a missing picture
    /// only costs the actor its visual context.
    pub async fn load(path: &Path) -> Option<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Some(Self::from_bytes(media_type_for(path), &bytes)),
            Err(e) => {
                warn!("Skipping visual reference {}: {}", path.display(), e);
                None
            }
        }
    }

    /// `data:` URL form accepted by multimodal chat APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.base64_data)
    }
}

fn media_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Everything a backend needs for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Name of the actor the response is for.
    pub agent_name: String,
    /// Framing phase the prompt was rendered in.
    pub phase: TransitionPhase,
    pub segments: Vec<Segment>,
    pub image: Option<ImageAttachment>,
}

impl Prompt {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Text of the leading framing segment.
    pub fn system_text(&self) -> &str {
        self.segments.first().map(|s| s.text.as_str()).unwrap_or("")
    }
}

/// Framing segment text for an actor in a given role.
pub fn framing_text(global_prompt: Option<&str>, agent_name: &str, role_desc: &str) -> String {
    match global_prompt.map(str::trim).filter(|g| !g.is_empty()) {
        Some(global) => format!(
            "{}\n\nYour name: {}\n\nYour role: {}",
            global, agent_name, role_desc
        ),
        None => format!("You are {}.\n\nYour role: {}", agent_name, role_desc),
    }
}

/// Default request appended when an actor is asked for its next line.
pub fn speak_now_request(agent_name: &str) -> String {
    format!("Now you speak, {}.{}", agent_name, END_OF_MESSAGE)
}

/// Render the prompt `agent_name` sees for `transcript`.
///
/// The phase is chosen from the final prompt length, so the framing segment already
/// reflects the role that applies to the line being requested.
pub fn assemble(
    agent_name: &str,
    framing: &RoleFraming,
    global_prompt: Option<&str>,
    transcript: &Transcript,
    request: Option<&Message>,
) -> Prompt {
    let phase = framing.phase_for(transcript.len());
    let mut segments = Vec::with_capacity(prompt_length(transcript.len()));

    segments.push(Segment::new(
        SYSTEM_NAME,
        framing_text(global_prompt, agent_name, framing.role_desc(phase)),
    ));

    for message in transcript.messages() {
        if message.is_system() {
            segments.push(Segment::new(SYSTEM_NAME, message.content.to_string()));
        } else {
            segments.push(Segment::new(
                message.speaker_name.clone(),
                format!("{}{}", message.content, END_OF_MESSAGE),
            ));
        }
    }

    let request_text = match request {
        Some(req) => req.content.to_string(),
        None => speak_now_request(agent_name),
    };
    segments.push(Segment::new(SYSTEM_NAME, request_text));

    Prompt {
        agent_name: agent_name.to_string(),
        phase,
        segments,
        image: None,
    }
}

/// Strip speaker prefixes the model tends to echo back and the trailing end-of-message
/// marker.
pub fn clean_response(agent_name: &str, raw: &str) -> String {
    let response = BRACKETED_SPEAKER_PREFIX.replace(raw.trim(), "");
    let response = strip_own_prefix(agent_name, response.trim()).trim();

    TRAILING_END_OF_MESSAGE
        .replace(response, "")
        .trim()
        .to_string()
}

/// Drop a leading `"{agent_name}:"` (whitespace allowed before the colon).
fn strip_own_prefix<'a>(agent_name: &str, text: &'a str) -> &'a str {
    text.strip_prefix(agent_name)
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(text)
}
