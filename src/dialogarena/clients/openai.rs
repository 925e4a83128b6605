//! `OpenAIChat` implements [`Backend`] over OpenAI's Chat Completions REST API, including
//! multimodal image parts, and records the token usage of every successful call.
//!
//! # Message mapping
//!
//! - the first prompt segment becomes the `system` message,
//! - the actor's own past lines become `assistant` messages (consecutive ones merged),
//! - everyone else's lines, system narration and the request become `user` messages of the
//!   form `[name]: text`, folded into one message when
//!   [`merge_other_agents_as_one_user`](crate::BackendConfig::merge_other_agents_as_one_user)
//!   is set,
//! - the prompt image, if any, is attached to the last `user` message.
//!
//! # Example
//!
//! ```rust,no_run
//! use dialogarena::clients::openai::OpenAIChat;
//! use dialogarena::BackendConfig;
//!
//! // Reads the key from OPENAI_API_KEY.
//! let backend = OpenAIChat::from_config(&BackendConfig::default()).unwrap();
//! ```

use crate::dialogarena::backend::{Backend, BackendError, TokenUsage};
use crate::dialogarena::clients::common::{get_http_client, send_and_track};
use crate::dialogarena::config::{BackendConfig, ConfigError};
use crate::dialogarena::message::END_OF_MESSAGE;
use crate::dialogarena::prompt::Prompt;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::sync::Mutex;

/// Stop sequences sent with every request.
pub const STOP_SEQUENCES: [&str; 2] = ["<|endoftext|>", END_OF_MESSAGE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl ChatContent {
    /// Text of the message, ignoring image parts.
    pub fn text(&self) -> &str {
        match self {
            ChatContent::Text(text) => text,
            ChatContent::Parts(parts) => parts
                .iter()
                .find_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .unwrap_or(""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: ChatContent,
}

impl ChatMessage {
    fn text(role: ChatRole, text: String) -> Self {
        Self {
            role,
            content: ChatContent::Text(text),
        }
    }
}

/// Map a [`Prompt`] onto Chat Completions messages.
pub fn format_chat_messages(prompt: &Prompt, merge_other_agents_as_one_user: bool) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::with_capacity(prompt.segments.len());

    for (i, segment) in prompt.segments.iter().enumerate() {
        if i == 0 {
            messages.push(ChatMessage::text(ChatRole::System, segment.text.clone()));
            continue;
        }

        if segment.speaker == prompt.agent_name {
            match messages.last_mut() {
                Some(ChatMessage {
                    role: ChatRole::Assistant,
                    content: ChatContent::Text(text),
                }) => {
                    text.push('\n');
                    text.push_str(&segment.text);
                }
                _ => messages.push(ChatMessage::text(ChatRole::Assistant, segment.text.clone())),
            }
            continue;
        }

        let line = format!("[{}]: {}", segment.speaker, segment.text);
        match messages.last_mut() {
            Some(ChatMessage {
                role: ChatRole::User,
                content: ChatContent::Text(text),
            }) if merge_other_agents_as_one_user => {
                text.push_str("\n\n");
                text.push_str(&line);
            }
            _ => messages.push(ChatMessage::text(ChatRole::User, line)),
        }
    }

    if let Some(image) = &prompt.image {
        if let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == ChatRole::User) {
            let text = last_user.content.text().to_string();
            last_user.content = ChatContent::Parts(vec![
                ContentPart::Text { text },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_url(),
                    },
                },
            ]);
        }
    }

    messages
}

pub struct OpenAIChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    merge_other_agents_as_one_user: bool,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let defaults = BackendConfig::default();
        Self {
            client: get_http_client(&defaults.base_url),
            api_key: api_key.into(),
            base_url: defaults.base_url,
            model: model.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            merge_other_agents_as_one_user: defaults.merge_other_agents_as_one_user,
            token_usage: Mutex::new(None),
        }
    }

    /// Build a backend from `config`, reading the key from `config.api_key_env`.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(config.api_key_env.clone()))?;

        Ok(Self::new(api_key, config.model.clone())
            .with_base_url(config.base_url.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_merge_other_agents_as_one_user(config.merge_other_agents_as_one_user))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self.client = get_http_client(&self.base_url);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_merge_other_agents_as_one_user(mut self, merge: bool) -> Self {
        self.merge_other_agents_as_one_user = merge;
        self
    }

    /// JSON body sent for `prompt`.
    pub fn request_body(&self, prompt: &Prompt) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": format_chat_messages(prompt, self.merge_other_agents_as_one_user),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stop": STOP_SEQUENCES,
        })
    }
}

#[async_trait]
impl Backend for OpenAIChat {
    async fn query(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        send_and_track(
            &self.client,
            &url,
            &self.api_key,
            &self.request_body(prompt),
            &self.token_usage,
        )
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}
