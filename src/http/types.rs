//! Request and response bodies of the HTTP API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{ChatMessage, GenerationRequest};
use crate::error::CoreError;
use crate::models::{LoadOutcome, SlotKind};

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    pub model_id: String,
    pub model_type: String,
}

#[derive(Debug, Serialize)]
pub struct LoadAccepted {
    pub status: &'static str,
    pub message: String,
    pub load_id: Uuid,
    pub slot: SlotKind,
    pub model_id: String,
}

#[derive(Debug, Serialize)]
pub struct LoadStatusResponse {
    pub load_id: Uuid,
    #[serde(flatten)]
    pub outcome: LoadOutcome,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub slot: Option<String>,
}

/// Chat input. Either a message history or a bare `prompt`, which is
/// treated as a single user message.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
}

impl ChatRequest {
    pub fn into_generation(self, default_max_tokens: u32) -> Result<GenerationRequest, CoreError> {
        let messages = match (self.messages, self.prompt) {
            (Some(messages), _) => messages,
            (None, Some(prompt)) => vec![ChatMessage::user(prompt)],
            (None, None) => {
                return Err(CoreError::Validation(
                    "either messages or prompt is required".into(),
                ))
            }
        };
        let request = GenerationRequest::new(messages)
            .with_max_tokens(self.max_length.unwrap_or(default_max_tokens));
        request.validate()?;
        Ok(request)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResponse {
    pub image_base64: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeQuery {
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub analysis: String,
}
