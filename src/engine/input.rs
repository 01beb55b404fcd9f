//! Chat request types and validation.
//!
//! Requests are checked before any slot is touched; invalid requests are
//! rejected as a whole.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Output-token budget used when a request does not specify one.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Upper bound on total message content per request (1 MiB).
pub const MAX_CONTENT_BYTES: usize = 1024 * 1024;

/// Typed chat roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }
}

/// Ordered chat history plus an output-token budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.messages.is_empty() {
            return Err(CoreError::Validation("messages cannot be empty".into()));
        }
        if self.max_tokens == 0 {
            return Err(CoreError::Validation("max_length must be > 0".into()));
        }
        let total: usize = self.messages.iter().map(|m| m.content.len()).sum();
        if total > MAX_CONTENT_BYTES {
            return Err(CoreError::Validation(format!(
                "message content exceeds maximum: {} > {} bytes",
                total, MAX_CONTENT_BYTES
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget() {
        let req = GenerationRequest::new(vec![ChatMessage::user("hi")]);
        assert_eq!(req.max_tokens, 2048);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn rejects_empty_history() {
        let req = GenerationRequest::new(Vec::new());
        assert!(matches!(req.validate(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn rejects_zero_budget() {
        let req = GenerationRequest::new(vec![ChatMessage::user("hi")]).with_max_tokens(0);
        assert!(matches!(req.validate(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn rejects_oversized_content() {
        let big = "x".repeat(MAX_CONTENT_BYTES + 1);
        let req = GenerationRequest::new(vec![ChatMessage::user(big)]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn role_serde_is_lowercase() {
        let msg: ChatMessage = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(msg.role, ChatRole::User);
        assert!(serde_json::from_str::<ChatMessage>(r#"{"role":"robot","content":"x"}"#).is_err());
    }
}
