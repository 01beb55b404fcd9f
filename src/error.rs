//! Error types for the slot runtime.
//!
//! Load failures are absorbed into slot status; everything else is returned
//! to the caller that issued the request.

use thiserror::Error;

use crate::models::SlotKind;

/// Failure reported by an inference backend implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors surfaced by runtime operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{} model not loaded.", .0.title())]
    NotLoaded(SlotKind),

    #[error("failed to load {slot} model '{model_id}': {reason}")]
    ModelLoad {
        slot: SlotKind,
        model_id: String,
        reason: String,
    },

    #[error("{0}")]
    Backend(String),
}

impl CoreError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_request",
            Self::NotLoaded(_) => "not_loaded",
            Self::ModelLoad { .. } | Self::Backend(_) => "backend_error",
        }
    }

    /// Returns true if the caller, not the runtime, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotLoaded(_))
    }
}

impl From<BackendError> for CoreError {
    fn from(err: BackendError) -> Self {
        Self::Backend(err.0)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
