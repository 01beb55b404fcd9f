//! Inference backend contract.
//!
//! The runtime never performs model computation itself. A backend loads
//! models per slot kind and hands back opaque model objects; every call on
//! them is blocking and is always issued from a blocking-pool thread.

use std::sync::Arc;

use crate::engine::input::ChatMessage;
use crate::error::BackendError;
use crate::models::SlotKind;

/// Lazy, finite sequence of generated text fragments.
pub type ChunkIter<'a> = Box<dyn Iterator<Item = Result<String, BackendError>> + Send + 'a>;

/// A loaded text-generation model.
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;

    /// Render a chat history into the model's prompt format, including the
    /// trailing generation prompt.
    fn apply_chat_template(&self, messages: &[ChatMessage]) -> Result<String, BackendError>;

    /// Bounded generation. Returns the continuation only, never the prompt.
    fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, BackendError>;

    /// Same computation as [`ChatModel::generate`], yielded incrementally.
    ///
    /// Each call to `next()` may perform backend work; the caller stops
    /// polling as soon as the consumer goes away.
    fn generate_stream(&self, prompt: String, max_tokens: u32) -> Result<ChunkIter<'_>, BackendError>;
}

/// A loaded image-synthesis model.
pub trait ImageModel: Send + Sync {
    fn model_id(&self) -> &str;

    /// Synthesize one image, returned as encoded PNG bytes.
    fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, BackendError>;
}

/// A loaded image-understanding model.
pub trait VisionModel: Send + Sync {
    fn model_id(&self) -> &str;

    fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, BackendError>;
}

/// A model as returned by the backend loader.
#[derive(Clone)]
pub enum LoadedModel {
    Chat(Arc<dyn ChatModel>),
    Image(Arc<dyn ImageModel>),
    Vision(Arc<dyn VisionModel>),
}

impl LoadedModel {
    pub fn kind(&self) -> SlotKind {
        match self {
            Self::Chat(_) => SlotKind::Chat,
            Self::Image(_) => SlotKind::Image,
            Self::Vision(_) => SlotKind::Vision,
        }
    }

    pub fn model_id(&self) -> &str {
        match self {
            Self::Chat(m) => m.model_id(),
            Self::Image(m) => m.model_id(),
            Self::Vision(m) => m.model_id(),
        }
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("kind", &self.kind())
            .field("model_id", &self.model_id())
            .finish()
    }
}

/// Loads models on demand. Loading may download weights and take minutes.
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, slot: SlotKind, model_id: &str) -> Result<LoadedModel, BackendError>;
}
