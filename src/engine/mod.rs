//! Inference side of the runtime: the backend contract, request types,
//! the streaming bridge and the orchestrator that ties them to the slots.

pub mod backend;
pub mod input;
pub mod mock;
pub mod orchestrator;
pub mod streaming;

pub use backend::{ChatModel, ChunkIter, ImageModel, InferenceBackend, LoadedModel, VisionModel};
pub use input::{ChatMessage, ChatRole, GenerationRequest, DEFAULT_MAX_TOKENS, MAX_CONTENT_BYTES};
pub use mock::{MockBackend, MockConfig, MockStats};
pub use orchestrator::{GenerationOrchestrator, DEFAULT_STREAM_BUFFER};
pub use streaming::{ChunkSender, ChunkStream, StreamClosed};
