//! Generation orchestration against the resident slot models.
//!
//! Every backend call runs on the blocking pool. A request takes a snapshot
//! of the slot's model before doing any work and keeps it for its whole
//! duration, so a concurrent load never disturbs it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Span;

use super::backend::ChatModel;
use super::input::GenerationRequest;
use super::streaming::{ChunkSender, ChunkStream};
use crate::error::{CoreError, CoreResult};
use crate::models::{SlotKind, SlotManager};
use crate::telemetry::{self, OperationSpan, SpanExt};

/// Default capacity of the chunk channel between producer and consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 16;

const CANCELLED: &str = "generation cancelled";

/// Runs chat generation, image synthesis and vision analysis.
pub struct GenerationOrchestrator {
    slots: Arc<SlotManager>,
    stream_buffer: usize,
    shutdown: CancellationToken,
}

impl GenerationOrchestrator {
    /// `shutdown` is the parent of every stream's cancellation token.
    pub fn new(slots: Arc<SlotManager>, stream_buffer: usize, shutdown: CancellationToken) -> Self {
        Self {
            slots,
            stream_buffer: stream_buffer.max(1),
            shutdown,
        }
    }

    pub fn slots(&self) -> &Arc<SlotManager> {
        &self.slots
    }

    /// Run a chat generation to completion and return the continuation.
    pub async fn generate(&self, request: GenerationRequest) -> CoreResult<String> {
        request.validate()?;
        let model = self.slots.chat_model()?;
        let span = request_span(SlotKind::Chat, "blocking", model.model_id());

        let result = run_blocking(span.clone(), move || {
            let prompt = model.apply_chat_template(&request.messages)?;
            Ok(model.generate(&prompt, request.max_tokens)?)
        })
        .await;

        finish_request(&span, SlotKind::Chat, "blocking", &result);
        result
    }

    /// Start a streaming chat generation.
    ///
    /// Validation and slot checks happen before this returns; backend
    /// failures arrive through the stream. Dropping the returned stream
    /// stops the producer before its next unit of backend work.
    pub fn generate_stream(&self, request: GenerationRequest) -> CoreResult<ChunkStream> {
        request.validate()?;
        let model = self.slots.chat_model()?;
        let span = request_span(SlotKind::Chat, "stream", model.model_id());

        let (sender, stream) =
            ChunkStream::channel(self.stream_buffer, self.shutdown.child_token());
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let success = produce(model.as_ref(), request, sender);
            telemetry::record_request(SlotKind::Chat, "stream", success);
            span.record("status", if success { "ok" } else { "error" });
        });
        Ok(stream)
    }

    /// Synthesize an image from a prompt. Returns PNG bytes.
    pub async fn generate_image(&self, prompt: String) -> CoreResult<Vec<u8>> {
        if prompt.trim().is_empty() {
            return Err(CoreError::Validation("prompt cannot be empty".into()));
        }
        let model = self.slots.image_model()?;
        let span = request_span(SlotKind::Image, "synthesize", model.model_id());

        let result = run_blocking(span.clone(), move || Ok(model.generate_image(&prompt)?)).await;

        finish_request(&span, SlotKind::Image, "synthesize", &result);
        result
    }

    /// Describe an image according to `prompt`.
    pub async fn analyze_image(&self, image: Vec<u8>, prompt: String) -> CoreResult<String> {
        let model = self.slots.vision_model()?;
        let span = request_span(SlotKind::Vision, "analyze", model.model_id());

        let result = run_blocking(span.clone(), move || Ok(model.analyze(&image, &prompt)?)).await;

        finish_request(&span, SlotKind::Vision, "analyze", &result);
        result
    }
}

fn request_span(slot: SlotKind, mode: &str, model_id: &str) -> Span {
    let span = OperationSpan::request(slot.as_str(), mode);
    span.record("model_id", model_id);
    span
}

fn finish_request<T>(span: &Span, slot: SlotKind, mode: &'static str, result: &CoreResult<T>) {
    span.record_result(result);
    telemetry::record_request(slot, mode, result.is_ok());
}

async fn run_blocking<T, F>(span: Span, work: F) -> CoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        work()
    })
    .await
    .map_err(|e| CoreError::Backend(format!("inference task failed: {}", e)))?
}

/// Drive the backend iterator into the channel. Returns true on completion.
fn produce(model: &dyn ChatModel, request: GenerationRequest, sender: ChunkSender) -> bool {
    let prompt = match model.apply_chat_template(&request.messages) {
        Ok(prompt) => prompt,
        Err(e) => {
            sender.fail(e.0);
            return false;
        }
    };
    let mut chunks = match model.generate_stream(prompt, request.max_tokens) {
        Ok(chunks) => chunks,
        Err(e) => {
            sender.fail(e.0);
            return false;
        }
    };

    let mut delivered = 0usize;
    loop {
        if sender.is_cancelled() {
            tracing::debug!(delivered, "stream cancelled by consumer");
            telemetry::record_stream_cancelled();
            sender.fail(CANCELLED);
            return false;
        }
        match chunks.next() {
            Some(Ok(text)) => {
                if sender.send(text).is_err() {
                    tracing::debug!(delivered, "stream consumer went away");
                    telemetry::record_stream_cancelled();
                    return false;
                }
                delivered += 1;
                telemetry::record_stream_chunk();
            }
            Some(Err(e)) => {
                tracing::warn!(delivered, error = %e, "generation failed mid-stream");
                sender.fail(e.0);
                return false;
            }
            None => {
                tracing::debug!(delivered, "stream complete");
                sender.finish();
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::input::ChatMessage;
    use crate::engine::mock::{MockBackend, MockConfig};
    use crate::models::StatusRegistry;

    fn orchestrator(config: MockConfig) -> (GenerationOrchestrator, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::with_config(config));
        let slots = Arc::new(SlotManager::new(backend.clone(), Arc::new(StatusRegistry::new())));
        (
            GenerationOrchestrator::new(slots, 4, CancellationToken::new()),
            backend,
        )
    }

    fn hi() -> GenerationRequest {
        GenerationRequest::new(vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn blocking_generate_returns_continuation() {
        let (orch, _) = orchestrator(MockConfig::default());
        orch.slots().load(SlotKind::Chat, "echo").unwrap();
        assert_eq!(orch.generate(hi()).await.unwrap(), "hi-echo");
    }

    #[tokio::test]
    async fn stream_matches_blocking() {
        let (orch, _) = orchestrator(MockConfig::default());
        orch.slots().load(SlotKind::Chat, "echo").unwrap();
        let streamed = orch.generate_stream(hi()).unwrap().collect_text().await.unwrap();
        assert_eq!(streamed, orch.generate(hi()).await.unwrap());
    }

    #[tokio::test]
    async fn empty_slot_never_reaches_backend() {
        let (orch, backend) = orchestrator(MockConfig::default());
        assert!(matches!(orch.generate(hi()).await, Err(CoreError::NotLoaded(SlotKind::Chat))));
        assert!(orch.generate_stream(hi()).is_err());
        assert_eq!(backend.stats().inference_calls(), 0);
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_first() {
        let (orch, backend) = orchestrator(MockConfig::default());
        orch.slots().load(SlotKind::Chat, "echo").unwrap();
        let err = orch.generate(GenerationRequest::new(Vec::new())).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(backend.stats().inference_calls(), 0);
    }
}
