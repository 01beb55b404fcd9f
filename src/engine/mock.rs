//! Deterministic in-process backend.
//!
//! Chat models echo the last user message with an `-echo` suffix, image
//! models return a fixed 1x1 PNG and vision models describe the byte count.
//! Delays, failures and counters are configurable so the coordination layer
//! can be exercised without real weights.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::backend::{ChatModel, ChunkIter, ImageModel, InferenceBackend, LoadedModel, VisionModel};
use super::input::ChatMessage;
use crate::error::BackendError;
use crate::models::SlotKind;

/// Minimal valid PNG (1x1, transparent).
pub const MOCK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

const USER_TAG: &str = "<|user|>\n";
const ASSISTANT_TAG: &str = "<|assistant|>\n";

/// Tunables for [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub load_delay: Duration,
    pub chunk_delay: Duration,
    /// Characters per streamed chunk (floor 1).
    pub chunk_chars: usize,
    /// How many times the reply is repeated; used to build long streams.
    pub reply_repeat: usize,
    /// Fail generation after this many chunks.
    pub fail_after: Option<usize>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            load_delay: Duration::ZERO,
            chunk_delay: Duration::ZERO,
            chunk_chars: 2,
            reply_repeat: 1,
            fail_after: None,
        }
    }
}

/// Call counters shared by the backend and every model it loads.
#[derive(Debug, Default)]
pub struct MockStats {
    pub loads_started: AtomicUsize,
    pub loads_finished: AtomicUsize,
    /// Generate, analyze and image calls (not loads).
    pub inference_calls: AtomicUsize,
    pub chunks_produced: AtomicUsize,
    active_loads: [AtomicUsize; 3],
    max_active_loads: [AtomicUsize; 3],
}

impl MockStats {
    pub fn inference_calls(&self) -> usize {
        self.inference_calls.load(Ordering::SeqCst)
    }

    pub fn chunks_produced(&self) -> usize {
        self.chunks_produced.load(Ordering::SeqCst)
    }

    pub fn loads_finished(&self) -> usize {
        self.loads_finished.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous loads observed for one slot.
    pub fn max_concurrent_loads(&self, slot: SlotKind) -> usize {
        self.max_active_loads[slot.index()].load(Ordering::SeqCst)
    }

    fn enter_load(&self, slot: SlotKind) {
        self.loads_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_loads[slot.index()].fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_loads[slot.index()].fetch_max(now, Ordering::SeqCst);
    }

    fn exit_load(&self, slot: SlotKind) {
        self.active_loads[slot.index()].fetch_sub(1, Ordering::SeqCst);
        self.loads_finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Deterministic backend for tests and local runs.
pub struct MockBackend {
    config: MockConfig,
    stats: Arc<MockStats>,
    failing: Mutex<HashSet<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            stats: Arc::new(MockStats::default()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }

    /// Make every future load of `model_id` fail.
    pub fn fail_loads_for(&self, model_id: &str) {
        self.failing.lock().insert(model_id.to_string());
    }

    fn should_fail(&self, model_id: &str) -> bool {
        model_id.starts_with("missing") || self.failing.lock().contains(model_id)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn load(&self, slot: SlotKind, model_id: &str) -> Result<LoadedModel, BackendError> {
        self.stats.enter_load(slot);
        if !self.config.load_delay.is_zero() {
            std::thread::sleep(self.config.load_delay);
        }
        let result = if self.should_fail(model_id) {
            Err(BackendError::new(format!("model '{}' not found", model_id)))
        } else {
            let model = MockModel {
                model_id: model_id.to_string(),
                config: self.config.clone(),
                stats: self.stats.clone(),
            };
            Ok(match slot {
                SlotKind::Chat => LoadedModel::Chat(Arc::new(model)),
                SlotKind::Image => LoadedModel::Image(Arc::new(model)),
                SlotKind::Vision => LoadedModel::Vision(Arc::new(model)),
            })
        };
        self.stats.exit_load(slot);
        result
    }
}

struct MockModel {
    model_id: String,
    config: MockConfig,
    stats: Arc<MockStats>,
}

impl MockModel {
    fn reply_for(&self, prompt: &str) -> String {
        let last_user = prompt
            .rfind(USER_TAG)
            .map(|at| &prompt[at + USER_TAG.len()..])
            .and_then(|rest| rest.split("\n<|").next())
            .unwrap_or("");
        format!("{}-echo", last_user).repeat(self.config.reply_repeat.max(1))
    }

    fn chunks_for(&self, prompt: &str, max_tokens: u32) -> VecDeque<String> {
        let reply: Vec<char> = self.reply_for(prompt).chars().collect();
        reply
            .chunks(self.config.chunk_chars.max(1))
            .take(max_tokens as usize)
            .map(|c| c.iter().collect())
            .collect()
    }
}

impl ChatModel for MockModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn apply_chat_template(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        let mut prompt = String::new();
        for message in messages {
            prompt.push_str(&format!("<|{}|>\n{}\n", message.role.as_str(), message.content));
        }
        prompt.push_str(ASSISTANT_TAG);
        Ok(prompt)
    }

    fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, BackendError> {
        self.stats.inference_calls.fetch_add(1, Ordering::SeqCst);
        let chunks = self.chunks_for(prompt, max_tokens);
        if let Some(limit) = self.config.fail_after {
            if chunks.len() > limit {
                return Err(BackendError::new(format!("generation failed after {} chunks", limit)));
            }
        }
        Ok(chunks.into_iter().collect())
    }

    fn generate_stream(&self, prompt: String, max_tokens: u32) -> Result<ChunkIter<'_>, BackendError> {
        self.stats.inference_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockChunks {
            pending: self.chunks_for(&prompt, max_tokens),
            emitted: 0,
            delay: self.config.chunk_delay,
            fail_after: self.config.fail_after,
            stats: self.stats.clone(),
        }))
    }
}

impl ImageModel for MockModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, BackendError> {
        self.stats.inference_calls.fetch_add(1, Ordering::SeqCst);
        if prompt.trim().is_empty() {
            return Err(BackendError::new("prompt cannot be empty"));
        }
        Ok(MOCK_PNG.to_vec())
    }
}

impl VisionModel for MockModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, BackendError> {
        self.stats.inference_calls.fetch_add(1, Ordering::SeqCst);
        if image.is_empty() {
            return Err(BackendError::new("cannot identify image file"));
        }
        Ok(format!("{}: {} bytes", prompt, image.len()))
    }
}

struct MockChunks {
    pending: VecDeque<String>,
    emitted: usize,
    delay: Duration,
    fail_after: Option<usize>,
    stats: Arc<MockStats>,
}

impl Iterator for MockChunks {
    type Item = Result<String, BackendError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending.is_empty() {
            return None;
        }
        if self.fail_after == Some(self.emitted) {
            self.pending.clear();
            return Some(Err(BackendError::new(format!(
                "generation failed after {} chunks",
                self.emitted
            ))));
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.emitted += 1;
        self.stats.chunks_produced.fetch_add(1, Ordering::SeqCst);
        self.pending.pop_front().map(Ok)
    }
}
