//! Model slot manager: owns the resident model of each slot.
//!
//! A load is non-destructive until it fully succeeds. While a replacement is
//! loading, or after it fails, the previous model stays installed and
//! servable. Readers take an `Arc` snapshot, so a concurrent swap never
//! invalidates an operation that already started; the superseded model is
//! released when its last in-flight user finishes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::slot::SlotKind;
use super::status::{SlotState, StatusRegistry};
use crate::engine::{ChatModel, ImageModel, InferenceBackend, LoadedModel, VisionModel};
use crate::error::{BackendError, CoreError};
use crate::telemetry;

/// Unique handle to an installed model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(u64);

impl ModelHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A model resident in a slot.
#[derive(Debug)]
pub struct InstalledModel {
    handle: ModelHandle,
    model_id: String,
    model: LoadedModel,
    loaded_at: DateTime<Utc>,
}

impl InstalledModel {
    pub fn handle(&self) -> ModelHandle {
        self.handle
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn model(&self) -> &LoadedModel {
        &self.model
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

#[derive(Default)]
struct Slot {
    current: RwLock<Option<Arc<InstalledModel>>>,
}

/// Owns up to three independent slots and mediates loads into them.
pub struct SlotManager {
    backend: Arc<dyn InferenceBackend>,
    status: Arc<StatusRegistry>,
    slots: [Slot; 3],
    next_id: AtomicU64,
}

impl SlotManager {
    pub fn new(backend: Arc<dyn InferenceBackend>, status: Arc<StatusRegistry>) -> Self {
        Self {
            backend,
            status,
            slots: Default::default(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    pub fn status(&self) -> &Arc<StatusRegistry> {
        &self.status
    }

    /// Load `model_id` into `slot`, blocking the calling thread.
    ///
    /// The outcome is always recorded in the status registry. Callers that
    /// run loads in the background should ignore the returned error.
    pub fn load(&self, slot: SlotKind, model_id: &str) -> Result<ModelHandle, CoreError> {
        let started = self.begin_load(slot, model_id);
        let result = self.backend.load(slot, model_id);
        self.finish_load(slot, model_id, result, started)
    }

    /// Mark the slot as loading. The current model stays installed.
    pub(crate) fn begin_load(&self, slot: SlotKind, model_id: &str) -> Instant {
        tracing::info!(%slot, model_id, "loading model");
        self.status.set(
            slot,
            SlotState::Loading,
            format!("Loading {} model: {}...", slot, model_id),
            Some(model_id),
        );
        Instant::now()
    }

    /// Install a loader result, or record its failure.
    pub(crate) fn finish_load(
        &self,
        slot: SlotKind,
        model_id: &str,
        result: Result<LoadedModel, BackendError>,
        started: Instant,
    ) -> Result<ModelHandle, CoreError> {
        let model = match result {
            Ok(model) if model.kind() == slot => model,
            Ok(model) => {
                let reason = format!(
                    "backend returned a {} model for the {} slot",
                    model.kind(),
                    slot
                );
                return Err(self.fail_load(slot, model_id, reason, started));
            }
            Err(e) => return Err(self.fail_load(slot, model_id, e.0, started)),
        };

        let handle = ModelHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
        let installed = Arc::new(InstalledModel {
            handle,
            model_id: model_id.to_string(),
            model,
            loaded_at: Utc::now(),
        });
        let previous = self.slots[slot.index()].current.write().replace(installed);

        self.status.set(
            slot,
            SlotState::Ready,
            format!("{} model {} loaded.", slot.title(), model_id),
            Some(model_id),
        );
        telemetry::record_load(slot, true, started.elapsed());
        tracing::info!(
            %slot,
            model_id,
            handle = handle.id(),
            replaced = previous.as_ref().map(|p| p.model_id.as_str()),
            "model loaded"
        );
        Ok(handle)
    }

    /// Record a failed load. The previously installed model is untouched.
    pub(crate) fn fail_load(
        &self,
        slot: SlotKind,
        model_id: &str,
        reason: String,
        started: Instant,
    ) -> CoreError {
        tracing::warn!(%slot, model_id, error = %reason, "model load failed");
        self.status.set(
            slot,
            SlotState::Error,
            format!("Error: {}", reason),
            Some(model_id),
        );
        telemetry::record_load(slot, false, started.elapsed());
        CoreError::ModelLoad {
            slot,
            model_id: model_id.to_string(),
            reason,
        }
    }

    /// Snapshot of the slot's model, if any.
    pub fn current_handle(&self, slot: SlotKind) -> Option<Arc<InstalledModel>> {
        self.slots[slot.index()].current.read().clone()
    }

    fn require(&self, slot: SlotKind) -> Result<Arc<InstalledModel>, CoreError> {
        self.current_handle(slot).ok_or(CoreError::NotLoaded(slot))
    }

    pub fn chat_model(&self) -> Result<Arc<dyn ChatModel>, CoreError> {
        match self.require(SlotKind::Chat)?.model() {
            LoadedModel::Chat(m) => Ok(m.clone()),
            _ => Err(CoreError::NotLoaded(SlotKind::Chat)),
        }
    }

    pub fn image_model(&self) -> Result<Arc<dyn ImageModel>, CoreError> {
        match self.require(SlotKind::Image)?.model() {
            LoadedModel::Image(m) => Ok(m.clone()),
            _ => Err(CoreError::NotLoaded(SlotKind::Image)),
        }
    }

    pub fn vision_model(&self) -> Result<Arc<dyn VisionModel>, CoreError> {
        match self.require(SlotKind::Vision)?.model() {
            LoadedModel::Vision(m) => Ok(m.clone()),
            _ => Err(CoreError::NotLoaded(SlotKind::Vision)),
        }
    }

    /// Number of slots holding a model.
    pub fn loaded_count(&self) -> usize {
        SlotKind::ALL
            .iter()
            .filter(|k| self.current_handle(**k).is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockBackend;

    fn manager() -> (SlotManager, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new());
        let manager = SlotManager::new(backend.clone(), Arc::new(StatusRegistry::new()));
        (manager, backend)
    }

    #[test]
    fn successful_load_installs_and_reports_ready() {
        let (manager, _) = manager();
        let handle = manager.load(SlotKind::Chat, "echo").unwrap();

        let installed = manager.current_handle(SlotKind::Chat).unwrap();
        assert_eq!(installed.handle(), handle);
        assert_eq!(installed.model_id(), "echo");

        let status = manager.status().get(SlotKind::Chat);
        assert_eq!(status.status, SlotState::Ready);
        assert_eq!(status.message, "Chat model echo loaded.");
    }

    #[test]
    fn failed_load_keeps_previous_model() {
        let (manager, _) = manager();
        let first = manager.load(SlotKind::Image, "sd-v1").unwrap();

        let err = manager.load(SlotKind::Image, "missing-xl").unwrap_err();
        assert!(matches!(err, CoreError::ModelLoad { slot: SlotKind::Image, .. }));

        let status = manager.status().get(SlotKind::Image);
        assert_eq!(status.status, SlotState::Error);
        assert!(status.message.starts_with("Error: "));
        assert_eq!(manager.current_handle(SlotKind::Image).unwrap().handle(), first);
    }

    #[test]
    fn snapshot_survives_replacement() {
        let (manager, _) = manager();
        manager.load(SlotKind::Chat, "a").unwrap();
        let snapshot = manager.current_handle(SlotKind::Chat).unwrap();

        manager.load(SlotKind::Chat, "b").unwrap();
        assert_eq!(snapshot.model_id(), "a");
        assert_eq!(manager.current_handle(SlotKind::Chat).unwrap().model_id(), "b");
    }

    #[test]
    fn empty_slots_are_not_loaded() {
        let (manager, _) = manager();
        assert!(matches!(manager.chat_model(), Err(CoreError::NotLoaded(SlotKind::Chat))));
        assert!(matches!(manager.image_model(), Err(CoreError::NotLoaded(SlotKind::Image))));
        assert!(matches!(manager.vision_model(), Err(CoreError::NotLoaded(SlotKind::Vision))));
        assert_eq!(manager.loaded_count(), 0);
    }
}
