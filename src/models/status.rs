//! Per-slot lifecycle status visible to pollers.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::slot::SlotKind;

/// Lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Idle,
    Loading,
    Ready,
    Error,
}

/// Snapshot of one slot's status.
#[derive(Debug, Clone, Serialize)]
pub struct SlotStatus {
    pub slot: SlotKind,
    pub status: SlotState,
    pub message: String,
    /// Model the status refers to (being loaded, loaded, or failed).
    pub model_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    seq: u64,
}

impl SlotStatus {
    fn idle(slot: SlotKind) -> Self {
        Self {
            slot,
            status: SlotState::Idle,
            message: "Ready".to_string(),
            model_id: None,
            updated_at: Utc::now(),
            seq: 0,
        }
    }

    /// Write order across all slots; higher is more recent.
    pub fn sequence(&self) -> u64 {
        self.seq
    }
}

/// Last-write-wins status table, one entry per slot.
pub struct StatusRegistry {
    entries: DashMap<SlotKind, SlotStatus>,
    next_seq: AtomicU64,
}

impl StatusRegistry {
    pub fn new() -> Self {
        let entries = DashMap::new();
        for kind in SlotKind::ALL {
            entries.insert(kind, SlotStatus::idle(kind));
        }
        Self {
            entries,
            next_seq: AtomicU64::new(1),
        }
    }

    /// Overwrite the status of a slot.
    pub fn set(
        &self,
        slot: SlotKind,
        status: SlotState,
        message: impl Into<String>,
        model_id: Option<&str>,
    ) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let entry = SlotStatus {
            slot,
            status,
            message: message.into(),
            model_id: model_id.map(str::to_string),
            updated_at: Utc::now(),
            seq,
        };
        self.entries.insert(slot, entry);
    }

    pub fn get(&self, slot: SlotKind) -> SlotStatus {
        self.entries
            .get(&slot)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| SlotStatus::idle(slot))
    }

    /// All slots in declaration order.
    pub fn all(&self) -> Vec<SlotStatus> {
        SlotKind::ALL.iter().map(|k| self.get(*k)).collect()
    }

    /// The most recently written status across every slot.
    ///
    /// Ties go to the earlier slot, so with no writes yet this is the idle
    /// chat slot.
    pub fn latest(&self) -> SlotStatus {
        self.all()
            .into_iter()
            .max_by_key(|s| (s.seq, std::cmp::Reverse(s.slot.index())))
            .unwrap_or_else(|| SlotStatus::idle(SlotKind::Chat))
    }

    /// Number of slots currently in the given state.
    pub fn count(&self, state: SlotState) -> usize {
        self.entries.iter().filter(|e| e.status == state).count()
    }
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}
