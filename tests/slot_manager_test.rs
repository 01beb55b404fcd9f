//! Integration tests for slot status and handle ownership.

use std::sync::Arc;

use slot_runtime::engine::MockBackend;
use slot_runtime::models::{SlotKind, SlotManager, SlotState, StatusRegistry};
use slot_runtime::CoreError;

fn manager() -> (SlotManager, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend::new());
    let manager = SlotManager::new(backend.clone(), Arc::new(StatusRegistry::new()));
    (manager, backend)
}

// === Lifecycle ===

#[test]
fn slots_start_empty_and_idle() {
    let (manager, _) = manager();
    for slot in SlotKind::ALL {
        assert!(manager.current_handle(slot).is_none());
        assert_eq!(manager.status().get(slot).status, SlotState::Idle);
    }
}

#[test]
fn every_slot_reports_ready_after_successful_load() {
    let (manager, _) = manager();
    for slot in SlotKind::ALL {
        let handle = manager.load(slot, "tiny").unwrap();
        let installed = manager.current_handle(slot).unwrap();
        assert_eq!(installed.handle(), handle);
        assert_eq!(installed.model().kind(), slot);
        assert_eq!(manager.status().get(slot).status, SlotState::Ready);
    }
    assert_eq!(manager.loaded_count(), 3);
}

#[test]
fn failed_load_into_empty_slot_leaves_it_empty() {
    let (manager, _) = manager();
    let err = manager.load(SlotKind::Vision, "missing-blip").unwrap_err();
    assert!(matches!(err, CoreError::ModelLoad { .. }));

    let status = manager.status().get(SlotKind::Vision);
    assert_eq!(status.status, SlotState::Error);
    assert_eq!(status.message, "Error: model 'missing-blip' not found");
    assert_eq!(status.model_id.as_deref(), Some("missing-blip"));
    assert!(manager.current_handle(SlotKind::Vision).is_none());
}

#[test]
fn failed_reload_keeps_previous_handle() {
    let (manager, backend) = manager();
    let first = manager.load(SlotKind::Chat, "echo").unwrap();
    backend.fail_loads_for("echo-v2");

    assert!(manager.load(SlotKind::Chat, "echo-v2").is_err());
    assert_eq!(manager.current_handle(SlotKind::Chat).unwrap().handle(), first);
    assert!(manager.chat_model().is_ok());
}

#[test]
fn successful_reload_replaces_handle() {
    let (manager, _) = manager();
    let first = manager.load(SlotKind::Image, "sd-1").unwrap();
    let second = manager.load(SlotKind::Image, "sd-2").unwrap();
    assert_ne!(first, second);
    assert_eq!(manager.current_handle(SlotKind::Image).unwrap().model_id(), "sd-2");
    assert_eq!(
        manager.status().get(SlotKind::Image).message,
        "Image model sd-2 loaded."
    );
}

// === Isolation ===

#[test]
fn chat_load_does_not_touch_other_slots() {
    let (manager, _) = manager();
    manager.load(SlotKind::Image, "sd").unwrap();
    let image_before = manager.status().get(SlotKind::Image);

    manager.load(SlotKind::Chat, "echo").unwrap();
    assert!(manager.load(SlotKind::Chat, "missing").is_err());

    let image_after = manager.status().get(SlotKind::Image);
    assert_eq!(image_after.status, image_before.status);
    assert_eq!(image_after.message, image_before.message);
    assert_eq!(image_after.updated_at, image_before.updated_at);
    assert_eq!(manager.status().get(SlotKind::Vision).status, SlotState::Idle);
    assert!(manager.current_handle(SlotKind::Vision).is_none());
}

#[test]
fn not_loaded_error_names_the_slot() {
    let (manager, _) = manager();
    let err = manager.image_model().err().unwrap();
    assert_eq!(err.to_string(), "Image model not loaded.");
}

// === Status registry ===

#[test]
fn latest_status_follows_most_recent_load() {
    let (manager, _) = manager();
    manager.load(SlotKind::Vision, "blip").unwrap();
    assert_eq!(manager.status().latest().slot, SlotKind::Vision);
    manager.load(SlotKind::Chat, "echo").unwrap();
    assert_eq!(manager.status().latest().slot, SlotKind::Chat);
}

#[test]
fn concurrent_status_writers_keep_one_entry_per_slot() {
    let registry = Arc::new(StatusRegistry::new());
    let writers: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for n in 0..100 {
                    let slot = SlotKind::ALL[(i + n) % 3];
                    registry.set(slot, SlotState::Loading, format!("w{}-{}", i, n), None);
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    assert_eq!(registry.all().len(), 3);
    assert_eq!(registry.count(SlotState::Loading), 3);
}
