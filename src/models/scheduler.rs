//! Background load scheduling.
//!
//! Each slot has one worker task draining a bounded FIFO queue, so loads to
//! the same slot run strictly one after another while loads to different
//! slots proceed independently. The backend loader itself runs on the
//! blocking pool. Callers receive a ticket immediately and observe progress
//! through the status registry or [`LoadScheduler::outcome`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::manager::SlotManager;
use super::slot::SlotKind;
use crate::error::{BackendError, CoreError};
use crate::telemetry::{OperationSpan, SpanExt};

/// Scheduler tunables.
#[derive(Debug, Clone)]
pub struct LoadSchedulerConfig {
    /// Give up on a load after this long. None waits forever.
    pub load_timeout: Option<Duration>,
    /// Queued (not yet running) loads allowed per slot.
    pub max_pending: usize,
    /// Finished outcomes kept for polling; the oldest are forgotten first.
    pub max_retained_outcomes: usize,
}

impl Default for LoadSchedulerConfig {
    fn default() -> Self {
        Self {
            load_timeout: Some(Duration::from_secs(1800)),
            max_pending: 16,
            max_retained_outcomes: 1024,
        }
    }
}

/// Acknowledgement returned to the requester of a load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadTicket {
    pub id: Uuid,
    pub slot: SlotKind,
    pub model_id: String,
    pub queued_at: DateTime<Utc>,
}

/// Progress of one load request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LoadOutcome {
    Pending,
    Running,
    Succeeded { handle: u64 },
    Failed { message: String },
}

impl LoadOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Outcomes by ticket. Pending and running entries are always kept; only the
/// most recent `retain` terminal ones survive.
struct OutcomeLedger {
    entries: DashMap<Uuid, LoadOutcome>,
    finished: Mutex<VecDeque<Uuid>>,
    retain: usize,
}

impl OutcomeLedger {
    fn new(retain: usize) -> Self {
        Self {
            entries: DashMap::new(),
            finished: Mutex::new(VecDeque::new()),
            retain: retain.max(1),
        }
    }

    fn get(&self, id: &Uuid) -> Option<LoadOutcome> {
        self.entries.get(id).map(|o| o.value().clone())
    }

    fn remove(&self, id: &Uuid) {
        self.entries.remove(id);
    }

    fn record(&self, id: Uuid, outcome: LoadOutcome) {
        let terminal = outcome.is_terminal();
        self.entries.insert(id, outcome);
        if !terminal {
            return;
        }

        let mut finished = self.finished.lock();
        finished.push_back(id);
        while finished.len() > self.retain {
            if let Some(evicted) = finished.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }
}

/// Runs loads off the request path, serialized per slot.
pub struct LoadScheduler {
    queues: [mpsc::Sender<LoadTicket>; 3],
    outcomes: Arc<OutcomeLedger>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl LoadScheduler {
    /// Spawn one worker per slot. Must be called within a Tokio runtime.
    pub fn start(
        manager: Arc<SlotManager>,
        config: LoadSchedulerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let outcomes = Arc::new(OutcomeLedger::new(config.max_retained_outcomes));
        let mut workers = Vec::with_capacity(SlotKind::ALL.len());

        let queues = SlotKind::ALL.map(|slot| {
            let (tx, rx) = mpsc::channel(config.max_pending.max(1));
            let worker = SlotWorker {
                slot,
                manager: manager.clone(),
                outcomes: outcomes.clone(),
                load_timeout: config.load_timeout,
            };
            workers.push(tokio::spawn(worker.run(rx, shutdown.clone())));
            tx
        });

        Self {
            queues,
            outcomes,
            workers: Mutex::new(workers),
            shutdown,
        }
    }

    /// Queue a load and return immediately.
    ///
    /// Fails only when the request is rejected up front: empty model id,
    /// a full queue for the slot, or a scheduler that is shutting down.
    /// Load failures are never reported here.
    pub fn enqueue_load(&self, slot: SlotKind, model_id: &str) -> Result<LoadTicket, CoreError> {
        let model_id = model_id.trim();
        if model_id.is_empty() {
            return Err(CoreError::Validation("model_id cannot be empty".into()));
        }
        if self.shutdown.is_cancelled() {
            return Err(CoreError::Validation("runtime is shutting down".into()));
        }

        let ticket = LoadTicket {
            id: Uuid::new_v4(),
            slot,
            model_id: model_id.to_string(),
            queued_at: Utc::now(),
        };
        self.outcomes.record(ticket.id, LoadOutcome::Pending);

        match self.queues[slot.index()].try_send(ticket.clone()) {
            Ok(()) => {
                tracing::info!(load_id = %ticket.id, %slot, model_id, "load queued");
                Ok(ticket)
            }
            Err(e) => {
                self.outcomes.remove(&ticket.id);
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => {
                        format!("load queue for the {} slot is full", slot)
                    }
                    mpsc::error::TrySendError::Closed(_) => "runtime is shutting down".to_string(),
                };
                Err(CoreError::Validation(reason))
            }
        }
    }

    /// Current outcome of a previously issued ticket.
    ///
    /// None for unknown tickets and for finished ones old enough to have been
    /// evicted.
    pub fn outcome(&self, id: &Uuid) -> Option<LoadOutcome> {
        self.outcomes.get(id)
    }

    /// Stop accepting loads and wait, up to `timeout` in total, for workers
    /// to finish their current job.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutdown.cancel();
        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        if tokio::time::timeout(timeout, futures::future::join_all(workers))
            .await
            .is_err()
        {
            tracing::warn!("load workers did not stop within {:?}", timeout);
        }
    }
}

struct SlotWorker {
    slot: SlotKind,
    manager: Arc<SlotManager>,
    outcomes: Arc<OutcomeLedger>,
    load_timeout: Option<Duration>,
}

impl SlotWorker {
    async fn run(self, mut rx: mpsc::Receiver<LoadTicket>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::debug!(slot = %self.slot, "load worker: shutdown signal received");
                    break;
                }
                next = rx.recv() => match next {
                    Some(ticket) => {
                        let span = OperationSpan::load(
                            &ticket.id.to_string(),
                            self.slot.as_str(),
                            &ticket.model_id,
                        );
                        self.execute(ticket).instrument(span).await;
                    }
                    None => break,
                },
            }
        }

        rx.close();
        while let Ok(ticket) = rx.try_recv() {
            self.outcomes.record(
                ticket.id,
                LoadOutcome::Failed {
                    message: "load abandoned: runtime shut down".to_string(),
                },
            );
        }
    }

    async fn execute(&self, ticket: LoadTicket) {
        self.outcomes.record(ticket.id, LoadOutcome::Running);
        let slot = self.slot;
        let started = self.manager.begin_load(slot, &ticket.model_id);

        let backend = self.manager.backend().clone();
        let model_id = ticket.model_id.clone();
        let mut task = tokio::task::spawn_blocking(move || backend.load(slot, &model_id));

        let joined = match self.load_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    let reason = format!(
                        "load of {} timed out after {}s",
                        ticket.model_id,
                        limit.as_secs()
                    );
                    let err = self.manager.fail_load(slot, &ticket.model_id, reason, started);
                    self.finish(&ticket, Err(err));

                    // The loader thread cannot be interrupted. Wait it out so the
                    // next load for this slot never overlaps it; the result is dropped.
                    if task.await.is_ok() {
                        tracing::debug!(slot = %slot, "discarded late load result");
                    }
                    return;
                }
            },
            None => task.await,
        };

        let result = joined
            .unwrap_or_else(|e| Err(BackendError::new(format!("loader task failed: {}", e))));
        let installed = self
            .manager
            .finish_load(slot, &ticket.model_id, result, started);
        self.finish(&ticket, installed.map(|h| h.id()));
    }

    fn finish(&self, ticket: &LoadTicket, result: Result<u64, CoreError>) {
        tracing::Span::current().record_result(&result);
        let outcome = match result {
            Ok(handle) => LoadOutcome::Succeeded { handle },
            Err(e) => LoadOutcome::Failed {
                message: e.to_string(),
            },
        };
        self.outcomes.record(ticket.id, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockBackend, MockConfig};
    use crate::models::{SlotState, StatusRegistry};

    fn scheduler(config: MockConfig, sched: LoadSchedulerConfig) -> (LoadScheduler, Arc<SlotManager>) {
        let backend = Arc::new(MockBackend::with_config(config));
        let manager = Arc::new(SlotManager::new(backend, Arc::new(StatusRegistry::new())));
        let scheduler = LoadScheduler::start(manager.clone(), sched, CancellationToken::new());
        (scheduler, manager)
    }

    async fn wait_terminal(scheduler: &LoadScheduler, id: &Uuid) -> LoadOutcome {
        for _ in 0..500 {
            if let Some(outcome) = scheduler.outcome(id) {
                if outcome.is_terminal() {
                    return outcome;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("load {} did not finish", id);
    }

    #[tokio::test]
    async fn enqueue_returns_before_load_completes() {
        let (scheduler, manager) = scheduler(
            MockConfig {
                load_delay: Duration::from_millis(100),
                ..Default::default()
            },
            LoadSchedulerConfig::default(),
        );
        let ticket = scheduler.enqueue_load(SlotKind::Chat, "echo").unwrap();
        assert!(manager.current_handle(SlotKind::Chat).is_none());

        let outcome = wait_terminal(&scheduler, &ticket.id).await;
        assert!(matches!(outcome, LoadOutcome::Succeeded { .. }));
        assert_eq!(manager.status().get(SlotKind::Chat).status, SlotState::Ready);
    }

    #[tokio::test]
    async fn rejects_empty_model_id() {
        let (scheduler, _) = scheduler(MockConfig::default(), LoadSchedulerConfig::default());
        assert!(matches!(
            scheduler.enqueue_load(SlotKind::Vision, "  "),
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn timeout_marks_error_and_discards_late_result() {
        let (scheduler, manager) = scheduler(
            MockConfig {
                load_delay: Duration::from_millis(300),
                ..Default::default()
            },
            LoadSchedulerConfig {
                load_timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            },
        );
        let ticket = scheduler.enqueue_load(SlotKind::Image, "sd").unwrap();
        let outcome = wait_terminal(&scheduler, &ticket.id).await;
        assert!(matches!(outcome, LoadOutcome::Failed { .. }));

        let status = manager.status().get(SlotKind::Image);
        assert_eq!(status.status, SlotState::Error);
        assert!(status.message.contains("timed out"));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(manager.current_handle(SlotKind::Image).is_none());
    }

    #[tokio::test]
    async fn full_queue_is_rejected() {
        let (scheduler, _) = scheduler(
            MockConfig {
                load_delay: Duration::from_millis(200),
                ..Default::default()
            },
            LoadSchedulerConfig {
                max_pending: 1,
                ..Default::default()
            },
        );
        // One running, one queued, then the queue is full.
        scheduler.enqueue_load(SlotKind::Chat, "a").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.enqueue_load(SlotKind::Chat, "b").unwrap();
        let err = scheduler.enqueue_load(SlotKind::Chat, "c").unwrap_err();
        assert!(err.to_string().contains("full"));
    }

    #[tokio::test]
    async fn old_finished_outcomes_are_evicted() {
        let (scheduler, _) = scheduler(
            MockConfig::default(),
            LoadSchedulerConfig {
                max_retained_outcomes: 4,
                ..Default::default()
            },
        );
        let tickets: Vec<_> = (0..10)
            .map(|i| scheduler.enqueue_load(SlotKind::Chat, &format!("m{}", i)).unwrap())
            .collect();
        wait_terminal(&scheduler, &tickets[9].id).await;

        for ticket in &tickets[..6] {
            assert!(scheduler.outcome(&ticket.id).is_none());
        }
        for ticket in &tickets[6..] {
            assert!(matches!(
                scheduler.outcome(&ticket.id),
                Some(LoadOutcome::Succeeded { .. })
            ));
        }
    }

    #[test]
    fn ledger_keeps_unfinished_entries() {
        let ledger = OutcomeLedger::new(1);
        let running = Uuid::new_v4();
        ledger.record(running, LoadOutcome::Running);
        for _ in 0..3 {
            ledger.record(Uuid::new_v4(), LoadOutcome::Succeeded { handle: 1 });
        }
        assert_eq!(ledger.get(&running), Some(LoadOutcome::Running));
        assert_eq!(ledger.entries.len(), 2);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_loads() {
        let (scheduler, _) = scheduler(MockConfig::default(), LoadSchedulerConfig::default());
        scheduler.shutdown(Duration::from_secs(1)).await;
        assert!(scheduler.enqueue_load(SlotKind::Chat, "echo").is_err());
    }
}
