//! Slot Runtime
//!
//! Owns which generative model is resident per capability ("slot"), runs
//! model loads in the background, and serves chat, image and vision
//! requests against the resident models over HTTP.
//!
//! # Slots
//!
//! - **chat**: text generation, blocking or streamed
//! - **image**: image synthesis, PNG output
//! - **vision**: image understanding
//!
//! Each slot holds at most one model. Loads are serialized per slot and
//! never disturb the model already installed until they fully succeed.
//! Model computation itself is delegated to an [`engine::InferenceBackend`].

pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod http;
pub mod models;
pub mod shutdown;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use engine::{GenerationOrchestrator, InferenceBackend, DEFAULT_MAX_TOKENS, DEFAULT_STREAM_BUFFER};
use error::CoreResult;
use health::{HealthChecker, HealthReport};
use models::{LoadScheduler, LoadSchedulerConfig, LoadTicket, SlotKind, SlotManager, StatusRegistry};
use shutdown::{ShutdownCoordinator, ShutdownResult};
use tokio_util::sync::CancellationToken;

pub use error::{BackendError, CoreError};

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// None waits for loads indefinitely.
    pub load_timeout: Option<Duration>,
    pub max_pending_loads: usize,
    pub stream_buffer: usize,
    pub default_max_tokens: u32,
    pub shutdown_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            load_timeout: Some(Duration::from_secs(1800)),
            max_pending_loads: 16,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            default_max_tokens: DEFAULT_MAX_TOKENS,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&config::EnvConfig> for RuntimeConfig {
    fn from(env: &config::EnvConfig) -> Self {
        Self {
            load_timeout: env.load_timeout,
            max_pending_loads: env.max_pending_loads,
            stream_buffer: env.stream_buffer,
            default_max_tokens: env.default_max_tokens,
            shutdown_timeout: env.shutdown_timeout,
        }
    }
}

/// The runtime service object shared by every request handler.
pub struct Runtime {
    pub config: RuntimeConfig,
    pub status: Arc<StatusRegistry>,
    pub slots: Arc<SlotManager>,
    pub scheduler: LoadScheduler,
    pub orchestrator: GenerationOrchestrator,
    pub shutdown: ShutdownCoordinator,
    pub health: HealthChecker,
}

impl Runtime {
    /// Create a runtime around `backend`. Must be called within a Tokio runtime.
    pub fn new(config: RuntimeConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        let status = Arc::new(StatusRegistry::new());
        let slots = Arc::new(SlotManager::new(backend, status.clone()));
        let shutdown = ShutdownCoordinator::new();

        let scheduler = LoadScheduler::start(
            slots.clone(),
            LoadSchedulerConfig {
                load_timeout: config.load_timeout,
                max_pending: config.max_pending_loads,
                ..LoadSchedulerConfig::default()
            },
            CancellationToken::new(),
        );
        let orchestrator =
            GenerationOrchestrator::new(slots.clone(), config.stream_buffer, shutdown.token());

        tracing::info!(
            backend = slots.backend().name(),
            load_timeout_secs = config.load_timeout.map(|d| d.as_secs()),
            stream_buffer = config.stream_buffer,
            "runtime initialized"
        );

        Self {
            config,
            status,
            slots,
            scheduler,
            orchestrator,
            shutdown,
            health: HealthChecker::default(),
        }
    }

    /// Queue a background load into `slot`.
    pub fn load_model(&self, slot: SlotKind, model_id: &str) -> CoreResult<LoadTicket> {
        self.scheduler.enqueue_load(slot, model_id)
    }

    pub fn health_report(&self) -> HealthReport {
        self.health.report(
            self.shutdown.state(),
            &self.status,
            self.slots.loaded_count(),
            self.shutdown.in_flight_count(),
        )
    }

    /// Stop accepting requests, cancel live streams, drain, then stop load workers.
    pub async fn shutdown(&self) -> ShutdownResult {
        let timeout = self.config.shutdown_timeout;
        let result = self.shutdown.initiate(timeout).await;
        self.scheduler.shutdown(timeout).await;
        result
    }
}
