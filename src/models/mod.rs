//! Model slots: identity, status tracking, resident models and background loads.

mod manager;
mod scheduler;
mod slot;
mod status;

pub use manager::{InstalledModel, ModelHandle, SlotManager};
pub use scheduler::{LoadOutcome, LoadScheduler, LoadSchedulerConfig, LoadTicket};
pub use slot::SlotKind;
pub use status::{SlotState, SlotStatus, StatusRegistry};
