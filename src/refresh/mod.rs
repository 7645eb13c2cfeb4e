//! Background refresh of the state cache

pub mod engine;
pub mod scheduler;

pub use engine::{refresh_once, RefreshEngine, SchedulerEvent, SchedulerHandle};
pub use scheduler::{RefreshPhase, RefreshScheduler, RefreshSettings};
