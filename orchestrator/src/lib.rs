#![allow(clippy::missing_docs_in_private_items)]

pub mod engine;
pub mod manager;
pub mod scheduler;
pub mod threshold;

pub use engine::{ActiveEngine, EngineLease, EngineState, EngineStatus};
pub use manager::EngineLifecycleManager;
pub use scheduler::ExpiryScheduler;
pub use threshold::{evaluate, ReadinessDecision};
