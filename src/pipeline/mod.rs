pub mod deps;
pub mod orchestrator;
pub mod scheduler;

pub use deps::Deps;
pub use orchestrator::BatchOrchestrator;
pub use scheduler::{AdaptiveScheduler, SchedulerError, SchedulerStatus};
