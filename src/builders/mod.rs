//! Builders to construct a scheduler and its backends from configuration.

pub mod scheduler_builder;

pub use scheduler_builder::{build_backend, build_scheduler, SchedulerBuilder};
