//! Configuration models for the scheduler, its persistence, and timings.

pub mod scheduler;

pub use scheduler::{PersistenceConfig, SchedulerConfig, StoreBackendConfig};
