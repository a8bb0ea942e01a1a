//! Unit tests for individual components

mod builders_test;
mod config_test;
mod durable_test;
mod error_test;
mod queue_test;
mod record_test;
mod store_test;
