//! Mail transport implementations.

pub mod logging;

pub use logging::LoggingTransport;
