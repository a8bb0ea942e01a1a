//! Infrastructure adapters for durable stores and mail transports.

pub mod store;
pub mod transport;

pub use store::{FileSortedSetStore, InMemorySortedSetStore};
pub use transport::LoggingTransport;
