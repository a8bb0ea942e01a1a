//! # Prometheus Mail Scheduler
//!
//! Priority-aware, memory-bounded scheduling of outbound mail.
//!
//! A caller says "send this message at time T with priority P". The scheduler
//! keeps a bounded working set of upcoming messages in memory, overflows the
//! rest to a durable sorted-set store, and dispatches each message in due-time
//! order from a single dedicated thread.
//!
//! ## Core Problem Solved
//!
//! Scheduled mail backlogs grow far beyond what should live in process memory:
//!
//! - **Bounded Memory**: Only `max_in_memory` records are resident; the rest wait in the durable store
//! - **Ordering**: Earlier due times go first; equal due times go to the higher priority level
//! - **Restarts**: Persisted records are backfilled after a restart and sent
//! - **Isolation**: A failing send is logged and dropped; the loops never stop
//!
//! ## Key Features
//!
//! - **Priority Bands**: One ordered band per level, level 1 being the highest priority
//! - **Admission and Eviction**: Newly scheduled records displace the latest resident record only
//!   when they are early enough relative to what backfill has loaded
//! - **Backfill Loop**: Tops the working set up from the durable store, earliest first
//! - **Pluggable Collaborators**: [`core::MailTransport`] sends mail, [`core::SortedSetBackend`]
//!   stores overflow
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use prometheus_mail_scheduler::config::{PersistenceConfig, SchedulerConfig};
//! use prometheus_mail_scheduler::core::{MailMessage, MailScheduler};
//! use prometheus_mail_scheduler::infra::{InMemorySortedSetStore, LoggingTransport};
//! use prometheus_mail_scheduler::util::clock::now_ms;
//!
//! let config = SchedulerConfig::new(3).with_persistence(PersistenceConfig {
//!     enabled: true,
//!     ..PersistenceConfig::default()
//! });
//! let scheduler = MailScheduler::start(
//!     &config,
//!     Arc::new(LoggingTransport::new()),
//!     Some(Arc::new(InMemorySortedSetStore::new())),
//! )?;
//!
//! let message = MailMessage::new("ops@example.com", "Weekly report")
//!     .to("team@example.com")
//!     .with_text("See attached.");
//! let id = scheduler.schedule(message, Some(now_ms() + 60_000), 2)?;
//!
//! scheduler.shutdown();
//! ```
//!
//! For configuration-driven setup see [`builders::SchedulerBuilder`].

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling engine: working set, durable store adapter, loops, facade.
pub mod core;
/// Configuration models for the scheduler, persistence, and timings.
pub mod config;
/// Builders to construct a scheduler from configuration.
pub mod builders;
/// Infrastructure adapters: durable store backends and transports.
pub mod infra;
/// Shared utilities.
pub mod util;
