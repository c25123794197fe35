//! Shared event-sourcing abstractions for eventvault.
//!
//! This crate defines the data model (events, staging transactions,
//! snapshots, queries), the error taxonomy and the traits every storage
//! backend and publisher implements. It contains no infrastructure code.

pub mod clock;
pub mod error;
pub mod event;
pub mod publisher;
pub mod query;
pub mod snapshot;
pub mod storage;
pub mod transaction;

pub use error::{EventStoreError, Result};
