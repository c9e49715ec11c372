//! Append-only event store boundary.
//!
//! Infrastructure-facing abstraction for storing and loading per-aggregate
//! event streams without making any storage assumptions. The in-memory
//! implementation backs tests and development; a durable backend implements
//! the same trait.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
