//! Append-only event store boundary.
//!
//! Defines an infrastructure-facing abstraction for storing and loading
//! tenant-scoped event streams without making storage assumptions. Relational
//! persistence is an external collaborator of this service, so the in-memory
//! store is the only backend shipped here.

pub mod in_memory;
pub mod store;

pub use in_memory::InMemoryEventStore;
pub use store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
