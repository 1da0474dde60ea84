//! `scdp-events`: event abstractions shared by domain and infrastructure.
//!
//! Domain crates implement [`Event`] for their event enums; infrastructure
//! moves them around as tenant-scoped [`EventEnvelope`]s over an [`EventBus`].

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
