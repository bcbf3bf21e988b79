//! Event distribution bus
//!
//! Propagates create/update/delete notifications between agents through
//! a pluggable publish/subscribe channel, with process-local fan-out to
//! registered subscriber callbacks.

pub mod channel;
pub mod client;
pub mod types;

pub use channel::{EventChannel, EventStream, MemoryChannel};
pub use client::{BusState, EventBusClient, SubscriberCallback, SyncReport};
pub use types::{SyncEvent, SyncEventType};
