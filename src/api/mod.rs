//! HTTP API surface over the coordinator

pub mod handler;
pub mod types;

pub use handler::{memory_router, MemoryApiState};
