//! Record schema and store gateway
//!
//! The memory record and its three metadata sub-structures, plus the
//! `RecordStore` seam every other component sits on top of.

pub mod file_store;
pub mod store;
pub mod types;

pub use file_store::FileRecordStore;
pub use store::{MemoryRecordStore, QueryOrder, RecordFilter, RecordStore};
pub use types::{
    ConflictState, MemoryRecord, MetadataPatch, ResolutionStrategy, SharingMeta, SharingPolicy,
    SummarizationState,
};
