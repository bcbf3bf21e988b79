//! MemShare - Shared memory coordination for multi-agent systems
//!
//! MemShare coordinates a pool of memory records written and read by many
//! independent agents: per-record access control, near-real-time change
//! distribution over a publish/subscribe channel, and a background
//! lifecycle that reconciles write conflicts and compacts aged content.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Memory Coordinator                          │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────┐  │
//! │  │ Access Control │  │ Sharing Policy │  │  HTTP API (axum)   │  │
//! │  │   Evaluator    │  │ Administrator  │  │  uniform envelope  │  │
//! │  └───────┬────────┘  └───────┬────────┘  └─────────┬──────────┘  │
//! │          └───────────────────┴─────────────────────┘             │
//! │                              │                                    │
//! │  ┌───────────────────────────▼───────────────────────────────┐   │
//! │  │                  Record Store Gateway                      │   │
//! │  │  get / query / insert / merge_metadata / replace_content   │   │
//! │  │  (field-group merges, optimistic versioning)               │   │
//! │  └───────────────────────────┬───────────────────────────────┘   │
//! │                              │                                    │
//! │  ┌──────────────────┐  ┌─────▼──────────┐  ┌──────────────────┐  │
//! │  │  Event Bus       │  │  Conflict      │  │  Summarization   │  │
//! │  │  Client          │  │  Resolver      │  │  Lifecycle Mgr   │  │
//! │  │  fan-out minus   │  │  annotates     │  │  periodic scan,  │  │
//! │  │  originator      │  │  divergences   │  │  atomic compact  │  │
//! │  └────────┬─────────┘  └────────────────┘  └──────────────────┘  │
//! └───────────┼──────────────────────────────────────────────────────┘
//!             │ publish/subscribe channel (pluggable transport)
//!   ┌─────────▼─────────┐
//!   │  other agents'    │
//!   │  subscriber       │
//!   │  callbacks        │
//!   └───────────────────┘
//! ```
//!
//! ## Key behaviors
//!
//! - **Fail-closed access control**: owner always allowed; unknown policy
//!   values deny with a distinct reason; a failing store is never treated
//!   as "allowed".
//! - **Originator-excluded fan-out**: an agent never hears its own event;
//!   one failing subscriber callback never blocks the rest.
//! - **Typed metadata merges**: sharing, summarization, and conflict
//!   state are independent sub-structures on the record, so a merge can
//!   not clobber unrelated groups. Merges optionally carry an expected
//!   version and fail as conflicts when it has moved.
//! - **Idempotent compaction**: already-summarized records are skipped at
//!   selection time, so concurrent scans need no external locking.
//!
//! ## Modules
//!
//! - [`record`]: record schema and the store gateway
//! - [`access`]: policy evaluation and sharing administration
//! - [`bus`]: event distribution and bulk agent-state sync
//! - [`lifecycle`]: conflict resolution and summarization
//! - [`coordinator`]: composition root and operation surface
//! - [`api`]: REST endpoints over the coordinator
//! - [`config`]: configuration management

pub mod access;
pub mod api;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod outcome;
pub mod record;

pub use config::MemShareConfig;
pub use coordinator::MemoryCoordinator;
pub use error::{Error, Result};
pub use outcome::Outcome;
