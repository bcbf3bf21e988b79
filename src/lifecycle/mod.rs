//! Conflict resolution and summarization lifecycle

pub mod conflict;
pub mod manager;
pub mod summarizer;

pub use conflict::ConflictResolver;
pub use manager::{SummarizationManager, SummarizeEntry, SummarizeReport, SummaryStats};
pub use summarizer::{ExtractiveSummarizer, Summarizer};
