//! Pluggable summarization backends
//!
//! The lifecycle manager compacts content through the `Summarizer` seam.
//! An LLM-backed implementation plugs in behind the same trait; the
//! default is deterministic extraction so dry-run previews are
//! meaningful.

use crate::Result;
use async_trait::async_trait;
use regex::Regex;

/// Text compaction interface consumed by the lifecycle manager
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Derive a shorter form of `text`. No determinism is guaranteed
    /// across calls, but implementations should be stable enough for
    /// dry-run previews to be representative.
    async fn summarize(&self, text: &str) -> Result<String>;

    /// Human-readable name for this backend (used in logs).
    fn name(&self) -> &str;
}

/// Default rule-based summarizer: the first two sentences, or a
/// 500-character truncation with an ellipsis when fewer than two
/// sentence boundaries exist.
pub struct ExtractiveSummarizer {
    sentence_end: Regex,
}

const TRUNCATE_CHARS: usize = 500;

impl ExtractiveSummarizer {
    pub fn new() -> Self {
        Self {
            // Terminal punctuation followed by whitespace or end of text
            sentence_end: Regex::new(r"[.!?](\s|$)").expect("static sentence regex"),
        }
    }

    fn first_two_sentences<'a>(&self, text: &'a str) -> Option<&'a str> {
        let mut boundaries = self.sentence_end.find_iter(text);
        boundaries.next()?;
        let second = boundaries.next()?;
        // Keep the terminal punctuation, drop the trailing whitespace
        Some(&text[..second.start() + 1])
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        if let Some(lead) = self.first_two_sentences(text) {
            return Ok(lead.to_string());
        }
        if text.chars().count() <= TRUNCATE_CHARS {
            return Ok(text.to_string());
        }
        let truncated: String = text.chars().take(TRUNCATE_CHARS).collect();
        Ok(format!("{}...", truncated))
    }

    fn name(&self) -> &str {
        "extractive"
    }
}
