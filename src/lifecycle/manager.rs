//! Summarization lifecycle manager
//!
//! Periodically scans the store for aged, oversized records and compacts
//! them through the pluggable summarizer, recording reversible provenance
//! (`original_length`, `summary_date`) in summarization metadata. The
//! replacement is one atomic store update per record; "already
//! summarized" is a skip condition, so concurrent runs stay idempotent
//! without external locking.

use super::conflict::ConflictResolver;
use super::summarizer::Summarizer;
use crate::config::SummarizationConfig;
use crate::record::types::SummarizationState;
use crate::record::{MetadataPatch, QueryOrder, RecordFilter, RecordStore};
use crate::{Error, Result};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One candidate's outcome within a scan
#[derive(Debug, Clone, Serialize)]
pub struct SummarizeEntry {
    pub memory_id: String,
    pub original_length: u64,
    pub summary_length: u64,
    /// Human-readable compression ratio, e.g. `2000 -> 120 chars (94.0% reduction)`
    pub compression: String,
}

/// Scan report: partial success with per-item errors, never all-or-nothing
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummarizeReport {
    pub dry_run: bool,
    pub examined: u64,
    pub summarized: u64,
    /// Candidates that moved under us between selection and update
    pub skipped: u64,
    pub entries: Vec<SummarizeEntry>,
    pub errors: Vec<String>,
}

/// Aggregate summarization statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryStats {
    pub total_records: u64,
    pub summarized_records: u64,
    pub full_records: u64,
    /// Characters reclaimed across summarized records
    pub estimated_chars_reclaimed: u64,
}

/// Selects eligible records and compacts them
pub struct SummarizationManager {
    store: Arc<dyn RecordStore>,
    summarizer: Arc<dyn Summarizer>,
    config: SummarizationConfig,
    cancel: CancellationToken,
}

impl SummarizationManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        summarizer: Arc<dyn Summarizer>,
        config: SummarizationConfig,
    ) -> Self {
        Self {
            store,
            summarizer,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Compact records older than `age_threshold` whose content exceeds
    /// `min_length` characters. In dry-run mode the report carries the
    /// would-be compression per candidate and nothing is mutated.
    pub async fn summarize_old(
        &self,
        age_threshold: Duration,
        min_length: usize,
        dry_run: bool,
    ) -> Result<SummarizeReport> {
        let cutoff = Utc::now() - age_threshold;
        let filter = RecordFilter::default()
            .created_before(cutoff)
            .min_content_chars(min_length)
            .summarized(false);

        let candidates = self
            .store
            .query(filter, QueryOrder::CreatedAsc, self.config.scan_limit)
            .await?;

        let cancel = self.cancel.child_token();
        let mut report = SummarizeReport {
            dry_run,
            ..Default::default()
        };

        for candidate in candidates {
            // Cancellation is only honored between records so every
            // mutation stays all-or-nothing.
            if cancel.is_cancelled() {
                tracing::info!(
                    summarized = report.summarized,
                    "Summarization scan cancelled mid-scan"
                );
                break;
            }
            report.examined += 1;

            let original_length = candidate.content.chars().count() as u64;
            let summary = match self.summarizer.summarize(&candidate.content).await {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!(memory_id = %candidate.id, "Summarizer failed: {}", e);
                    report.errors.push(format!("{}: {}", candidate.id, e));
                    continue;
                }
            };
            let summary_length = summary.chars().count() as u64;

            // original_length >= len(content) must hold after compaction
            if summary_length > original_length {
                report.errors.push(format!(
                    "{}: summary longer than original ({} > {} chars)",
                    candidate.id, summary_length, original_length
                ));
                continue;
            }

            let entry = SummarizeEntry {
                memory_id: candidate.id.clone(),
                original_length,
                summary_length,
                compression: compression_ratio(original_length, summary_length),
            };

            if dry_run {
                report.entries.push(entry);
                continue;
            }

            let patch = MetadataPatch::summarization(SummarizationState {
                summarized: true,
                original_length: Some(original_length),
                summary_date: Some(Utc::now()),
            })
            .with_expected_version(candidate.version);

            match self
                .store
                .replace_content(&candidate.id, summary, patch)
                .await
            {
                Ok(_) => {
                    tracing::debug!(
                        memory_id = %candidate.id,
                        compression = %entry.compression,
                        "Record summarized"
                    );
                    report.summarized += 1;
                    report.entries.push(entry);
                }
                // A concurrent writer (or a concurrent scan) moved the
                // record between selection and update; leave it alone.
                Err(Error::Conflict(_)) | Err(Error::NotFound(_)) => {
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(memory_id = %candidate.id, "Summarize update failed: {}", e);
                    report.errors.push(format!("{}: {}", candidate.id, e));
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            summarized = report.summarized,
            skipped = report.skipped,
            failed = report.errors.len(),
            dry_run,
            "Summarization scan finished"
        );
        Ok(report)
    }

    /// Per-category variant: same algorithm restricted to one category,
    /// fixed 500-character eligibility threshold, no dry-run.
    pub async fn summarize_by_category(&self, category: &str) -> Result<SummarizeReport> {
        let cutoff = Utc::now() - Duration::days(self.config.age_threshold_days);
        let filter = RecordFilter::default()
            .category(category)
            .created_before(cutoff)
            .min_content_chars(self.config.category_min_length)
            .summarized(false);

        let candidates = self
            .store
            .query(filter, QueryOrder::CreatedAsc, self.config.scan_limit)
            .await?;

        let mut report = SummarizeReport::default();
        for candidate in candidates {
            report.examined += 1;
            let original_length = candidate.content.chars().count() as u64;
            let summary = match self.summarizer.summarize(&candidate.content).await {
                Ok(summary) => summary,
                Err(e) => {
                    report.errors.push(format!("{}: {}", candidate.id, e));
                    continue;
                }
            };
            let summary_length = summary.chars().count() as u64;
            if summary_length > original_length {
                report.errors.push(format!(
                    "{}: summary longer than original ({} > {} chars)",
                    candidate.id, summary_length, original_length
                ));
                continue;
            }

            let patch = MetadataPatch::summarization(SummarizationState {
                summarized: true,
                original_length: Some(original_length),
                summary_date: Some(Utc::now()),
            })
            .with_expected_version(candidate.version);

            match self
                .store
                .replace_content(&candidate.id, summary, patch)
                .await
            {
                Ok(_) => {
                    report.summarized += 1;
                    report.entries.push(SummarizeEntry {
                        memory_id: candidate.id.clone(),
                        original_length,
                        summary_length,
                        compression: compression_ratio(original_length, summary_length),
                    });
                }
                Err(Error::Conflict(_)) | Err(Error::NotFound(_)) => report.skipped += 1,
                Err(e) => report.errors.push(format!("{}: {}", candidate.id, e)),
            }
        }
        Ok(report)
    }

    /// Total/summarized/full counts plus estimated space reclaimed.
    pub async fn summary_stats(&self) -> Result<SummaryStats> {
        let all = self
            .store
            .query(RecordFilter::default(), QueryOrder::CreatedDesc, usize::MAX)
            .await?;

        let mut stats = SummaryStats::default();
        for record in &all {
            stats.total_records += 1;
            if record.summarization.summarized {
                stats.summarized_records += 1;
                let current = record.content.chars().count() as u64;
                let original = record.summarization.original_length.unwrap_or(current);
                stats.estimated_chars_reclaimed += original.saturating_sub(current);
            }
        }
        stats.full_records = stats.total_records - stats.summarized_records;
        Ok(stats)
    }

    /// Background lifecycle loop: each tick runs the configured scan and
    /// hands records with open conflict metadata to the resolver
    /// (KEEP_NEWEST — the store already kept the newest write).
    pub fn spawn_periodic(
        self: Arc<Self>,
        resolver: Arc<ConflictResolver>,
        interval: std::time::Duration,
    ) -> JoinHandle<()> {
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let age = Duration::days(self.config.age_threshold_days);
                if let Err(e) = self
                    .summarize_old(age, self.config.min_length, false)
                    .await
                {
                    tracing::warn!("Periodic summarization scan failed: {}", e);
                }

                match self
                    .store
                    .query(
                        RecordFilter::default().open_conflict(true),
                        QueryOrder::CreatedAsc,
                        self.config.scan_limit,
                    )
                    .await
                {
                    Ok(open) => {
                        for record in open {
                            if let Err(e) = resolver
                                .resolve_conflict(
                                    &record.id,
                                    serde_json::json!({"detected": "periodic_scan"}),
                                    "keep_newest",
                                )
                                .await
                            {
                                tracing::warn!(
                                    memory_id = %record.id,
                                    "Periodic conflict resolution failed: {}",
                                    e
                                );
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Open-conflict scan failed: {}", e);
                    }
                }
            }
            tracing::info!("Summarization lifecycle loop stopped");
        })
    }

    /// Cancel the periodic loop and any in-flight scan.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

fn compression_ratio(original: u64, summary: u64) -> String {
    let reduction = if original == 0 {
        0.0
    } else {
        (1.0 - summary as f64 / original as f64) * 100.0
    };
    format!(
        "{} -> {} chars ({:.1}% reduction)",
        original, summary, reduction
    )
}
