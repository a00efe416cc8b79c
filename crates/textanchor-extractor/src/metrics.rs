//! Metrics collected across annotation runs

use std::collections::HashMap;
use textanchor_domain::{AlignmentStatus, RunMetadata};

/// Cumulative counters for one annotator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotatorMetrics {
    /// Documents that produced a result (including partial ones)
    pub documents_annotated: usize,

    /// Documents whose run returned an error
    pub documents_failed: usize,

    /// Documents returned as partial results
    pub partial_documents: usize,

    /// Chunk jobs that completed, successfully or not
    pub chunks_processed: usize,

    /// Chunk jobs that contributed nothing due to a failure
    pub chunks_failed: usize,

    /// Model calls issued
    pub model_calls: usize,

    /// Candidates accepted by the resolver
    pub candidates: usize,

    /// Records rejected by the resolver
    pub rejected_records: usize,

    /// Alignment outcomes before merging
    pub alignments: HashMap<AlignmentStatus, usize>,

    /// Total processing time in milliseconds
    pub total_processing_ms: u64,
}

impl AnnotatorMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issued model call
    pub fn record_model_call(&mut self) {
        self.model_calls += 1;
    }

    /// Record a completed chunk job
    pub fn record_chunk(&mut self, candidates: usize, rejected: usize) {
        self.chunks_processed += 1;
        self.candidates += candidates;
        self.rejected_records += rejected;
    }

    /// Record a chunk job that failed
    pub fn record_chunk_failure(&mut self) {
        self.chunks_processed += 1;
        self.chunks_failed += 1;
    }

    /// Record a document that produced a result
    pub fn record_document(&mut self, metadata: &RunMetadata) {
        self.documents_annotated += 1;
        if metadata.partial {
            self.partial_documents += 1;
        }
        self.record_alignment(AlignmentStatus::Exact, metadata.exact_count);
        self.record_alignment(AlignmentStatus::Fuzzy, metadata.fuzzy_count);
        self.record_alignment(AlignmentStatus::Unaligned, metadata.unaligned_count);
        self.total_processing_ms += metadata.processing_time_ms;
    }

    /// Record a document whose run failed
    pub fn record_failed_document(&mut self, processing_time_ms: u64) {
        self.documents_failed += 1;
        self.total_processing_ms += processing_time_ms;
    }

    /// Record alignment outcomes
    pub fn record_alignment(&mut self, status: AlignmentStatus, count: usize) {
        if count > 0 {
            *self.alignments.entry(status).or_insert(0) += count;
        }
    }

    /// Count for one alignment status
    pub fn alignment_count(&self, status: AlignmentStatus) -> usize {
        self.alignments.get(&status).copied().unwrap_or(0)
    }

    /// Exact plus fuzzy alignments
    pub fn total_aligned(&self) -> usize {
        self.alignment_count(AlignmentStatus::Exact) + self.alignment_count(AlignmentStatus::Fuzzy)
    }

    /// Share of extractions that were anchored, in [0.0, 1.0]
    pub fn alignment_rate(&self) -> f64 {
        let total: usize = self.alignments.values().sum();
        if total == 0 {
            return 0.0;
        }
        self.total_aligned() as f64 / total as f64
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Annotator Metrics Summary".to_string(),
            "=========================".to_string(),
            format!(
                "Documents: {} annotated ({} partial), {} failed",
                self.documents_annotated, self.partial_documents, self.documents_failed
            ),
            format!("Chunks: {} processed, {} failed", self.chunks_processed, self.chunks_failed),
            format!("Model calls: {}", self.model_calls),
            format!(
                "Candidates: {} accepted, {} rejected",
                self.candidates, self.rejected_records
            ),
            format!("Total processing time: {}ms", self.total_processing_ms),
        ];

        if !self.alignments.is_empty() {
            lines.push(String::new());
            lines.push("Alignments:".to_string());
            for status in [AlignmentStatus::Exact, AlignmentStatus::Fuzzy, AlignmentStatus::Unaligned] {
                lines.push(format!("  {}: {}", status.as_str(), self.alignment_count(status)));
            }
            lines.push(format!("  Aligned rate: {:.1}%", self.alignment_rate() * 100.0));
        }

        lines.join("\n")
    }
}
