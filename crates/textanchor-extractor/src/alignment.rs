//! Relocating claimed text inside its source chunk
//!
//! Two passes per candidate:
//!
//! 1. **Exact**: byte-identical occurrences of the claim in the chunk, first
//!    one not already claimed by an earlier candidate of the same chunk
//! 2. **Fuzzy**: token-level Levenshtein similarity against sliding windows of
//!    the chunk's word tokens, accepted at or above the threshold
//!
//! Anything else is left unaligned with the model's claimed text.

use crate::config::ExtractorConfig;
use std::cmp::Ordering;
use std::collections::HashSet;
use textanchor_domain::{AlignmentStatus, Candidate, CharInterval, GroundedExtraction, TextChunk};
use tracing::debug;

/// Alignment settings applied uniformly within a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aligner {
    fuzzy_threshold: f64,
    fuzzy_margin_ratio: f64,
}

impl Aligner {
    /// Create an aligner
    pub fn new(fuzzy_threshold: f64, fuzzy_margin_ratio: f64) -> Self {
        Self {
            fuzzy_threshold,
            fuzzy_margin_ratio,
        }
    }

    /// Create an aligner from pipeline configuration
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.fuzzy_threshold, config.fuzzy_margin_ratio)
    }

    /// Start aligning candidates of one chunk
    pub fn for_chunk<'a>(&self, chunk: TextChunk<'a>) -> ChunkAligner<'a> {
        ChunkAligner {
            settings: *self,
            chunk,
            claimed: HashSet::new(),
            tokens: None,
        }
    }

    /// Align every candidate of a chunk in emission order
    pub fn align_chunk(&self, chunk: TextChunk<'_>, candidates: Vec<Candidate>) -> Vec<GroundedExtraction> {
        let mut aligner = self.for_chunk(chunk);
        candidates.into_iter().map(|c| aligner.align(c)).collect()
    }
}

/// Per-chunk aligner remembering spans claimed by earlier candidates
#[derive(Debug)]
pub struct ChunkAligner<'a> {
    settings: Aligner,
    chunk: TextChunk<'a>,
    claimed: HashSet<CharInterval>,
    tokens: Option<Vec<Token>>,
}

/// A word token of the chunk, lowercased, with its local byte span
#[derive(Debug, Clone)]
struct Token {
    span: CharInterval,
    norm: String,
}

/// Best fuzzy window found so far
#[derive(Debug, Clone, Copy)]
struct FuzzyMatch {
    score: f64,
    start_token: usize,
    size_gap: usize,
    claimed: bool,
    len: usize,
    span: CharInterval,
}

impl FuzzyMatch {
    /// `Greater` when `self` should win over `other`
    fn rank(&self, other: &FuzzyMatch) -> Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.start_token.cmp(&self.start_token))
            .then_with(|| other.size_gap.cmp(&self.size_gap))
            .then_with(|| other.claimed.cmp(&self.claimed))
            .then_with(|| other.len.cmp(&self.len))
    }
}

impl<'a> ChunkAligner<'a> {
    /// Align one candidate; pass index is left at 0
    pub fn align(&mut self, candidate: Candidate) -> GroundedExtraction {
        let claim = candidate.claimed_text.as_str();
        if claim.trim().is_empty() {
            return GroundedExtraction::unaligned(candidate, self.chunk.chunk_index);
        }

        if let Some(local) = self.exact_match(claim) {
            return self.ground(candidate, local, AlignmentStatus::Exact);
        }

        match self.fuzzy_match(claim) {
            Some(local) => self.ground(candidate, local, AlignmentStatus::Fuzzy),
            None => {
                debug!(
                    "Chunk {}: no alignment for {} '{}'",
                    self.chunk.chunk_index, candidate.class_name, candidate.claimed_text
                );
                GroundedExtraction::unaligned(candidate, self.chunk.chunk_index)
            }
        }
    }

    fn ground(&mut self, candidate: Candidate, local: CharInterval, status: AlignmentStatus) -> GroundedExtraction {
        self.claimed.insert(local);
        let text = &self.chunk.text[local.start_offset..local.end_offset];

        GroundedExtraction {
            class_name: candidate.class_name,
            extraction_text: text.to_string(),
            attributes: candidate.attributes,
            interval: Some(local.shift(self.chunk.interval.start_offset)),
            alignment_status: status,
            extraction_index: candidate.extraction_index,
            group_index: candidate.group_index,
            chunk_index: self.chunk.chunk_index,
            pass_index: 0,
        }
    }

    /// First unclaimed occurrence, else the first occurrence
    fn exact_match(&self, claim: &str) -> Option<CharInterval> {
        let text = self.chunk.text;
        let mut first = None;
        let mut from = 0;

        while let Some(found) = text[from..].find(claim) {
            let start = from + found;
            let span = CharInterval::new(start, start + claim.len());
            if !self.claimed.contains(&span) {
                return Some(span);
            }
            first.get_or_insert(span);

            // Step one character so overlapping occurrences are seen
            match text[start..].chars().next() {
                Some(c) => from = start + c.len_utf8(),
                None => break,
            }
        }

        first
    }

    fn fuzzy_match(&mut self, claim: &str) -> Option<CharInterval> {
        let claim_tokens: Vec<String> = tokenize(claim).into_iter().map(|t| t.norm).collect();
        let n = claim_tokens.len();
        if n == 0 {
            return None;
        }

        let margin = ((n as f64 * self.settings.fuzzy_margin_ratio).ceil() as usize).max(1);
        let min_len = n.saturating_sub(margin).max(1);
        let max_len = n + margin;

        let chunk_text = self.chunk.text;
        let tokens = self.tokens.get_or_insert_with(|| tokenize(chunk_text));
        let mut best: Option<FuzzyMatch> = None;

        // One edit-distance table per start token covers every window length
        let mut prev = vec![0usize; n + 1];
        let mut curr = vec![0usize; n + 1];
        for start in 0..tokens.len() {
            for (row, cell) in prev.iter_mut().enumerate() {
                *cell = row;
            }

            let end = (start + max_len).min(tokens.len());
            for (len, token) in (1..).zip(&tokens[start..end]) {
                curr[0] = len;
                for row in 1..=n {
                    let substitution = prev[row - 1] + usize::from(claim_tokens[row - 1] != token.norm);
                    curr[row] = substitution.min(prev[row] + 1).min(curr[row - 1] + 1);
                }
                std::mem::swap(&mut prev, &mut curr);

                if len < min_len {
                    continue;
                }

                let distance = prev[n];
                let score = 1.0 - distance as f64 / n.max(len) as f64;
                let span = CharInterval::new(tokens[start].span.start_offset, token.span.end_offset);
                let candidate = FuzzyMatch {
                    score,
                    start_token: start,
                    size_gap: len.abs_diff(n),
                    claimed: self.claimed.contains(&span),
                    len,
                    span,
                };

                if best.map_or(true, |b| candidate.rank(&b) == Ordering::Greater) {
                    best = Some(candidate);
                }
            }
        }

        best.filter(|b| b.score >= self.settings.fuzzy_threshold)
            .map(|b| b.span)
    }
}

/// Maximal alphanumeric runs, lowercased
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start = None;

    for (offset, c) in text.char_indices() {
        match (c.is_alphanumeric(), start) {
            (true, None) => start = Some(offset),
            (false, Some(s)) => {
                tokens.push(Token {
                    span: CharInterval::new(s, offset),
                    norm: text[s..offset].to_lowercase(),
                });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            span: CharInterval::new(s, text.len()),
            norm: text[s..].to_lowercase(),
        });
    }

    tokens
}
