//! Splitting documents into bounded, position-tagged chunks
//!
//! Chunks are contiguous and non-overlapping: concatenating them in index
//! order reproduces the document text exactly. Sizes are counted in
//! characters; intervals are byte offsets on `char` boundaries.

use crate::config::{ChunkStrategy, ExtractorConfig};
use crate::error::ChunkingError;
use textanchor_domain::{CharInterval, Document, TextChunk};

/// Default look-back window used by [`split`]
const DEFAULT_LOOKBACK: usize = 200;

/// Split a document with the default boundary preference
///
/// An empty document yields no chunks.
pub fn split(document: &Document, max_chars: usize) -> Result<Vec<TextChunk<'_>>, ChunkingError> {
    TextChunker::new(ChunkStrategy::default(), max_chars, DEFAULT_LOOKBACK).split(document)
}

/// Kind of boundary found at a candidate cut position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Sentence,
    Word,
}

/// Chunks text according to the specified strategy
#[derive(Debug, Clone)]
pub struct TextChunker {
    strategy: ChunkStrategy,
    max_chars: usize,
    lookback: usize,
}

impl TextChunker {
    /// Create a new text chunker
    pub fn new(strategy: ChunkStrategy, max_chars: usize, boundary_lookback: usize) -> Self {
        Self {
            strategy,
            max_chars,
            lookback: boundary_lookback,
        }
    }

    /// Create a chunker from pipeline configuration
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.chunk_strategy, config.max_chars, config.boundary_lookback)
    }

    /// Split a document into chunks borrowing its text
    pub fn split<'a>(&self, document: &'a Document) -> Result<Vec<TextChunk<'a>>, ChunkingError> {
        let text = document.text();
        let chunks = self
            .intervals(text)?
            .into_iter()
            .enumerate()
            .map(|(index, interval)| TextChunk::new(index, interval, text))
            .collect();
        Ok(chunks)
    }

    /// Compute chunk intervals over `text`
    pub fn intervals(&self, text: &str) -> Result<Vec<CharInterval>, ChunkingError> {
        if self.max_chars == 0 {
            return Err(ChunkingError::ZeroMaxChars);
        }

        let mut intervals = Vec::new();
        let mut start = 0;

        while start < text.len() {
            // Byte offset just past `max_chars` characters, or the tail fits
            let hard_end = match text[start..].char_indices().nth(self.max_chars) {
                Some((offset, _)) => start + offset,
                None => {
                    intervals.push(CharInterval::new(start, text.len()));
                    break;
                }
            };

            let end = self.find_break(text, start, hard_end).unwrap_or(hard_end);
            intervals.push(CharInterval::new(start, end));
            start = end;
        }

        Ok(intervals)
    }

    /// Find the best cut in the look-back window ending at `hard_end`
    fn find_break(&self, text: &str, start: usize, hard_end: usize) -> Option<usize> {
        if self.strategy == ChunkStrategy::Hard {
            return None;
        }

        // At least one character always stays in the chunk
        let lookback = self.lookback.min(self.max_chars - 1);
        let window_start = text[start..hard_end]
            .char_indices()
            .nth(self.max_chars - lookback)
            .map(|(offset, _)| start + offset)
            .unwrap_or(hard_end);

        let mut sentence = None;
        let mut word = None;
        let mut cut = hard_end;

        while cut >= window_start && cut > start {
            match classify_cut(text, start, cut) {
                Some(Boundary::Paragraph) if self.strategy == ChunkStrategy::ByParagraph => {
                    return Some(cut);
                }
                Some(Boundary::Paragraph | Boundary::Sentence) => {
                    if self.strategy == ChunkStrategy::BySentence {
                        return Some(cut);
                    }
                    sentence.get_or_insert(cut);
                }
                Some(Boundary::Word) => {
                    word.get_or_insert(cut);
                }
                None => {}
            }

            match text[..cut].chars().next_back() {
                Some(c) => cut -= c.len_utf8(),
                None => break,
            }
        }

        sentence.or(word)
    }
}

/// Classify a cut placed at `cut`, i.e. right after a whitespace run
fn classify_cut(text: &str, start: usize, cut: usize) -> Option<Boundary> {
    let before = &text[start..cut];
    if !before.chars().next_back()?.is_whitespace() {
        return None;
    }
    // The whitespace run must end exactly at the cut
    if text[cut..].chars().next().is_some_and(char::is_whitespace) {
        return None;
    }

    let content = before.trim_end();
    if content.is_empty() {
        return None;
    }
    let run = &before[content.len()..];

    if run.matches('\n').count() >= 2 {
        return Some(Boundary::Paragraph);
    }

    let ends_sentence = content
        .trim_end_matches(['"', '\'', ')', ']', '\u{201D}', '\u{2019}'])
        .ends_with(['.', '!', '?']);
    if ends_sentence || run.contains('\n') {
        Some(Boundary::Sentence)
    } else {
        Some(Boundary::Word)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn strategy() -> impl Strategy<Value = ChunkStrategy> {
        prop_oneof![
            Just(ChunkStrategy::ByParagraph),
            Just(ChunkStrategy::BySentence),
            Just(ChunkStrategy::Hard),
        ]
    }

    proptest! {
        /// Property: chunks cover the document exactly, in order, within size
        #[test]
        fn test_chunk_coverage(
            text in "[a-zA-Zé .!?\n]{0,300}",
            max_chars in 1usize..60,
            lookback in 0usize..80,
            strategy in strategy(),
        ) {
            let chunker = TextChunker::new(strategy, max_chars, lookback);
            let intervals = chunker.intervals(&text).unwrap();

            let mut expected_start = 0;
            let mut rebuilt = String::new();
            for interval in &intervals {
                prop_assert_eq!(interval.start_offset, expected_start);
                prop_assert!(!interval.is_empty());
                let piece = interval.slice(&text).unwrap();
                prop_assert!(piece.chars().count() <= max_chars);
                rebuilt.push_str(piece);
                expected_start = interval.end_offset;
            }

            prop_assert_eq!(rebuilt, text.clone());
            prop_assert_eq!(intervals.is_empty(), text.is_empty());
        }
    }
}
