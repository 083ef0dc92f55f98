//! Boundary-aware chunking
//!
//! Windows are measured in characters. Each window ends at the best natural
//! boundary in its second half: a paragraph break beats a sentence end, which
//! beats a clause or word break. Text with no boundary is cut hard at the
//! window edge. Consecutive chunks share exactly `chunk_overlap` characters,
//! and every chunk is a verbatim slice of the input.

use unicode_segmentation::UnicodeSegmentation;

use crate::domain::ingestion::{ChunkingConfig, ChunkingStrategy, TextChunk};
use crate::domain::DomainError;

const CLAUSE_PUNCTUATION: &[char] = &['，', '、', ',', ';', '；'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Boundary {
    None,
    Word,
    Sentence,
    Paragraph,
}

/// Paragraph, sentence and word aware chunker
#[derive(Debug, Clone, Default)]
pub struct BoundaryChunker;

impl BoundaryChunker {
    pub fn new() -> Self {
        Self
    }

    /// Boundary strength of cutting before each character position `0..=n`
    fn boundaries(text: &str, chars: &[char]) -> Vec<Boundary> {
        let mut ranks = vec![Boundary::None; chars.len() + 1];

        for i in 1..=chars.len() {
            let prev = chars[i - 1];
            if prev.is_whitespace() || CLAUSE_PUNCTUATION.contains(&prev) {
                ranks[i] = Boundary::Word;
            }
        }

        let byte_offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        for (byte, _) in text.split_sentence_bound_indices() {
            if let Ok(i) = byte_offsets.binary_search(&byte) {
                if i > 0 {
                    ranks[i] = ranks[i].max(Boundary::Sentence);
                }
            }
        }

        for i in 2..=chars.len() {
            if chars[i - 1] == '\n' && chars[i - 2] == '\n' {
                ranks[i] = Boundary::Paragraph;
            }
        }

        ranks
    }

    /// Rightmost position in `(lo, hi]` carrying the strongest boundary
    fn best_cut(ranks: &[Boundary], lo: usize, hi: usize) -> Option<usize> {
        [Boundary::Paragraph, Boundary::Sentence, Boundary::Word]
            .into_iter()
            .find_map(|wanted| ((lo + 1)..=hi).rev().find(|&i| ranks[i] >= wanted))
    }
}

impl ChunkingStrategy for BoundaryChunker {
    fn chunk(&self, content: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>, DomainError> {
        config.validate()?;

        if content.trim().is_empty() {
            return Ok(vec![]);
        }

        let chars: Vec<char> = content.chars().collect();
        let total = chars.len();
        let size = config.chunk_size;
        let overlap = config.chunk_overlap;

        if total <= size {
            return Ok(vec![TextChunk::new(0, content, 0, total)]);
        }

        let ranks = Self::boundaries(content, &chars);
        let slice = |start: usize, end: usize| chars[start..end].iter().collect::<String>();

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            if total - start <= size {
                chunks.push(TextChunk::new(chunks.len(), slice(start, total), start, total));
                break;
            }

            let hi = start + size;
            let lo = start + overlap.max(size / 2);
            let end = Self::best_cut(&ranks, lo, hi).unwrap_or(hi);

            chunks.push(TextChunk::new(chunks.len(), slice(start, end), start, end));
            start = end - overlap;
        }

        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "boundary"
    }
}
