//! Recursive character text splitter with overlap.
//!
//! Splits a document body into [`Chunk`]s of at most `chunk_size`
//! characters. Consecutive chunks overlap by up to `chunk_overlap`
//! characters, so text at a chunk edge also appears in the next chunk.
//!
//! # Algorithm
//!
//! 1. Pick the first separator present in the text, in order of
//!    preference: paragraph (`\n\n`), line (`\n`), sentence (`. `),
//!    word (` `), and finally the empty separator (a hard cut between
//!    characters).
//! 2. Split on it, keeping the separator at the end of each piece.
//!    Pieces that are still `chunk_size` or longer are split again with
//!    the remaining, finer separators.
//! 3. All pieces are then greedily merged in document order. When the
//!    next piece would overflow, the buffer is flushed as a chunk and
//!    pieces are dropped from its front until at most `chunk_overlap`
//!    characters remain; those carry into the next chunk. If no whole
//!    piece fits, the last `chunk_overlap` characters of the flushed
//!    chunk are carried instead, starting at a word boundary.
//!
//! All lengths are counted in `char`s and every cut lands on a UTF-8
//! boundary. Chunk ids are UUIDv5 of `(source_id, chunk_index)`, so
//! rebuilding from an unchanged corpus yields identical chunks.
//!
//! # Example
//!
//! ```rust
//! use ecoscribe_core::chunk::{chunk_document, TextSplitter};
//!
//! let splitter = TextSplitter::new(500, 100).unwrap();
//! let chunks = chunk_document("history.txt", "Mercian dialects.\n\nWessex.", &splitter);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use std::collections::VecDeque;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RestoreError, Result};
use crate::models::Chunk;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Separators in order of preference. The trailing empty separator is the
/// hard-cut fallback and must stay last.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// A piece of text and its byte offset in the original document.
type Piece<'a> = (usize, &'a str);

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RestoreError::InvalidArgument(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RestoreError::InvalidArgument(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into trimmed, non-empty spans paired with their byte
    /// offset in `text`.
    pub fn split(&self, text: &str) -> Vec<(usize, String)> {
        let pieces = self.atomize(text, 0, &DEFAULT_SEPARATORS);
        self.merge(&pieces)
    }

    /// Break `text` into contiguous pieces shorter than `chunk_size`,
    /// using the coarsest separator that works at each level.
    fn atomize<'a>(&self, text: &'a str, base: usize, separators: &[&str]) -> Vec<Piece<'a>> {
        let sep_idx = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(sep_idx).copied().unwrap_or("");
        let finer = separators.get(sep_idx + 1..).unwrap_or(&[]);

        let mut out = Vec::new();
        for (offset, piece) in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size || finer.is_empty() {
                out.push((base + offset, piece));
            } else {
                out.extend(self.atomize(piece, base + offset, finer));
            }
        }
        out
    }

    /// Greedily merge pieces into chunks, carrying an overlap window.
    ///
    /// When no whole trailing piece fits in the overlap, the last
    /// `chunk_overlap` chars of the previous chunk (snapped forward to a
    /// word start) are carried instead.
    fn merge<'a>(&self, pieces: &[Piece<'a>]) -> Vec<(usize, String)> {
        let mut docs = Vec::new();
        let mut window: VecDeque<Piece<'a>> = VecDeque::new();
        let mut total = 0usize;

        for &(offset, piece) in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                flush(&mut docs, &window);
                let last = window.back().copied();
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= char_len(dropped),
                        None => break,
                    }
                }
                if window.is_empty() {
                    let budget = self.chunk_overlap.min(self.chunk_size.saturating_sub(len));
                    if let Some(tail) = last.and_then(|p| overlap_tail(p, budget)) {
                        total = char_len(tail.1);
                        window.push_back(tail);
                    }
                }
            }
            window.push_back((offset, piece));
            total += len;
        }

        flush(&mut docs, &window);
        docs
    }
}

/// Split a document body into indexed chunks.
///
/// Blank documents produce no chunks.
pub fn chunk_document(source_id: &str, text: &str, splitter: &TextSplitter) -> Vec<Chunk> {
    splitter
        .split(text)
        .into_iter()
        .enumerate()
        .map(|(index, (byte_start, span))| {
            let start = text[..byte_start].chars().count();
            make_chunk(source_id, index as i64, start, &span)
        })
        .collect()
}

/// Deterministic id for a chunk position.
pub fn chunk_id(source_id: &str, index: i64) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}#{}", source_id, index).as_bytes(),
    )
    .to_string()
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(source_id: &str, index: i64, start: usize, text: &str) -> Chunk {
    Chunk {
        id: chunk_id(source_id, index),
        source_id: source_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        start,
        char_len: char_len(text),
        hash: hash_text(text),
    }
}

/// Split on `sep`, keeping it at the end of each piece. The empty
/// separator yields one piece per char.
fn split_keep_separator<'a>(text: &'a str, sep: &str) -> Vec<Piece<'a>> {
    if sep.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| (i, &text[i..i + c.len_utf8()]))
            .collect();
    }

    let mut pieces = Vec::new();
    let mut last = 0;
    for (idx, m) in text.match_indices(sep) {
        let end = idx + m.len();
        pieces.push((last, &text[last..end]));
        last = end;
    }
    if last < text.len() {
        pieces.push((last, &text[last..]));
    }
    pieces
}

/// Suffix of `piece` holding at most `budget` chars, trailing separator
/// included, starting at a word boundary when one exists.
fn overlap_tail(piece: Piece<'_>, budget: usize) -> Option<Piece<'_>> {
    let (offset, text) = piece;
    let body = text.trim_end();
    let keep = budget.checked_sub(char_len(&text[body.len()..]))?;
    if keep == 0 {
        return None;
    }

    let skip = char_len(body).saturating_sub(keep);
    let mut start = body
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    if skip > 0 && !body[..start].ends_with(char::is_whitespace) {
        if let Some(ws) = body[start..].find(char::is_whitespace) {
            let rest = &body[start + ws..];
            let next_word = start + ws + (rest.len() - rest.trim_start().len());
            if next_word < body.len() {
                start = next_word;
            }
        }
    }

    let tail = &text[start..];
    if tail.trim().is_empty() {
        return None;
    }
    Some((offset + start, tail))
}

fn flush(docs: &mut Vec<(usize, String)>, window: &VecDeque<Piece>) {
    let Some(&(offset, _)) = window.front() else {
        return;
    };
    let joined: String = window.iter().map(|(_, p)| *p).collect();
    push_trimmed(docs, offset, &joined);
}

fn push_trimmed(docs: &mut Vec<(usize, String)>, offset: usize, text: &str) {
    let trimmed = text.trim_start();
    let lead = text.len() - trimmed.len();
    let trimmed = trimmed.trim_end();
    if !trimmed.is_empty() {
        docs.push((offset + lead, trimmed.to_string()));
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_document("doc1", "Hello, world!", &TextSplitter::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].start, 0);
    }

    #[test]
    fn test_blank_text_no_chunks() {
        assert!(chunk_document("doc1", "", &TextSplitter::default()).is_empty());
        assert!(chunk_document("doc1", " \n\n \t", &TextSplitter::default()).is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_document("doc1", text, &TextSplitter::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = "Alpha paragraph sentence one.\n\nBeta paragraph sentence two.";
        let splitter = TextSplitter::new(40, 0).unwrap();
        let chunks = chunk_document("doc1", text, &splitter);
        assert_eq!(
            texts(&chunks),
            vec!["Alpha paragraph sentence one.", "Beta paragraph sentence two."]
        );
        assert_eq!(chunks[1].start, 31);
    }

    #[test]
    fn test_prefers_sentence_over_word() {
        let text = "One short sentence here. Two short sentence here. Three short sentence here.";
        let splitter = TextSplitter::new(30, 0).unwrap();
        let chunks = chunk_document("doc1", text, &splitter);
        assert_eq!(
            texts(&chunks),
            vec![
                "One short sentence here.",
                "Two short sentence here.",
                "Three short sentence here."
            ]
        );
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = (0..200)
            .map(|i| format!("w{:03}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let splitter = TextSplitter::new(50, 20).unwrap();
        let chunks = chunk_document("doc1", &text, &splitter);
        assert!(chunks.len() > 2);

        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].text.split_whitespace().collect();
            let next: Vec<&str> = pair[1].text.split_whitespace().collect();
            assert_eq!(&prev[prev.len() - 4..], &next[..4], "pair {:?}", pair);
        }
        for c in &chunks {
            assert!(c.char_len <= 50, "chunk too long: {}", c.char_len);
        }
    }

    #[test]
    fn test_hard_cut_fallback() {
        let word: String = (0..120u8).map(|i| (b'a' + i % 26) as char).collect();
        let splitter = TextSplitter::new(50, 10).unwrap();
        let chunks = chunk_document("doc1", &word, &splitter);
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| c.start).collect::<Vec<_>>(),
            vec![0, 40, 80]
        );
        for c in &chunks {
            let expect: String = word.chars().skip(c.start).take(c.char_len).collect();
            assert_eq!(c.text, expect);
        }
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_document("doc1", &text, &TextSplitter::new(60, 10).unwrap());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_offsets_point_at_text() {
        let text = "Mercian dialects were spoken in the Midlands.\n\n\
                    Northumbrian was spoken north of the Humber.\n\n\
                    West Saxon became the literary standard.";
        let chunks = chunk_document("doc1", text, &TextSplitter::new(60, 10).unwrap());
        for c in &chunks {
            let span: String = text.chars().skip(c.start).take(c.char_len).collect();
            assert_eq!(span, c.text);
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = chunk_document("doc1", text, &TextSplitter::new(12, 3).unwrap());
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.text.is_empty());
            assert!(c.char_len <= 12);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let splitter = TextSplitter::new(12, 4).unwrap();
        let c1 = chunk_document("doc1", text, &splitter);
        let c2 = chunk_document("doc1", text, &splitter);
        assert_eq!(c1, c2);
    }

    fn paragraph(tag: &str, words: usize) -> String {
        (0..words)
            .map(|j| format!("{}w{:02}", tag, j))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn assert_neighbours_overlap(text: &str, chunks: &[Chunk]) {
        for pair in chunks.windows(2) {
            let prev_end = pair[0].start + pair[0].char_len;
            assert!(
                pair[1].start < prev_end,
                "chunk {} starts at {} after previous ends at {}",
                pair[1].chunk_index,
                pair[1].start,
                prev_end
            );
            let shared: String = text
                .chars()
                .skip(pair[1].start)
                .take(prev_end - pair[1].start)
                .collect();
            assert!(pair[0].text.ends_with(&shared));
            assert!(pair[1].text.starts_with(&shared));
        }
    }

    #[test]
    fn test_overlap_between_paragraph_sized_pieces() {
        // Each paragraph is 239 chars, far longer than the overlap.
        let text = ["p0", "p1", "p2"]
            .iter()
            .map(|tag| paragraph(tag, 40))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_document("doc1", &text, &TextSplitter::default());

        assert_eq!(chunks.len(), 2);
        assert_neighbours_overlap(&text, &chunks);

        let overlap = chunks[0].start + chunks[0].char_len - chunks[1].start;
        assert!(overlap > 0 && overlap <= DEFAULT_CHUNK_OVERLAP, "overlap {}", overlap);
        let before: char = text.chars().nth(chunks[1].start - 1).unwrap();
        assert!(before.is_whitespace(), "carried tail starts mid-word");
        assert!(chunks[1].text.starts_with("p1w"));
        assert!(chunks[1].text.ends_with("p2w39"));
    }

    #[test]
    fn test_overlap_after_oversized_paragraph() {
        // The first paragraph must be split into words; the short one after
        // it still overlaps the last of those chunks.
        let text = format!("{}\n\nb00 b01 b02", paragraph("a", 20));
        let splitter = TextSplitter::new(40, 10).unwrap();
        let chunks = chunk_document("doc1", &text, &splitter);

        assert!(chunks.len() >= 3);
        assert_neighbours_overlap(&text, &chunks);
        for c in &chunks {
            assert!(c.char_len <= 40, "chunk too long: {}", c.char_len);
        }
        let last = &chunks[chunks.len() - 1];
        assert!(last.text.contains("aw19"));
        assert!(last.text.ends_with("b02"));
    }

    #[test]
    fn test_invalid_overlap() {
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
    }
}
