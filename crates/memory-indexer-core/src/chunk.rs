//! Word-window text chunker.
//!
//! Splits document text on whitespace and yields overlapping windows of
//! words. Size is measured in whitespace-delimited words, an explicit
//! approximation of model tokens.
//!
//! # Algorithm
//!
//! 1. Split text on whitespace into a word sequence `W`.
//! 2. Emit a window of up to `size` words starting at index 0.
//! 3. Advance the start by `size - overlap` words.
//! 4. Stop once a window's end reaches `len(W)`.
//!
//! For `W > size` words this yields `ceil((W - overlap) / (size - overlap))`
//! windows; for `0 < W <= size` exactly one; for empty text none.
//!
//! # Example
//!
//! ```rust
//! use memory_indexer_core::chunk::WordWindows;
//!
//! let windows: Vec<_> = WordWindows::new("a b c d e", 3, 1).unwrap().collect();
//! assert_eq!(windows.len(), 2);
//! assert_eq!(windows[0].text, "a b c");
//! assert_eq!(windows[1].text, "c d e");
//! ```

use anyhow::{bail, Result};

/// One window produced by [`WordWindows`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkWindow {
    /// Zero-based position within the document.
    pub ordinal: i64,
    /// Window words joined by single spaces.
    pub text: String,
    /// Number of words in the window.
    pub word_count: usize,
}

/// Lazy iterator over overlapping word windows of a text.
///
/// Holds no state beyond the source words; clone it before consuming to
/// walk the same sequence twice.
#[derive(Debug, Clone)]
pub struct WordWindows<'a> {
    words: Vec<&'a str>,
    size: usize,
    step: usize,
    next_start: Option<usize>,
    ordinal: i64,
}

impl<'a> WordWindows<'a> {
    /// Build a window iterator over `text`.
    ///
    /// Fails if `size` is zero or `overlap >= size`.
    pub fn new(text: &'a str, size: usize, overlap: usize) -> Result<Self> {
        validate_params(size, overlap)?;
        let words: Vec<&str> = text.split_whitespace().collect();
        let next_start = if words.is_empty() { None } else { Some(0) };
        Ok(Self {
            words,
            size,
            step: size - overlap,
            next_start,
            ordinal: 0,
        })
    }

    /// Total number of words in the source text.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

impl Iterator for WordWindows<'_> {
    type Item = ChunkWindow;

    fn next(&mut self) -> Option<ChunkWindow> {
        let start = self.next_start?;
        let end = (start + self.size).min(self.words.len());
        let window = &self.words[start..end];

        self.next_start = if end >= self.words.len() {
            None
        } else {
            Some(start + self.step)
        };

        let item = ChunkWindow {
            ordinal: self.ordinal,
            text: window.join(" "),
            word_count: window.len(),
        };
        self.ordinal += 1;
        Some(item)
    }
}

/// Check chunking parameters: `size > 0` and `overlap < size`.
pub fn validate_params(size: usize, overlap: usize) -> Result<()> {
    if size == 0 {
        bail!("chunk size must be > 0");
    }
    if overlap >= size {
        bail!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            overlap,
            size
        );
    }
    Ok(())
}

/// Number of windows a text of `words` words yields.
pub fn expected_chunk_count(words: usize, size: usize, overlap: usize) -> usize {
    if words == 0 {
        0
    } else if words <= size {
        1
    } else {
        let step = size - overlap;
        (words - overlap).div_ceil(step)
    }
}
