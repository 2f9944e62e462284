//! Deterministic overlapping text chunking for the ingest path.
//!
//! Splitting is character-based with a preference for word boundaries: a
//! chunk ends at the last space inside its window when one exists far enough
//! in, otherwise at the hard size limit. Every chunk after the first starts
//! exactly `overlap` characters before the previous chunk's end, so the same
//! input and settings always reproduce the same chunk boundaries.
//!
//! `overlap >= size` is a configuration error and is rejected when the
//! profile is saved ([`crate::profile::ProfileSettings::validate`]); the
//! functions here assume validated settings.

use serde::{Deserialize, Serialize};

/// A contiguous span of the source text, ready for embedding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub content: String,
    /// Zero-based position of this chunk within its document.
    pub chunk_index: usize,
    /// Start offset in characters (not bytes) of the source text.
    pub start: usize,
    /// End offset in characters, exclusive.
    pub end: usize,
}

/// Splits `text` into overlapping chunks of at most `size` characters.
///
/// Empty (or whitespace-only) input yields no chunks; input shorter than
/// `size` yields exactly one chunk covering the whole text.
///
/// # Panics
/// Debug-asserts `overlap < size`; callers go through validated
/// [`crate::profile::ProfileSettings`].
pub fn chunk(text: &str, size: usize, overlap: usize) -> Vec<TextChunk> {
    debug_assert!(size > 0 && overlap < size, "settings must be pre-validated");

    if text.trim().is_empty() {
        return Vec::new();
    }

    // Char-offset table so size/overlap arithmetic is exact for any script.
    let byte_of: Vec<usize> = text
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = byte_of.len() - 1;
    let chars: Vec<char> = text.chars().collect();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let hard_end = (start + size).min(total);
        let end = if hard_end < total {
            // Prefer breaking at the last space, but only where doing so
            // still guarantees forward progress past the overlap region.
            match (start + overlap + 1..hard_end)
                .rev()
                .find(|&i| chars[i] == ' ')
            {
                Some(space) => space,
                None => hard_end,
            }
        } else {
            hard_end
        };

        chunks.push(TextChunk {
            content: text[byte_of[start]..byte_of[end]].to_string(),
            chunk_index: chunks.len(),
            start,
            end,
        });

        if end >= total {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// Normalizes raw document text before chunking: unifies line endings and
/// strips control characters other than newline and tab.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}
