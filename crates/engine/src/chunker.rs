//! Text chunking with configurable size and overlap.
//!
//! Text is cut into windows of `chunk_size` units that advance by
//! `chunk_size - overlap` units. The last window is truncated to whatever text
//! remains. Windows always tile the source contiguously, so every character is
//! covered and offsets map straight back into the original text.

use crate::config::{ChunkConfig, ChunkUnit};
use crate::types::ChunkCandidate;
use docrag_core::AppResult;

/// Start position of a unit as (character offset, byte offset).
type Boundary = (usize, usize);

/// Chunk text into overlapping windows.
///
/// Fails only on an invalid configuration. Empty text yields no chunks; text
/// no longer than one window yields exactly one chunk.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> AppResult<Vec<ChunkCandidate>> {
    config.validate()?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    let boundaries = unit_boundaries(text, config.unit);
    // The last boundary is the end of the text, not the start of a unit.
    let unit_count = boundaries.len() - 1;
    let step = config.step();

    let mut chunks = Vec::with_capacity(unit_count / step + 1);
    let mut start = 0usize;
    let mut ordinal = 0u32;

    loop {
        let end = (start + config.chunk_size).min(unit_count);
        let (start_char, start_byte) = boundaries[start];
        let (end_char, end_byte) = boundaries[end];

        chunks.push(ChunkCandidate {
            ordinal,
            text: text[start_byte..end_byte].to_string(),
            start: start_char,
            end: end_char,
            byte_range: (start_byte, end_byte),
        });

        if end == unit_count {
            break;
        }

        ordinal += 1;
        start += step;
    }

    tracing::debug!(
        "Chunked {} bytes into {} chunks (size: {}, overlap: {}, unit: {:?})",
        text.len(),
        chunks.len(),
        config.chunk_size,
        config.overlap,
        config.unit
    );

    Ok(chunks)
}

/// Unit start positions followed by the end-of-text position.
fn unit_boundaries(text: &str, unit: ChunkUnit) -> Vec<Boundary> {
    let mut boundaries = Vec::new();
    let mut char_count = 0usize;

    match unit {
        ChunkUnit::Characters => {
            for (byte_idx, _) in text.char_indices() {
                boundaries.push((char_count, byte_idx));
                char_count += 1;
            }
        }
        ChunkUnit::Words => {
            // A word unit runs from its first character up to the next word,
            // taking its trailing whitespace with it. The first unit also
            // owns any leading whitespace.
            boundaries.push((0, 0));
            let mut prev_is_space = true;
            let mut seen_word = false;
            for (byte_idx, c) in text.char_indices() {
                let is_space = c.is_whitespace();
                if prev_is_space && !is_space {
                    if seen_word {
                        boundaries.push((char_count, byte_idx));
                    }
                    seen_word = true;
                }
                prev_is_space = is_space;
                char_count += 1;
            }
        }
    }

    boundaries.push((char_count, text.len()));
    boundaries
}
