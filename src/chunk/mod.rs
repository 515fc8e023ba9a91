//! Deterministic text chunking
//!
//! Chunking runs on whitespace-normalized text so that formatting-only edits
//! upstream do not change chunk boundaries, point ids, or stored vectors.

use crate::config::ChunkConfig;

/// Collapse all whitespace runs to single spaces and trim
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split normalized text into overlapping windows of at most `max_chars`
/// characters. Boundaries are measured in chars, not bytes, so multi-byte
/// input never splits inside a code point.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() <= config.max_chars {
        return vec![normalized];
    }

    let step = config.max_chars.saturating_sub(config.overlap_chars).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}
