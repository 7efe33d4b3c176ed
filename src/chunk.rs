//! Overlapping character-window chunker.
//!
//! Splits document text into [`Chunk`]s of at most `max_chars` characters.
//! Paragraphs (`\n\n`) are packed together while they fit; when a chunk is
//! flushed, the next one starts with up to `overlap_chars` of its trailing
//! text so retrieval keeps context that straddles a boundary. Paragraphs
//! longer than the window are cut into overlapping windows on whitespace.
//!
//! Lengths are counted in `char`s, never bytes, so multibyte text is never
//! split inside a code point.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split text into overlapping chunks with contiguous indices starting at 0.
/// Blank text yields no chunks.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    max_chars: usize,
    overlap_chars: usize,
) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let overlap_chars = overlap_chars.min(max_chars - 1);

    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_len = char_len(trimmed);

        if para_len > max_chars {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }
            pieces.extend(split_long(trimmed, max_chars, overlap_chars));
            continue;
        }

        let sep = if buf.is_empty() { 0 } else { 2 };
        if !buf.is_empty() && char_len(&buf) + sep + para_len > max_chars {
            // Shrink the carried tail so tail + separator + paragraph still fits.
            let room = max_chars.saturating_sub(para_len + 2);
            let tail = overlap_tail(&buf, overlap_chars.min(room));
            pieces.push(std::mem::replace(&mut buf, tail));
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(trimmed);
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(document_id, i as i64, piece))
        .collect()
}

/// Cut a single oversized paragraph into overlapping windows.
fn split_long(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let mut windows = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let rest = &text[start..];
        if char_len(rest) <= max_chars {
            let t = rest.trim();
            if !t.is_empty() {
                windows.push(t.to_string());
            }
            break;
        }

        let limit = byte_offset(rest, max_chars);
        let cut = rest[..limit]
            .rfind(char::is_whitespace)
            .filter(|&i| i > 0)
            .unwrap_or(limit);
        windows.push(rest[..cut].trim().to_string());

        start += overlap_start(&rest[..cut], overlap_chars);
        let remaining = &text[start..];
        start += remaining.len() - remaining.trim_start().len();
    }

    windows
}

/// Byte offset inside `s` where a word-aligned overlap of at most `n` chars
/// begins. Returns `s.len()` when no overlap is possible.
fn overlap_start(s: &str, n: usize) -> usize {
    let total = char_len(s);
    if n == 0 || total <= n {
        return s.len();
    }
    let from = byte_offset(s, total - n);
    match s[from..].find(char::is_whitespace) {
        Some(pos) => from + pos,
        None => s.len(),
    }
}

fn overlap_tail(s: &str, n: usize) -> String {
    s[overlap_start(s, n)..].trim_start().to_string()
}

fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("doc1", "", 1000, 200).is_empty());
        assert!(chunk_text("doc1", "  \n\n \t\n", 1000, 200).is_empty());
    }

    #[test]
    fn test_paragraphs_packed_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text("doc1", text, 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First paragraph."));
        assert!(chunks[0].text.contains("Third paragraph."));
    }

    #[test]
    fn test_flushed_chunk_carries_overlap() {
        let text = (0..12)
            .map(|i| format!("Paragraph number {} is here.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("doc1", &text, 60, 20);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let carried = pair[1].text.split("\n\n").next().unwrap();
            assert!(
                pair[0].text.ends_with(carried),
                "expected {:?} to end with {:?}",
                pair[0].text,
                carried
            );
        }
        for c in &chunks {
            assert!(c.text.chars().count() <= 60, "chunk too long: {:?}", c.text);
        }
    }

    #[test]
    fn test_zero_overlap_has_no_shared_text() {
        let text = "aaaa aaaa\n\nbbbb bbbb\n\ncccc cccc";
        let chunks = chunk_text("doc1", text, 12, 0);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa aaaa", "bbbb bbbb", "cccc cccc"]);
    }

    #[test]
    fn test_long_paragraph_windows_overlap() {
        let text = (0..300)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text("doc1", &text, 100, 20);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 100);
        }
        for pair in chunks.windows(2) {
            let first = pair[1].text.split_whitespace().next().unwrap();
            assert!(pair[0].text.split_whitespace().any(|w| w == first));
        }
        assert!(chunks.last().unwrap().text.ends_with("word299"));
    }

    #[test]
    fn test_unbroken_text_is_hard_split() {
        let text = "x".repeat(250);
        let chunks = chunk_text("doc1", &text, 100, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.len(), 100);
    }

    #[test]
    fn test_multibyte_text_is_not_split_mid_char() {
        let text = "héllo wörld ünïcode ".repeat(40);
        let chunks = chunk_text("doc1", &text, 50, 10);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 50);
        }
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("doc1", &text, 40, 10);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
            assert_eq!(c.document_id, "doc1");
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text("doc1", text, 12, 4);
        let c2 = chunk_text("doc1", text, 12, 4);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }
}
