//! Character-window text splitter.
//!
//! Splits resource text into [`TextChunk`]s of at most `chunk_size`
//! characters, with `chunk_overlap` characters shared between neighbours.
//! Where possible a window ends on a paragraph break (`\n\n`), then a line
//! break, then any whitespace, as long as that keeps the window at least
//! half full; otherwise it is cut hard at `chunk_size`.
//!
//! Boundaries depend only on the text and the two parameters, so a
//! re-run over unchanged content produces identical chunks.

/// One window of a resource's text.
///
/// `start`/`end` are character offsets of the raw window in the source
/// text; `text` is the window with surrounding whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Split text into overlapping character windows.
///
/// Whitespace-only windows are skipped; indices stay contiguous from 0.
/// An overlap of `chunk_size` or more is clamped to `chunk_size - 1`.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<TextChunk> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let overlap = chunk_overlap.min(chunk_size - 1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < n {
        let hard_end = (start + chunk_size).min(n);
        let end = if hard_end < n {
            find_break(&chars, start, hard_end, chunk_size)
        } else {
            n
        };

        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(TextChunk {
                index: chunks.len(),
                start,
                end,
                text: trimmed.to_string(),
            });
        }

        if end >= n {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

/// Pick the window end in `(start + chunk_size / 2, hard_end]`, preferring
/// paragraph, then line, then word boundaries.
fn find_break(chars: &[char], start: usize, hard_end: usize, chunk_size: usize) -> usize {
    let floor = start + chunk_size / 2;
    let candidates = || (floor + 1..=hard_end).rev();

    candidates()
        .find(|&p| p >= start + 2 && chars[p - 1] == '\n' && chars[p - 2] == '\n')
        .or_else(|| candidates().find(|&p| chars[p - 1] == '\n'))
        .or_else(|| candidates().find(|&p| chars[p - 1].is_whitespace()))
        .unwrap_or(hard_end)
}
