
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extractor::PageText;

/// Separators tried in order when a span is too long to stand on its own
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A bounded span of document text, the unit of embedding and retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// The chunk text
    pub content: String,
    /// Name of the document the chunk came from
    pub source: String,
    /// 1-based page number, when known
    pub page: Option<u32>,
    /// Position of this chunk within the document
    pub chunk_index: usize,
}

/// Provenance attached to every chunk produced from one span of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMetadata {
    pub source: String,
    pub page: Option<u32>,
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    /// How far the overlap may be stretched backwards to start on a word
    fn slack(&self) -> usize {
        self.chunk_overlap / 4
    }

    /// Largest piece that still fits after a carried overlap
    fn max_piece(&self) -> usize {
        self.chunk_size
            .saturating_sub(self.chunk_overlap + self.slack())
            .max(1)
    }
}

/// Split one span of text into overlapping chunks.
///
/// Every chunk holds at most `chunk_size` characters, and each chunk after the
/// first starts with at least `chunk_overlap` characters copied from the end of
/// its predecessor. Chunk indices start at zero.
#[inline]
pub fn split_text(
    text: &str,
    metadata: &SourceMetadata,
    config: &ChunkingConfig,
) -> Vec<DocumentChunk> {
    let mut chunk_index = 0;
    split_into(text, metadata, config, &mut chunk_index)
}

/// Chunk every page of a document, numbering chunks across the whole document
#[inline]
pub fn split_pages(source: &str, pages: &[PageText], config: &ChunkingConfig) -> Vec<DocumentChunk> {
    let mut chunk_index = 0;
    let mut chunks = Vec::new();

    for page in pages {
        let metadata = SourceMetadata {
            source: source.to_string(),
            page: Some(page.number),
        };
        chunks.extend(split_into(&page.text, &metadata, config, &mut chunk_index));
    }

    debug!(
        "Chunked '{}' ({} pages) into {} chunks (avg {} chars)",
        source,
        pages.len(),
        chunks.len(),
        chunks
            .iter()
            .map(|c| c.content.chars().count())
            .sum::<usize>()
            / chunks.len().max(1)
    );

    chunks
}

fn split_into(
    text: &str,
    metadata: &SourceMetadata,
    config: &ChunkingConfig,
    chunk_index: &mut usize,
) -> Vec<DocumentChunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    decompose(text, &SEPARATORS, config.max_piece(), &mut pieces);

    merge_pieces(&pieces, config)
        .into_iter()
        .map(|content| {
            let chunk = DocumentChunk {
                content,
                source: metadata.source.clone(),
                page: metadata.page,
                chunk_index: *chunk_index,
            };
            *chunk_index += 1;
            chunk
        })
        .collect()
}

/// Break `text` into pieces of at most `max_piece` characters, preferring the
/// coarsest separator present. Concatenating the pieces reproduces `text`.
fn decompose<'a>(text: &'a str, separators: &[&str], max_piece: usize, out: &mut Vec<&'a str>) {
    if char_len(text) <= max_piece {
        out.push(text);
        return;
    }

    let Some(position) = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
    else {
        out.extend(char_windows(text, max_piece));
        return;
    };

    let separator = separators[position];
    if separator.is_empty() {
        out.extend(char_windows(text, max_piece));
        return;
    }

    let finer = &separators[position + 1..];
    for piece in split_keep_separator(text, separator) {
        if char_len(piece) <= max_piece {
            out.push(piece);
        } else {
            decompose(piece, finer, max_piece, out);
        }
    }
}

/// Split on `separator`, keeping it at the start of the following piece
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
            start = idx;
        }
    }
    pieces.push(&text[start..]);

    pieces
}

/// Fixed-width character windows, the last resort for unbroken text
fn char_windows(text: &str, width: usize) -> Vec<&str> {
    let mut windows = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == width {
            windows.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        windows.push(&text[start..]);
    }

    windows
}

/// Greedily pack pieces into windows of at most `chunk_size` characters,
/// seeding each new window with the tail of the previous one
fn merge_pieces(pieces: &[&str], config: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in pieces {
        let piece_len = char_len(piece);

        // The tail plus any single piece always fits, so a window is only ever
        // flushed once it holds something beyond the carried overlap.
        if current_len > 0 && current_len + piece_len > config.chunk_size {
            let tail = overlap_tail(&current, config.chunk_overlap, config.slack()).to_string();
            chunks.push(std::mem::replace(&mut current, tail));
            current_len = char_len(&current);
        }

        current.push_str(piece);
        current_len += piece_len;
    }

    if current_len > 0 {
        chunks.push(current);
    }

    chunks.retain(|chunk| !chunk.trim().is_empty());
    chunks
}

/// The last `overlap` characters of `chunk`, stretched back by up to `slack`
/// characters so the tail starts right after whitespace when possible
fn overlap_tail(chunk: &str, overlap: usize, slack: usize) -> &str {
    if overlap == 0 {
        return "";
    }

    let chars: Vec<(usize, char)> = chunk.char_indices().collect();
    let len = chars.len();
    if len <= overlap {
        return chunk;
    }

    let cut = len - overlap;
    let floor = cut.saturating_sub(slack + 1);
    let start = (floor..cut)
        .rev()
        .find(|&pos| chars[pos].1.is_whitespace())
        .map_or(cut, |pos| pos + 1);

    &chunk[chars[start].0..]
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
