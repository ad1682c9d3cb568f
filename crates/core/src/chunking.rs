use crate::error::IngestError;

/// Separator hierarchy, highest priority first. Pieces still exceeding the
/// chunk size after the last separator are split at character boundaries.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

impl ChunkingConfig {
    fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Last `count` characters of `text` as a subslice.
fn suffix_chars(text: &str, count: usize) -> &str {
    let total = char_len(text);
    if count >= total {
        return text;
    }
    match text.char_indices().nth(total - count) {
        Some((byte_index, _)) => &text[byte_index..],
        None => text,
    }
}

/// Split `text` into pieces no longer than `chunk_size`, preferring the
/// highest-priority separator that applies. Separators stay attached to the
/// preceding piece, so concatenating the pieces reproduces `text` exactly.
fn split_pieces(text: &str, level: usize, config: &ChunkingConfig) -> Vec<String> {
    if char_len(text) <= config.chunk_size {
        return vec![text.to_string()];
    }

    if level >= SEPARATORS.len() {
        // Character-boundary fallback. Pieces are sized so a full overlap
        // seed plus one piece still fits in a chunk.
        let size = config.chunk_size.saturating_sub(config.chunk_overlap).max(1);
        let chars: Vec<char> = text.chars().collect();
        return chars
            .chunks(size)
            .map(|window| window.iter().collect())
            .collect();
    }

    let separator = SEPARATORS[level];
    if !text.contains(separator) {
        return split_pieces(text, level + 1, config);
    }

    let mut pieces = Vec::new();
    for part in text.split_inclusive(separator) {
        if char_len(part) <= config.chunk_size {
            pieces.push(part.to_string());
        } else {
            pieces.extend(split_pieces(part, level + 1, config));
        }
    }
    pieces
}

/// Greedily merge pieces into chunks of at most `chunk_size` characters.
/// Each chunk after the first is seeded with the last `chunk_overlap`
/// characters of its predecessor; the seed shrinks only when the incoming
/// piece would otherwise push the chunk past `chunk_size`.
fn merge_with_overlap(pieces: Vec<String>, config: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    let mut seeded_len = 0usize;

    for piece in pieces {
        let piece_len = char_len(&piece);

        if current_len + piece_len > config.chunk_size && current_len > seeded_len {
            chunks.push(current.clone());

            let mut tail_len = config.chunk_overlap.min(current_len);
            if tail_len + piece_len > config.chunk_size {
                tail_len = config.chunk_size.saturating_sub(piece_len);
            }
            current = suffix_chars(&current, tail_len).to_string();
            current_len = tail_len;
            seeded_len = tail_len;
        }

        current.push_str(&piece);
        current_len += piece_len;
    }

    // Never emit a chunk that is nothing but its overlap seed.
    if current_len > seeded_len {
        chunks.push(current);
    }

    chunks
}

/// Split `text` into overlapping chunks. Every chunk is at most
/// `chunk_size` characters; adjacent chunks share `chunk_overlap`
/// characters; stripping each seed reconstructs `text` exactly.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    let pieces = split_pieces(text, 0, &config);
    Ok(merge_with_overlap(pieces, &config))
}
