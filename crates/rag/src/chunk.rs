use crate::error::{Error, Result};

/// What a chunk size is counted in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChunkUnit {
    /// Whitespace separated words, re-joined with single spaces.
    #[default]
    Words,
    /// Unicode scalar values, whitespace kept as is.
    Chars,
}

/// Sliding window chunking settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkConfig {
    /// Units per chunk.
    pub size: usize,
    /// Units shared by two consecutive chunks.
    pub overlap: usize,
    /// Unit of `size` and `overlap`.
    pub unit: ChunkUnit,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 300,
            overlap: 50,
            unit: ChunkUnit::Words,
        }
    }
}

impl ChunkConfig {
    /// Word based chunks of `size` words.
    pub fn words(size: usize, overlap: usize) -> Result<Self> {
        Self {
            size,
            overlap,
            unit: ChunkUnit::Words,
        }
        .validated()
    }

    /// Character based chunks of `size` characters.
    pub fn chars(size: usize, overlap: usize) -> Result<Self> {
        Self {
            size,
            overlap,
            unit: ChunkUnit::Chars,
        }
        .validated()
    }

    /// Checks that the window always moves forward.
    pub fn validated(self) -> Result<Self> {
        if self.size == 0 || self.overlap >= self.size {
            return Err(Error::InvalidChunkConfig {
                size: self.size,
                overlap: self.overlap,
            });
        }
        Ok(self)
    }

    #[inline]
    fn step(&self) -> usize {
        self.size - self.overlap
    }
}

/// Splits `text` into overlapping chunks.
///
/// Windows start every `size - overlap` units and the last window ends
/// at the end of the text, so no chunk is fully contained in the
/// previous one.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Result<Vec<String>> {
    let config = config.validated()?;
    let chunks = match config.unit {
        ChunkUnit::Words => {
            let words: Vec<&str> = text.split_whitespace().collect();
            windows(words.len(), &config)
                .map(|(start, end)| words[start..end].join(" "))
                .collect()
        }
        ChunkUnit::Chars => {
            let chars: Vec<char> = text.chars().collect();
            if text.trim().is_empty() {
                Vec::new()
            } else {
                windows(chars.len(), &config)
                    .map(|(start, end)| chars[start..end].iter().collect())
                    .collect()
            }
        }
    };
    Ok(chunks)
}

fn windows(len: usize, config: &ChunkConfig) -> impl Iterator<Item = (usize, usize)> {
    let size = config.size;
    let step = config.step();
    let mut start = 0;
    let mut done = len == 0;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let end = (start + size).min(len);
        let window = (start, end);
        done = end >= len;
        start += step;
        Some(window)
    })
}
