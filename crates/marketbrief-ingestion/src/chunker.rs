//! Word-window chunker and chunk validity filter.
//!
//! Text is split on whitespace into tokens. Windows of `chunk_size` tokens
//! start at 0 and advance by `chunk_size - overlap`; the last window may be
//! shorter and ends the sequence.

use marketbrief_common::ConfigError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 300;
pub const DEFAULT_OVERLAP: usize = 50;

/// One window of the token sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkWindow {
    pub index: usize,
    pub token_start: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunking {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

/// Split `text` into overlapping word windows.
pub fn chunk_words(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<ChunkWindow>, ConfigError> {
    ChunkerConfig { chunk_size, overlap }.validate()?;

    let words: Vec<&str> = text.split_whitespace().collect();
    let mut windows = Vec::new();
    if words.is_empty() {
        return Ok(windows);
    }

    let step = chunk_size - overlap;
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(words.len());
        windows.push(ChunkWindow {
            index: windows.len(),
            token_start: start,
            text: words[start..end].join(" "),
        });
        if end == words.len() {
            break;
        }
        start += step;
    }
    Ok(windows)
}

/// Rejects chunks that carry no retrievable content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFilter {
    /// Minimum length in characters.
    pub min_chars: usize,
    /// Maximum share of decimal digits among non-whitespace characters.
    pub max_digit_ratio: f32,
    /// Phrases (matched case-insensitively) that mark legal boilerplate.
    pub boilerplate: Vec<String>,
}

impl Default for ChunkFilter {
    fn default() -> Self {
        Self {
            min_chars: 30,
            max_digit_ratio: 0.5,
            boilerplate: default_boilerplate(),
        }
    }
}

pub fn default_boilerplate() -> Vec<String> {
    [
        "all rights reserved",
        "compliance notice",
        "for information purposes only",
        "unauthorized reproduction",
        "무단 복제",
        "무단전재",
        "무단 전재",
        "투자판단의 최종 책임",
        "법적 책임소재의 증빙자료",
        "당사는 본 자료",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl ChunkFilter {
    pub fn accepts(&self, text: &str) -> bool {
        if text.chars().count() < self.min_chars {
            return false;
        }

        let mut visible = 0usize;
        let mut digits = 0usize;
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            visible += 1;
            if c.is_numeric() {
                digits += 1;
            }
        }
        if visible == 0 || digits as f32 / visible as f32 > self.max_digit_ratio {
            return false;
        }

        let lower = text.to_lowercase();
        !self
            .boilerplate
            .iter()
            .any(|phrase| !phrase.is_empty() && lower.contains(&phrase.to_lowercase()))
    }

    /// Keep accepted windows, renumbered densely in traversal order.
    /// Returns the survivors and the number rejected.
    pub fn select(&self, windows: Vec<ChunkWindow>) -> (Vec<ChunkWindow>, usize) {
        let total = windows.len();
        let kept: Vec<ChunkWindow> = windows
            .into_iter()
            .filter(|w| {
                let ok = self.accepts(&w.text);
                if !ok {
                    tracing::debug!(token_start = w.token_start, "chunk rejected by filter");
                }
                ok
            })
            .enumerate()
            .map(|(index, w)| ChunkWindow { index, ..w })
            .collect();
        let rejected = total - kept.len();
        (kept, rejected)
    }
}
