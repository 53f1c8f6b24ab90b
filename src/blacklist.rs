//! Immutable set of blacklisted host-name fragments.
//!
//! Loaded once at startup from a newline-delimited text file. Matching is a
//! literal byte-substring search over the first payload bytes of a CONNECT
//! tunnel; the pattern count and buffer size are both small enough that a
//! naive per-pattern scan dominates neither CPU nor latency for this
//! workload.

use std::path::Path;

use crate::error::{ProxyError, Result};

/// A loaded set of blacklist patterns.
pub struct Blacklist {
    patterns: Vec<Vec<u8>>,
}

impl Blacklist {
    /// Loads patterns from `path`, one per line, trailing whitespace
    /// stripped, blank lines skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] if `path` cannot be read.
    pub async fn load(path: &Path) -> Result<Blacklist> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ProxyError::Config(format!("blacklist file {}: {e}", path.display()))
        })?;

        let patterns = contents
            .lines()
            .map(|line| line.trim_end())
            .filter(|line| !line.is_empty())
            .map(|line| line.as_bytes().to_vec())
            .collect();

        Ok(Blacklist { patterns })
    }

    /// An empty blacklist that never matches. Used with `--no-blacklist`,
    /// where fragmentation is forced regardless of content.
    pub fn empty() -> Blacklist {
        Blacklist { patterns: Vec::new() }
    }

    /// Returns true iff any loaded pattern occurs as a contiguous substring
    /// of `buf`.
    pub fn contains_any(&self, buf: &[u8]) -> bool {
        self.patterns.iter().any(|pattern| contains(buf, pattern))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return needle.is_empty();
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}
