//! Text normalization for coverage comparison.
//!
//! The rewriting model adds punctuation and may drop filler syllables, so
//! both sides of a coverage comparison are reduced to the same canonical
//! form first. Normalizing only one side is a correctness bug; everything
//! goes through [`Normalizer::apply`].

use std::collections::HashSet;

use crate::config::NormalizeConfig;

/// Strips the configured punctuation characters and filler syllables.
/// Pure; construct once and share.
#[derive(Debug, Clone)]
pub struct Normalizer {
    strip: HashSet<char>,
    fillers: Vec<String>,
}

impl Normalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            strip: config.strip_chars.chars().collect(),
            fillers: config
                .fillers
                .iter()
                .filter(|f| !f.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// Canonical form of `text` for substring comparison.
    pub fn apply(&self, text: &str) -> String {
        let mut out: String = text
            .chars()
            .filter(|c| !self.strip.contains(c))
            .collect();
        for filler in &self.fillers {
            if out.contains(filler.as_str()) {
                out = out.replace(filler.as_str(), "");
            }
        }
        out
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&NormalizeConfig::default())
    }
}
