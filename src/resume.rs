//! Skip-or-regenerate decisions for prior outputs.
//!
//! Re-running a conversion over a large directory must not redo finished
//! work. Caption coverage against the whole existing output is a cheap
//! structural proxy for "this file already converted fully": above the
//! threshold the file is skipped, otherwise it is regenerated from scratch.
//! There is no incremental repair of a partially-correct output.

use std::path::Path;

use crate::artifact::read_existing;
use crate::coverage::coverage;
use crate::normalize::Normalizer;

/// What to do with one input file given its prior output, if any.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeDecision {
    /// Prior output already covers the fragments; leave it alone.
    Skip { coverage: f64 },
    /// Convert from scratch. `prior_coverage` is the score of the
    /// insufficient prior output, when one was readable.
    Regenerate { prior_coverage: Option<f64> },
}

/// Score any existing output at `output_path` against `fragments`.
///
/// Skips only when prior coverage strictly exceeds the threshold; the
/// boundary score a fresh rewrite would accept (≥) is not enough to
/// trust a leftover file. A missing or unreadable output
/// degrades to regeneration, never to a run failure. Deterministic for
/// unchanged input and output.
pub fn should_process(
    normalizer: &Normalizer,
    fragments: &[String],
    output_path: &Path,
    threshold: f64,
) -> ResumeDecision {
    let existing = match read_existing(output_path) {
        Some(content) => content,
        None => return ResumeDecision::Regenerate { prior_coverage: None },
    };

    match coverage(normalizer, fragments, &existing) {
        Some(score) if score > threshold => ResumeDecision::Skip { coverage: score },
        Some(score) => ResumeDecision::Regenerate {
            prior_coverage: Some(score),
        },
        None => ResumeDecision::Regenerate { prior_coverage: None },
    }
}
