//! Structural coverage metric.
//!
//! Coverage is the fraction of fragments whose normalized text appears
//! verbatim (as a substring) inside the normalized comparison text. It is
//! the acceptance gate for rewrite attempts and the resume check for
//! existing outputs. Order of fragments does not matter; each fragment is
//! tested independently.

use crate::normalize::Normalizer;

/// Fraction of `fragments` structurally preserved in `text`, in [0, 1].
///
/// Returns `None` for an empty fragment list; callers must guard.
/// Extending `text` can only gain substring matches, so the score is
/// monotonically non-decreasing under concatenation.
pub fn coverage(normalizer: &Normalizer, fragments: &[String], text: &str) -> Option<f64> {
    if fragments.is_empty() {
        return None;
    }

    let haystack = normalizer.apply(text);
    let hits = fragments
        .iter()
        .filter(|fragment| haystack.contains(&normalizer.apply(fragment)))
        .count();

    Some(hits as f64 / fragments.len() as f64)
}
