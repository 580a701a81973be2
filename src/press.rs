//! Coverage-gated rewrite attempts.
//!
//! Drives up to `max_attempts` rewrite calls for one batch and accepts the
//! first candidate whose coverage clears the threshold, with no best-of-N
//! selection. Accepted text is appended to the artifact and flushed before
//! returning. Exhausting the budget is an ordinary outcome the caller must
//! handle, not an error and never a silent drop.

use anyhow::Result;

use crate::artifact::ProseArtifact;
use crate::chunk::Batch;
use crate::coverage::coverage;
use crate::normalize::Normalizer;
use crate::rewrite::RewriteProvider;

/// Result of pressing one batch through the rewrite provider.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// A candidate cleared the threshold and was written to the artifact.
    Accepted {
        attempts: u32,
        coverage: f64,
        chars_written: usize,
    },
    /// Every attempt fell short. Nothing was written for this batch; the
    /// caller chooses whether to skip the batch or abort the file.
    Exhausted { attempts: u32, best_coverage: f64 },
}

/// Attempt parameters, owned by the orchestrator's configuration.
#[derive(Debug, Clone, Copy)]
pub struct PressSettings {
    pub coverage_threshold: f64,
    pub max_attempts: u32,
}

/// Rewrite `batch` and append the first passing candidate to `artifact`.
///
/// Makes at most `max_attempts` provider calls. Transport errors from the
/// provider propagate immediately and do not consume the attempt budget;
/// they are failures of the service, not coverage shortfalls.
pub async fn press_batch(
    provider: &dyn RewriteProvider,
    settings: PressSettings,
    normalizer: &Normalizer,
    batch: &Batch<'_>,
    artifact: &mut ProseArtifact,
) -> Result<BatchOutcome> {
    debug_assert!(!batch.is_empty());

    let input = batch.concat();
    let mut best_coverage = 0.0f64;

    for attempt in 1..=settings.max_attempts {
        let candidate = provider.rewrite(&input).await?;

        // Batches are non-empty by construction, so the score is defined.
        let score = coverage(normalizer, batch.fragments, &candidate)
            .ok_or_else(|| anyhow::anyhow!("coverage undefined for empty batch"))?;

        if score < settings.coverage_threshold {
            eprintln!(
                "Warning: rewrite coverage {:.2} < {:.2} (attempt {}/{}), retrying",
                score, settings.coverage_threshold, attempt, settings.max_attempts
            );
            best_coverage = best_coverage.max(score);
            continue;
        }

        artifact.append(&candidate)?;
        return Ok(BatchOutcome::Accepted {
            attempts: attempt,
            coverage: score,
            chars_written: candidate.chars().count(),
        });
    }

    Ok(BatchOutcome::Exhausted {
        attempts: settings.max_attempts,
        best_coverage,
    })
}
