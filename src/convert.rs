//! Conversion pipeline orchestration.
//!
//! Drives the full per-directory flow: scan caption files → parse →
//! resume decision → chunk → coverage-gated rewrite → incremental output.
//! Files are processed sequentially in sorted order; one rewrite call is
//! in flight at a time.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::artifact::ProseArtifact;
use crate::captions;
use crate::chunk::{batch_count, batches};
use crate::config::Config;
use crate::normalize::Normalizer;
use crate::press::{press_batch, BatchOutcome, PressSettings};
use crate::progress::{ConvertProgressEvent, ConvertProgressReporter};
use crate::resume::{should_process, ResumeDecision};
use crate::rewrite::{self, RewriteProvider};

/// Flags from the CLI that modify one run.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Ignore existing outputs and reconvert every file from scratch.
    pub full: bool,
    /// Show file and batch counts without calling the rewrite provider.
    pub dry_run: bool,
    /// Maximum number of caption files to process.
    pub limit: Option<usize>,
}

/// Aggregate counts for a whole run, across all files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertStats {
    pub files_found: u64,
    pub converted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub fragments_total: u64,
    pub batches_total: u64,
    /// Rewrite attempts beyond the first, summed over accepted batches.
    pub attempts_retried: u64,
    pub batches_exhausted: u64,
}

/// Policy for a batch whose rewrite attempts are exhausted.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ExhaustedPolicy {
    /// Stop converting this file, keep what was accepted so far, move on.
    AbortFile,
    /// Leave a gap for this batch and continue with the rest of the file.
    SkipBatch,
}

impl ExhaustedPolicy {
    fn from_config(value: &str) -> Result<Self> {
        match value {
            "abort-file" => Ok(Self::AbortFile),
            "skip-batch" => Ok(Self::SkipBatch),
            other => bail!("Unknown on_exhausted policy: {}", other),
        }
    }
}

/// Convert every caption file under `srt_dir` into a prose file under
/// `out_dir`, resuming past work where possible. Returns run totals.
pub async fn run_convert(
    config: &Config,
    srt_dir: &Path,
    out_dir: &Path,
    opts: &ConvertOptions,
    progress: &dyn ConvertProgressReporter,
) -> Result<ConvertStats> {
    if !srt_dir.exists() {
        bail!("Input directory does not exist: {}", srt_dir.display());
    }
    if !srt_dir.is_dir() {
        bail!("Input path is not a directory: {}", srt_dir.display());
    }

    let mut files = scan_caption_files(srt_dir, &config.convert.include_globs)?;
    if let Some(limit) = opts.limit {
        files.truncate(limit);
    }

    let mut stats = ConvertStats {
        files_found: files.len() as u64,
        ..ConvertStats::default()
    };

    if opts.dry_run {
        return dry_run_report(config, srt_dir, &files, stats);
    }

    if !config.rewrite.is_enabled() {
        bail!("Rewrite provider is disabled. Set [rewrite] provider in config.");
    }

    // One provider for the whole run, passed down to every batch.
    let provider = rewrite::create_provider(&config.rewrite)?;

    convert_files(
        config,
        provider.as_ref(),
        srt_dir,
        out_dir,
        &files,
        opts,
        progress,
        &mut stats,
    )
    .await?;

    print_summary(srt_dir, &stats, config.rewrite.is_enabled());
    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
async fn convert_files(
    config: &Config,
    provider: &dyn RewriteProvider,
    srt_dir: &Path,
    out_dir: &Path,
    files: &[PathBuf],
    opts: &ConvertOptions,
    progress: &dyn ConvertProgressReporter,
    stats: &mut ConvertStats,
) -> Result<()> {
    let policy = ExhaustedPolicy::from_config(&config.convert.on_exhausted)?;
    let normalizer = Normalizer::new(&config.normalize);

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    for input_path in files {
        let display_name = relative_name(srt_dir, input_path);
        let output_path = output_path_for(srt_dir, out_dir, input_path);

        let fragments = match load_fragments(input_path) {
            Ok(fragments) => fragments,
            Err(e) => {
                eprintln!("Warning: skipping {}: {:#}", display_name, e);
                stats.failed += 1;
                if config.convert.fail_fast {
                    bail!("Aborting run (fail_fast): {} could not be parsed", display_name);
                }
                continue;
            }
        };

        if !opts.full {
            if let ResumeDecision::Skip { coverage } = should_process(
                &normalizer,
                &fragments,
                &output_path,
                config.convert.coverage_threshold,
            ) {
                progress.report(ConvertProgressEvent::FileSkipped {
                    file: display_name.clone(),
                    coverage,
                });
                stats.skipped += 1;
                continue;
            }
        }

        let total_batches = batch_count(&fragments, config.convert.context_len) as u64;
        progress.report(ConvertProgressEvent::FileStarted {
            file: display_name.clone(),
            fragments: fragments.len() as u64,
            batches: total_batches,
        });

        let settings = PressSettings {
            coverage_threshold: config.convert.coverage_threshold,
            max_attempts: config.convert.max_attempts,
        };

        let mut artifact = ProseArtifact::create(&output_path)?;
        let mut file_aborted = false;
        let mut done_batches = 0u64;

        for batch in batches(&fragments, config.convert.context_len) {
            let outcome = press_batch(provider, settings, &normalizer, &batch, &mut artifact)
                .await
                .with_context(|| format!("Rewrite failed for {}", display_name))?;

            stats.batches_total += 1;
            done_batches += 1;
            progress.report(ConvertProgressEvent::BatchFinished {
                file: display_name.clone(),
                n: done_batches,
                total: total_batches,
            });

            match outcome {
                BatchOutcome::Accepted { attempts, .. } => {
                    stats.attempts_retried += u64::from(attempts - 1);
                }
                BatchOutcome::Exhausted {
                    attempts,
                    best_coverage,
                } => {
                    stats.batches_exhausted += 1;
                    eprintln!(
                        "Warning: {} batch {}/{} exhausted {} attempts (best coverage {:.2})",
                        display_name, done_batches, total_batches, attempts, best_coverage
                    );
                    match policy {
                        ExhaustedPolicy::AbortFile => {
                            file_aborted = true;
                            break;
                        }
                        ExhaustedPolicy::SkipBatch => continue,
                    }
                }
            }
        }

        if file_aborted {
            // Accepted batches stay on disk; the next run's resume check
            // will score the partial output and regenerate.
            stats.failed += 1;
            if config.convert.fail_fast {
                bail!(
                    "Aborting run (fail_fast): {} exhausted rewrite attempts",
                    display_name
                );
            }
            continue;
        }

        stats.converted += 1;
        stats.fragments_total += fragments.len() as u64;
    }

    Ok(())
}

pub(crate) fn load_fragments(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cues = captions::parse_srt(&content)?;
    let fragments = captions::fragments(&cues);
    if fragments.is_empty() {
        bail!("No caption text found");
    }
    Ok(fragments)
}

/// Collect caption files matching the include globs, sorted by relative
/// path so runs are deterministic.
pub fn scan_caption_files(root: &Path, include_globs: &[String]) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(include_globs)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !include_set.is_match(relative.to_string_lossy().as_ref()) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Output file for one input: same relative path, `.md` extension.
pub fn output_path_for(srt_dir: &Path, out_dir: &Path, input: &Path) -> PathBuf {
    let relative = input.strip_prefix(srt_dir).unwrap_or(input);
    out_dir.join(relative).with_extension("md")
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

fn dry_run_report(
    config: &Config,
    srt_dir: &Path,
    files: &[PathBuf],
    mut stats: ConvertStats,
) -> Result<ConvertStats> {
    println!("convert {} (dry-run)", srt_dir.display());
    println!("  files found: {}", files.len());

    for path in files {
        match load_fragments(path) {
            Ok(fragments) => {
                stats.fragments_total += fragments.len() as u64;
                stats.batches_total += batch_count(&fragments, config.convert.context_len) as u64;
            }
            Err(_) => stats.failed += 1,
        }
    }

    println!("  fragments: {}", stats.fragments_total);
    println!("  estimated batches: {}", stats.batches_total);
    if stats.failed > 0 {
        println!("  unparseable files: {}", stats.failed);
    }
    Ok(stats)
}

fn print_summary(srt_dir: &Path, stats: &ConvertStats, provider_enabled: bool) {
    println!("convert {}", srt_dir.display());
    println!("  files found: {}", stats.files_found);
    println!("  converted: {}", stats.converted);
    println!("  skipped: {}", stats.skipped);
    println!("  failed: {}", stats.failed);
    println!("  fragments: {}", stats.fragments_total);
    println!("  batches: {}", stats.batches_total);
    if provider_enabled {
        println!("  extra attempts: {}", stats.attempts_retried);
        println!("  exhausted batches: {}", stats.batches_exhausted);
    }
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use tempfile::TempDir;

    const GOOD_SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\n今天\n\n2\n00:00:02,000 --> 00:00:03,000\n天气\n\n3\n00:00:03,000 --> 00:00:04,000\n很好\n";

    fn passthrough_config() -> Config {
        let mut config = Config::default();
        config.rewrite.provider = "passthrough".to_string();
        config
    }

    fn write_srt(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[tokio::test]
    async fn missing_input_dir_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let result = run_convert(
            &passthrough_config(),
            &tmp.path().join("nope"),
            tmp.path(),
            &ConvertOptions::default(),
            &NoProgress,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn converts_directory_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let srt_dir = tmp.path().join("subs");
        let out_dir = tmp.path().join("out");
        std::fs::create_dir_all(&srt_dir).unwrap();
        write_srt(&srt_dir, "ep01.srt", GOOD_SRT);
        write_srt(&srt_dir, "ep02.srt", GOOD_SRT);

        let stats = run_convert(
            &passthrough_config(),
            &srt_dir,
            &out_dir,
            &ConvertOptions::default(),
            &NoProgress,
        )
        .await
        .unwrap();

        assert_eq!(stats.converted, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.fragments_total, 6);
        assert_eq!(
            std::fs::read_to_string(out_dir.join("ep01.md")).unwrap(),
            "今天天气很好"
        );
    }

    #[tokio::test]
    async fn second_run_skips_satisfied_files() {
        let tmp = TempDir::new().unwrap();
        let srt_dir = tmp.path().join("subs");
        let out_dir = tmp.path().join("out");
        std::fs::create_dir_all(&srt_dir).unwrap();
        write_srt(&srt_dir, "ep01.srt", GOOD_SRT);

        let config = passthrough_config();
        let first = run_convert(&config, &srt_dir, &out_dir, &ConvertOptions::default(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(first.converted, 1);

        let second =
            run_convert(&config, &srt_dir, &out_dir, &ConvertOptions::default(), &NoProgress)
                .await
                .unwrap();
        assert_eq!(second.converted, 0);
        assert_eq!(second.skipped, 1);
    }

    #[tokio::test]
    async fn full_flag_reconverts_everything() {
        let tmp = TempDir::new().unwrap();
        let srt_dir = tmp.path().join("subs");
        let out_dir = tmp.path().join("out");
        std::fs::create_dir_all(&srt_dir).unwrap();
        write_srt(&srt_dir, "ep01.srt", GOOD_SRT);

        let config = passthrough_config();
        run_convert(&config, &srt_dir, &out_dir, &ConvertOptions::default(), &NoProgress)
            .await
            .unwrap();

        let opts = ConvertOptions {
            full: true,
            ..ConvertOptions::default()
        };
        let stats = run_convert(&config, &srt_dir, &out_dir, &opts, &NoProgress)
            .await
            .unwrap();
        assert_eq!(stats.converted, 1);
        assert_eq!(stats.skipped, 0);
    }

    #[tokio::test]
    async fn malformed_file_does_not_poison_the_run() {
        let tmp = TempDir::new().unwrap();
        let srt_dir = tmp.path().join("subs");
        let out_dir = tmp.path().join("out");
        std::fs::create_dir_all(&srt_dir).unwrap();
        write_srt(&srt_dir, "bad.srt", "this is not an srt file");
        write_srt(&srt_dir, "good.srt", GOOD_SRT);

        // Default policy: malformed files fail individually, run continues.
        let stats = run_convert(
            &passthrough_config(),
            &srt_dir,
            &out_dir,
            &ConvertOptions::default(),
            &NoProgress,
        )
        .await
        .unwrap();

        assert_eq!(stats.converted, 1);
        assert_eq!(stats.failed, 1);
        assert!(out_dir.join("good.md").exists());
        assert!(!out_dir.join("bad.md").exists());
    }

    #[tokio::test]
    async fn fail_fast_aborts_on_malformed_file() {
        let tmp = TempDir::new().unwrap();
        let srt_dir = tmp.path().join("subs");
        let out_dir = tmp.path().join("out");
        std::fs::create_dir_all(&srt_dir).unwrap();
        write_srt(&srt_dir, "bad.srt", "this is not an srt file");

        let mut config = passthrough_config();
        config.convert.fail_fast = true;

        let result = run_convert(
            &config,
            &srt_dir,
            &out_dir,
            &ConvertOptions::default(),
            &NoProgress,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dry_run_counts_without_writing() {
        let tmp = TempDir::new().unwrap();
        let srt_dir = tmp.path().join("subs");
        let out_dir = tmp.path().join("out");
        std::fs::create_dir_all(&srt_dir).unwrap();
        write_srt(&srt_dir, "ep01.srt", GOOD_SRT);

        // Provider stays disabled: dry-run must not need one.
        let opts = ConvertOptions {
            dry_run: true,
            ..ConvertOptions::default()
        };
        let stats = run_convert(&Config::default(), &srt_dir, &out_dir, &opts, &NoProgress)
            .await
            .unwrap();

        assert_eq!(stats.fragments_total, 3);
        assert_eq!(stats.batches_total, 1);
        assert!(!out_dir.exists());
    }

    #[tokio::test]
    async fn limit_truncates_file_list() {
        let tmp = TempDir::new().unwrap();
        let srt_dir = tmp.path().join("subs");
        let out_dir = tmp.path().join("out");
        std::fs::create_dir_all(&srt_dir).unwrap();
        write_srt(&srt_dir, "a.srt", GOOD_SRT);
        write_srt(&srt_dir, "b.srt", GOOD_SRT);
        write_srt(&srt_dir, "c.srt", GOOD_SRT);

        let opts = ConvertOptions {
            limit: Some(2),
            ..ConvertOptions::default()
        };
        let stats = run_convert(&passthrough_config(), &srt_dir, &out_dir, &opts, &NoProgress)
            .await
            .unwrap();
        assert_eq!(stats.files_found, 2);
        assert_eq!(stats.converted, 2);
        assert!(!out_dir.join("c.md").exists());
    }

    /// Provider whose output never covers the captions.
    struct UselessProvider;

    #[async_trait::async_trait]
    impl RewriteProvider for UselessProvider {
        fn name(&self) -> String {
            "useless".to_string()
        }

        async fn rewrite(&self, _text: &str) -> anyhow::Result<String> {
            Ok("完全无关的输出".to_string())
        }
    }

    async fn run_with_useless_provider(
        config: &Config,
        srt_dir: &Path,
        out_dir: &Path,
    ) -> anyhow::Result<ConvertStats> {
        let files = scan_caption_files(srt_dir, &config.convert.include_globs)?;
        let mut stats = ConvertStats {
            files_found: files.len() as u64,
            ..ConvertStats::default()
        };
        convert_files(
            config,
            &UselessProvider,
            srt_dir,
            out_dir,
            &files,
            &ConvertOptions::default(),
            &NoProgress,
            &mut stats,
        )
        .await?;
        Ok(stats)
    }

    #[tokio::test]
    async fn exhausted_batch_aborts_file_by_default() {
        let tmp = TempDir::new().unwrap();
        let srt_dir = tmp.path().join("subs");
        let out_dir = tmp.path().join("out");
        std::fs::create_dir_all(&srt_dir).unwrap();
        write_srt(&srt_dir, "ep01.srt", GOOD_SRT);
        write_srt(&srt_dir, "ep02.srt", GOOD_SRT);

        let config = passthrough_config();
        let stats = run_with_useless_provider(&config, &srt_dir, &out_dir)
            .await
            .unwrap();

        // Both files fail independently; the run itself succeeds.
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.converted, 0);
        assert_eq!(stats.batches_exhausted, 2);
        // Nothing was accepted, so the artifacts are empty.
        assert_eq!(std::fs::read_to_string(out_dir.join("ep01.md")).unwrap(), "");
    }

    #[tokio::test]
    async fn skip_batch_policy_leaves_gap_and_continues() {
        let tmp = TempDir::new().unwrap();
        let srt_dir = tmp.path().join("subs");
        let out_dir = tmp.path().join("out");
        std::fs::create_dir_all(&srt_dir).unwrap();
        write_srt(&srt_dir, "ep01.srt", GOOD_SRT);

        let mut config = passthrough_config();
        config.convert.on_exhausted = "skip-batch".to_string();

        let stats = run_with_useless_provider(&config, &srt_dir, &out_dir)
            .await
            .unwrap();

        // The file completes with a gap instead of being marked failed.
        assert_eq!(stats.converted, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.batches_exhausted, 1);
    }

    #[tokio::test]
    async fn fail_fast_aborts_run_on_exhausted_batch() {
        let tmp = TempDir::new().unwrap();
        let srt_dir = tmp.path().join("subs");
        let out_dir = tmp.path().join("out");
        std::fs::create_dir_all(&srt_dir).unwrap();
        write_srt(&srt_dir, "ep01.srt", GOOD_SRT);

        let mut config = passthrough_config();
        config.convert.fail_fast = true;

        let result = run_with_useless_provider(&config, &srt_dir, &out_dir).await;
        assert!(result.is_err());
    }

    #[test]
    fn output_paths_mirror_subdirectories() {
        let srt_dir = Path::new("/subs");
        let out_dir = Path::new("/out");
        assert_eq!(
            output_path_for(srt_dir, out_dir, Path::new("/subs/s1/ep01.srt")),
            PathBuf::from("/out/s1/ep01.md")
        );
    }

    #[test]
    fn scan_is_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.srt"), "x").unwrap();
        std::fs::write(tmp.path().join("a.srt"), "x").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        let files = scan_caption_files(tmp.path(), &["**/*.srt".to_string()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.srt", "b.srt"]);
    }
}
