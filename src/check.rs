//! Read-only coverage audit of existing outputs.
//!
//! For each caption file, scores any existing prose output and prints the
//! decision a convert run would take. Makes no provider calls and writes
//! nothing.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;
use crate::convert::{load_fragments, output_path_for, scan_caption_files};
use crate::normalize::Normalizer;
use crate::resume::{should_process, ResumeDecision};

pub fn run_check(config: &Config, srt_dir: &Path, out_dir: &Path) -> Result<()> {
    if !srt_dir.is_dir() {
        bail!("Input directory does not exist: {}", srt_dir.display());
    }

    let normalizer = Normalizer::new(&config.normalize);
    let files = scan_caption_files(srt_dir, &config.convert.include_globs)?;

    println!("{:<40} {:>10} {:>10}  DECISION", "FILE", "FRAGMENTS", "COVERAGE");

    let mut satisfied = 0usize;
    let mut pending = 0usize;
    let mut unreadable = 0usize;

    for input_path in &files {
        let name = input_path
            .strip_prefix(srt_dir)
            .unwrap_or(input_path)
            .to_string_lossy()
            .to_string();

        let fragments = match load_fragments(input_path) {
            Ok(fragments) => fragments,
            Err(_) => {
                println!("{:<40} {:>10} {:>10}  UNPARSEABLE", name, "-", "-");
                unreadable += 1;
                continue;
            }
        };

        let output_path = output_path_for(srt_dir, out_dir, input_path);
        match should_process(
            &normalizer,
            &fragments,
            &output_path,
            config.convert.coverage_threshold,
        ) {
            ResumeDecision::Skip { coverage } => {
                println!(
                    "{:<40} {:>10} {:>9.2}  SKIP",
                    name,
                    fragments.len(),
                    coverage
                );
                satisfied += 1;
            }
            ResumeDecision::Regenerate { prior_coverage } => {
                let shown = prior_coverage
                    .map(|c| format!("{:.2}", c))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<40} {:>10} {:>10}  REGENERATE",
                    name,
                    fragments.len(),
                    shown
                );
                pending += 1;
            }
        }
    }

    println!();
    println!("check {}", srt_dir.display());
    println!("  files: {}", files.len());
    println!("  satisfied: {}", satisfied);
    println!("  pending: {}", pending);
    println!("  unparseable: {}", unreadable);

    Ok(())
}
