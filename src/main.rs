//! # Caption Press CLI (`cpress`)
//!
//! The `cpress` binary converts directories of SRT caption files into
//! punctuated prose and packages the results into an EPUB.
//!
//! ## Usage
//!
//! ```bash
//! cpress --config ./cpress.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cpress convert <SRT_DIR>` | Rewrite caption files into prose, resuming past work |
//! | `cpress check <SRT_DIR>` | Report coverage of existing outputs, no rewriting |
//! | `cpress compose <MD_DIR>` | Package prose files into an EPUB |
//! | `cpress completions <shell>` | Generate shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Convert with a configured provider
//! cpress convert ./subs --out-dir ./prose --config ./cpress.toml
//!
//! # Estimate work without calling the provider
//! cpress convert ./subs --dry-run
//!
//! # Audit what a rerun would redo
//! cpress check ./subs --out-dir ./prose
//!
//! # Build the ebook
//! cpress compose ./prose --output book.epub --title "讲座合集"
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use caption_press::check;
use caption_press::compose;
use caption_press::config;
use caption_press::convert::{self, ConvertOptions};
use caption_press::progress::ProgressMode;

/// Caption Press — turn caption transcripts into punctuated prose with a
/// coverage-gated LLM rewrite pipeline.
#[derive(Parser)]
#[command(
    name = "cpress",
    about = "Caption Press — convert caption transcripts into punctuated prose",
    version,
    long_about = "Caption Press groups caption fragments into bounded-size batches, rewrites \
    each batch with an external text-generation service, validates that the rewrite still \
    contains the original content, and writes accepted text incrementally so interrupted \
    runs resume without duplicating work."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./cpress.toml`. Provider, threshold, chunking, and
    /// normalization settings are read from this file; a missing file
    /// falls back to built-in defaults.
    #[arg(long, global = true, default_value = "./cpress.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Convert a directory of caption files into prose files.
    ///
    /// Files whose existing output already covers the captions are
    /// skipped; the rest are regenerated from scratch. Accepted batches
    /// are flushed immediately, so interrupting and re-running is safe.
    Convert {
        /// Directory containing `.srt` caption files.
        srt_dir: PathBuf,

        /// Directory for prose output files (default: same as SRT_DIR).
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Ignore existing outputs and reconvert every file.
        #[arg(long)]
        full: bool,

        /// Show file and batch counts without calling the provider.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of caption files to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum coverage to accept a rewrite (overrides config).
        #[arg(long)]
        coverage_threshold: Option<f64>,

        /// Batch size threshold in characters (overrides config).
        #[arg(long)]
        context_len: Option<usize>,

        /// Rewrite attempts per batch (overrides config).
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Progress output: auto (TTY-detected), off, human, or json.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Report coverage of existing outputs without rewriting anything.
    ///
    /// Shows, per caption file, the coverage of any existing prose file
    /// and whether a convert run would skip or regenerate it.
    Check {
        /// Directory containing `.srt` caption files.
        srt_dir: PathBuf,

        /// Directory holding prose outputs (default: same as SRT_DIR).
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Package converted prose files into an EPUB.
    ///
    /// Chapters are ordered by filename; a shared filename prefix is
    /// clipped from chapter titles.
    Compose {
        /// Directory containing `.md` prose files.
        md_dir: PathBuf,

        /// Output EPUB path (default: `book.epub` in MD_DIR).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Book title.
        #[arg(long, default_value = "Caption Press Book")]
        title: String,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "cpress", &mut std::io::stdout());
        return Ok(());
    }

    let mut cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Convert {
            srt_dir,
            out_dir,
            full,
            dry_run,
            limit,
            coverage_threshold,
            context_len,
            max_attempts,
            progress,
        } => {
            if let Some(threshold) = coverage_threshold {
                cfg.convert.coverage_threshold = threshold;
            }
            if let Some(len) = context_len {
                cfg.convert.context_len = len;
            }
            if let Some(attempts) = max_attempts {
                cfg.convert.max_attempts = attempts;
            }

            let out_dir = out_dir.unwrap_or_else(|| srt_dir.clone());
            let opts = ConvertOptions {
                full,
                dry_run,
                limit,
            };
            let reporter = ProgressMode::from_flag(progress.as_deref()).reporter();
            convert::run_convert(&cfg, &srt_dir, &out_dir, &opts, reporter.as_ref()).await?;
        }
        Commands::Check { srt_dir, out_dir } => {
            let out_dir = out_dir.unwrap_or_else(|| srt_dir.clone());
            check::run_check(&cfg, &srt_dir, &out_dir)?;
        }
        Commands::Compose {
            md_dir,
            output,
            title,
        } => {
            let output = output.unwrap_or_else(|| md_dir.join("book.epub"));
            compose::run_compose(&cfg.compose, &md_dir, &output, &title)?;
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}
