//! Conversion progress reporting.
//!
//! Reports observable progress during `cpress convert` so users watching a
//! long run see which file is being rewritten and how many batches are
//! left. Progress is emitted on **stderr** so stdout remains parseable for
//! scripts.

use std::io::Write;

/// A single progress event for a conversion run.
#[derive(Clone, Debug)]
pub enum ConvertProgressEvent {
    /// A caption file was parsed and is about to be converted.
    FileStarted {
        file: String,
        fragments: u64,
        batches: u64,
    },
    /// One batch finished (accepted or given up on).
    BatchFinished { file: String, n: u64, total: u64 },
    /// A file was skipped because its prior output already covers it.
    FileSkipped { file: String, coverage: f64 },
}

/// Reports conversion progress. Implementations write to stderr (human or JSON).
pub trait ConvertProgressReporter: Send + Sync {
    fn report(&self, event: ConvertProgressEvent);
}

/// Human-friendly progress on stderr: "convert ep01.srt  3 / 12 batches".
pub struct StderrProgress;

impl ConvertProgressReporter for StderrProgress {
    fn report(&self, event: ConvertProgressEvent) {
        let line = match &event {
            ConvertProgressEvent::FileStarted {
                file,
                fragments,
                batches,
            } => {
                format!(
                    "convert {}  {} fragments, {} batches\n",
                    file, fragments, batches
                )
            }
            ConvertProgressEvent::BatchFinished { file, n, total } => {
                format!("convert {}  {} / {} batches\n", file, n, total)
            }
            ConvertProgressEvent::FileSkipped { file, coverage } => {
                format!("convert {}  skipped (coverage {:.2})\n", file, coverage)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ConvertProgressReporter for JsonProgress {
    fn report(&self, event: ConvertProgressEvent) {
        let obj = match &event {
            ConvertProgressEvent::FileStarted {
                file,
                fragments,
                batches,
            } => serde_json::json!({
                "event": "progress",
                "phase": "started",
                "file": file,
                "fragments": fragments,
                "batches": batches
            }),
            ConvertProgressEvent::BatchFinished { file, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "batch",
                "file": file,
                "n": n,
                "total": total
            }),
            ConvertProgressEvent::FileSkipped { file, coverage } => serde_json::json!({
                "event": "progress",
                "phase": "skipped",
                "file": file,
                "coverage": coverage
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ConvertProgressReporter for NoProgress {
    fn report(&self, _event: ConvertProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some("off") => ProgressMode::Off,
            Some("human") => ProgressMode::Human,
            Some("json") => ProgressMode::Json,
            _ => Self::default_for_tty(),
        }
    }

    /// Build a reporter for this mode. Caller passes it to the orchestrator.
    pub fn reporter(&self) -> Box<dyn ConvertProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
