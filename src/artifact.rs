//! Incrementally written prose output files.
//!
//! One artifact per input file. Within a run the file is append-only:
//! every accepted batch is written and flushed immediately, so an
//! interruption between batches leaves a prefix the resume check can score
//! on the next run. Regeneration always starts the file empty; there is no
//! in-place repair of a partial output.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// An open, exclusively owned output file for one conversion pass.
pub struct ProseArtifact {
    file: File,
    path: PathBuf,
}

impl ProseArtifact {
    /// Create (or truncate) the artifact for a fresh conversion.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Append accepted text and flush it to disk before returning.
    /// The flush is the resume mechanism; writes must not be batched.
    pub fn append(&mut self, text: &str) -> Result<()> {
        self.file
            .write_all(text.as_bytes())
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        self.file
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read a prior run's output, if any usable one exists.
///
/// Unreadable content (missing file, permission error, invalid UTF-8) is
/// treated as "no usable prior output" so the caller degrades to
/// regeneration instead of failing the run.
pub fn read_existing(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_is_durable_immediately() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.md");

        let mut artifact = ProseArtifact::create(&path).unwrap();
        artifact.append("第一段。").unwrap();

        // Readable before the artifact is dropped: flush already happened.
        assert_eq!(read_existing(&path).unwrap(), "第一段。");

        artifact.append("第二段。").unwrap();
        assert_eq!(read_existing(&path).unwrap(), "第一段。第二段。");
    }

    #[test]
    fn create_truncates_prior_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.md");
        std::fs::write(&path, "stale content").unwrap();

        let artifact = ProseArtifact::create(&path).unwrap();
        drop(artifact);
        assert_eq!(read_existing(&path).unwrap(), "");
    }

    #[test]
    fn create_makes_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("deeper").join("out.md");
        let mut artifact = ProseArtifact::create(&path).unwrap();
        artifact.append("text").unwrap();
        assert_eq!(read_existing(&path).unwrap(), "text");
    }

    #[test]
    fn missing_file_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        assert!(read_existing(&tmp.path().join("nope.md")).is_none());
    }

    #[test]
    fn invalid_utf8_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("binary.md");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x80]).unwrap();
        assert!(read_existing(&path).is_none());
    }
}
