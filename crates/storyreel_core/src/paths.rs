//! Deterministic per-job file layout.
//!
//! Every artifact of a job lives under `<root>/<job id>/`, so two jobs with
//! different ids never write the same file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// A fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accepts caller-chosen ids that are safe to use as a single path
    /// component.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(Self(id))
        } else {
            Err(CoreError::InvalidJobId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = CoreError;
    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// The files a job reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Narration,
    Transcript,
    Captions,
    /// Zero-based image slot.
    Image(usize),
    Output,
}

#[derive(Debug, Clone)]
pub struct JobPaths {
    root: PathBuf,
    job_id: JobId,
}

impl JobPaths {
    pub fn new(root: impl Into<PathBuf>, job_id: JobId) -> Self {
        Self {
            root: root.into(),
            job_id,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn job_dir(&self) -> PathBuf {
        self.root.join(self.job_id.as_str())
    }

    pub fn images_dir(&self) -> PathBuf {
        self.job_dir().join("images")
    }

    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        match kind {
            ArtifactKind::Narration => self.job_dir().join("narration.mp3"),
            ArtifactKind::Transcript => self.job_dir().join("transcript.json"),
            ArtifactKind::Captions => self.job_dir().join("captions.srt"),
            ArtifactKind::Image(n) => self.images_dir().join(format!("image_{n}.png")),
            ArtifactKind::Output => self.job_dir().join("final.mp4"),
        }
    }

    /// Create the job directory tree.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.images_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
