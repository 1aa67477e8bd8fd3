use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Terminal-state marker written into a staging area by `promote`. A staging
/// area without this record never reached success and must not be read by
/// downstream stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageStatus {
    pub stage: String,
    pub finished_at: DateTime<Utc>,
    pub digest: Option<String>,
}

/// A per-stage scratch directory under the build-local staging root. Stages
/// write freely into it while running; `promote` is the last thing a stage
/// does, so an abort at any earlier point leaves the area incomplete.
#[derive(Debug, Clone)]
pub struct StagingArea {
    name: String,
    dir: PathBuf,
}

const STATUS_FILE: &str = ".stage-status.json";

impl StagingArea {
    pub fn create(root: &Path, name: &str) -> Result<Self, BuildError> {
        let dir = root.join(name);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Clear any previous contents, including a stale completion marker.
    pub fn reset(&self) -> Result<(), BuildError> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Mark the area as terminally complete. Writing the marker is the final
    /// step of a stage; everything the stage produces must already be in
    /// place.
    pub fn promote(&self, digest: Option<String>) -> Result<(), BuildError> {
        let status = StageStatus {
            stage: self.name.clone(),
            finished_at: Utc::now(),
            digest,
        };
        let body = serde_json::to_string_pretty(&status).map_err(|e| BuildError::Internal {
            reason: e.to_string(),
        })?;
        fs::write(self.dir.join(STATUS_FILE), body)?;
        Ok(())
    }

    pub fn status(&self) -> Option<StageStatus> {
        let body = fs::read_to_string(self.dir.join(STATUS_FILE)).ok()?;
        serde_json::from_str(&body).ok()
    }

    pub fn is_complete(&self) -> bool {
        self.status().is_some()
    }

    /// Join-point check: downstream stages call this before reading.
    pub fn require_complete(&self) -> Result<StageStatus, BuildError> {
        if !self.dir.exists() {
            return Err(BuildError::MissingArtifact {
                stage: self.name.clone(),
            });
        }
        self.status().ok_or_else(|| BuildError::StageIncomplete {
            stage: self.name.clone(),
        })
    }

    /// Relative path of the status marker, for consumers that copy staging
    /// contents forward and must skip it.
    pub fn status_file_name() -> &'static str {
        STATUS_FILE
    }
}
