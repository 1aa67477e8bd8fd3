use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, instrument};

use weatherbox_models::{BuildError, Snapshot, SourceRef, StagingArea};

use crate::fingerprint;

/// Fetches a shallow, ref-pinned snapshot of the application repository into
/// a staging area. The snapshot is stripped of version-control metadata so it
/// cannot be mutated or incrementally updated afterwards.
pub struct Fetcher {
    git_bin: String,
}

impl Fetcher {
    pub fn new(git_bin: impl Into<String>) -> Self {
        Self {
            git_bin: git_bin.into(),
        }
    }

    /// Directory the snapshot lands in, relative to the fetch staging area.
    pub fn snapshot_dir(area: &StagingArea) -> PathBuf {
        area.dir().join("src")
    }

    #[instrument(skip(self, area), fields(source = %source))]
    pub async fn fetch(
        &self,
        source: &SourceRef,
        area: &StagingArea,
    ) -> Result<Snapshot, BuildError> {
        area.reset()?;
        let dest = Self::snapshot_dir(area);

        info!("Fetching {} into {}", source, dest.display());

        // Minimal-depth fetch: one commit of one branch. A full history
        // fetch would be wasted bytes, the snapshot is read-only.
        let output = Command::new(&self.git_bin)
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--single-branch")
            .arg("--branch")
            .arg(&source.git_ref)
            .arg(&source.url)
            .arg(&dest)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BuildError::FetchFailed {
                reason: format!("failed to run {}: {}", self.git_bin, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_ref(&stderr) {
                return Err(BuildError::RefNotFound {
                    git_ref: source.git_ref.clone(),
                });
            }
            return Err(BuildError::FetchFailed {
                reason: stderr.trim().to_string(),
            });
        }

        // Strip VCS metadata: the snapshot is immutable from here on.
        let git_dir = dest.join(".git");
        if git_dir.exists() {
            std::fs::remove_dir_all(&git_dir)?;
        }

        let fingerprint = fingerprint::tree_digest(&dest)?;
        info!("Fetched {} (fingerprint {})", source, fingerprint);

        area.promote(Some(fingerprint.clone()))?;

        Ok(Snapshot {
            root: dest,
            source: source.clone(),
            fingerprint,
        })
    }
}

fn is_missing_ref(stderr: &str) -> bool {
    stderr.contains("not found in upstream")
        || stderr.contains("Could not find remote branch")
        || stderr.contains("couldn't find remote ref")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ref_detection_covers_git_phrasings() {
        assert!(is_missing_ref(
            "fatal: Remote branch nope not found in upstream origin"
        ));
        assert!(is_missing_ref(
            "warning: Could not find remote branch nope to clone"
        ));
        assert!(is_missing_ref("fatal: couldn't find remote ref nope"));
        assert!(!is_missing_ref(
            "fatal: unable to access 'https://example.com/': Connection refused"
        ));
    }
}
