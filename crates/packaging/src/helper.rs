use std::fs;
use std::path::PathBuf;
use std::process::Stdio;

use sha2::{Digest, Sha256};
use tokio::process::Command;
use tracing::{info, instrument};

use weatherbox_models::{BuildError, Snapshot, StagingArea};

/// Compiles the native helper from a subtree of the fetched source into one
/// statically linked binary. The toolchain caches live in a scratch directory
/// that is deleted after the build, so nothing toolchain-shaped survives in
/// the staging area; the binary is moved into place only on success.
pub struct HelperBuilder {
    go_bin: String,
}

impl HelperBuilder {
    pub fn new(go_bin: impl Into<String>) -> Self {
        Self {
            go_bin: go_bin.into(),
        }
    }

    /// Final location of the helper binary inside the helper staging area.
    pub fn binary_path(area: &StagingArea, name: &str) -> PathBuf {
        area.dir().join(name)
    }

    #[instrument(skip(self, snapshot, area), fields(subtree = subtree, helper = name))]
    pub async fn build(
        &self,
        snapshot: &Snapshot,
        subtree: &str,
        name: &str,
        area: &StagingArea,
    ) -> Result<PathBuf, BuildError> {
        area.reset()?;

        let src = snapshot.root.join(subtree);
        if !src.is_dir() {
            return Err(BuildError::HelperBuildFailed {
                reason: format!("helper subtree not found: {}", src.display()),
            });
        }

        let scratch = area.dir().join("scratch");
        fs::create_dir_all(&scratch)?;
        let tmp_out = scratch.join(name);

        info!("Compiling helper from {}", src.display());
        let output = Command::new(&self.go_bin)
            .arg("build")
            .arg("-trimpath")
            .arg("-ldflags")
            .arg("-s -w")
            .arg("-o")
            .arg(&tmp_out)
            .arg(".")
            .current_dir(&src)
            .env("CGO_ENABLED", "0")
            .env("GOCACHE", scratch.join("gocache"))
            .env("GOPATH", scratch.join("gopath"))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BuildError::HelperBuildFailed {
                reason: format!("failed to run {}: {}", self.go_bin, e),
            })?;

        if !output.status.success() {
            return Err(BuildError::HelperBuildFailed {
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let out = Self::binary_path(area, name);
        fs::rename(&tmp_out, &out)?;
        fs::remove_dir_all(&scratch)?;

        let digest = format!("{:x}", Sha256::digest(fs::read(&out)?));
        info!("Helper binary ready: {} ({})", out.display(), digest);

        area.promote(Some(digest))?;
        Ok(out)
    }
}
