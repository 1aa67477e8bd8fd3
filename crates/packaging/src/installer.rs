use std::fs;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, instrument};

use weatherbox_models::{
    BuildError, DependencyManifest, ExclusionSet, Snapshot, StagingArea,
};

/// Materializes the isolated interpreted runtime environment: filters the
/// application's dependency manifest, creates a fresh venv in the env staging
/// area, and installs every surviving requirement into it. Any install
/// failure leaves the staging area unpromoted, so a partial environment can
/// never reach the assembler.
pub struct Installer {
    python_bin: String,
    exclusions: ExclusionSet,
}

impl Installer {
    pub fn new(python_bin: impl Into<String>, exclusions: ExclusionSet) -> Self {
        Self {
            python_bin: python_bin.into(),
            exclusions,
        }
    }

    /// Environment tree inside the env staging area.
    pub fn venv_dir(area: &StagingArea) -> PathBuf {
        area.dir().join("venv")
    }

    /// Filtered manifest written next to the venv for inspection.
    pub fn filtered_manifest_path(area: &StagingArea) -> PathBuf {
        area.dir().join("requirements.filtered.txt")
    }

    #[instrument(skip(self, snapshot, area), fields(manifest = manifest_path))]
    pub async fn install(
        &self,
        snapshot: &Snapshot,
        manifest_path: &str,
        area: &StagingArea,
    ) -> Result<DependencyManifest, BuildError> {
        area.reset()?;

        let manifest_file = snapshot.root.join(manifest_path);
        let text = fs::read_to_string(&manifest_file).map_err(|e| BuildError::ManifestError {
            reason: format!("cannot read {}: {}", manifest_file.display(), e),
        })?;

        let manifest = DependencyManifest::parse(&text);
        let filtered = manifest.filter(&self.exclusions);
        let dropped = manifest.excluded_names(&self.exclusions);
        if !dropped.is_empty() {
            info!(
                "Filtered {} of {} manifest entries: {}",
                dropped.len(),
                manifest.requirement_count(),
                dropped.join(", ")
            );
        }

        let filtered_file = Self::filtered_manifest_path(area);
        fs::write(&filtered_file, filtered.render())?;

        let venv = Self::venv_dir(area);
        info!("Creating environment at {}", venv.display());
        let output = Command::new(&self.python_bin)
            .arg("-m")
            .arg("venv")
            .arg(&venv)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BuildError::InstallFailed {
                reason: format!("failed to run {}: {}", self.python_bin, e),
            })?;
        if !output.status.success() {
            return Err(BuildError::InstallFailed {
                reason: format!(
                    "venv creation failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        info!(
            "Installing {} requirements into {}",
            filtered.requirement_count(),
            venv.display()
        );
        let pip = venv.join("bin/pip");
        let output = Command::new(&pip)
            .arg("install")
            .arg("--no-cache-dir")
            .arg("-r")
            .arg(&filtered_file)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BuildError::InstallFailed {
                reason: format!("failed to run {}: {}", pip.display(), e),
            })?;
        if !output.status.success() {
            return Err(BuildError::InstallFailed {
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        area.promote(None)?;
        info!("Runtime environment complete");
        Ok(filtered)
    }
}
