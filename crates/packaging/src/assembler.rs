use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use weatherbox_models::{
    image, BuildConfig, BuildError, ImageManifest, RuntimeConfig, Snapshot, StagingArea,
};

use crate::helper::HelperBuilder;
use crate::installer::Installer;
use crate::layer;

/// Directory and file names that must never appear in an assembled image:
/// version-control metadata and toolchain litter.
const FORBIDDEN_NAMES: &[&str] = &[".git", "gocache", "gopath", "scratch", "__pycache__"];

/// The final image produced by a build: a compressed layer tarball plus its
/// manifest record.
#[derive(Debug)]
pub struct AssembledImage {
    pub dir: PathBuf,
    pub layer_file: PathBuf,
    pub manifest_file: PathBuf,
    pub manifest: ImageManifest,
}

/// Composes the runtime image from the promoted staging areas: application
/// tree, runtime environment, helper binary (variant), writable cache/log
/// directories, and a generated supervisor configuration. This is the
/// pipeline's join point — every upstream staging area must have reached its
/// terminal success state before anything is read from it.
pub struct Assembler {
    config: BuildConfig,
}

impl Assembler {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(image = %self.config.image.name))]
    pub async fn assemble(
        &self,
        snapshot: &Snapshot,
        fetch_area: &StagingArea,
        env_area: &StagingArea,
        helper_area: Option<&StagingArea>,
    ) -> Result<AssembledImage, BuildError> {
        // Join point: refuse to read from any staging area that did not
        // reach a terminal success state.
        fetch_area.require_complete()?;
        env_area.require_complete()?;

        let helper_bin = if self.config.variant.includes_helper() {
            let area = helper_area.ok_or_else(|| BuildError::MissingArtifact {
                stage: "helper".to_string(),
            })?;
            area.require_complete()?;
            let bin = HelperBuilder::binary_path(area, &self.config.source.helper_name);
            if !bin.is_file() {
                return Err(BuildError::MissingArtifact {
                    stage: area.name().to_string(),
                });
            }
            Some(bin)
        } else {
            None
        };

        let venv = Installer::venv_dir(env_area);
        if !venv.is_dir() {
            return Err(BuildError::MissingArtifact {
                stage: env_area.name().to_string(),
            });
        }

        // Compose into a scratch root, then package. Nothing is written to
        // the output directory until composition has fully succeeded.
        let scratch = tempfile::tempdir().map_err(|e| BuildError::AssemblyFailed {
            reason: format!("cannot create scratch root: {}", e),
        })?;
        let rootfs = scratch.path();

        info!("Composing image root at {}", rootfs.display());

        // Application tree, minus build-only subtrees.
        let helper_subtree = PathBuf::from(&self.config.source.helper_subtree);
        copy_tree(
            &snapshot.root,
            &rootfs.join(image::APP_DIR),
            &[helper_subtree.as_path()],
        )?;

        // Runtime environment.
        copy_tree(&venv, &rootfs.join(image::VENV_DIR), &[])?;

        // Helper binary, copied verbatim.
        let helper_runtime_path = if let Some(bin) = &helper_bin {
            let dest_dir = rootfs.join(image::HELPER_DIR);
            fs::create_dir_all(&dest_dir)?;
            let dest = dest_dir.join(&self.config.source.helper_name);
            fs::copy(bin, &dest)?;
            set_mode(&dest, 0o755)?;
            Some(format!("/{}/{}", image::HELPER_DIR, self.config.source.helper_name))
        } else {
            None
        };

        // Writable state directories for the unprivileged runtime process.
        for dir in [image::CACHE_DIR, image::LOG_DIR] {
            let path = rootfs.join(dir);
            fs::create_dir_all(&path)?;
            set_mode(&path, 0o777)?;
        }

        self.write_supervisor_config(rootfs, helper_runtime_path.clone())?;

        verify_no_build_tooling(rootfs)?;

        // Package and record. The manifest is written last, so an aborted
        // assembly never looks like a finished image.
        let out_dir = self.config.image.output_dir.join(&self.config.image.name);
        fs::create_dir_all(&out_dir)?;
        let layer_file = out_dir.join(image::LAYER_FILE);
        let layer_digest = layer::package_layer(rootfs, &layer_file)?;

        let manifest = ImageManifest {
            build_id: Uuid::new_v4(),
            created_at: Utc::now(),
            image_name: self.config.image.name.clone(),
            variant: self.config.variant,
            source_url: snapshot.source.url.clone(),
            source_ref: snapshot.source.git_ref.clone(),
            source_fingerprint: snapshot.fingerprint.clone(),
            layer_digest,
            entry_point: vec![image::ENTRY_POINT.to_string()],
            helper_bin: helper_runtime_path,
        };
        let manifest_file = out_dir.join(image::MANIFEST_FILE);
        let body =
            serde_json::to_string_pretty(&manifest).map_err(|e| BuildError::Internal {
                reason: e.to_string(),
            })?;
        fs::write(&manifest_file, body)?;

        info!(
            "Assembled image {} (build {})",
            manifest.image_name, manifest.build_id
        );

        Ok(AssembledImage {
            dir: out_dir,
            layer_file,
            manifest_file,
            manifest,
        })
    }

    fn write_supervisor_config(
        &self,
        rootfs: &Path,
        helper_bin: Option<String>,
    ) -> Result<(), BuildError> {
        let runtime = RuntimeConfig {
            helper_bin: helper_bin.map(PathBuf::from),
            entry_script: self.config.source.entry_script.clone(),
            ..RuntimeConfig::default()
        };
        let body = toml::to_string_pretty(&runtime).map_err(|e| BuildError::Internal {
            reason: e.to_string(),
        })?;

        let path = rootfs.join(image::SUPERVISOR_CONFIG);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, body)?;
        Ok(())
    }
}

/// Recursive copy that skips excluded relative subtrees and forbidden names.
/// Regular file permissions come along; symlinks are recreated as-is.
fn copy_tree(src_root: &Path, dst_root: &Path, exclude: &[&Path]) -> Result<(), BuildError> {
    fs::create_dir_all(dst_root)?;
    copy_dir(src_root, src_root, dst_root, exclude)
}

fn copy_dir(
    src_root: &Path,
    dir: &Path,
    dst_root: &Path,
    exclude: &[&Path],
) -> Result<(), BuildError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let relative = path
            .strip_prefix(src_root)
            .map_err(|e| BuildError::Internal {
                reason: e.to_string(),
            })?
            .to_path_buf();

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if FORBIDDEN_NAMES.contains(&name.as_ref()) {
            continue;
        }
        if exclude.iter().any(|prefix| relative.as_path() == *prefix) {
            continue;
        }

        let dest = dst_root.join(&relative);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
            copy_dir(src_root, &path, dst_root, exclude)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(&path)?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &dest)?;
        } else {
            fs::copy(&path, &dest)?;
        }
    }
    Ok(())
}

fn verify_no_build_tooling(rootfs: &Path) -> Result<(), BuildError> {
    for entry in fs::read_dir(rootfs)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy().into_owned();
        if FORBIDDEN_NAMES.contains(&name.as_str()) {
            return Err(BuildError::AssemblyFailed {
                reason: format!("build tooling leaked into image: {}", entry.path().display()),
            });
        }
        if entry.file_type()?.is_dir() {
            verify_no_build_tooling(&entry.path())?;
        }
    }
    Ok(())
}

fn set_mode(path: &Path, mode: u32) -> Result<(), BuildError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}
