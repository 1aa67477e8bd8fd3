use std::fs;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tar::{Archive, Builder};
use tracing::{info, instrument};

use weatherbox_models::BuildError;

/// Package an assembled image root as a compressed layer tarball with
/// deterministic entry ordering, and return the SHA-256 of the compressed
/// bytes.
#[instrument(skip_all, fields(out = %out_file.display()))]
pub fn package_layer(root: &Path, out_file: &Path) -> Result<String, BuildError> {
    let file = fs::File::create(out_file)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    append_dir_sorted(&mut builder, root, root)?;

    let encoder = builder.into_inner()?;
    encoder.finish()?;

    let digest = format!("{:x}", Sha256::digest(fs::read(out_file)?));
    info!("Packaged layer {} ({})", out_file.display(), digest);
    Ok(digest)
}

fn append_dir_sorted(
    builder: &mut Builder<GzEncoder<fs::File>>,
    root: &Path,
    dir: &Path,
) -> Result<(), BuildError> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = path.strip_prefix(root).map_err(|e| BuildError::Internal {
            reason: e.to_string(),
        })?;

        if entry.file_type()?.is_dir() {
            builder.append_dir(relative, &path)?;
            append_dir_sorted(builder, root, &path)?;
        } else {
            builder.append_path_with_name(&path, relative)?;
        }
    }
    Ok(())
}

/// Entry names of a packaged layer, for verification and `inspect`.
pub fn layer_entries(layer_file: &Path) -> Result<Vec<String>, BuildError> {
    let file = fs::File::open(layer_file)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut names = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        names.push(entry.path()?.to_string_lossy().into_owned());
    }
    Ok(names)
}
