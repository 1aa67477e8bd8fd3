use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use weatherbox_models::BuildError;

/// Content digest of a directory tree: SHA-256 over relative paths and file
/// bytes in sorted order. Timestamps and permissions do not participate, so
/// two fetches of the same ref fingerprint identically.
pub fn tree_digest(root: &Path) -> Result<String, BuildError> {
    let mut hasher = Sha256::new();
    hash_dir(root, root, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn hash_dir(root: &Path, dir: &Path, hasher: &mut Sha256) -> Result<(), BuildError> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|e| BuildError::Internal {
                reason: e.to_string(),
            })?
            .to_string_lossy()
            .into_owned();

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            hasher.update(b"dir:");
            hasher.update(relative.as_bytes());
            hasher.update([0u8]);
            hash_dir(root, &path, hasher)?;
        } else if file_type.is_file() {
            hasher.update(b"file:");
            hasher.update(relative.as_bytes());
            hasher.update([0u8]);
            hasher.update(fs::read(&path)?);
            hasher.update([0u8]);
        } else if file_type.is_symlink() {
            // Symlinks are hashed by their target path, not what it points
            // at; other special files never appear in a git snapshot.
            let target = fs::read_link(&path)?;
            hasher.update(b"link:");
            hasher.update(relative.as_bytes());
            hasher.update([0u8]);
            hasher.update(target.to_string_lossy().as_bytes());
            hasher.update([0u8]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_tree(root: &Path) {
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("requirements.txt"), "requests\n").unwrap();
        fs::write(root.join("lib/app.py"), "print('hi')\n").unwrap();
    }

    #[test]
    fn identical_trees_fingerprint_identically() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write_tree(a.path());
        write_tree(b.path());
        assert_eq!(
            tree_digest(a.path()).unwrap(),
            tree_digest(b.path()).unwrap()
        );
    }

    #[test]
    fn content_change_changes_fingerprint() {
        let a = tempfile::tempdir().unwrap();
        write_tree(a.path());
        let before = tree_digest(a.path()).unwrap();

        fs::write(a.path().join("lib/app.py"), "print('bye')\n").unwrap();
        assert_ne!(before, tree_digest(a.path()).unwrap());
    }

    #[test]
    fn timestamp_change_does_not_change_fingerprint() {
        let a = tempfile::tempdir().unwrap();
        write_tree(a.path());
        let before = tree_digest(a.path()).unwrap();

        // Rewrite a file with identical bytes; mtime moves, content does not.
        fs::write(a.path().join("requirements.txt"), "requests\n").unwrap();
        assert_eq!(before, tree_digest(a.path()).unwrap());
    }
}
