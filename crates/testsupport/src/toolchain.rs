use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::fixtures::write_script;

/// A directory of stand-in `git`/`python3`/`go` executables for hermetic
/// pipeline tests: no network, no real toolchains. The stubs read their
/// behavior from control files next to the bin directory, not from global
/// environment variables, so parallel tests never interfere.
pub struct StubToolchain {
    root: PathBuf,
}

impl StubToolchain {
    pub fn create(root: &Path) -> Result<Self> {
        let bin = root.join("bin");
        fs::create_dir_all(&bin)?;

        write_script(&bin.join("git"), GIT_STUB)?;
        write_script(&bin.join("python3"), PYTHON_STUB)?;
        write_script(&bin.join("pip-stub"), PIP_STUB)?;
        write_script(&bin.join("go"), GO_STUB)?;

        let toolchain = Self {
            root: root.to_path_buf(),
        };
        toolchain.set_refs(&["master"])?;
        Ok(toolchain)
    }

    pub fn git_bin(&self) -> String {
        self.root.join("bin/git").to_string_lossy().into_owned()
    }

    pub fn python_bin(&self) -> String {
        self.root.join("bin/python3").to_string_lossy().into_owned()
    }

    pub fn go_bin(&self) -> String {
        self.root.join("bin/go").to_string_lossy().into_owned()
    }

    /// Point the git stub's "remote" at a local fixture tree.
    pub fn set_remote(&self, remote: &Path) -> Result<()> {
        fs::write(
            self.root.join("remote.path"),
            remote.to_string_lossy().as_bytes(),
        )?;
        Ok(())
    }

    /// Refs the git stub accepts; cloning any other ref fails the way git
    /// reports a missing remote branch.
    pub fn set_refs(&self, refs: &[&str]) -> Result<()> {
        fs::write(self.root.join("refs"), refs.join(" "))?;
        Ok(())
    }

    /// Make every subsequent `go build` fail with a compile error.
    pub fn fail_go_builds(&self) -> Result<()> {
        fs::write(self.root.join("go-fail"), b"1")?;
        Ok(())
    }
}

const GIT_STUB: &str = r#"#!/bin/sh
# Stand-in for: git clone --depth 1 --single-branch --branch REF URL DEST
set -e
here="$(cd "$(dirname "$0")/.." && pwd)"
ref=""
dest=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "--branch" ]; then ref="$arg"; fi
    prev="$arg"
    dest="$arg"
done
refs="$(cat "$here/refs" 2>/dev/null || echo master)"
ok=no
for r in $refs; do
    if [ "$r" = "$ref" ]; then ok=yes; fi
done
if [ "$ok" = "no" ]; then
    echo "fatal: Remote branch $ref not found in upstream origin" >&2
    exit 128
fi
remote="$(cat "$here/remote.path")"
mkdir -p "$dest"
cp -R "$remote/." "$dest/"
mkdir -p "$dest/.git"
echo "ref: refs/heads/$ref" > "$dest/.git/HEAD"
"#;

const PYTHON_STUB: &str = r#"#!/bin/sh
# Stand-in interpreter. Handles "-m venv DIR"; anything else is a no-op.
set -e
if [ "$1" = "-m" ] && [ "$2" = "venv" ]; then
    dir="$3"
    mkdir -p "$dir/bin" "$dir/lib/site-packages"
    printf 'home = stub\n' > "$dir/pyvenv.cfg"
    cp "$(dirname "$0")/pip-stub" "$dir/bin/pip"
    cp "$0" "$dir/bin/python3"
    chmod +x "$dir/bin/pip" "$dir/bin/python3"
fi
exit 0
"#;

const PIP_STUB: &str = r#"#!/bin/sh
# Stand-in for: pip install --no-cache-dir -r FILE. Creates one site-packages
# entry per requirement; a requirement named *unbuildable* fails the install.
set -e
file=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "-r" ]; then file="$arg"; fi
    prev="$arg"
done
if [ -z "$file" ]; then
    echo "ERROR: no requirements file given" >&2
    exit 2
fi
site="$(cd "$(dirname "$0")/.." && pwd)/lib/site-packages"
mkdir -p "$site"
while IFS= read -r line; do
    case "$line" in ''|'#'*) continue ;; esac
    name="$(printf '%s' "$line" | sed 's/[=<>!~;[:space:]].*//; s/\[.*//')"
    case "$name" in
        *unbuildable*)
            echo "ERROR: Failed building wheel for $name" >&2
            exit 1
            ;;
    esac
    mkdir -p "$site/$name"
    printf 'stub\n' > "$site/$name/__init__.py"
done < "$file"
"#;

const GO_STUB: &str = r#"#!/bin/sh
# Stand-in for: go build -o OUT DIR
set -e
here="$(cd "$(dirname "$0")/.." && pwd)"
if [ -f "$here/go-fail" ]; then
    echo "build: cannot load package: compile error" >&2
    exit 2
fi
out=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "-o" ]; then out="$arg"; fi
    prev="$arg"
done
if [ -z "$out" ]; then
    exit 2
fi
printf '#!/bin/sh\necho stub-helper\n' > "$out"
chmod +x "$out"
"#;
