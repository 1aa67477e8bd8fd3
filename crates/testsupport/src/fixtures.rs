use std::fs;
use std::path::Path;

use anyhow::Result;

/// Dependency manifest used by the fixture repository: four requirements plus
/// a comment, one of which (`mpld3`) the default build configuration filters.
pub const FIXTURE_MANIFEST: &str = "\
# terminal weather service dependencies
requests==2.31.0
geoip2
mpld3
pytz
";

/// Create a miniature application repository tree that looks enough like the
/// real one for the pipeline: a dependency manifest, an entry script, a
/// library module, and the helper subtree the variant build compiles.
pub fn write_fixture_repo(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join("bin"))?;
    fs::create_dir_all(root.join("lib"))?;
    fs::create_dir_all(root.join("tooling/ansi-renderer"))?;

    fs::write(root.join("requirements.txt"), FIXTURE_MANIFEST)?;
    fs::write(
        root.join("bin/srv.py"),
        "import lib.weather\n\nlib.weather.serve()\n",
    )?;
    fs::write(
        root.join("lib/weather.py"),
        "def serve():\n    print(\"listening\")\n",
    )?;
    fs::write(
        root.join("tooling/ansi-renderer/main.go"),
        "package main\n\nfunc main() {}\n",
    )?;
    fs::write(
        root.join("tooling/ansi-renderer/go.mod"),
        "module ansi-renderer\n\ngo 1.21\n",
    )?;
    Ok(())
}

/// Write a child script that records each start in `marker` and exits
/// immediately with status 1. Used to exercise supervisor restarts.
pub fn write_crashing_child(script: &Path, marker: &Path) -> Result<()> {
    write_script(
        script,
        &format!(
            "#!/bin/sh\necho started >> \"{}\"\nexit 1\n",
            marker.display()
        ),
    )
}

/// Write a child script that records its start and then sleeps long enough to
/// count as a healthy run.
pub fn write_sleeping_child(script: &Path, marker: &Path) -> Result<()> {
    write_script(
        script,
        &format!(
            "#!/bin/sh\necho started >> \"{}\"\nsleep 600\n",
            marker.display()
        ),
    )
}

pub(crate) fn write_script(path: &Path, body: &str) -> Result<()> {
    fs::write(path, body)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}
