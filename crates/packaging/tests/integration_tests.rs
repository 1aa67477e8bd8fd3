use std::path::Path;

use weatherbox_models::{
    BuildConfig, BuildError, ExclusionSet, Snapshot, SourceRef, StagingArea, Variant,
};
use weatherbox_packaging::{layer_entries, Assembler, HelperBuilder, Installer};
use weatherbox_testsupport::{write_fixture_repo, StubToolchain};

struct Fixture {
    _dir: tempfile::TempDir,
    toolchain: StubToolchain,
    snapshot: Snapshot,
    staging_root: std::path::PathBuf,
    config: BuildConfig,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = StubToolchain::create(&dir.path().join("tools")).unwrap();

    let snapshot_root = dir.path().join("snapshot");
    write_fixture_repo(&snapshot_root).unwrap();
    let fingerprint = weatherbox_fetch::tree_digest(&snapshot_root).unwrap();
    let snapshot = Snapshot {
        root: snapshot_root,
        source: SourceRef {
            url: "https://example.com/app.git".to_string(),
            git_ref: "master".to_string(),
        },
        fingerprint,
    };

    let mut config = BuildConfig::default();
    config.tools.git_bin = toolchain.git_bin();
    config.tools.python_bin = toolchain.python_bin();
    config.tools.go_bin = toolchain.go_bin();
    config.staging.root = dir.path().join("staging");
    config.image.output_dir = dir.path().join("dist");

    Fixture {
        staging_root: config.staging.root.clone(),
        _dir: dir,
        toolchain,
        snapshot,
        config,
    }
}

fn area(fixture: &Fixture, name: &str) -> StagingArea {
    StagingArea::create(&fixture.staging_root, name).unwrap()
}

#[tokio::test]
async fn installer_filters_manifest_and_installs_the_rest() {
    let fx = fixture();
    let env_area = area(&fx, "env");

    let installer = Installer::new(
        fx.toolchain.python_bin(),
        ExclusionSet::new(&fx.config.install.exclude),
    );
    let filtered = installer
        .install(&fx.snapshot, "requirements.txt", &env_area)
        .await
        .unwrap();

    // Four requirements in the fixture manifest, one filtered out.
    assert_eq!(filtered.requirement_count(), 3);
    assert!(env_area.is_complete());

    let site = Installer::venv_dir(&env_area).join("lib/site-packages");
    assert!(site.join("requests").exists());
    assert!(site.join("pytz").exists());
    assert!(!site.join("mpld3").exists());

    let written = std::fs::read_to_string(Installer::filtered_manifest_path(&env_area)).unwrap();
    assert!(!written.contains("mpld3"));
}

#[tokio::test]
async fn failed_install_promotes_nothing() {
    let fx = fixture();
    std::fs::write(
        fx.snapshot.root.join("requirements.txt"),
        "requests\nunbuildable-widget==0.1\n",
    )
    .unwrap();
    let env_area = area(&fx, "env");

    let installer = Installer::new(fx.toolchain.python_bin(), ExclusionSet::default());
    let err = installer
        .install(&fx.snapshot, "requirements.txt", &env_area)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::InstallFailed { .. }));
    assert!(!env_area.is_complete());
}

#[tokio::test]
async fn helper_build_produces_binary_without_toolchain_litter() {
    let fx = fixture();
    let helper_area = area(&fx, "helper");

    let builder = HelperBuilder::new(fx.toolchain.go_bin());
    let bin = builder
        .build(&fx.snapshot, "tooling/ansi-renderer", "ansi-renderer", &helper_area)
        .await
        .unwrap();

    assert!(bin.is_file());
    assert!(helper_area.is_complete());
    assert!(!helper_area.dir().join("scratch").exists());
}

#[tokio::test]
async fn helper_compile_failure_leaves_no_artifact() {
    let fx = fixture();
    fx.toolchain.fail_go_builds().unwrap();
    let helper_area = area(&fx, "helper");

    let builder = HelperBuilder::new(fx.toolchain.go_bin());
    let err = builder
        .build(&fx.snapshot, "tooling/ansi-renderer", "ansi-renderer", &helper_area)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::HelperBuildFailed { .. }));
    assert!(!helper_area.is_complete());
    assert!(!helper_area.dir().join("ansi-renderer").exists());
}

async fn build_upstream_stages(fx: &Fixture) -> (StagingArea, StagingArea, StagingArea) {
    let fetch_area = area(fx, "fetch");
    // The snapshot was written directly for these tests; mark the fetch
    // stage the way the fetcher would.
    fetch_area
        .promote(Some(fx.snapshot.fingerprint.clone()))
        .unwrap();

    let env_area = area(fx, "env");
    Installer::new(
        fx.toolchain.python_bin(),
        ExclusionSet::new(&fx.config.install.exclude),
    )
    .install(&fx.snapshot, "requirements.txt", &env_area)
    .await
    .unwrap();

    let helper_area = area(fx, "helper");
    HelperBuilder::new(fx.toolchain.go_bin())
        .build(&fx.snapshot, "tooling/ansi-renderer", "ansi-renderer", &helper_area)
        .await
        .unwrap();

    (fetch_area, env_area, helper_area)
}

#[tokio::test]
async fn assembles_image_with_runtime_artifacts_only() {
    let fx = fixture();
    let (fetch_area, env_area, helper_area) = build_upstream_stages(&fx).await;

    let assembler = Assembler::new(fx.config.clone());
    let image = assembler
        .assemble(&fx.snapshot, &fetch_area, &env_area, Some(&helper_area))
        .await
        .unwrap();

    let entries = layer_entries(&image.layer_file).unwrap();
    assert!(entries.iter().any(|e| e == "app/requirements.txt"));
    assert!(entries.iter().any(|e| e.starts_with("app/venv/")));
    assert!(entries.iter().any(|e| e == "app/bin/ansi-renderer"));
    assert!(entries.iter().any(|e| e.starts_with("app/cache")));
    assert!(entries.iter().any(|e| e.starts_with("var/log/weatherbox")));
    assert!(entries
        .iter()
        .any(|e| e == "etc/weatherbox/supervisor.toml"));

    // Build-only content stays out: no VCS metadata, no helper source.
    assert!(entries.iter().all(|e| !e.contains(".git")));
    assert!(entries.iter().all(|e| !e.starts_with("app/tooling/ansi-renderer")));

    assert_eq!(image.manifest.source_fingerprint, fx.snapshot.fingerprint);
    assert_eq!(
        image.manifest.helper_bin.as_deref(),
        Some("/app/bin/ansi-renderer")
    );
    assert!(image.manifest_file.is_file());
}

#[tokio::test]
async fn plain_variant_needs_no_helper_stage() {
    let mut fx = fixture();
    fx.config.variant = Variant::Plain;
    let (fetch_area, env_area, _helper) = build_upstream_stages(&fx).await;

    let assembler = Assembler::new(fx.config.clone());
    let image = assembler
        .assemble(&fx.snapshot, &fetch_area, &env_area, None)
        .await
        .unwrap();

    assert!(image.manifest.helper_bin.is_none());
    let entries = layer_entries(&image.layer_file).unwrap();
    assert!(entries.iter().all(|e| e != "app/bin/ansi-renderer"));
}

#[tokio::test]
async fn unpromoted_env_stage_fails_the_join_point() {
    let fx = fixture();
    let (fetch_area, env_area, helper_area) = build_upstream_stages(&fx).await;
    env_area.reset().unwrap();

    let assembler = Assembler::new(fx.config.clone());
    let err = assembler
        .assemble(&fx.snapshot, &fetch_area, &env_area, Some(&helper_area))
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::StageIncomplete { .. }));
}

#[tokio::test]
async fn missing_helper_stage_fails_the_helper_variant() {
    let fx = fixture();
    let (fetch_area, env_area, _helper) = build_upstream_stages(&fx).await;

    let assembler = Assembler::new(fx.config.clone());
    let err = assembler
        .assemble(&fx.snapshot, &fetch_area, &env_area, None)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::MissingArtifact { stage } if stage == "helper"));
}

#[test]
fn supervisor_config_lands_under_etc() {
    assert!(Path::new(weatherbox_models::image::SUPERVISOR_CONFIG).starts_with("etc"));
}
