use std::path::PathBuf;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use weatherbox_models::{BuildConfig, RuntimeConfig};
use weatherbox_pipeline::BuildPipeline;
use weatherbox_supervisor::{RestartPolicy, Supervisor};
use weatherbox_testsupport::{write_fixture_repo, StubToolchain};

fn stubbed_config(dir: &std::path::Path) -> BuildConfig {
    let toolchain = StubToolchain::create(&dir.join("tools")).unwrap();
    let remote = dir.join("remote");
    write_fixture_repo(&remote).unwrap();
    toolchain.set_remote(&remote).unwrap();

    let mut config = BuildConfig::default();
    config.tools.git_bin = toolchain.git_bin();
    config.tools.python_bin = toolchain.python_bin();
    config.tools.go_bin = toolchain.go_bin();
    config.staging.root = dir.join("staging");
    config.image.output_dir = dir.join("dist");
    config
}

fn unpack_layer(layer_file: &std::path::Path, root: &std::path::Path) {
    let file = std::fs::File::open(layer_file).unwrap();
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    archive.unpack(root).unwrap();
}

/// Build an image, unpack its layer, and boot the supervisor against the
/// unpacked root. The stub interpreter baked into the venv exits right away,
/// so the supervisor observes exits and restarts while the "container" keeps
/// running.
#[tokio::test]
async fn supervisor_boots_the_assembled_image() {
    let dir = tempfile::tempdir().unwrap();
    let config = stubbed_config(dir.path());

    let image = BuildPipeline::new(config).run().await.unwrap();

    let root = dir.path().join("container");
    unpack_layer(&image.layer_file, &root);

    // The generated supervisor config carries image defaults; rebase the
    // install paths onto the unpacked root.
    let mut runtime =
        RuntimeConfig::load_from(&root.join("etc/weatherbox/supervisor.toml")).unwrap();
    assert_eq!(
        runtime.helper_bin,
        Some(PathBuf::from("/app/bin/ansi-renderer"))
    );
    runtime.app_root = root.join("app");
    runtime.listen_host = "127.0.0.1".to_string();

    let policy = RestartPolicy {
        base_delay: Duration::from_millis(20),
        factor: 2,
        max_delay: Duration::from_millis(80),
        jitter: 0.0,
        healthy_after: Duration::from_secs(10),
    };

    let supervisor = Supervisor::new(runtime);
    let handle = supervisor.handle();
    let task = tokio::spawn(async move { supervisor.run(policy).await });

    timeout(Duration::from_secs(10), async {
        while handle.restart_count() < 2 {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("supervisor never restarted the child");

    handle.shutdown();
    timeout(Duration::from_secs(5), task)
        .await
        .expect("supervisor did not stop")
        .unwrap()
        .unwrap();
}
