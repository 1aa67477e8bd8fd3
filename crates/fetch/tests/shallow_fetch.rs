use weatherbox_fetch::Fetcher;
use weatherbox_models::{BuildError, SourceRef, StagingArea};
use weatherbox_testsupport::{write_fixture_repo, StubToolchain};

fn source() -> SourceRef {
    SourceRef {
        url: "https://example.com/app.git".to_string(),
        git_ref: "master".to_string(),
    }
}

#[tokio::test]
async fn fetch_strips_vcs_metadata_and_promotes() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = StubToolchain::create(&dir.path().join("tools")).unwrap();
    let remote = dir.path().join("remote");
    write_fixture_repo(&remote).unwrap();
    toolchain.set_remote(&remote).unwrap();

    let area = StagingArea::create(&dir.path().join("staging"), "fetch").unwrap();
    let fetcher = Fetcher::new(toolchain.git_bin());
    let snapshot = fetcher.fetch(&source(), &area).await.unwrap();

    assert!(snapshot.root.join("requirements.txt").exists());
    assert!(!snapshot.root.join(".git").exists());
    assert!(area.is_complete());
    assert_eq!(
        area.status().unwrap().digest.as_deref(),
        Some(snapshot.fingerprint.as_str())
    );
}

#[tokio::test]
async fn fetching_same_ref_twice_fingerprints_identically() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = StubToolchain::create(&dir.path().join("tools")).unwrap();
    let remote = dir.path().join("remote");
    write_fixture_repo(&remote).unwrap();
    toolchain.set_remote(&remote).unwrap();

    let fetcher = Fetcher::new(toolchain.git_bin());
    let area_a = StagingArea::create(&dir.path().join("staging"), "fetch-a").unwrap();
    let area_b = StagingArea::create(&dir.path().join("staging"), "fetch-b").unwrap();

    let a = fetcher.fetch(&source(), &area_a).await.unwrap();
    let b = fetcher.fetch(&source(), &area_b).await.unwrap();
    assert_eq!(a.fingerprint, b.fingerprint);
}

#[tokio::test]
async fn unknown_ref_fails_without_promoting() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = StubToolchain::create(&dir.path().join("tools")).unwrap();
    let remote = dir.path().join("remote");
    write_fixture_repo(&remote).unwrap();
    toolchain.set_remote(&remote).unwrap();

    let area = StagingArea::create(&dir.path().join("staging"), "fetch").unwrap();
    let fetcher = Fetcher::new(toolchain.git_bin());
    let err = fetcher
        .fetch(
            &SourceRef {
                url: "https://example.com/app.git".to_string(),
                git_ref: "no-such-branch".to_string(),
            },
            &area,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::RefNotFound { git_ref } if git_ref == "no-such-branch"));
    assert!(!area.is_complete());
}
