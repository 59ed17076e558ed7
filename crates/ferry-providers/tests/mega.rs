#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use ferry_core::{Route, Sink, Source, StagedArtifact, TransferContext};
use ferry_providers::{MegaConfig, MegaSink, MegaSource};
use ferry_test_support::fixtures::{RecordingProgress, job};

fn script(dir: &Path, name: &str, body: &str) -> anyhow::Result<String> {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path.to_string_lossy().into_owned())
}

fn config(bin: &Path) -> anyhow::Result<MegaConfig> {
    Ok(MegaConfig {
        get_bin: script(
            bin,
            "mega-get",
            r#"printf 'TRANSFERRING ||###.......||(1/4 MB:  25.00 %%)\r' >&2
printf 'TRANSFERRING ||######....||(2/4 MB:  50.00 %%)\r' >&2
printf 'TRANSFERRING ||##########||(4/4 MB: 100.00 %%)\n' >&2
printf 'movie' > "$2/movie.mkv"
echo "Download finished: $2/movie.mkv""#,
        )?,
        put_bin: script(bin, "mega-put", r#"echo "$@" > "$(dirname "$0")/put.args""#)?,
        export_bin: script(
            bin,
            "mega-export",
            r#"echo "Exported $2: https://mega.nz/file/Xy12#secret""#,
        )?,
        ..MegaConfig::default()
    })
}

#[tokio::test]
async fn fetch_reports_progress_and_stages_one_file() -> anyhow::Result<()> {
    let bin = tempfile::tempdir()?;
    let staging = tempfile::tempdir()?;
    let progress = Arc::new(RecordingProgress::default());
    let ctx = TransferContext::new(
        job(Route::MegaToGDrive, "https://mega.nz/file/Ab12Cd34#key-1", "uid"),
        staging.path().join("job-1"),
        progress.clone(),
    );

    let artifact = MegaSource::new(config(bin.path())?).fetch(&ctx).await?;
    assert_eq!(artifact.name, "movie.mkv");
    assert_eq!(artifact.size_bytes, 5);
    assert_eq!(progress.percentages().await, vec![25, 50, 100]);
    let records = progress.records().await;
    assert!(records.iter().all(|record| record.name == "tmp.file"));
    assert!(records
        .iter()
        .all(|record| record.message == "Transferring from Mega.nz"));
    Ok(())
}

#[tokio::test]
async fn quota_exit_code_is_distinguished() -> anyhow::Result<()> {
    let bin = tempfile::tempdir()?;
    let staging = tempfile::tempdir()?;
    let config = MegaConfig {
        get_bin: script(bin.path(), "mega-get", "echo 'Transfer quota exceeded' >&2\nexit 239")?,
        ..MegaConfig::default()
    };
    let ctx = TransferContext::new(
        job(Route::MegaToDirect, "https://mega.nz/folder/Ab12#key", "uid"),
        staging.path().join("job-1"),
        Arc::new(RecordingProgress::default()),
    );
    let err = MegaSource::new(config).fetch(&ctx).await.unwrap_err();
    assert_eq!(err.kind(), "quota_exceeded");
    Ok(())
}

#[tokio::test]
async fn other_exit_codes_are_source_failures() -> anyhow::Result<()> {
    let bin = tempfile::tempdir()?;
    let staging = tempfile::tempdir()?;
    let config = MegaConfig {
        get_bin: script(bin.path(), "mega-get", "exit 2")?,
        ..MegaConfig::default()
    };
    let ctx = TransferContext::new(
        job(Route::MegaToGDrive, "https://mega.nz/file/Ab12#key", "uid"),
        staging.path().join("job-1"),
        Arc::new(RecordingProgress::default()),
    );
    let err = MegaSource::new(config).fetch(&ctx).await.unwrap_err();
    assert_eq!(err.kind(), "source_unreachable");
    assert!(err.to_string().contains("exited with 2"));
    Ok(())
}

#[tokio::test]
async fn unrecognized_urls_never_spawn() -> anyhow::Result<()> {
    let staging = tempfile::tempdir()?;
    let config = MegaConfig {
        get_bin: "/nonexistent/mega-get".into(),
        ..MegaConfig::default()
    };
    let ctx = TransferContext::new(
        job(Route::MegaToGDrive, "https://mega.nz/#!legacy!key", "uid"),
        staging.path().join("job-1"),
        Arc::new(RecordingProgress::default()),
    );
    let err = MegaSource::new(config).fetch(&ctx).await.unwrap_err();
    assert_eq!(err.kind(), "unrecognized_url");
    Ok(())
}

#[tokio::test]
async fn publish_uploads_then_exports() -> anyhow::Result<()> {
    let bin = tempfile::tempdir()?;
    let staging = tempfile::tempdir()?;
    let path = staging.path().join("notes.txt");
    tokio::fs::write(&path, b"notes").await?;
    let artifact = StagedArtifact {
        name: "notes.txt".into(),
        path: path.clone(),
        mime_type: "text/plain".into(),
        size_bytes: 5,
        is_directory: false,
    };
    let ctx = TransferContext::new(
        job(Route::DirectToMega, "https://host/notes.txt", "uid"),
        staging.path().to_path_buf(),
        Arc::new(RecordingProgress::default()),
    );

    let link = MegaSink::new(config(bin.path())?).publish(&ctx, &artifact).await?;
    assert_eq!(link, "https://mega.nz/file/Xy12#secret");
    let put_args = tokio::fs::read_to_string(bin.path().join("put.args")).await?;
    assert_eq!(put_args.trim(), format!("-c {} /Ferry/", path.display()));
    Ok(())
}

#[tokio::test]
async fn export_without_link_is_a_publish_failure() -> anyhow::Result<()> {
    let bin = tempfile::tempdir()?;
    let staging = tempfile::tempdir()?;
    let path = staging.path().join("a.bin");
    tokio::fs::write(&path, b"a").await?;
    let config = MegaConfig {
        put_bin: script(bin.path(), "mega-put", "exit 0")?,
        export_bin: script(bin.path(), "mega-export", "echo '[API:err]: access denied'")?,
        ..MegaConfig::default()
    };
    let ctx = TransferContext::new(
        job(Route::GDriveToMega, "https://drive.google.com/file/d/x/view", "uid"),
        staging.path().to_path_buf(),
        Arc::new(RecordingProgress::default()),
    );
    let artifact = StagedArtifact {
        name: "a.bin".into(),
        path,
        mime_type: "application/octet-stream".into(),
        size_bytes: 1,
        is_directory: false,
    };
    let err = MegaSink::new(config).publish(&ctx, &artifact).await.unwrap_err();
    assert_eq!(err.kind(), "publish_failure");
    Ok(())
}
