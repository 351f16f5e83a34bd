use std::path::{Path, PathBuf};

use bix_types::{PipelineError, Result};
use tracing::{debug, error, warn};

/// Require an empty staging directory before a run writes anything.
///
/// Anything already present is left over from a run that did not finish.
/// The leftovers are deleted, but the run is still refused so the earlier
/// failure gets looked at. A missing directory is created.
pub async fn ensure_empty_staging(dir: &Path) -> Result<()> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(PipelineError::Config(format!(
                "Staging path {} is not a directory",
                dir.display()
            )));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| PipelineError::fs(dir, e))?;
            debug!(dir = %dir.display(), "Created staging directory");
            return Ok(());
        }
        Err(e) => return Err(PipelineError::fs(dir, e)),
    }

    let entries = list_entries(dir).await?;
    if entries.is_empty() {
        debug!(dir = %dir.display(), "Staging directory is empty");
        return Ok(());
    }

    warn!(
        dir = %dir.display(),
        count = entries.len(),
        "Stray files found in staging directory, deleting"
    );

    for (path, is_dir) in &entries {
        let removed = if *is_dir {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        if let Err(e) = removed {
            error!(path = %path.display(), error = %e, "Failed to delete stray entry");
        }
    }

    Err(PipelineError::WorkspaceDirty {
        count: entries.len(),
        dir: dir.to_path_buf(),
    })
}

async fn list_entries(dir: &Path) -> Result<Vec<(PathBuf, bool)>> {
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| PipelineError::fs(dir, e))?;

    let mut entries = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| PipelineError::fs(dir, e))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        entries.push((entry.path(), is_dir));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_directory_passes() {
        let tmp = tempfile::tempdir().unwrap();
        ensure_empty_staging(tmp.path()).await.unwrap();
    }

    #[tokio::test]
    async fn missing_directory_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = tmp.path().join("staging");
        ensure_empty_staging(&staging).await.unwrap();
        assert!(staging.is_dir());
    }

    #[tokio::test]
    async fn stray_files_are_deleted_and_run_refused() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("testfile.csv"), "*1,2*").unwrap();
        std::fs::write(tmp.path().join("testfile_enc.csv"), "xx").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested/left.txt"), "x").unwrap();

        let err = ensure_empty_staging(tmp.path()).await.unwrap_err();
        match err {
            PipelineError::WorkspaceDirty { count, dir } => {
                assert_eq!(count, 3);
                assert_eq!(dir, tmp.path());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn second_check_after_cleanup_passes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("old.csv"), "x").unwrap();
        assert!(ensure_empty_staging(tmp.path()).await.is_err());
        ensure_empty_staging(tmp.path()).await.unwrap();
    }

    #[tokio::test]
    async fn file_in_place_of_directory_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();
        let err = ensure_empty_staging(&file).await.unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
