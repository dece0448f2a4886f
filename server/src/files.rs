//! Small filesystem helpers for state and snapshot files.

use std::io;
use std::path::Path;
use tokio::fs;

/// Write `contents` to `path` through a temporary sibling that is persisted
/// over the target, so readers never observe a partially written file. The
/// temporary file is removed if any step fails.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).await?;

    let temp_file = tempfile::NamedTempFile::new_in(parent)?;
    fs::write(temp_file.path(), contents).await?;

    let temp_path = temp_file.into_temp_path();
    temp_path.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a file, mapping "does not exist" to `None`.
pub async fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Remove a file; a missing file is not an error.
pub async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_atomic(&path, b"one").await.unwrap();
        write_atomic(&path, b"two").await.unwrap();

        assert_eq!(read_optional(&path).await.unwrap().as_deref(), Some("two"));

        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["state.json".to_string()]);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("inside"), "x").unwrap();

        assert!(write_atomic(&path, b"data").await.is_err());

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["taken".to_string()]);
    }

    #[tokio::test]
    async fn missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        assert_eq!(read_optional(&path).await.unwrap(), None);
        remove_if_exists(&path).await.unwrap();
    }
}
