//! Uploaded files spooled to disk before they are handed to the asset store.

use std::io::Write;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use tempfile::NamedTempFile;

/// A file received with a create or update request.
///
/// The spool file is removed when the value is dropped.
#[derive(Debug)]
pub struct Upload {
    file: NamedTempFile,
    mime: Option<String>,
}

impl Upload {
    pub fn new(file: NamedTempFile, mime: Option<String>) -> Self {
        Self { file, mime }
    }

    /// Writes `bytes` into a fresh file under `dir` on the blocking pool.
    pub async fn spool(dir: PathBuf, bytes: Bytes, mime: Option<String>) -> std::io::Result<Self> {
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
            let mut file = tempfile::Builder::new()
                .prefix("upload-")
                .tempfile_in(&dir)?;
            file.write_all(&bytes)?;
            file.flush()?;
            Ok(file)
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(Self::new(file, mime))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spool_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let upload = Upload::spool(
            dir.path().to_path_buf(),
            Bytes::from_static(b"image-bytes"),
            Some("image/png".into()),
        )
        .await
        .unwrap();
        let path = upload.path().to_path_buf();

        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"image-bytes");
        assert_eq!(upload.mime(), Some("image/png"));

        drop(upload);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn spool_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Upload::spool(dir.path().join("gone"), Bytes::from_static(b"x"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
