//! File storage for original and signed PDFs.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{DocError, Result};

pub const DEFAULT_DOCS_DIR: &str = "./docs";

/// Separate locations for files uploaded by the admin and countersigned copies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobArea {
    Uploads,
    Signed,
}

impl BlobArea {
    pub fn dir_name(&self) -> &'static str {
        match self {
            BlobArea::Uploads => "uploads",
            BlobArea::Signed => "signed",
        }
    }
}

/// Trait for blob storage backends
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` under `name` and return the location to record.
    async fn put(&self, area: BlobArea, name: &str, data: &[u8]) -> Result<String>;
    async fn remove(&self, location: &str) -> Result<()>;
}

/// Files on the local disk under `<root>/uploads` and `<root>/signed`.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create both area directories.
    pub async fn prepare(&self) -> Result<()> {
        for area in [BlobArea::Uploads, BlobArea::Signed] {
            let dir = self.root.join(area.dir_name());
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| DocError::storage("Could not create storage directory", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, area: BlobArea, name: &str, data: &[u8]) -> Result<String> {
        let dir = self.root.join(area.dir_name());
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| DocError::storage("Could not save file", e))?;
        let path = dir.join(name);

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| DocError::storage("Could not save file", e))?;
        let written = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path).await {
                warn!("Could not remove partial file {:?}: {}", path, cleanup);
            }
            return Err(DocError::storage("Could not save file", e));
        }

        debug!("Stored {} bytes at {:?}", data.len(), path);
        Ok(path.to_string_lossy().into_owned())
    }

    async fn remove(&self, location: &str) -> Result<()> {
        match fs::remove_file(location).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DocError::storage("Could not remove file", e)),
        }
    }
}

/// Extension of a client supplied filename, including the dot.
///
/// Only short alphanumeric extensions survive so a crafted name cannot steer
/// the stored path; anything else yields an empty string.
pub fn safe_extension(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match base.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 10
                && ext.bytes().all(|b| b.is_ascii_alphanumeric()) =>
        {
            format!(".{ext}")
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn extension_extraction() {
        assert_eq!(safe_extension("contract.pdf"), ".pdf");
        assert_eq!(safe_extension("a.b.PDF"), ".PDF");
        assert_eq!(safe_extension("noext"), "");
        assert_eq!(safe_extension(".hidden"), "");
        assert_eq!(safe_extension("evil.p/../df"), "");
        assert_eq!(safe_extension("dir\\x.pdf"), ".pdf");
        assert_eq!(safe_extension("x.pd f"), "");
    }

    #[tokio::test]
    async fn put_writes_into_area() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        store.prepare().await.unwrap();

        let loc = store.put(BlobArea::Signed, "signed_x.pdf", b"%PDF-1.4").await.unwrap();
        assert!(loc.ends_with("signed_x.pdf"));
        assert!(Path::new(&loc).starts_with(dir.path().join("signed")));
        assert_eq!(std::fs::read(&loc).unwrap(), b"%PDF-1.4");
        assert!(Path::new(&loc).is_file());
    }

    #[tokio::test]
    async fn put_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        store.put(BlobArea::Uploads, "a.pdf", b"one").await.unwrap();
        let err = store.put(BlobArea::Uploads, "a.pdf", b"two").await.unwrap_err();
        assert!(matches!(err, DocError::Storage { .. }));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let loc = store.put(BlobArea::Uploads, "a.pdf", b"x").await.unwrap();
        store.remove(&loc).await.unwrap();
        assert!(!Path::new(&loc).exists());
        store.remove(&loc).await.unwrap();
    }
}
