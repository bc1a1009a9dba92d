use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::BlobError;
use crate::store::{BlobEntry, BlobHandle, BlobStore};

/// Name prefix for in-progress writes. Such files are never listed.
const PARTIAL_PREFIX: &str = ".ferry-partial-";

/// Name prefix for the startup self-check file.
const HEALTH_CHECK_PREFIX: &str = ".ferry-health-check-";

/// Blob store backed by a local directory.
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check that the root can be written, read back, and cleaned up.
    ///
    /// Meant to run once at startup so permission problems surface before
    /// the first upload does.
    pub async fn validate(&self) -> Result<(), BlobError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| BlobError::Validation(format!("create {}: {e}", self.root.display())))?;

        let probe = self
            .root
            .join(format!("{HEALTH_CHECK_PREFIX}{}", Uuid::new_v4().simple()));
        let payload = b"ferry-storage-check";

        fs::write(&probe, payload)
            .await
            .map_err(|e| BlobError::Validation(format!("write {}: {e}", probe.display())))?;

        let read_back = fs::read(&probe).await;
        let removed = fs::remove_file(&probe).await;

        match read_back {
            Ok(data) if data == payload => {}
            Ok(_) => return Err(BlobError::Validation("read-back mismatch".into())),
            Err(e) => {
                return Err(BlobError::Validation(format!(
                    "read {}: {e}",
                    probe.display()
                )));
            }
        }
        removed.map_err(|e| BlobError::Validation(format!("remove {}: {e}", probe.display())))?;

        debug!(root = %self.root.display(), "blob storage validated");
        Ok(())
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        validate_relative(path)?;
        Ok(self.root.join(path))
    }

    fn relative(&self, full: &Path) -> String {
        let rel = full.strip_prefix(&self.root).unwrap_or(full);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    async fn write_partial(temp: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(temp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(())
    }
}

/// Accept only non-empty paths made of plain components.
fn validate_relative(path: &str) -> Result<(), BlobError> {
    if path.is_empty() || path.contains('\\') || path.contains('\0') {
        return Err(BlobError::InvalidPath(path.to_owned()));
    }
    let plain = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if plain {
        Ok(())
    } else {
        Err(BlobError::InvalidPath(path.to_owned()))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn write(&self, path: &str, data: Bytes) -> Result<(), BlobError> {
        let full = self.resolve(path)?;
        debug!(path, size = data.len(), "blob write");

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::io(path, e))?;
        }

        let temp = full.with_file_name(format!("{PARTIAL_PREFIX}{}", Uuid::new_v4().simple()));
        if let Err(e) = Self::write_partial(&temp, &data).await {
            warn!(path, error = %e, "blob write failed");
            let _ = fs::remove_file(&temp).await;
            return Err(BlobError::io(path, e));
        }

        // hard_link refuses to replace an existing file, unlike rename.
        let linked = fs::hard_link(&temp, &full).await;
        if let Err(e) = fs::remove_file(&temp).await {
            warn!(path, error = %e, "failed to remove partial blob");
        }

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(BlobError::AlreadyExists(path.to_owned()))
            }
            Err(e) => Err(BlobError::io(path, e)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, BlobError> {
        let full = self.resolve(path)?;
        fs::try_exists(&full)
            .await
            .map_err(|e| BlobError::io(path, e))
    }

    async fn open(&self, path: &str) -> Result<Option<BlobHandle>, BlobError> {
        let full = self.resolve(path)?;
        let file = match fs::File::open(&full).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BlobError::io(path, e)),
        };
        let meta = file.metadata().await.map_err(|e| BlobError::io(path, e))?;
        if !meta.is_file() {
            return Ok(None);
        }
        Ok(Some(BlobHandle::new(meta.len(), Box::new(file))))
    }

    async fn delete(&self, path: &str) -> Result<bool, BlobError> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => {
                debug!(path, "blob deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BlobError::io(path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, BlobError> {
        let trimmed = prefix.trim_matches('/');
        let start = if trimmed.is_empty() {
            self.root.clone()
        } else {
            self.resolve(trimmed)?
        };

        let mut entries = Vec::new();
        let mut pending = vec![start];

        while let Some(dir) = pending.pop() {
            let mut read_dir = match fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(BlobError::io(self.relative(&dir), e)),
            };

            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| BlobError::io(self.relative(&dir), e))?
            {
                let entry_path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| BlobError::io(self.relative(&entry_path), e))?;

                if file_type.is_dir() {
                    pending.push(entry_path);
                    continue;
                }

                let name = entry.file_name();
                let name = name.to_string_lossy();
                if !file_type.is_file()
                    || name.starts_with(PARTIAL_PREFIX)
                    || name.starts_with(HEALTH_CHECK_PREFIX)
                {
                    continue;
                }

                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    // Removed between readdir and stat.
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(BlobError::io(self.relative(&entry_path), e)),
                };
                // Unknown mtimes read as "just now" so they fall inside any grace window.
                let modified_at = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                entries.push(BlobEntry {
                    path: self.relative(&entry_path),
                    size: meta.len(),
                    modified_at,
                });
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}
