use std::{fmt, future::Future, sync::Arc};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::StorageClient;

/// Every stored photo lives under this folder of the media root.
pub const PHOTO_DIR: &str = "contacts_photos";

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic"];

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("unsupported file extension {0:?}")]
    UnsupportedExtension(String),
    #[error("uploaded file is empty")]
    Empty,
    #[error("invalid stored reference {0:?}")]
    InvalidRef(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<AttachmentError> for AppError {
    fn from(e: AttachmentError) -> Self {
        match e {
            AttachmentError::UnsupportedExtension(ext) => AppError::validation(format!(
                "unsupported photo extension {ext:?}; allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )),
            AttachmentError::Empty => AppError::validation("photo is empty"),
            AttachmentError::InvalidRef(r) => {
                AppError::Internal(anyhow::anyhow!("corrupt attachment reference {r:?}"))
            }
            AttachmentError::Storage(e) => AppError::Internal(e),
        }
    }
}

/// Handle to one stored photo: `contacts_photos/<uuid>.<ext>`, relative to the media root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredRef(String);

impl StoredRef {
    fn generate(ext: &str) -> Self {
        Self(format!("{PHOTO_DIR}/{}.{ext}", Uuid::new_v4()))
    }

    /// Accepts only references this module could have produced.
    pub fn parse(raw: &str) -> Result<Self, AttachmentError> {
        let invalid = || AttachmentError::InvalidRef(raw.to_string());
        let file = raw
            .strip_prefix(PHOTO_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(invalid)?;
        let (stem, ext) = file.rsplit_once('.').ok_or_else(invalid)?;
        if Uuid::parse_str(stem).is_err() || !ALLOWED_EXTENSIONS.contains(&ext) {
            return Err(invalid());
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoredRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stale file that could not be removed. The operation that produced it still succeeded.
#[derive(Debug, Clone)]
pub struct CleanupWarning {
    pub stored_ref: StoredRef,
    pub reason: String,
}

#[derive(Debug)]
pub struct Replacement {
    pub stored: StoredRef,
    pub warning: Option<CleanupWarning>,
}

#[derive(Clone)]
pub struct AttachmentManager {
    storage: Arc<dyn StorageClient>,
    public_base_url: String,
}

impl AttachmentManager {
    pub fn new(storage: Arc<dyn StorageClient>, public_base_url: impl Into<String>) -> Self {
        Self {
            storage,
            public_base_url: public_base_url.into(),
        }
    }

    pub async fn store(&self, body: Bytes, extension: &str) -> Result<StoredRef, AttachmentError> {
        let ext = sanitize_extension(extension)?;
        if body.is_empty() {
            return Err(AttachmentError::Empty);
        }
        let stored = StoredRef::generate(ext);
        let size = body.len();
        self.storage.put_object(stored.as_str(), body).await?;
        debug!(stored_ref = %stored, size, "attachment stored");
        Ok(stored)
    }

    /// Stores the new file, runs `commit` with its reference, and only then removes
    /// `existing`. If `commit` fails the new file is discarded and `existing` is untouched,
    /// so the record never points at a missing file.
    pub async fn replace<T, E, F, Fut>(
        &self,
        existing: Option<&StoredRef>,
        body: Bytes,
        extension: &str,
        commit: F,
    ) -> Result<(T, Replacement), E>
    where
        F: FnOnce(StoredRef) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AttachmentError>,
    {
        let stored = self.store(body, extension).await?;
        let committed = match commit(stored.clone()).await {
            Ok(v) => v,
            Err(e) => {
                self.discard(&stored).await;
                return Err(e);
            }
        };
        let warning = match existing {
            Some(old) => self.discard(old).await,
            None => None,
        };
        Ok((committed, Replacement { stored, warning }))
    }

    pub async fn remove(&self, stored: &StoredRef) -> Result<(), AttachmentError> {
        let existed = self.storage.delete_object(stored.as_str()).await?;
        if !existed {
            debug!(stored_ref = %stored, "attachment already absent");
        }
        Ok(())
    }

    /// Best-effort `remove`: failures are logged and handed back instead of propagated.
    pub async fn discard(&self, stored: &StoredRef) -> Option<CleanupWarning> {
        match self.remove(stored).await {
            Ok(()) => None,
            Err(e) => {
                warn!(stored_ref = %stored, error = %e, "could not remove stale attachment");
                Some(CleanupWarning {
                    stored_ref: stored.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    pub fn public_url(&self, stored: &StoredRef) -> String {
        format!("{}/media/{}", self.public_base_url, stored)
    }
}

pub fn sanitize_extension(raw: &str) -> Result<&'static str, AttachmentError> {
    let ext = raw.trim().trim_start_matches('.').to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .copied()
        .find(|allowed| *allowed == ext)
        .ok_or(AttachmentError::UnsupportedExtension(ext))
}

/// Used when an upload has no usable file name.
pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use async_trait::async_trait;

    async fn manager(dir: &tempfile::TempDir) -> AttachmentManager {
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        AttachmentManager::new(Arc::new(storage), "http://localhost:8080")
    }

    fn on_disk(dir: &tempfile::TempDir, stored: &StoredRef) -> std::path::PathBuf {
        dir.path().join(stored.as_str())
    }

    #[test]
    fn sanitizes_against_allow_list() {
        assert_eq!(sanitize_extension(".PNG").unwrap(), "png");
        assert_eq!(sanitize_extension("jpeg").unwrap(), "jpeg");
        assert!(matches!(
            sanitize_extension(".php"),
            Err(AttachmentError::UnsupportedExtension(e)) if e == "php"
        ));
        assert!(sanitize_extension("../../etc/passwd").is_err());
        assert!(sanitize_extension("").is_err());
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn parse_rejects_foreign_refs() {
        let good = StoredRef::generate("png");
        assert_eq!(StoredRef::parse(good.as_str()).unwrap(), good);
        assert!(StoredRef::parse("contacts_photos/../secret.png").is_err());
        assert!(StoredRef::parse("other/5f0c3c4e-6d8f-4a5b-9b62-2f0c2a3c4d5e.png").is_err());
        assert!(StoredRef::parse("contacts_photos/5f0c3c4e-6d8f-4a5b-9b62-2f0c2a3c4d5e.exe").is_err());
    }

    #[tokio::test]
    async fn store_writes_under_photo_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir).await;

        let stored = mgr.store(Bytes::from_static(b"img"), ".JPG").await.unwrap();
        assert!(stored.as_str().starts_with("contacts_photos/"));
        assert!(stored.as_str().ends_with(".jpg"));
        assert_eq!(std::fs::read(on_disk(&dir, &stored)).unwrap(), b"img");
        assert_eq!(
            mgr.public_url(&stored),
            format!("http://localhost:8080/media/{stored}")
        );
    }

    #[tokio::test]
    async fn store_rejects_bad_input_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir).await;

        assert!(matches!(
            mgr.store(Bytes::from_static(b"x"), "sh").await,
            Err(AttachmentError::UnsupportedExtension(_))
        ));
        assert!(matches!(
            mgr.store(Bytes::new(), "png").await,
            Err(AttachmentError::Empty)
        ));
        assert!(!dir.path().join(PHOTO_DIR).exists());
    }

    #[tokio::test]
    async fn replace_removes_old_and_yields_distinct_ref() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir).await;

        let old = mgr.store(Bytes::from_static(b"old"), "png").await.unwrap();
        let (committed, replaced) = mgr
            .replace(Some(&old), Bytes::from_static(b"new"), "webp", |stored| async move {
                Ok::<_, AttachmentError>(stored)
            })
            .await
            .unwrap();

        assert_eq!(committed, replaced.stored);
        assert_ne!(replaced.stored, old);
        assert!(replaced.warning.is_none());
        assert!(!on_disk(&dir, &old).exists());
        assert_eq!(std::fs::read(on_disk(&dir, &replaced.stored)).unwrap(), b"new");
    }

    #[tokio::test]
    async fn failed_commit_keeps_old_and_discards_new() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir).await;

        let old = mgr.store(Bytes::from_static(b"old"), "png").await.unwrap();
        let mut attempted = None;
        let err = mgr
            .replace(Some(&old), Bytes::from_static(b"new"), "png", |stored| {
                attempted = Some(stored);
                async { Err::<(), _>(AttachmentError::Storage(anyhow::anyhow!("row update failed"))) }
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("row update failed"));
        assert!(on_disk(&dir, &old).exists());
        assert!(!on_disk(&dir, &attempted.unwrap()).exists());
    }

    #[tokio::test]
    async fn replace_skips_commit_on_rejected_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir).await;

        let mut called = false;
        let err = mgr
            .replace(None, Bytes::from_static(b"x"), "exe", |_| {
                called = true;
                async { Ok::<(), AttachmentError>(()) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::UnsupportedExtension(_)));
        assert!(!called);
    }

    #[tokio::test]
    async fn remove_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir).await;

        let stored = mgr.store(Bytes::from_static(b"a"), "gif").await.unwrap();
        mgr.remove(&stored).await.unwrap();
        mgr.remove(&stored).await.unwrap();
        assert!(!dir.path().join(stored.as_str()).exists());
    }

    #[tokio::test]
    async fn refs_never_collide_after_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir).await;

        let first = mgr.store(Bytes::from_static(b"a"), "png").await.unwrap();
        mgr.remove(&first).await.unwrap();
        let second = mgr.store(Bytes::from_static(b"b"), "png").await.unwrap();
        assert_ne!(first, second);
    }

    struct StuckDeletes;

    #[async_trait]
    impl StorageClient for StuckDeletes {
        async fn put_object(&self, _k: &str, _b: Bytes) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_object(&self, k: &str) -> anyhow::Result<bool> {
            anyhow::bail!("permission denied: {k}")
        }
    }

    #[tokio::test]
    async fn replace_reports_cleanup_failure_as_warning() {
        let mgr = AttachmentManager::new(Arc::new(StuckDeletes), "http://h");
        let old = StoredRef::generate("png");

        let ((), replaced) = mgr
            .replace(Some(&old), Bytes::from_static(b"new"), "png", |_| async {
                Ok::<(), AttachmentError>(())
            })
            .await
            .expect("replace must not fail on cleanup");

        let warning = replaced.warning.expect("cleanup warning surfaced");
        assert_eq!(warning.stored_ref, old);
        assert!(warning.reason.contains("permission denied"));
    }
}
