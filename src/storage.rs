use std::{io::ErrorKind, path::PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use tracing::warn;

/// Byte-level object store keyed by relative, `/`-separated paths.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()>;
    /// Returns `false` when there was nothing to delete.
    async fn delete_object(&self, key: &str) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create media root {}", root.display()))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create dir {}", parent.display()))?;
        }

        // Write under a temporary name and rename, so a reader never sees half a file.
        let partial = path.with_extension("part");
        let written = async {
            let mut file = fs::File::create(&partial)
                .await
                .with_context(|| format!("create {}", partial.display()))?;
            file.write_all(&body)
                .await
                .with_context(|| format!("write {}", partial.display()))?;
            file.sync_all().await.context("fsync object")?;
            drop(file);

            fs::rename(&partial, &path)
                .await
                .with_context(|| format!("rename into {}", path.display()))
        }
        .await;

        if written.is_err() {
            if let Err(e) = fs::remove_file(&partial).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %partial.display(), error = %e, "could not remove partial upload");
                }
            }
        }
        written
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
}
