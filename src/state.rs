use crate::auth::{CredentialStore, TokenService};
use crate::config::AppConfig;
use crate::contacts::ContactRepository;
use crate::photos::AttachmentManager;
use crate::storage::{LocalStorage, StorageClient};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub tokens: TokenService,
    pub credentials: CredentialStore,
    pub contacts: ContactRepository,
    pub attachments: AttachmentManager,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = crate::db::connect(&config.database_url, config.max_connections).await?;
        crate::db::migrate(&db).await?;

        let storage =
            Arc::new(LocalStorage::new(&config.storage.media_root).await?) as Arc<dyn StorageClient>;

        Ok(Self::from_parts(db, config, storage))
    }

    pub fn from_parts(db: SqlitePool, config: Arc<AppConfig>, storage: Arc<dyn StorageClient>) -> Self {
        Self {
            tokens: TokenService::new(&config.jwt),
            credentials: CredentialStore::new(db.clone()),
            contacts: ContactRepository::new(db.clone()),
            attachments: AttachmentManager::new(storage, config.storage.public_base_url.clone()),
            db,
            config,
        }
    }

    /// In-memory database and a real media root under `media_root`.
    #[cfg(test)]
    pub async fn for_tests(media_root: &std::path::Path) -> Self {
        let storage = Arc::new(LocalStorage::new(media_root).await.expect("media root"))
            as Arc<dyn StorageClient>;
        Self::from_parts(crate::db::test_pool().await, Self::test_config(media_root), storage)
    }

    #[cfg(test)]
    pub fn test_config(media_root: &std::path::Path) -> Arc<AppConfig> {
        use crate::config::{JwtConfig, StorageConfig};

        Arc::new(AppConfig {
            database_url: "sqlite::memory:".into(),
            max_connections: 1,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                algorithm: jsonwebtoken::Algorithm::HS256,
                ttl_minutes: 5,
            },
            storage: StorageConfig {
                media_root: media_root.to_path_buf(),
                public_base_url: "http://localhost:8080".into(),
            },
        })
    }
}
