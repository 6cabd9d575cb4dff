use std::path::PathBuf;

use anyhow::Context;
use jsonwebtoken::Algorithm;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub media_root: PathBuf,
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let secret = lookup("JWT_SECRET").context("JWT_SECRET must be set")?;
        anyhow::ensure!(!secret.trim().is_empty(), "JWT_SECRET must not be empty");
        let algorithm = parse_algorithm(lookup("JWT_ALG").as_deref().unwrap_or("HS256"))?;
        let ttl_minutes = parse_or(&lookup, "JWT_TTL_MINUTES", 60i64)?;
        anyhow::ensure!(ttl_minutes > 0, "JWT_TTL_MINUTES must be positive");

        let media_root = lookup("MEDIA_ROOT").unwrap_or_else(|| "media".into());
        let public_base_url = lookup("PUBLIC_BASE_URL")
            .unwrap_or_else(|| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            database_url,
            max_connections,
            jwt: JwtConfig {
                secret,
                algorithm,
                ttl_minutes,
            },
            storage: StorageConfig {
                media_root: PathBuf::from(media_root),
                public_base_url,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {v}")),
        None => Ok(default),
    }
}

// Tokens are signed with a shared secret, so only the HMAC family makes sense here.
fn parse_algorithm(raw: &str) -> anyhow::Result<Algorithm> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => anyhow::bail!("unsupported JWT_ALG {other}; expected HS256, HS384 or HS512"),
    }
}
