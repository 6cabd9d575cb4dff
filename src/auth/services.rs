use lazy_static::lazy_static;
use regex::Regex;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use super::password::{hash_password, verify_password};
use super::repo_types::User;
use crate::error::{AppError, AppResult};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 100;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Emails are compared lowercase-to-lowercase, independent of database collation.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// User identity and password verification over an explicitly owned pool.
#[derive(Clone)]
pub struct CredentialStore {
    db: SqlitePool,
}

impl CredentialStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> AppResult<User> {
        let name = name.trim();
        let email = normalize_email(email);

        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::validation(format!(
                "name must be between 1 and {MAX_NAME_LEN} characters"
            )));
        }
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AppError::validation("invalid email"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let hash = hash_password(password)?;

        // No lookup first: the UNIQUE constraint settles concurrent registrations.
        match User::create(&self.db, name, &email, &hash).await {
            Ok(user) => {
                info!(user_id = user.id, email = %user.email, "user registered");
                Ok(user)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                warn!(email = %email, "email already registered");
                Err(AppError::DuplicateEmail)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Unknown email and wrong password fail identically.
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<User> {
        let email = normalize_email(email);

        let Some(user) = User::find_by_email(&self.db, &email).await? else {
            warn!("login unknown email");
            return Err(AppError::InvalidCredentials);
        };

        match verify_password(password, &user.password_hash) {
            Ok(true) => {
                info!(user_id = user.id, "user logged in");
                Ok(user)
            }
            Ok(false) => {
                warn!(user_id = user.id, "login invalid password");
                Err(AppError::InvalidCredentials)
            }
            Err(e) => {
                error!(error = %e, user_id = user.id, "stored password hash unreadable");
                Err(AppError::InvalidCredentials)
            }
        }
    }

    pub async fn find_by_id(&self, id: i64) -> AppResult<Option<User>> {
        Ok(User::find_by_id(&self.db, id).await?)
    }
}
