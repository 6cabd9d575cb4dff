use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Serialize;
use tracing::{debug, warn};

use super::{jwt::TokenService, services::CredentialStore};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

/// The caller's identity, trusted for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: i64,
    pub email: String,
    pub name: String,
}

/// Turns an `Authorization` header into a [`Principal`]. Every call re-verifies; nothing is cached.
pub struct AuthGuard<'a> {
    tokens: &'a TokenService,
    users: &'a CredentialStore,
}

impl<'a> AuthGuard<'a> {
    pub fn new(tokens: &'a TokenService, users: &'a CredentialStore) -> Self {
        Self { tokens, users }
    }

    pub async fn resolve(&self, raw_header: Option<&str>) -> AppResult<Principal> {
        let header = raw_header.ok_or(AppError::Unauthorized("Missing Authorization header"))?;
        let token = bearer_token(header)
            .ok_or(AppError::Unauthorized("Invalid Authorization header"))?;

        let claims = self.tokens.validate(token).map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            AppError::Unauthorized("Invalid or expired token")
        })?;

        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| AppError::Unauthorized("Invalid credentials"))?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Unauthorized("Invalid credentials"))?;

        if !user.is_active {
            warn!(user_id, "inactive user presented a valid token");
            return Err(AppError::Forbidden);
        }

        debug!(user_id, "request authenticated");
        Ok(Principal {
            id: user.id,
            email: user.email,
            name: user.name,
        })
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Extractor for protected handlers; rejects before the handler body runs.
pub struct CurrentUser(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // A header that is present but not valid UTF-8 is treated like a malformed one.
        let raw = match parts.headers.get(AUTHORIZATION) {
            Some(v) => Some(
                v.to_str()
                    .map_err(|_| AppError::Unauthorized("Invalid Authorization header"))?,
            ),
            None => None,
        };
        let guard = AuthGuard::new(&state.tokens, &state.credentials);
        guard.resolve(raw).await.map(CurrentUser)
    }
}
