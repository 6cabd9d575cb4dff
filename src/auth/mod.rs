use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
mod password;
mod repo;
pub mod repo_types;
pub mod services;

pub use extractors::{CurrentUser, Principal};
pub use jwt::TokenService;
pub use services::CredentialStore;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
