use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::query::{Page, DEFAULT_LIMIT};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub starts_with: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}
fn default_page() -> i64 {
    1
}
fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

/// Raw multipart form for create and update; fields are validated by the service.
#[derive(Debug, Default)]
pub struct ContactForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub photo: Option<PhotoUpload>,
}

#[derive(Debug)]
pub struct PhotoUpload {
    pub body: Bytes,
    pub extension: String,
}

#[derive(Debug, Serialize)]
pub struct ContactOut {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub photo: Option<String>, // absolute URL
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct PaginationOut {
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub total_items: i64,
}

#[derive(Debug, Serialize)]
pub struct ContactsResponse {
    pub contacts: Vec<ContactOut>,
    pub pagination: PaginationOut,
}

impl From<Page<ContactOut>> for ContactsResponse {
    fn from(p: Page<ContactOut>) -> Self {
        Self {
            contacts: p.items,
            pagination: PaginationOut {
                page: p.page,
                limit: p.limit,
                total_pages: p.total_pages,
                total_items: p.total_items,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedContactResponse {
    pub message: &'static str,
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
