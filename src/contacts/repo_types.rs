use sqlx::FromRow;
use time::OffsetDateTime;

use crate::photos::{services::AttachmentError, StoredRef};

/// Contact row. `attachment_ref` is the relative path handed out by the attachment manager.
#[derive(Debug, Clone, FromRow)]
pub struct Contact {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub attachment_ref: Option<String>,
    pub created_at: OffsetDateTime,
}

impl Contact {
    pub fn stored_ref(&self) -> Result<Option<StoredRef>, AttachmentError> {
        self.attachment_ref
            .as_deref()
            .map(StoredRef::parse)
            .transpose()
    }
}

/// Validated, owner-independent contact fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactFields {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Lowercased first character of a name; what the `starts_with` filter compares against.
pub fn name_initial(name: &str) -> String {
    name.chars()
        .next()
        .map(|c| c.to_lowercase().collect())
        .unwrap_or_default()
}
