use sqlx::{Executor, Sqlite, SqlitePool, Transaction};
use time::OffsetDateTime;

use super::repo_types::{name_initial, Contact, ContactFields};

const CONTACT_COLUMNS: &str = "id, owner_id, name, email, phone, attachment_ref, created_at";

/// Owner-scoped contact persistence. Every statement filters on `owner_id`, so a row that
/// belongs to someone else looks exactly like a missing one.
#[derive(Clone)]
pub struct ContactRepository {
    db: SqlitePool,
}

impl ContactRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn begin(&self) -> sqlx::Result<Transaction<'static, Sqlite>> {
        self.db.begin().await
    }

    pub async fn insert(
        &self,
        owner_id: i64,
        fields: &ContactFields,
        attachment_ref: Option<&str>,
    ) -> sqlx::Result<Contact> {
        sqlx::query_as::<_, Contact>(&format!(
            r#"
            INSERT INTO contacts (owner_id, name, name_initial, email, phone, attachment_ref, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(owner_id)
        .bind(&fields.name)
        .bind(name_initial(&fields.name))
        .bind(&fields.email)
        .bind(&fields.phone)
        .bind(attachment_ref)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.db)
        .await
    }

    pub async fn find(&self, owner_id: i64, id: i64) -> sqlx::Result<Option<Contact>> {
        find(&self.db, owner_id, id).await
    }

    pub async fn update(
        &self,
        owner_id: i64,
        id: i64,
        fields: &ContactFields,
        attachment_ref: Option<&str>,
    ) -> sqlx::Result<Option<Contact>> {
        update(&self.db, owner_id, id, fields, attachment_ref).await
    }

    /// Removes the row and hands it back so the caller can clean up its file.
    pub async fn delete(&self, owner_id: i64, id: i64) -> sqlx::Result<Option<Contact>> {
        sqlx::query_as::<_, Contact>(&format!(
            r#"
            DELETE FROM contacts
            WHERE id = ? AND owner_id = ?
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await
    }

    pub async fn count(&self, owner_id: i64, initial: Option<&str>) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM contacts
            WHERE owner_id = ? AND (? IS NULL OR name_initial = ?)
            "#,
        )
        .bind(owner_id)
        .bind(initial)
        .bind(initial)
        .fetch_one(&self.db)
        .await
    }

    pub async fn list_window(
        &self,
        owner_id: i64,
        initial: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> sqlx::Result<Vec<Contact>> {
        sqlx::query_as::<_, Contact>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS}
            FROM contacts
            WHERE owner_id = ? AND (? IS NULL OR name_initial = ?)
            ORDER BY id ASC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(owner_id)
        .bind(initial)
        .bind(initial)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
    }
}

pub async fn find<'e, E>(exec: E, owner_id: i64, id: i64) -> sqlx::Result<Option<Contact>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Contact>(&format!(
        r#"
        SELECT {CONTACT_COLUMNS}
        FROM contacts
        WHERE id = ? AND owner_id = ?
        "#
    ))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(exec)
    .await
}

/// `attachment_ref = None` keeps the current photo.
pub async fn update<'e, E>(
    exec: E,
    owner_id: i64,
    id: i64,
    fields: &ContactFields,
    attachment_ref: Option<&str>,
) -> sqlx::Result<Option<Contact>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Contact>(&format!(
        r#"
        UPDATE contacts
        SET name = ?, name_initial = ?, email = ?, phone = ?,
            attachment_ref = COALESCE(?, attachment_ref)
        WHERE id = ? AND owner_id = ?
        RETURNING {CONTACT_COLUMNS}
        "#
    ))
    .bind(&fields.name)
    .bind(name_initial(&fields.name))
    .bind(&fields.email)
    .bind(&fields.phone)
    .bind(attachment_ref)
    .bind(id)
    .bind(owner_id)
    .fetch_optional(exec)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::CredentialStore, db::test_pool};

    fn fields(name: &str) -> ContactFields {
        ContactFields {
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: "555-0100".into(),
        }
    }

    async fn setup() -> (ContactRepository, i64, i64) {
        let db = test_pool().await;
        let users = CredentialStore::new(db.clone());
        let a = users.register("A", "a@x.com", "password-1").await.unwrap();
        let b = users.register("B", "b@x.com", "password-1").await.unwrap();
        (ContactRepository::new(db), a.id, b.id)
    }

    #[tokio::test]
    async fn crud_is_owner_scoped() {
        let (repo, a, b) = setup().await;
        let c = repo.insert(a, &fields("Ana"), None).await.unwrap();
        assert_eq!(c.owner_id, a);

        assert!(repo.find(a, c.id).await.unwrap().is_some());
        assert!(repo.find(b, c.id).await.unwrap().is_none());

        let changed = fields("Bia");
        assert!(repo.update(b, c.id, &changed, None).await.unwrap().is_none());
        assert!(repo.delete(b, c.id).await.unwrap().is_none());
        assert_eq!(repo.find(a, c.id).await.unwrap().unwrap().name, "Ana");

        let r = "contacts_photos/5f0c3c4e-6d8f-4a5b-9b62-2f0c2a3c4d5e.png";
        let with_photo = repo.update(a, c.id, &changed, Some(r)).await.unwrap().unwrap();
        assert_eq!(with_photo.name, "Bia");
        assert_eq!(with_photo.attachment_ref.as_deref(), Some(r));

        let kept = repo.update(a, c.id, &fields("Cleo"), None).await.unwrap().unwrap();
        assert_eq!(kept.attachment_ref.as_deref(), Some(r));

        let removed = repo.delete(a, c.id).await.unwrap().unwrap();
        assert_eq!(removed.id, c.id);
        assert!(repo.find(a, c.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn attachment_refs_are_unique() {
        let (repo, a, b) = setup().await;
        let r = "contacts_photos/5f0c3c4e-6d8f-4a5b-9b62-2f0c2a3c4d5e.png";
        repo.insert(a, &fields("Ana"), Some(r)).await.unwrap();
        assert!(repo.insert(b, &fields("Bob"), Some(r)).await.is_err());
    }

    #[tokio::test]
    async fn filtered_count_and_window() {
        let (repo, a, _b) = setup().await;
        for name in ["Ana", "bob", "alice", "Carl"] {
            repo.insert(a, &fields(name), None).await.unwrap();
        }
        assert_eq!(repo.count(a, None).await.unwrap(), 4);
        assert_eq!(repo.count(a, Some("a")).await.unwrap(), 2);

        let window = repo.list_window(a, None, 2, 1).await.unwrap();
        let names: Vec<_> = window.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["bob", "alice"]);
    }
}
