use tracing::{info, warn};

use super::dto::{ContactForm, ContactOut, PhotoUpload};
use super::repo;
use super::repo_types::{Contact, ContactFields};
use crate::{
    auth::{services::is_valid_email, Principal},
    error::{AppError, AppResult},
    photos::{CleanupWarning, StoredRef},
    state::AppState,
};

const MAX_NAME_LEN: usize = 100;
const MAX_PHONE_LEN: usize = 20;

pub fn validate_fields(
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
) -> AppResult<ContactFields> {
    let name = required("name", name)?;
    let email = required("email", email)?;
    let phone = required("phone", phone)?;

    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if phone.chars().count() > MAX_PHONE_LEN {
        return Err(AppError::validation(format!(
            "phone must be at most {MAX_PHONE_LEN} characters"
        )));
    }
    if !is_valid_email(&email) {
        return Err(AppError::validation("invalid email"));
    }
    Ok(ContactFields { name, email, phone })
}

fn required(field: &str, value: Option<String>) -> AppResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::validation(format!("{field} is required"))),
    }
}

/// A corrupt reference is never handed to the file system; it is logged and ignored.
fn owned_ref(contact: &Contact) -> Option<StoredRef> {
    contact.stored_ref().unwrap_or_else(|e| {
        warn!(contact_id = contact.id, error = %e, "ignoring unusable attachment reference");
        None
    })
}

pub fn to_out(st: &AppState, c: Contact) -> ContactOut {
    let photo = owned_ref(&c).map(|r| st.attachments.public_url(&r));
    ContactOut {
        id: c.id,
        name: c.name,
        email: c.email,
        phone: c.phone,
        photo,
        created_at: c.created_at,
    }
}

pub async fn get_contact(st: &AppState, owner: &Principal, id: i64) -> AppResult<Contact> {
    st.contacts.find(owner.id, id).await?.ok_or(AppError::NotFound)
}

/// The photo is written first; if the row cannot be inserted the file is removed again.
pub async fn create_contact(st: &AppState, owner: &Principal, form: ContactForm) -> AppResult<Contact> {
    let ContactForm {
        name,
        email,
        phone,
        photo,
    } = form;
    let fields = validate_fields(name, email, phone)?;

    let contact = match photo {
        None => st.contacts.insert(owner.id, &fields, None).await?,
        Some(PhotoUpload { body, extension }) => {
            let (contact, _) = st
                .attachments
                .replace(None, body, &extension, |stored| async move {
                    st.contacts
                        .insert(owner.id, &fields, Some(stored.as_str()))
                        .await
                        .map_err(AppError::from)
                })
                .await?;
            contact
        }
    };

    info!(contact_id = contact.id, owner_id = owner.id, "contact created");
    Ok(contact)
}

/// With a new photo the file is stored before any transaction opens, so no lock is held
/// across the upload. The row is then re-read, updated and committed in one short
/// transaction, and only after the commit is the old file removed.
pub async fn update_contact(
    st: &AppState,
    owner: &Principal,
    id: i64,
    form: ContactForm,
) -> AppResult<(Contact, Option<CleanupWarning>)> {
    let ContactForm {
        name,
        email,
        phone,
        photo,
    } = form;
    let fields = validate_fields(name, email, phone)?;

    let Some(PhotoUpload { body, extension }) = photo else {
        let contact = st
            .contacts
            .update(owner.id, id, &fields, None)
            .await?
            .ok_or(AppError::NotFound)?;
        info!(contact_id = id, owner_id = owner.id, "contact updated");
        return Ok((contact, None));
    };

    // Nothing is uploaded for a contact the caller cannot see.
    get_contact(st, owner, id).await?;

    let ((contact, old), replacement) = st
        .attachments
        .replace(None, body, &extension, |stored| async move {
            let mut tx = st.contacts.begin().await?;
            let current = repo::find(&mut *tx, owner.id, id)
                .await?
                .ok_or(AppError::NotFound)?;
            let updated = repo::update(&mut *tx, owner.id, id, &fields, Some(stored.as_str()))
                .await?
                .ok_or(AppError::NotFound)?;
            tx.commit().await?;
            Ok::<_, AppError>((updated, owned_ref(&current)))
        })
        .await?;

    let warning = match old {
        Some(old) => st.attachments.discard(&old).await,
        None => None,
    };
    info!(
        contact_id = id,
        owner_id = owner.id,
        stored_ref = %replacement.stored,
        "contact updated with new photo"
    );
    Ok((contact, warning))
}

/// Deletes the row first; the file is then removed best-effort.
pub async fn delete_contact(
    st: &AppState,
    owner: &Principal,
    id: i64,
) -> AppResult<Option<CleanupWarning>> {
    let removed = st
        .contacts
        .delete(owner.id, id)
        .await?
        .ok_or(AppError::NotFound)?;

    let warning = match owned_ref(&removed) {
        Some(stored) => st.attachments.discard(&stored).await,
        None => None,
    };
    info!(contact_id = id, owner_id = owner.id, "contact deleted");
    Ok(warning)
}
