use std::path::Path as FsPath;

use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        rejection::{PathRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::dto::{
    ContactForm, ContactOut, ContactsResponse, CreatedContactResponse, ListQuery, MessageResponse,
    PhotoUpload,
};
use super::query::{ListFilter, PageRequest, PaginatedQueryEngine};
use super::services;
use crate::{
    auth::CurrentUser,
    error::{AppError, AppResult},
    photos::services::ext_from_mime,
    state::AppState,
};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn contact_routes() -> Router<AppState> {
    Router::new()
        .route("/contacts", get(list_contacts).post(create_contact))
        .route(
            "/contacts/:id",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

#[instrument(skip(state))]
pub async fn list_contacts(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> AppResult<Json<ContactsResponse>> {
    let Query(q) = query?;
    let req = PageRequest::new(q.page, q.limit)?;
    let filter = match q.starts_with.as_deref() {
        Some(raw) => ListFilter::starts_with(raw)?,
        None => ListFilter::all(),
    };

    let page = PaginatedQueryEngine::new(&state.contacts)
        .list(principal.id, &filter, req)
        .await?
        .map(|c| services::to_out(&state, c));
    Ok(Json(page.into()))
}

#[instrument(skip(state))]
pub async fn get_contact(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<ContactOut>> {
    let Path(id) = path?;
    let contact = services::get_contact(&state, &principal, id).await?;
    Ok(Json(services::to_out(&state, contact)))
}

/// POST /contacts (multipart: name, email, phone, optional photo)
#[instrument(skip(state, mp))]
pub async fn create_contact(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<CreatedContactResponse>> {
    let form = read_form(mp?).await?;
    let contact = services::create_contact(&state, &principal, form).await?;
    Ok(Json(CreatedContactResponse {
        message: "Contact created",
        id: contact.id,
    }))
}

/// PUT /contacts/:id (multipart; a photo part swaps the stored photo)
#[instrument(skip(state, mp))]
pub async fn update_contact(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    path: Result<Path<i64>, PathRejection>,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<ContactOut>> {
    let Path(id) = path?;
    let form = read_form(mp?).await?;
    let (contact, _warning) = services::update_contact(&state, &principal, id, form).await?;
    Ok(Json(services::to_out(&state, contact)))
}

#[instrument(skip(state))]
pub async fn delete_contact(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<MessageResponse>> {
    let Path(id) = path?;
    services::delete_contact(&state, &principal, id).await?;
    Ok(Json(MessageResponse {
        message: "Contact deleted",
    }))
}

async fn read_form(mut mp: Multipart) -> AppResult<ContactForm> {
    let mut form = ContactForm::default();
    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "name" => form.name = Some(field.text().await.map_err(bad_multipart)?),
            "email" => form.email = Some(field.text().await.map_err(bad_multipart)?),
            "phone" => form.phone = Some(field.text().await.map_err(bad_multipart)?),
            "photo" => form.photo = read_photo(field).await?,
            _ => {}
        }
    }
    Ok(form)
}

/// An empty file part (a form submitted without choosing a file) counts as no photo.
async fn read_photo(field: Field<'_>) -> AppResult<Option<PhotoUpload>> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().unwrap_or_default().to_string();
    let body = field.bytes().await.map_err(bad_multipart)?;
    if body.is_empty() && file_name.is_empty() {
        return Ok(None);
    }

    let extension = FsPath::new(&file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_string)
        .or_else(|| ext_from_mime(&content_type).map(str::to_string))
        .unwrap_or_default();
    Ok(Some(PhotoUpload { body, extension }))
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::validation(format!("invalid multipart body: {e}"))
}
