//! HTTP request handlers.

use crate::catalog::{BookInput, CoverUpload};
use crate::db::Book;
use crate::error::{AppError, Result};
use crate::server::AppState;
use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use serde::Serialize;

/// Confirmation body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: &'static str,
}

impl MessageResponse {
    fn new(message: &'static str) -> Json<Self> {
        Json(Self { message })
    }
}

/// Fields of a create/update form, before validation.
#[derive(Debug, Default)]
struct BookForm {
    title: Option<String>,
    description: Option<String>,
    price: Option<String>,
    cover: Option<CoverUpload>,
}

impl BookForm {
    /// Read all multipart fields. Unknown fields are skipped.
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = BookForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();

            match name.as_str() {
                "title" | "description" | "price" => {
                    let text = field.text().await.map_err(|e| {
                        AppError::Validation(format!("failed to read field {}: {}", name, e))
                    })?;
                    match name.as_str() {
                        "title" => form.title = Some(text),
                        "description" => form.description = Some(text),
                        _ => form.price = Some(text),
                    }
                }
                "cover" => {
                    let file_name = field.file_name().map(|s| s.to_string());
                    let data = field.bytes().await.map_err(|e| {
                        AppError::Validation(format!("failed to read cover: {}", e))
                    })?;

                    // Browsers send an empty part when no file was picked.
                    if !data.is_empty() {
                        form.cover = Some(CoverUpload {
                            file_name,
                            data: data.to_vec(),
                        });
                    }
                }
                other => {
                    tracing::debug!(field = %other, "Ignoring unknown form field");
                }
            }
        }

        Ok(form)
    }

    /// Split into validated text fields and the optional cover.
    fn into_parts(self) -> Result<(BookInput, Option<CoverUpload>)> {
        let title = required(self.title, "title")?;
        let description = required(self.description, "description")?;
        let price_text = required(self.price, "price")?;
        let price = price_text.trim().parse::<f64>().map_err(|_| {
            AppError::Validation(format!("price is not a number: {}", price_text))
        })?;

        Ok((
            BookInput {
                title,
                description,
                price,
            },
            self.cover,
        ))
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value.ok_or_else(|| AppError::Validation(format!("missing field: {}", field)))
}

// ============================================================================
// BOOK HANDLERS
// ============================================================================

/// List all books.
pub async fn list_books(State(state): State<AppState>) -> Result<Json<Vec<Book>>> {
    Ok(Json(state.catalog.list()?))
}

/// Single book, or `null` when the ID is unknown.
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Option<Book>>> {
    Ok(Json(state.catalog.get(id)?))
}

/// Create a book from a multipart form with a required cover.
pub async fn create_book(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<MessageResponse>> {
    let (input, cover) = BookForm::read(multipart).await?.into_parts()?;
    let cover = cover.ok_or_else(|| AppError::Validation("missing field: cover".to_string()))?;

    state.catalog.create(input, cover)?;
    Ok(MessageResponse::new("Book added"))
}

/// Update a book; the cover is replaced only when one is uploaded.
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<MessageResponse>> {
    let (input, cover) = BookForm::read(multipart).await?.into_parts()?;

    state.catalog.update(id, input, cover)?;
    Ok(MessageResponse::new("Book updated successfully"))
}

/// Delete a book and its cover.
pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    state.catalog.delete(id)?;
    Ok(MessageResponse::new("Book and image deleted"))
}
