//! HTTP route handlers for admin.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Health check (outside /api)
//!
//! # Everything below is nested under /api
//! /products/...                         - Products, search, low stock
//! /orders/...                           - Orders, notes, actions, stats
//! /customers/...                        - Registered and guest customers
//! /categories/...                       - Product categories and hierarchy
//! /products/attributes/...              - Attributes and terms
//! /orishas/...                          - Product brands
//! /inventory/...                        - Inventory projection
//! /blog/...                             - Posts, taxonomy, media, comments, AI
//! /media/upload                         - Media upload
//! /ai/generated-images                  - Generated image registry
//! /static/generated-images/{file}       - Generated image files
//! /webhooks/orders                      - Order webhook
//! /dashboard/...                        - Dashboard statistics
//! ```

pub mod ai;
pub mod attributes;
pub mod blog;
pub mod categories;
pub mod customers;
pub mod dashboard;
pub mod inventory;
pub mod media;
pub mod orders;
pub mod orishas;
pub mod products;
pub mod webhooks;

use std::collections::HashMap;

use axum::{Json, Router, body::Bytes, extract::Multipart, routing::get};
use ibulore_core::Pagination;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::AppError;
use crate::state::AppState;
use crate::upstream::Page;

/// Build the `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(products::router())
        .merge(orders::router())
        .merge(customers::router())
        .merge(categories::router())
        .merge(attributes::router())
        .merge(orishas::router())
        .merge(inventory::router())
        .merge(blog::router())
        .merge(media::router())
        .merge(ai::router())
        .merge(webhooks::router())
        .merge(dashboard::router())
}

/// Health check router, mounted at the root.
pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

// =============================================================================
// Shared extractors and response shapes
// =============================================================================

/// `?force=` on delete routes.
#[derive(Debug, Default, Deserialize)]
pub struct ForceQuery {
    pub force: Option<bool>,
}

/// Parse a request body that must be a non-empty JSON object.
///
/// # Errors
///
/// Returns `BadRequest` with `message` for an empty, invalid or non-object
/// body.
pub fn json_object(body: &Bytes, message: &str) -> Result<Map<String, Value>, AppError> {
    if body.trim_ascii().is_empty() {
        return Err(AppError::BadRequest(message.to_string()));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) if !map.is_empty() => Ok(map),
        Ok(_) => Err(AppError::BadRequest(message.to_string())),
        Err(e) => Err(AppError::BadRequest(format!("Invalid JSON body: {e}"))),
    }
}

/// Parse an optional JSON body; empty means an empty object.
///
/// # Errors
///
/// Returns `BadRequest` if the body is present but not a JSON object.
pub fn optional_object(body: &Bytes) -> Result<Map<String, Value>, AppError> {
    if body.trim_ascii().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::BadRequest("Expected a JSON object".to_string())),
        Err(e) => Err(AppError::BadRequest(format!("Invalid JSON body: {e}"))),
    }
}

/// Wrap one upstream page as `{<key>: [...], pagination: {...}}`.
#[must_use]
pub fn listing<T: Serialize>(key: &str, page: Page<T>, page_no: u32, per_page: u32) -> Value {
    let pagination = Pagination::from_upstream(page_no, per_page, page.total, page.total_pages);
    let mut body = Map::new();
    body.insert(key.to_string(), json!(page.items));
    body.insert("pagination".to_string(), json!(pagination));
    Value::Object(body)
}

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// A file part of a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// A multipart form: one file part plus text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    /// Read every part, keeping the part named `file_field` as the file.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if the form is malformed.
    pub async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == file_field {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Read error: {e}")))?;
                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Read error: {e}")))?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// A text field, trimmed, if present and non-empty.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        non_empty(self.fields.get(name).map(String::as_str))
    }

    /// The file part, which must be present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` with `message` when there is no usable file.
    pub fn require_file(&mut self, message: &str) -> Result<UploadedFile, AppError> {
        match self.file.take() {
            Some(file) if !file.bytes.is_empty() && !file.file_name.trim().is_empty() => Ok(file),
            _ => Err(AppError::BadRequest(message.to_string())),
        }
    }
}

/// First non-empty trimmed value.
#[must_use]
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
