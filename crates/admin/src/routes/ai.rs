//! Generated product images: registry listing, recording and file serving.

use std::path::Path;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::get,
};
use serde_json::{Value, json};
use tower_http::services::ServeDir;

use crate::error::AppError;
use crate::routes::{MAX_UPLOAD_BYTES, UploadForm};
use crate::state::AppState;

/// Build the generated-images router.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/ai/generated-images",
        get(list_images)
            .post(record_image)
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
    )
}

/// Serve the registry directory at `/static/generated-images`.
pub fn static_files(dir: &Path) -> Router<AppState> {
    Router::new().nest_service("/static/generated-images", ServeDir::new(dir))
}

async fn list_images(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let images = state.images().list().await?;
    Ok(Json(json!({"success": true, "images": images})))
}

async fn record_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut form = UploadForm::read(multipart, "image").await?;
    let file = form.require_file("No se proporcionó ninguna imagen")?;
    let prompt = form
        .field("prompt")
        .ok_or_else(|| AppError::BadRequest("No se proporcionó un prompt".to_string()))?
        .to_string();

    let image = state.images().record(&file.bytes, &prompt).await?;
    Ok(Json(json!({
        "success": true,
        "imageUrl": image.local_url,
        "fileName": image.file_name,
    })))
}
