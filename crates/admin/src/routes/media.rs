//! Product image uploads to the content media library.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use serde_json::{Value, json};

use crate::error::AppError;
use crate::routes::{MAX_UPLOAD_BYTES, UploadForm};
use crate::state::AppState;
use crate::upstream::content::MediaMeta;

/// Build the media router.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/media/upload",
        post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
    )
}

/// The fields the product editor needs from an uploaded media item.
fn summary(media: &Value) -> Value {
    json!({
        "id": media.get("id"),
        "source_url": media.get("source_url"),
        "alt_text": media.get("alt_text").and_then(Value::as_str).unwrap_or_default(),
        "media_type": media.get("media_type"),
    })
}

async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = UploadForm::read(multipart, "file").await?;
    let file = form.require_file("No file part")?;
    let meta = MediaMeta {
        alt_text: form.field("alt_text").map(String::from),
        ..MediaMeta::default()
    };

    let media = state
        .content()?
        .upload_media(&file.file_name, &file.content_type, file.bytes.to_vec(), &meta)
        .await?;
    Ok((StatusCode::CREATED, Json(summary(&media))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_keeps_editor_fields() {
        let media = json!({
            "id": 321,
            "source_url": "https://shop.example.com/wp-content/uploads/collar.jpg",
            "media_type": "image",
            "guid": {"rendered": "x"},
        });
        let summary = summary(&media);
        assert_eq!(summary["id"], 321);
        assert_eq!(summary["alt_text"], "");
        assert_eq!(summary["media_type"], "image");
        assert!(summary.get("guid").is_none());
    }
}
