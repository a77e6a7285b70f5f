//! Content source records and helpers.

use ibulore_core::{CommentId, CommentStatus, PostId};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::instrument;

use super::{ContentClient, Page, Params, UpstreamError};

/// A comment with its status already in the canonical vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    #[serde(default)]
    pub post: PostId,
    #[serde(default)]
    pub parent: u64,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Comment {
    /// Rewrite the status token into the canonical vocabulary.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.status = CommentStatus::inbound_token(&self.status);
        self
    }
}

/// Optional descriptive fields applied to an uploaded media item.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MediaMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl MediaMeta {
    fn is_empty(&self) -> bool {
        self.alt_text.is_none() && self.title.is_none() && self.caption.is_none()
    }
}

impl ContentClient {
    /// List comments, normalizing every status.
    ///
    /// A `status` parameter in canonical form is translated before it is
    /// sent; unknown tokens go through unchanged.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    #[instrument(skip(self, params))]
    pub async fn list_comments(&self, params: &Params) -> Result<Page<Comment>, UpstreamError> {
        let page: Page<Comment> = self.get_page("comments", params).await?;
        Ok(Page {
            items: page.items.into_iter().map(Comment::normalized).collect(),
            ..page
        })
    }

    /// Fetch one comment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the upstream has no such comment or answers
    /// with an empty body.
    pub async fn get_comment(&self, id: CommentId, embed: bool) -> Result<Comment, UpstreamError> {
        let params = Params::new().with_opt("_embed", embed.then_some("true"));
        let value: Value = self.get(&format!("comments/{id}"), &params).await?;
        comment_from_value(id, value)
    }

    /// Full-replace a comment's status.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    #[instrument(skip(self))]
    pub async fn set_comment_status(
        &self,
        id: CommentId,
        status: CommentStatus,
    ) -> Result<Comment, UpstreamError> {
        let body = json!({ "status": status.to_source_token() });
        let value: Value = self.put(&format!("comments/{id}"), &body).await?;
        comment_from_value(id, value)
    }

    /// Apply a partial update to a comment. Any `status` in `fields` must
    /// already be a source token.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    pub async fn update_comment(
        &self,
        id: CommentId,
        fields: &Map<String, Value>,
    ) -> Result<Comment, UpstreamError> {
        let value: Value = self.put(&format!("comments/{id}"), fields).await?;
        comment_from_value(id, value)
    }

    /// Delete a comment.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    pub async fn delete_comment(&self, id: CommentId, force: bool) -> Result<Value, UpstreamError> {
        let params = Params::new().with("force", force);
        self.delete(&format!("comments/{id}"), &params).await
    }

    /// Create a comment.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    pub async fn create_comment(&self, body: &Value) -> Result<Comment, UpstreamError> {
        let value: Value = self.post("comments", body).await?;
        let comment: Comment =
            serde_json::from_value(value).map_err(|e| UpstreamError::Parse(e.to_string()))?;
        Ok(comment.normalized())
    }

    /// Upload a file to the media library, then apply `meta` if any field
    /// is set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the file name or content type cannot be
    /// sent as a header, `Parse` if the upload response carries no id, or
    /// any upstream failure.
    #[instrument(skip(self, bytes, meta), fields(size = bytes.len()))]
    pub async fn upload_media(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        meta: &MediaMeta,
    ) -> Result<Value, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_DISPOSITION, content_disposition(file_name)?);
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type)
                .map_err(|e| UpstreamError::InvalidRequest(format!("content type: {e}")))?,
        );

        let media: Value = self.post_raw("media", headers, bytes).await?;
        let Some(id) = media.get("id").and_then(Value::as_u64) else {
            return Err(UpstreamError::Parse(
                "media upload response has no id".to_string(),
            ));
        };
        tracing::info!(media_id = id, file_name, "Uploaded media");

        if meta.is_empty() {
            return Ok(media);
        }
        match self.patch::<Value, _>(&format!("media/{id}"), meta).await {
            Ok(updated) if updated.get("id").is_some() => Ok(updated),
            Ok(_) => Ok(media),
            Err(e) => {
                tracing::warn!(media_id = id, error = %e, "Failed to update media metadata");
                Ok(media)
            }
        }
    }
}

fn comment_from_value(id: CommentId, value: Value) -> Result<Comment, UpstreamError> {
    if value.is_null() || value.as_object().is_some_and(Map::is_empty) {
        return Err(UpstreamError::NotFound(format!("comment {id}")));
    }
    let comment: Comment =
        serde_json::from_value(value).map_err(|e| UpstreamError::Parse(e.to_string()))?;
    Ok(comment.normalized())
}

fn content_disposition(file_name: &str) -> Result<HeaderValue, UpstreamError> {
    let safe: String = file_name
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .map_err(|e| UpstreamError::InvalidRequest(format!("file name: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_status_normalized_on_read() {
        let comment: Comment = serde_json::from_value(json!({
            "id": 4,
            "post": 9,
            "status": "approve",
            "date": "2024-05-02T08:00:00",
            "content": {"rendered": "<p>Hola</p>"}
        }))
        .unwrap();
        let comment = comment.normalized();
        assert_eq!(comment.status, "approved");
        assert_eq!(comment.post, PostId::new(9));
        assert!(comment.extra.contains_key("content"));
    }

    #[test]
    fn test_empty_comment_is_not_found() {
        assert!(matches!(
            comment_from_value(CommentId::new(1), Value::Null),
            Err(UpstreamError::NotFound(_))
        ));
        assert!(matches!(
            comment_from_value(CommentId::new(1), json!({})),
            Err(UpstreamError::NotFound(_))
        ));
    }

    #[test]
    fn test_content_disposition_escapes_quotes() {
        let header = content_disposition("foto \"1\".png").unwrap();
        assert_eq!(
            header.to_str().unwrap(),
            "attachment; filename=\"foto _1_.png\""
        );
    }

    #[test]
    fn test_media_meta_skips_unset_fields() {
        let meta = MediaMeta {
            alt_text: Some("Collar".to_string()),
            ..MediaMeta::default()
        };
        assert!(!meta.is_empty());
        assert_eq!(serde_json::to_value(&meta).unwrap(), json!({"alt_text": "Collar"}));
        assert!(MediaMeta::default().is_empty());
    }
}
