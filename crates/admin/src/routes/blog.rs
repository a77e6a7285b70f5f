//! Blog route handlers backed by the content source.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use ibulore_core::{CommentId, CommentStatus, PostId, clamp_per_page};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::AppError;
use crate::routes::{
    ForceQuery, MAX_UPLOAD_BYTES, UploadForm, json_object, listing, non_empty, optional_object,
};
use crate::services::CommentService;
use crate::services::comments::{
    BulkOutcome, BulkRequest, CommentList, CommentListQuery, CommentStatusCounts, CommentUpdate,
    ReplyRequest,
};
use crate::services::completion::{
    ARTICLE_SYSTEM_PROMPT, ArticleRequest, IDEAS_SYSTEM_PROMPT, IdeasRequest, Sampling,
};
use crate::state::AppState;
use crate::upstream::content::{Comment, MediaMeta};
use crate::upstream::{MAX_PER_PAGE, Params, UpstreamError};

/// Build the blog router.
pub fn router() -> Router<AppState> {
    Router::new()
        // Posts
        .route("/blog/posts", get(list_posts).post(create_post))
        .route(
            "/blog/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        // Taxonomy
        .route(
            "/blog/categories",
            get(list_categories).post(create_category),
        )
        .route(
            "/blog/categories/{id}",
            put(update_category).delete(delete_category),
        )
        .route("/blog/tags", get(list_tags).post(create_tag))
        // Media
        .route(
            "/blog/media",
            get(list_media)
                .post(upload_media)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/blog/media/{id}", get(get_media))
        // Comments
        .route("/blog/comments", get(list_comments))
        .route("/blog/comments/counts", get(comment_counts))
        .route("/blog/comments/bulk", post(bulk_comments))
        .route(
            "/blog/comments/{id}",
            get(get_comment).put(update_comment).delete(delete_comment),
        )
        .route(
            "/blog/comments/{id}/approve",
            put(approve_comment).post(approve_comment),
        )
        .route(
            "/blog/comments/{id}/reject",
            put(reject_comment).post(reject_comment),
        )
        .route(
            "/blog/comments/{id}/spam",
            put(spam_comment).post(spam_comment),
        )
        .route("/blog/comments/{id}/reply", post(reply_comment))
        .route("/blog/comments/{id}/replies", post(reply_comment))
        // AI drafting
        .route("/blog/ai/generate-content", post(generate_content))
        .route("/blog/ai/generate-ideas", post(generate_ideas))
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct PostListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub categories: Option<String>,
    pub tags: Option<String>,
    pub author: Option<u64>,
    #[serde(rename = "_embed")]
    pub embed: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TermListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    #[serde(default)]
    pub hide_empty: bool,
}

#[derive(Debug, Deserialize)]
pub struct MediaListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub media_type: Option<String>,
    pub mime_type: Option<String>,
    pub search: Option<String>,
}

// =============================================================================
// Payload shaping
// =============================================================================

const POST_FIELDS: [&str; 9] = [
    "title",
    "content",
    "excerpt",
    "status",
    "categories",
    "tags",
    "slug",
    "featured_media",
    "meta",
];

/// Whitelisted post fields. Creation fills in the draft defaults.
fn post_payload(body: &Map<String, Value>, create: bool) -> Map<String, Value> {
    let mut payload: Map<String, Value> = POST_FIELDS
        .iter()
        .filter_map(|key| body.get(*key).map(|v| ((*key).to_string(), v.clone())))
        .collect();
    if create {
        for (key, default) in [
            ("content", json!("")),
            ("excerpt", json!("")),
            ("status", json!("draft")),
            ("categories", json!([])),
            ("tags", json!([])),
        ] {
            payload.entry(key).or_insert(default);
        }
    }
    payload
}

/// Whitelisted taxonomy term fields, dropping empty values.
fn term_payload(body: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| {
            body.get(*key)
                .filter(|v| !v.is_null() && v.as_str() != Some(""))
                .map(|v| ((*key).to_string(), v.clone()))
        })
        .collect()
}

fn truthy(flag: Option<&str>) -> bool {
    flag.is_some_and(|f| f.eq_ignore_ascii_case("true") || f == "1")
}

/// Map a category delete refusal to a message and a hint for the dashboard.
fn category_delete_error(error: UpstreamError) -> AppError {
    let suggestion = match error.code() {
        Some("rest_trash_not_supported") => Some((
            "Las categorías no se pueden enviar a la papelera. Use force=true para eliminar permanentemente.",
            "force_required",
        )),
        Some("rest_cannot_delete") => Some((
            "No se puede eliminar esta categoría. Puede tener posts asignados o ser una categoría padre.",
            "check_dependencies",
        )),
        _ => None,
    };
    match (suggestion, error) {
        (Some((message, hint)), UpstreamError::Api { body, .. }) => AppError::UpstreamDetailed {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
            details: body,
            suggestion: Some(hint),
        },
        (_, other) => AppError::upstream_detailed(other),
    }
}

// =============================================================================
// Posts
// =============================================================================

async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Value>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = clamp_per_page(query.per_page.unwrap_or(20), MAX_PER_PAGE);
    let params = Params::new()
        .with("page", page)
        .with("per_page", per_page)
        .with("orderby", "date")
        .with("order", "desc")
        .with("status", non_empty(query.status.as_deref()).unwrap_or("any"))
        .with_opt("search", non_empty(query.search.as_deref()))
        .with_opt("categories", non_empty(query.categories.as_deref()))
        .with_opt("tags", non_empty(query.tags.as_deref()))
        .with_opt("author", query.author)
        .with_opt("_embed", truthy(query.embed.as_deref()).then_some("true"));

    let posts = state.content()?.get_page::<Value>("posts", &params).await?;
    Ok(Json(listing("posts", posts, page, per_page)))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<PostId>,
) -> Result<Json<Value>, AppError> {
    let post = state
        .content()?
        .get(&format!("posts/{id}"), &Params::new().with("_embed", "true"))
        .await?;
    Ok(Json(post))
}

async fn create_post(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let body = json_object(&body, "No se proporcionaron datos del post")?;
    let has_title = match body.get("title") {
        Some(Value::String(title)) => !title.trim().is_empty(),
        Some(Value::Object(title)) => !title.is_empty(),
        _ => false,
    };
    if !has_title {
        return Err(AppError::BadRequest("El título es obligatorio".to_string()));
    }

    let created: Value = state
        .content()?
        .post("posts", &post_payload(&body, true))
        .await
        .map_err(AppError::upstream_detailed)?;
    tracing::info!(post_id = ?created.get("id"), "Blog post created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<PostId>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "No se proporcionaron datos del post")?;
    let updated = state
        .content()?
        .put(&format!("posts/{id}"), &post_payload(&body, false))
        .await
        .map_err(AppError::upstream_detailed)?;
    Ok(Json(updated))
}

async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<PostId>,
    Query(query): Query<ForceQuery>,
) -> Result<Json<Value>, AppError> {
    let params = if query.force.unwrap_or(false) {
        Params::new().with("force", true)
    } else {
        Params::new()
    };
    let deleted = state
        .content()?
        .delete(&format!("posts/{id}"), &params)
        .await?;
    tracing::info!(post_id = %id, "Blog post deleted");
    Ok(Json(deleted))
}

// =============================================================================
// Categories and tags
// =============================================================================

async fn list_terms(
    state: &AppState,
    taxonomy: &str,
    query: &TermListQuery,
) -> Result<Value, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = clamp_per_page(query.per_page.unwrap_or(100), MAX_PER_PAGE);
    let params = Params::new()
        .with("page", page)
        .with("per_page", per_page)
        .with("orderby", "name")
        .with("order", "asc")
        .with_opt("search", non_empty(query.search.as_deref()))
        .with_opt("hide_empty", query.hide_empty.then_some("true"));
    let terms = state.content()?.get_page::<Value>(taxonomy, &params).await?;
    Ok(listing(taxonomy, terms, page, per_page))
}

async fn create_term(
    state: &AppState,
    taxonomy: &str,
    body: &Bytes,
    keys: &[&str],
) -> Result<(StatusCode, Json<Value>), AppError> {
    let body = json_object(body, "No se proporcionaron datos")?;
    if non_empty(body.get("name").and_then(Value::as_str)).is_none() {
        return Err(AppError::BadRequest("El nombre es obligatorio".to_string()));
    }
    let created: Value = state
        .content()?
        .post(taxonomy, &term_payload(&body, keys))
        .await
        .map_err(AppError::upstream_detailed)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<TermListQuery>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(list_terms(&state, "categories", &query).await?))
}

async fn create_category(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    create_term(
        &state,
        "categories",
        &body,
        &["name", "description", "slug", "parent"],
    )
    .await
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "No se proporcionaron datos de la categoría")?;
    let payload: Map<String, Value> = ["name", "description", "slug", "parent"]
        .iter()
        .filter_map(|key| body.get(*key).map(|v| ((*key).to_string(), v.clone())))
        .collect();
    let updated = state
        .content()?
        .put(&format!("categories/{id}"), &payload)
        .await
        .map_err(AppError::upstream_detailed)?;
    Ok(Json(updated))
}

async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<ForceQuery>,
) -> Result<Json<Value>, AppError> {
    let params = if query.force.unwrap_or(false) {
        Params::new().with("force", true)
    } else {
        Params::new()
    };
    let deleted = state
        .content()?
        .delete(&format!("categories/{id}"), &params)
        .await
        .map_err(category_delete_error)?;
    Ok(Json(deleted))
}

async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<TermListQuery>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(list_terms(&state, "tags", &query).await?))
}

async fn create_tag(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    create_term(&state, "tags", &body, &["name", "description", "slug"]).await
}

// =============================================================================
// Media
// =============================================================================

async fn list_media(
    State(state): State<AppState>,
    Query(query): Query<MediaListQuery>,
) -> Result<Json<Value>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = clamp_per_page(query.per_page.unwrap_or(20), MAX_PER_PAGE);
    let params = Params::new()
        .with("page", page)
        .with("per_page", per_page)
        .with("orderby", "date")
        .with("order", "desc")
        .with_opt("media_type", non_empty(query.media_type.as_deref()))
        .with_opt("mime_type", non_empty(query.mime_type.as_deref()))
        .with_opt("search", non_empty(query.search.as_deref()));
    let media = state.content()?.get_page::<Value>("media", &params).await?;
    Ok(Json(listing("media", media, page, per_page)))
}

async fn get_media(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, AppError> {
    let media = state
        .content()?
        .get(&format!("media/{id}"), &Params::new())
        .await?;
    Ok(Json(media))
}

async fn upload_media(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = UploadForm::read(multipart, "file").await?;
    let file = form.require_file("No se proporcionó ningún archivo")?;
    let meta = MediaMeta {
        alt_text: form.field("alt_text").map(String::from),
        title: form.field("title").map(String::from),
        caption: form.field("caption").map(String::from),
    };

    let media = state
        .content()?
        .upload_media(&file.file_name, &file.content_type, file.bytes.to_vec(), &meta)
        .await?;
    Ok((StatusCode::CREATED, Json(media)))
}

// =============================================================================
// Comments
// =============================================================================

async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentListQuery>,
) -> Result<Json<CommentList>, AppError> {
    let comments = CommentService::new(state.content()?);
    Ok(Json(comments.list(&query).await?))
}

async fn comment_counts(
    State(state): State<AppState>,
) -> Result<Json<CommentStatusCounts>, AppError> {
    let comments = CommentService::new(state.content()?);
    Ok(Json(comments.counts().await))
}

async fn bulk_comments(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BulkOutcome>, AppError> {
    let body = optional_object(&body)?;
    let request: BulkRequest = serde_json::from_value(Value::Object(body))
        .map_err(|e| AppError::BadRequest(format!("Solicitud inválida: {e}")))?;
    let comments = CommentService::new(state.content()?);
    Ok(Json(comments.bulk(request).await?))
}

async fn get_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
) -> Result<Json<Comment>, AppError> {
    let comments = CommentService::new(state.content()?);
    Ok(Json(comments.get(id).await?))
}

async fn update_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
    body: Bytes,
) -> Result<Json<Comment>, AppError> {
    let body = json_object(&body, "No se proporcionaron datos para actualizar")?;
    let update: CommentUpdate = serde_json::from_value(Value::Object(body))
        .map_err(|e| AppError::BadRequest(format!("Solicitud inválida: {e}")))?;
    let comments = CommentService::new(state.content()?);
    Ok(Json(comments.update(id, update).await?))
}

async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
    Query(query): Query<ForceQuery>,
) -> Result<Json<Value>, AppError> {
    let comments = CommentService::new(state.content()?);
    Ok(Json(comments.delete(id, query.force.unwrap_or(false)).await?))
}

async fn transition(
    state: &AppState,
    id: CommentId,
    status: CommentStatus,
) -> Result<Json<Comment>, AppError> {
    let comments = CommentService::new(state.content()?);
    Ok(Json(comments.transition(id, status).await?))
}

async fn approve_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
) -> Result<Json<Comment>, AppError> {
    transition(&state, id, CommentStatus::Approved).await
}

async fn reject_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
) -> Result<Json<Comment>, AppError> {
    transition(&state, id, CommentStatus::Hold).await
}

async fn spam_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
) -> Result<Json<Comment>, AppError> {
    transition(&state, id, CommentStatus::Spam).await
}

async fn reply_comment(
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let body = optional_object(&body)?;
    let request: ReplyRequest = serde_json::from_value(Value::Object(body))
        .map_err(|e| AppError::BadRequest(format!("Solicitud inválida: {e}")))?;
    let comments = CommentService::new(state.content()?);
    let reply = comments.reply(id, request).await?;
    Ok((StatusCode::CREATED, Json(reply)))
}

// =============================================================================
// AI drafting
// =============================================================================

async fn generate_content(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let completion = state.completion()?;
    let body = json_object(&body, "No se proporcionaron datos")?;
    let request: ArticleRequest = serde_json::from_value(Value::Object(body))
        .map_err(|e| AppError::BadRequest(format!("Solicitud inválida: {e}")))?;
    if request.selected_idea.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Debe seleccionar una idea para el artículo".to_string(),
        ));
    }

    tracing::info!(
        idea = %request.selected_idea,
        audience = %request.target_audience,
        length = %request.article_length,
        "Generating article"
    );
    let reply = completion
        .complete_json(ARTICLE_SYSTEM_PROMPT, &request.user_prompt(), Sampling::ARTICLE)
        .await?;
    Ok(Json(json!({
        "success": true,
        "content": reply.document.to_string(),
        "usage": reply.usage,
        "model": reply.model,
    })))
}

async fn generate_ideas(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let completion = state.completion()?;
    let body = optional_object(&body)?;
    let request: IdeasRequest = serde_json::from_value(Value::Object(body))
        .map_err(|e| AppError::BadRequest(format!("Solicitud inválida: {e}")))?;

    let reply = completion
        .complete_json(IDEAS_SYSTEM_PROMPT, &request.user_prompt(), Sampling::IDEAS)
        .await?;
    let ideas = reply
        .document
        .get("ideas")
        .cloned()
        .unwrap_or_else(|| json!([]));
    Ok(Json(json!({
        "success": true,
        "ideas": ideas,
        "usage": reply.usage,
        "model": reply.model,
    })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_post_payload_create_defaults() {
        let body = object(json!({"title": "Oshún", "author": 9, "slug": "oshun"}));
        let payload = post_payload(&body, true);
        assert_eq!(payload["status"], "draft");
        assert_eq!(payload["categories"], json!([]));
        assert_eq!(payload["slug"], "oshun");
        assert!(!payload.contains_key("author"));
    }

    #[test]
    fn test_post_payload_update_is_partial() {
        let body = object(json!({"status": "publish"}));
        let payload = post_payload(&body, false);
        assert_eq!(payload.len(), 1);
        assert_eq!(payload["status"], "publish");
    }

    #[test]
    fn test_term_payload_drops_empty() {
        let body = object(json!({"name": "Rituales", "description": "", "slug": null, "count": 4}));
        let payload = term_payload(&body, &["name", "description", "slug"]);
        assert_eq!(payload.len(), 1);
        assert_eq!(payload["name"], "Rituales");
    }

    #[test]
    fn test_category_delete_suggestions() {
        let error = UpstreamError::Api {
            status: 501,
            code: Some("rest_trash_not_supported".to_string()),
            message: "Terms do not support trashing.".to_string(),
            body: json!({"code": "rest_trash_not_supported"}),
        };
        match category_delete_error(error) {
            AppError::UpstreamDetailed {
                status, suggestion, ..
            } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(suggestion, Some("force_required"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let error = UpstreamError::Api {
            status: 500,
            code: Some("rest_cannot_delete".to_string()),
            message: "no".to_string(),
            body: json!({"code": "rest_cannot_delete"}),
        };
        assert!(matches!(
            category_delete_error(error),
            AppError::UpstreamDetailed {
                suggestion: Some("check_dependencies"),
                ..
            }
        ));

        let error = UpstreamError::NotFound("categories/9".to_string());
        assert!(matches!(category_delete_error(error), AppError::Upstream(_)));
    }

    #[test]
    fn test_truthy() {
        assert!(truthy(Some("true")));
        assert!(truthy(Some("1")));
        assert!(!truthy(Some("false")));
        assert!(!truthy(None));
    }
}
