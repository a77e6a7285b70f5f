//! Product brands, shown in the dashboard as orishas.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::Value;

use crate::error::AppError;
use crate::routes::{json_object, non_empty};
use crate::services::catalog::{BrandWrite, brand_payload};
use crate::state::AppState;
use crate::upstream::Params;

const PATH: &str = "products/brands";

/// Build the brands router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orishas", get(list_brands).post(create_brand))
        .route(
            "/orishas/{id}",
            get(get_brand).put(update_brand).delete(delete_brand),
        )
}

async fn list_brands(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    Ok(Json(state.commerce()?.get(PATH, &Params::new()).await?))
}

async fn create_brand(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let body = json_object(&body, "Name is required")?;
    if non_empty(body.get("name").and_then(Value::as_str)).is_none() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }
    let payload = brand_payload(&body, BrandWrite::Create);
    let created: Value = state
        .commerce()?
        .post(PATH, &payload)
        .await
        .map_err(AppError::upstream_detailed)?;
    tracing::info!(brand_id = ?created.get("id"), "Brand created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_brand(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, AppError> {
    state
        .commerce()?
        .find(&format!("{PATH}/{id}"))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Brand not found".to_string()))
}

async fn update_brand(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "Request data is empty")?;
    let payload = brand_payload(&body, BrandWrite::Update);
    let updated = state
        .commerce()?
        .put(&format!("{PATH}/{id}"), &payload)
        .await
        .map_err(AppError::upstream_detailed)?;
    Ok(Json(updated))
}

async fn delete_brand(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, AppError> {
    let deleted = state
        .commerce()?
        .delete(&format!("{PATH}/{id}"), &Params::new().with("force", true))
        .await?;
    tracing::info!(brand_id = id, "Brand deleted");
    Ok(Json(deleted))
}
