//! Global product attributes and their terms.
//!
//! The store sometimes acknowledges attribute writes with an empty body. In
//! that case the handlers answer with the record they sent, filled in with
//! the store's defaults.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::routes::{json_object, non_empty};
use crate::services::catalog::{
    apply_attribute_defaults, attribute_defaults, echo_record, term_defaults,
};
use crate::state::AppState;
use crate::upstream::{MAX_PER_PAGE, Params};

/// Build the attributes router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/products/attributes",
            get(list_attributes).post(create_attribute),
        )
        .route(
            "/products/attributes/{id}",
            get(get_attribute)
                .put(update_attribute)
                .delete(delete_attribute),
        )
        .route(
            "/products/attributes/{id}/terms",
            get(list_terms).post(create_term),
        )
        .route(
            "/products/attributes/{id}/terms/{term_id}",
            get(get_term).put(update_term).delete(delete_term),
        )
}

fn by_name() -> Params {
    Params::new()
        .with("per_page", MAX_PER_PAGE)
        .with("orderby", "name")
        .with("order", "asc")
}

fn require_name(body: &Map<String, Value>, message: &str) -> Result<(), AppError> {
    match non_empty(body.get("name").and_then(Value::as_str)) {
        Some(_) => Ok(()),
        None => Err(AppError::BadRequest(message.to_string())),
    }
}

/// The upstream record, or an echo of the write when the body was empty.
fn or_echo(record: Value, id: Option<u64>, body: &Map<String, Value>, defaults: Value) -> Value {
    if record.is_null() {
        echo_record(id, body, defaults)
    } else {
        record
    }
}

// =============================================================================
// Attributes
// =============================================================================

async fn list_attributes(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let attributes = state
        .commerce()?
        .get("products/attributes", &by_name())
        .await?;
    Ok(Json(attributes))
}

async fn create_attribute(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let mut body = json_object(&body, "No se proporcionaron datos de atributo")?;
    require_name(&body, "El nombre del atributo es requerido")?;
    apply_attribute_defaults(&mut body);

    let created: Value = state
        .commerce()?
        .post("products/attributes", &body)
        .await
        .map_err(AppError::upstream_detailed)?;
    let created = or_echo(created, None, &body, attribute_defaults());
    tracing::info!(attribute_id = ?created.get("id"), "Attribute created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_attribute(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, AppError> {
    state
        .commerce()?
        .find(&format!("products/attributes/{id}"))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Atributo no encontrado".to_string()))
}

async fn update_attribute(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "No se proporcionaron datos de atributo")?;
    let updated: Value = state
        .commerce()?
        .put(&format!("products/attributes/{id}"), &body)
        .await
        .map_err(AppError::upstream_detailed)?;
    Ok(Json(or_echo(updated, Some(id), &body, attribute_defaults())))
}

async fn delete_attribute(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, AppError> {
    let deleted = state
        .commerce()?
        .delete(
            &format!("products/attributes/{id}"),
            &Params::new().with("force", true),
        )
        .await?;
    tracing::info!(attribute_id = id, "Attribute deleted");
    Ok(Json(deleted))
}

// =============================================================================
// Terms
// =============================================================================

async fn list_terms(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, AppError> {
    let terms = state
        .commerce()?
        .get(&format!("products/attributes/{id}/terms"), &by_name())
        .await?;
    Ok(Json(terms))
}

async fn create_term(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let body = json_object(&body, "No se proporcionaron datos del término")?;
    require_name(&body, "El nombre del término es requerido")?;

    let created: Value = state
        .commerce()?
        .post(&format!("products/attributes/{id}/terms"), &body)
        .await
        .map_err(AppError::upstream_detailed)?;
    Ok((
        StatusCode::CREATED,
        Json(or_echo(created, None, &body, term_defaults())),
    ))
}

async fn get_term(
    State(state): State<AppState>,
    Path((id, term_id)): Path<(u64, u64)>,
) -> Result<Json<Value>, AppError> {
    state
        .commerce()?
        .find(&format!("products/attributes/{id}/terms/{term_id}"))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Término no encontrado".to_string()))
}

async fn update_term(
    State(state): State<AppState>,
    Path((id, term_id)): Path<(u64, u64)>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "No se proporcionaron datos del término")?;
    let updated: Value = state
        .commerce()?
        .put(&format!("products/attributes/{id}/terms/{term_id}"), &body)
        .await
        .map_err(AppError::upstream_detailed)?;
    Ok(Json(or_echo(updated, Some(term_id), &body, term_defaults())))
}

async fn delete_term(
    State(state): State<AppState>,
    Path((id, term_id)): Path<(u64, u64)>,
) -> Result<Json<Value>, AppError> {
    let deleted = state
        .commerce()?
        .delete(
            &format!("products/attributes/{id}/terms/{term_id}"),
            &Params::new().with("force", true),
        )
        .await?;
    Ok(Json(deleted))
}
