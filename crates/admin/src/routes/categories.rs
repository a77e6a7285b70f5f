//! Product category route handlers.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use ibulore_core::{CategoryId, clamp_per_page};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::routes::{json_object, listing, non_empty};
use crate::services::catalog::{
    Category, category_defaults, deletion_blocker, echo_record, ensure_slug, hierarchy,
};
use crate::state::AppState;
use crate::upstream::{CommerceClient, MAX_PER_PAGE, Params, UpstreamError};

const PATH: &str = "products/categories";

/// Build the categories router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/hierarchy", get(category_hierarchy))
        .route("/categories/bulk-delete", post(bulk_delete))
        .route(
            "/categories/{id}",
            get(get_category).put(update_category).delete(delete_category),
        )
}

#[derive(Debug, Deserialize)]
pub struct CategoryListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub parent: Option<u64>,
    pub orderby: Option<String>,
    pub order: Option<String>,
    #[serde(default)]
    pub hide_empty: bool,
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Option<Vec<CategoryId>>,
}

// =============================================================================
// Helpers
// =============================================================================

fn parent_of(body: &serde_json::Map<String, Value>) -> Option<u64> {
    body.get("parent").and_then(Value::as_u64).filter(|p| *p > 0)
}

async fn ensure_parent_exists(client: &CommerceClient, parent: u64) -> Result<(), AppError> {
    match client.find(&format!("{PATH}/{parent}")).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(AppError::BadRequest(
            "La categoría padre especificada no existe".to_string(),
        )),
        Err(e) => {
            tracing::warn!(parent, error = %e, "Parent category check failed");
            Err(AppError::BadRequest(
                "Error al validar la categoría padre".to_string(),
            ))
        }
    }
}

/// Check a category can go, then delete it with `force=true`.
async fn guarded_delete(client: &CommerceClient, id: CategoryId) -> Result<Value, AppError> {
    let subcategories: Vec<Value> = client
        .get(PATH, &Params::new().with("parent", id).with("per_page", MAX_PER_PAGE))
        .await?;
    let products = client
        .find(&format!("{PATH}/{id}"))
        .await?
        .and_then(|c| c.get("count").and_then(Value::as_u64))
        .unwrap_or(0);

    if let Some(reason) = deletion_blocker(subcategories.len(), products) {
        return Err(AppError::BadRequest(reason));
    }
    let deleted = client
        .delete(&format!("{PATH}/{id}"), &Params::new().with("force", true))
        .await?;
    Ok(deleted)
}

fn upstream_reason(error: &AppError) -> String {
    match error {
        AppError::BadRequest(m) | AppError::NotFound(m) => m.clone(),
        AppError::Upstream(UpstreamError::Api { message, .. }) => message.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<CategoryListQuery>,
) -> Result<Json<Value>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = clamp_per_page(query.per_page.unwrap_or(100), MAX_PER_PAGE);
    let params = Params::new()
        .with("page", page)
        .with("per_page", per_page)
        .with("orderby", non_empty(query.orderby.as_deref()).unwrap_or("name"))
        .with("order", non_empty(query.order.as_deref()).unwrap_or("asc"))
        .with("hide_empty", query.hide_empty)
        .with_opt("search", non_empty(query.search.as_deref()))
        .with_opt("parent", query.parent);

    let categories = state.commerce()?.get_page::<Value>(PATH, &params).await?;
    if query.format.as_deref() == Some("simple") {
        return Ok(Json(json!(categories.items)));
    }
    Ok(Json(listing("categories", categories, page, per_page)))
}

async fn create_category(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let mut body = json_object(&body, "No se proporcionaron datos de categoría")?;
    if non_empty(body.get("name").and_then(Value::as_str)).is_none() {
        return Err(AppError::BadRequest(
            "El nombre de la categoría es requerido".to_string(),
        ));
    }
    ensure_slug(&mut body);

    let client = state.commerce()?;
    if let Some(parent) = parent_of(&body) {
        ensure_parent_exists(client, parent).await?;
    }

    let created: Value = client
        .post(PATH, &body)
        .await
        .map_err(AppError::upstream_detailed)?;
    let created = if created.is_null() {
        echo_record(None, &body, category_defaults())
    } else {
        created
    };
    tracing::info!(category_id = ?created.get("id"), "Category created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<Json<Value>, AppError> {
    state
        .commerce()?
        .find(&format!("{PATH}/{id}"))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Categoría no encontrada".to_string()))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "No se proporcionaron datos de categoría")?;
    let client = state.commerce()?;
    if let Some(parent) = parent_of(&body) {
        if parent == id.as_u64() {
            return Err(AppError::BadRequest(
                "Una categoría no puede ser padre de sí misma".to_string(),
            ));
        }
        ensure_parent_exists(client, parent).await?;
    }

    let updated: Value = client
        .put(&format!("{PATH}/{id}"), &body)
        .await
        .map_err(AppError::upstream_detailed)?;
    if updated.is_null() {
        return Ok(Json(echo_record(
            Some(id.as_u64()),
            &body,
            category_defaults(),
        )));
    }
    Ok(Json(updated))
}

async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<Json<Value>, AppError> {
    let deleted = guarded_delete(state.commerce()?, id).await?;
    tracing::info!(category_id = %id, "Category deleted");
    Ok(Json(deleted))
}

/// Delete each category in turn, collecting refusals instead of stopping.
async fn bulk_delete(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "Se requiere una lista de IDs de categorías")?;
    let ids = serde_json::from_value::<BulkDeleteRequest>(Value::Object(body))
        .ok()
        .and_then(|r| r.ids)
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest("La lista de IDs debe ser un array no vacío".to_string())
        })?;

    let client = state.commerce()?;
    let mut deleted = Vec::new();
    let mut errors = Vec::new();
    for id in &ids {
        match guarded_delete(client, *id).await {
            Ok(data) => deleted.push(json!({"id": id, "status": "deleted", "data": data})),
            Err(e) => errors.push(format!("Categoría {id}: {}", upstream_reason(&e))),
        }
    }

    tracing::info!(
        requested = ids.len(),
        deleted = deleted.len(),
        failed = errors.len(),
        "Bulk category delete"
    );
    Ok(Json(json!({
        "summary": {
            "total_requested": ids.len(),
            "deleted": deleted.len(),
            "errors": errors.len(),
        },
        "deleted": deleted,
        "errors": errors,
    })))
}

async fn category_hierarchy(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let params = Params::new()
        .with("per_page", MAX_PER_PAGE)
        .with("orderby", "menu_order")
        .with("order", "asc");
    let categories: Vec<Category> = state.commerce()?.get(PATH, &params).await?;
    Ok(Json(json!({
        "hierarchy": hierarchy(&categories),
        "total_categories": categories.len(),
    })))
}
