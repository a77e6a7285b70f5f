//! Inventory route handlers.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    routing::{get, post, put},
};
use ibulore_core::ProductId;
use serde_json::Value;

use crate::error::AppError;
use crate::routes::{json_object, optional_object};
use crate::services::InventoryService;
use crate::services::inventory::{
    BulkInventoryOutcome, BulkInventoryRequest, InventoryItem, InventoryList, InventoryQuery,
    InventoryStats,
};
use crate::state::AppState;

/// Build the inventory router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/inventory", get(list_inventory))
        .route("/inventory/{id}", put(update_inventory))
        .route("/inventory/bulk-update", post(bulk_update))
        .route("/inventory/low-stock", get(low_stock))
        .route("/inventory/out-of-stock", get(out_of_stock))
        .route("/inventory/stats", get(inventory_stats))
}

async fn list_inventory(
    State(state): State<AppState>,
    Query(query): Query<InventoryQuery>,
) -> Result<Json<InventoryList>, AppError> {
    let inventory = InventoryService::new(state.commerce()?);
    Ok(Json(inventory.list(&query).await?))
}

async fn update_inventory(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    body: Bytes,
) -> Result<Json<InventoryItem>, AppError> {
    let body = json_object(&body, "No se proporcionaron datos de inventario")?;
    let inventory = InventoryService::new(state.commerce()?);
    Ok(Json(inventory.update(id, &body).await?))
}

async fn bulk_update(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BulkInventoryOutcome>, AppError> {
    let body = optional_object(&body)?;
    let request: BulkInventoryRequest = serde_json::from_value(Value::Object(body))
        .map_err(|e| AppError::BadRequest(format!("Datos de actualización inválidos: {e}")))?;
    let inventory = InventoryService::new(state.commerce()?);
    Ok(Json(inventory.bulk_update(request).await?))
}

async fn low_stock(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let inventory = InventoryService::new(state.commerce()?);
    Ok(Json(inventory.low_stock().await?))
}

async fn out_of_stock(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let inventory = InventoryService::new(state.commerce()?);
    Ok(Json(inventory.out_of_stock().await?))
}

async fn inventory_stats(State(state): State<AppState>) -> Result<Json<InventoryStats>, AppError> {
    let inventory = InventoryService::new(state.commerce()?);
    Ok(Json(inventory.stats().await?))
}
