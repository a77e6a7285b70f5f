//! Customer route handlers.
//!
//! Listing and search go through [`CustomerReconciler`] so guest shoppers
//! appear next to registered accounts. Single-record routes talk to the
//! commerce source directly.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use ibulore_core::{CustomerId, Email, clamp_per_page};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::routes::{json_object, listing, non_empty};
use crate::services::CustomerReconciler;
use crate::services::customers::{CustomerList, CustomerListQuery};
use crate::state::AppState;
use crate::upstream::{MAX_PER_PAGE, Params};

const SEARCH_LIMIT: usize = 10;

/// Build the customers router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/customers", get(list_customers).post(create_customer))
        .route("/customers/search", get(search_customers))
        .route(
            "/customers/{id}",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
        .route("/customers/{id}/orders", get(customer_orders))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub force: Option<bool>,
    pub reassign: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
}

async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<CustomerListQuery>,
) -> Result<Json<CustomerList>, AppError> {
    let reconciler =
        CustomerReconciler::new(state.commerce()?, state.config().last_order_concurrency);
    Ok(Json(reconciler.list(&query).await))
}

async fn search_customers(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let Some(q) = non_empty(query.q.as_deref()) else {
        return Ok(Json(json!({"customers": []})));
    };
    let limit = query.limit.unwrap_or(SEARCH_LIMIT).max(1);
    let reconciler =
        CustomerReconciler::new(state.commerce()?, state.config().last_order_concurrency);
    let customers = reconciler.search(q, limit).await;
    Ok(Json(json!({"customers": customers})))
}

async fn create_customer(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let mut body = json_object(&body, "No se proporcionaron datos del cliente")?;
    let email = body
        .get("email")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest("El email es requerido".to_string()))?;
    let email = Email::parse(email)
        .map_err(|e| AppError::BadRequest(format!("Email inválido: {e}")))?;
    body.insert("email".to_string(), json!(email.as_str()));

    let created: Value = state
        .commerce()?
        .post("customers", &body)
        .await
        .map_err(AppError::upstream_detailed)?;
    tracing::info!(customer_id = ?created.get("id"), "Customer created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
) -> Result<Json<Value>, AppError> {
    state
        .commerce()?
        .find(&format!("customers/{id}"))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Cliente no encontrado".to_string()))
}

async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "No se proporcionaron datos del cliente")?;
    if let Some(email) = body.get("email").and_then(Value::as_str) {
        Email::parse(email).map_err(|e| AppError::BadRequest(format!("Email inválido: {e}")))?;
    }
    let updated = state
        .commerce()?
        .put(&format!("customers/{id}"), &body)
        .await
        .map_err(AppError::upstream_detailed)?;
    Ok(Json(updated))
}

async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<Value>, AppError> {
    let params = Params::new()
        .with("force", query.force.unwrap_or(true))
        .with_opt("reassign", query.reassign);
    let deleted = state
        .commerce()?
        .delete(&format!("customers/{id}"), &params)
        .await?;
    tracing::info!(customer_id = %id, "Customer deleted");
    Ok(Json(deleted))
}

async fn customer_orders(
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Value>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = clamp_per_page(query.per_page.unwrap_or(10), MAX_PER_PAGE);
    let params = Params::new()
        .with("customer", id)
        .with("page", page)
        .with("per_page", per_page)
        .with_opt("status", non_empty(query.status.as_deref()));
    let orders = state.commerce()?.list_orders(&params).await?;
    Ok(Json(listing("orders", orders, page, per_page)))
}
