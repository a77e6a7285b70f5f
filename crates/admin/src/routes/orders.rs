//! Order route handlers.
//!
//! Every listing goes through [`CommerceClient::list_orders`] so abandoned
//! carts never reach the dashboard, except the dedicated abandoned-cart view.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};
use chrono::Utc;
use ibulore_core::{
    CustomerId, OrderId, amount_to_f64, clamp_per_page, order_status, parse_amount,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::AppError;
use crate::routes::{ForceQuery, json_object, listing, non_empty};
use crate::services::dashboard;
use crate::state::AppState;
use crate::upstream::commerce::{Address, Order};
use crate::upstream::{CommerceClient, MAX_PER_PAGE, Params, UpstreamError};

const SEARCH_LIMIT: u32 = 50;
const HISTORY_LIMIT: u32 = 100;

/// Build the orders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/stats", get(order_stats))
        .route("/orders/search", get(search_orders))
        .route("/orders/abandoned-carts", get(abandoned_carts))
        .route("/orders/test-connection", get(test_connection))
        .route(
            "/orders/{id}",
            get(get_order).put(update_order).delete(delete_order),
        )
        .route("/orders/{id}/notes", get(list_notes).post(add_note))
        .route("/orders/{id}/actions", axum::routing::post(run_action))
        .route("/orders/{id}/customer-history", get(customer_history))
        .route("/orders/{id}/metadata", get(order_metadata))
        .route("/orders/{id}/customer", put(assign_customer))
        .route("/orders/{id}/addresses", put(update_addresses))
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub customer: Option<u64>,
    pub search: Option<String>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub orderby: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    pub note: Option<String>,
    #[serde(default)]
    pub customer_note: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignCustomerRequest {
    pub customer_id: Option<CustomerId>,
}

#[derive(Debug, Deserialize)]
pub struct AddressesRequest {
    pub billing: Option<Address>,
    pub shipping: Option<Address>,
}

// =============================================================================
// Pure helpers
// =============================================================================

/// Device class from a user agent.
fn device_type(user_agent: &str) -> &'static str {
    if user_agent.is_empty() {
        return "Desconocido";
    }
    let ua = user_agent.to_lowercase();
    if ["mobile", "android", "iphone", "ipad"]
        .iter()
        .any(|m| ua.contains(m))
    {
        "Móvil"
    } else if ua.contains("tablet") {
        "Tablet"
    } else {
        "Escritorio"
    }
}

/// Human label for the channel an order was created through.
fn origin(created_via: &str) -> &'static str {
    match created_via {
        "admin" => "Admin",
        "rest-api" => "API",
        "checkout" => "Tienda Online",
        _ => "Directo",
    }
}

fn meta_value<'a>(order: &'a Value, key: &str) -> Option<&'a str> {
    order
        .get("meta_data")?
        .as_array()?
        .iter()
        .find(|m| m.get("key").and_then(Value::as_str) == Some(key))?
        .get("value")?
        .as_str()
}

fn str_field<'a>(order: &'a Value, key: &str) -> Option<&'a str> {
    order.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Request metadata of an order: IP, agent, device and origin.
fn metadata(order: &Value) -> Value {
    let created_via = str_field(order, "created_via").unwrap_or("unknown");
    let customer_ip = str_field(order, "customer_ip_address")
        .or_else(|| meta_value(order, "_customer_ip_address"))
        .unwrap_or_default();
    let user_agent = str_field(order, "customer_user_agent")
        .or_else(|| meta_value(order, "_customer_user_agent"))
        .unwrap_or_default();
    let origin = origin(created_via);

    json!({
        "customer_ip": customer_ip,
        "user_agent": user_agent,
        "device_type": device_type(user_agent),
        "origin": origin,
        "created_via": created_via,
        "order_source": meta_value(order, "_order_source").unwrap_or(origin),
    })
}

/// Purchase totals over the orders that count toward history.
fn history_totals(orders: &[Order], customer_id: u64) -> Value {
    let counted: Vec<&Order> = orders
        .iter()
        .filter(|o| order_status::counts_toward_history(&o.status))
        .collect();
    let spent: Decimal = counted.iter().map(|o| parse_amount(&o.total)).sum();
    let average = if counted.is_empty() {
        Decimal::ZERO
    } else {
        spent / Decimal::from(counted.len())
    };
    json!({
        "total_orders": counted.len(),
        "total_spent": amount_to_f64(spent),
        "average_order_value": amount_to_f64(average),
        "customer_id": customer_id,
        "is_guest": customer_id == 0,
    })
}

/// Outcome of an order action. Only the invoice email needs order data.
fn action_outcome(action: &str, order: &Value) -> Result<Value, AppError> {
    match action {
        "email-invoice" => {
            let email = order
                .pointer("/billing/email")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .ok_or_else(|| {
                    AppError::BadRequest("No se encontró email del cliente".to_string())
                })?;
            Ok(json!({
                "success": true,
                "message": format!("Factura/detalles del pedido enviados a {email}"),
            }))
        }
        "resend-new-order" => Ok(json!({
            "success": true,
            "message": "Notificación de nuevo pedido reenviada al administrador",
        })),
        "regenerate-permissions" => {
            let has_items = order
                .get("line_items")
                .and_then(Value::as_array)
                .is_some_and(|items| !items.is_empty());
            let message = if has_items {
                "Permisos de descarga regenerados correctamente"
            } else {
                "Este pedido no contiene productos descargables"
            };
            Ok(json!({"success": true, "message": message}))
        }
        other => Err(AppError::BadRequest(format!(
            "Acción '{other}' no reconocida"
        ))),
    }
}

/// A created order, unwrapped from a `{details: {...}}` envelope if present.
fn unwrap_created(created: Value) -> Value {
    match created.get("details") {
        Some(details) if details.get("id").is_some() => details.clone(),
        _ => created,
    }
}

/// Slim order view used by search.
fn slim(order: &Order) -> Value {
    json!({
        "id": order.id,
        "number": order.number,
        "status": order.status,
        "date_created": order.date_created,
        "total": order.total,
        "customer_id": order.customer_id,
        "billing": {
            "first_name": order.billing.first_name,
            "last_name": order.billing.last_name,
            "email": order.billing.email.clone().unwrap_or_default(),
        },
    })
}

async fn fetch_order(client: &CommerceClient, id: OrderId) -> Result<Value, AppError> {
    client
        .find(&format!("orders/{id}"))
        .await?
        .ok_or_else(|| AppError::NotFound("Pedido no encontrado".to_string()))
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Value>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = clamp_per_page(query.per_page.unwrap_or(20), MAX_PER_PAGE);
    let params = Params::new()
        .with("page", page)
        .with("per_page", per_page)
        .with("orderby", non_empty(query.orderby.as_deref()).unwrap_or("date"))
        .with("order", non_empty(query.order.as_deref()).unwrap_or("desc"))
        .with_opt("status", non_empty(query.status.as_deref()))
        .with_opt("customer", query.customer.filter(|c| *c > 0))
        .with_opt("search", non_empty(query.search.as_deref()))
        .with_opt("after", non_empty(query.after.as_deref()))
        .with_opt("before", non_empty(query.before.as_deref()));

    let orders = state.commerce()?.list_orders(&params).await?;
    Ok(Json(listing("orders", orders, page, per_page)))
}

async fn create_order(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let body = json_object(&body, "No se proporcionaron datos del pedido")?;
    let has_items = body
        .get("line_items")
        .and_then(Value::as_array)
        .is_some_and(|items| !items.is_empty());
    if !has_items {
        return Err(AppError::BadRequest(
            "El pedido debe tener al menos un producto".to_string(),
        ));
    }

    let created: Value = state
        .commerce()?
        .post("orders", &body)
        .await
        .map_err(AppError::upstream_detailed)?;
    let created = unwrap_created(created);
    tracing::info!(order_id = ?created.get("id"), "Order created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(fetch_order(state.commerce()?, id).await?))
}

async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "No se proporcionaron datos del pedido")?;
    let updated = state
        .commerce()?
        .put(&format!("orders/{id}"), &body)
        .await
        .map_err(AppError::upstream_detailed)?;
    tracing::info!(order_id = %id, "Order updated");
    Ok(Json(updated))
}

async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Query(query): Query<ForceQuery>,
) -> Result<Json<Value>, AppError> {
    let force = query.force.unwrap_or(false);
    let params = if force {
        Params::new().with("force", true)
    } else {
        Params::new()
    };
    let deleted = state
        .commerce()?
        .delete(&format!("orders/{id}"), &params)
        .await?;
    tracing::info!(order_id = %id, force, "Order deleted");
    Ok(Json(deleted))
}

async fn list_notes(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Value>, AppError> {
    let notes = state
        .commerce()?
        .get(&format!("orders/{id}/notes"), &Params::new())
        .await?;
    Ok(Json(notes))
}

async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let body = json_object(&body, "No se proporcionaron datos de la nota")?;
    let request: NoteRequest = serde_json::from_value(Value::Object(body))
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let note = request
        .note
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("El contenido de la nota es requerido".to_string()))?;

    let created: Value = state
        .commerce()?
        .post(
            &format!("orders/{id}/notes"),
            &json!({
                "note": note,
                "customer_note": request.customer_note,
                "added_by_user": true,
            }),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Nota agregada correctamente",
            "note": created,
        })),
    ))
}

async fn run_action(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "No se proporcionaron datos de la acción")?;
    let request: ActionRequest = serde_json::from_value(Value::Object(body))
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let action = request
        .action
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("La acción es requerida".to_string()))?;

    let order = fetch_order(state.commerce()?, id).await?;
    let outcome = action_outcome(action.trim(), &order)?;
    tracing::info!(order_id = %id, action = %action, "Order action executed");
    Ok(Json(outcome))
}

async fn customer_history(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Value>, AppError> {
    let client = state.commerce()?;
    let order: Order = serde_json::from_value(fetch_order(client, id).await?)
        .map_err(|e| AppError::Internal(format!("order {id}: {e}")))?;

    let params = Params::new()
        .with("per_page", HISTORY_LIMIT)
        .with("status", "any");
    let params = if order.customer_id > 0 {
        params.with("customer", order.customer_id)
    } else if let Some(email) = order.billing_email() {
        params.with("search", email)
    } else {
        let total = amount_to_f64(parse_amount(&order.total));
        return Ok(Json(json!({
            "total_orders": 1,
            "total_spent": total,
            "average_order_value": total,
            "customer_id": 0,
            "is_guest": true,
        })));
    };

    let orders = client.list_orders(&params).await?;
    Ok(Json(history_totals(&orders.items, order.customer_id)))
}

async fn order_metadata(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Value>, AppError> {
    let order = fetch_order(state.commerce()?, id).await?;
    Ok(Json(metadata(&order)))
}

async fn order_stats(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let orders = dashboard::window_orders(state.commerce()?, Utc::now()).await?;
    Ok(Json(json!(dashboard::order_stats(&orders))))
}

async fn search_orders(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let Some(q) = non_empty(query.q.as_deref()) else {
        return Ok(Json(json!({"orders": []})));
    };
    let params = Params::new()
        .with("search", q)
        .with("per_page", clamp_per_page(query.limit.unwrap_or(10), SEARCH_LIMIT));
    let orders = state.commerce()?.list_orders(&params).await?;
    let orders: Vec<Value> = orders.items.iter().map(slim).collect();
    Ok(Json(json!({"orders": orders})))
}

/// Draft checkouts, the one view that lists them.
async fn abandoned_carts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = clamp_per_page(query.per_page.unwrap_or(20), MAX_PER_PAGE);
    let params = Params::new()
        .with("page", page)
        .with("per_page", per_page)
        .with("status", order_status::CHECKOUT_DRAFT)
        .with("orderby", "date")
        .with("order", "desc");
    let carts = state
        .commerce()?
        .get_page::<Value>("orders", &params)
        .await?;
    Ok(Json(listing("abandoned_carts", carts, page, per_page)))
}

async fn assign_customer(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "No se proporcionaron datos del cliente")?;
    let customer_id = serde_json::from_value::<AssignCustomerRequest>(Value::Object(body))
        .ok()
        .and_then(|r| r.customer_id)
        .filter(|c| c.as_u64() > 0)
        .ok_or_else(|| AppError::BadRequest("El ID del cliente es requerido".to_string()))?;

    let client = state.commerce()?;
    fetch_order(client, id).await?;
    let customer = client
        .find(&format!("customers/{customer_id}"))
        .await?
        .ok_or_else(|| AppError::NotFound("Cliente no encontrado".to_string()))?;

    let order: Value = client
        .put(&format!("orders/{id}"), &json!({"customer_id": customer_id}))
        .await
        .map_err(AppError::upstream_detailed)?;
    tracing::info!(order_id = %id, customer_id = %customer_id, "Order customer reassigned");
    Ok(Json(json!({
        "success": true,
        "message": "Cliente actualizado correctamente",
        "order": order,
        "customer": customer,
    })))
}

async fn update_addresses(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "No se proporcionaron datos de direcciones")?;
    let request: AddressesRequest = serde_json::from_value(Value::Object(body))
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut update = Map::new();
    if let Some(billing) = request.billing {
        update.insert("billing".to_string(), json!(billing));
    }
    if let Some(shipping) = request.shipping {
        let shipping = Address {
            email: None,
            phone: None,
            ..shipping
        };
        update.insert("shipping".to_string(), json!(shipping));
    }

    let client = state.commerce()?;
    fetch_order(client, id).await?;
    let order: Value = client
        .put(&format!("orders/{id}"), &update)
        .await
        .map_err(AppError::upstream_detailed)?;
    Ok(Json(json!({
        "success": true,
        "message": "Direcciones actualizadas correctamente",
        "order": order,
    })))
}

/// One-record probe of the commerce source.
async fn test_connection(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let probe = state
        .commerce()?
        .get_page::<Value>("orders", &Params::new().with("per_page", 1))
        .await;
    Ok(match probe {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": "Conexión con la tienda exitosa",
                "upstream_status": 200,
            })),
        ),
        Err(e) => {
            let status = e.status();
            let details = match &e {
                UpstreamError::Api { body, .. } => body.clone(),
                other => json!(other.to_string()),
            };
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "status": "error",
                    "message": "Error de conexión con la tienda",
                    "upstream_status": status,
                    "details": details,
                })),
            )
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order(status: &str, total: &str) -> Order {
        serde_json::from_value(json!({"id": 1, "status": status, "total": total})).unwrap()
    }

    #[test]
    fn test_device_type() {
        assert_eq!(device_type(""), "Desconocido");
        assert_eq!(device_type("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)"), "Móvil");
        assert_eq!(device_type("Mozilla/5.0 (iPad; CPU OS 16_0)"), "Móvil");
        assert_eq!(device_type("Mozilla/5.0 (Linux; Tablet)"), "Tablet");
        assert_eq!(device_type("Mozilla/5.0 (Windows NT 10.0; Win64)"), "Escritorio");
    }

    #[test]
    fn test_metadata_falls_back_to_meta_data() {
        let order = json!({
            "created_via": "checkout",
            "customer_ip_address": "",
            "meta_data": [
                {"key": "_customer_ip_address", "value": "10.0.0.1"},
                {"key": "_customer_user_agent", "value": "Android Chrome"},
            ],
        });
        let meta = metadata(&order);
        assert_eq!(meta["customer_ip"], "10.0.0.1");
        assert_eq!(meta["device_type"], "Móvil");
        assert_eq!(meta["origin"], "Tienda Online");
        assert_eq!(meta["order_source"], "Tienda Online");

        let meta = metadata(&json!({"meta_data": [{"key": "_order_source", "value": "Instagram"}]}));
        assert_eq!(meta["created_via"], "unknown");
        assert_eq!(meta["origin"], "Directo");
        assert_eq!(meta["order_source"], "Instagram");
        assert_eq!(meta["device_type"], "Desconocido");
    }

    #[test]
    fn test_history_excludes_failed_and_cancelled() {
        let orders = vec![
            order("completed", "100.00"),
            order("processing", "50.00"),
            order("failed", "999.00"),
            order("cancelled", "999.00"),
            order("checkout-draft", "999.00"),
        ];
        let history = history_totals(&orders, 4);
        assert_eq!(history["total_orders"], 2);
        assert_eq!(history["total_spent"], 150.0);
        assert_eq!(history["average_order_value"], 75.0);
        assert_eq!(history["is_guest"], false);
    }

    #[test]
    fn test_action_outcomes() {
        let order = json!({"billing": {"email": "ana@example.com"}, "line_items": []});
        let sent = action_outcome("email-invoice", &order).unwrap();
        assert!(sent["message"].as_str().unwrap().contains("ana@example.com"));

        let no_email = action_outcome("email-invoice", &json!({"billing": {"email": ""}}));
        assert!(matches!(no_email, Err(AppError::BadRequest(_))));

        let perms = action_outcome("regenerate-permissions", &order).unwrap();
        assert_eq!(perms["message"], "Este pedido no contiene productos descargables");

        assert!(matches!(
            action_outcome("refund-everything", &order),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_unwrap_created() {
        let wrapped = json!({"success": true, "details": {"id": 9, "status": "pending"}});
        assert_eq!(unwrap_created(wrapped)["id"], 9);
        let plain = json!({"id": 10});
        assert_eq!(unwrap_created(plain)["id"], 10);
    }
}
