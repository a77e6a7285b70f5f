//! Order webhook receiver.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde_json::{Value, json};

use crate::error::AppError;
use crate::services::webhooks::{
    SIGNATURE_HEADER, TOPIC_HEADER, is_ping, order_id, verify_signature,
};
use crate::state::AppState;

/// Build the webhooks router.
pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/orders", post(order_webhook))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Receive an order event. The raw body is kept for signature checks.
async fn order_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    if is_ping(&body) {
        tracing::info!("Order webhook ping received");
        return Ok(Json(json!({"status": "received"})));
    }

    if let Some(secret) = &state.config().webhook_secret {
        verify_signature(secret, &body, header(&headers, SIGNATURE_HEADER)).map_err(|e| {
            tracing::warn!(error = %e, "Rejected order webhook");
            AppError::Unauthorized(e.to_string())
        })?;
    }

    tracing::info!(
        topic = header(&headers, TOPIC_HEADER).unwrap_or("unknown"),
        order_id = ?order_id(&body),
        "Order webhook received"
    );
    Ok(Json(json!({"status": "received"})))
}
