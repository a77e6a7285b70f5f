//! Dashboard statistics routes.

use axum::{Json, Router, extract::State, routing::get};
use chrono::Utc;

use crate::error::AppError;
use crate::services::dashboard::{self, DashboardStats, QuickStats};
use crate::state::AppState;

/// Build the dashboard router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard/stats", get(stats))
        .route("/dashboard/quick-stats", get(quick_stats))
}

/// Full dashboard. Sections whose fetch fails come back zeroed.
async fn stats(State(state): State<AppState>) -> Result<Json<DashboardStats>, AppError> {
    let client = state.commerce()?;
    let now = Utc::now();
    let inputs = dashboard::collect(client, now).await;
    Ok(Json(dashboard::compose(&inputs, now)))
}

async fn quick_stats(State(state): State<AppState>) -> Result<Json<QuickStats>, AppError> {
    let client = state.commerce()?;
    Ok(Json(dashboard::quick_stats(client, Utc::now()).await))
}
