//! Ibulore admin backend.
//!
//! Proxies the store's commerce and content REST APIs for the admin
//! dashboard, reconciles registered and guest customers, projects inventory,
//! moderates blog comments and drafts blog content through a completion API.
//!
//! # Security
//!
//! The server holds store-wide credentials for both upstream sources and
//! does no user authentication of its own. Run it behind the dashboard's
//! own access control.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod upstream;

use axum::Router;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Build the application router: `/health` at the root, everything else
/// under `/api`.
pub fn app(state: AppState) -> Router {
    let api = routes::router().merge(routes::ai::static_files(state.images().dir()));
    Router::new()
        .merge(routes::health_router())
        .nest("/api", api)
        .with_state(state)
}

/// CORS for the dashboard origins. An empty list allows any origin.
#[must_use]
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}
