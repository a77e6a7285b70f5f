//! Integration test support for the Ibulore admin backend.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests (no network, no upstream credentials)
//! cargo test -p ibulore-integration-tests
//!
//! # Live tests against a running server with real credentials
//! cargo run -p ibulore-admin &
//! cargo test -p ibulore-integration-tests -- --ignored
//! ```
//!
//! In-process tests drive the router built by [`ibulore_admin::app`] with
//! `tower::ServiceExt::oneshot`. Sources whose credentials are not passed to
//! [`TestApp::new`] stay unconfigured.

use std::collections::HashMap;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use ibulore_admin::config::AdminConfig;
use ibulore_admin::state::AppState;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Base URL for live tests (configurable via environment).
#[must_use]
pub fn admin_base_url() -> String {
    std::env::var("ADMIN_BASE_URL").unwrap_or_else(|_| "http://localhost:5001".to_string())
}

/// An in-process admin app with its own generated-images directory.
pub struct TestApp {
    router: Router,
    images: TempDir,
}

impl TestApp {
    /// Build the app from the given environment variables.
    ///
    /// # Panics
    ///
    /// Panics if the configuration or state cannot be built.
    #[must_use]
    pub fn new(vars: &[(&str, &str)]) -> Self {
        let images = TempDir::new().expect("Failed to create images dir");
        let mut env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        env.insert(
            "GENERATED_IMAGES_DIR".to_string(),
            images.path().display().to_string(),
        );

        let config =
            AdminConfig::from_vars(|key| env.get(key).cloned()).expect("Invalid test config");
        let state = AppState::new(config).expect("Failed to build state");
        Self {
            router: ibulore_admin::app(state),
            images,
        }
    }

    /// App with no upstream sources configured.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self::new(&[])
    }

    #[must_use]
    pub fn images_dir(&self) -> &std::path::Path {
        self.images.path()
    }

    /// Send a request and return the status with the raw body.
    ///
    /// # Panics
    ///
    /// Panics if the router fails or the body cannot be read.
    pub async fn send_raw(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        (status, bytes.to_vec())
    }

    /// Send a request and parse the JSON body (`Null` when empty).
    ///
    /// # Panics
    ///
    /// Panics if the body is not JSON.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(request).await;
        if bytes.is_empty() {
            return (status, Value::Null);
        }
        let body = serde_json::from_slice(&bytes).expect("Response is not JSON");
        (status, body)
    }

    /// `GET` a path.
    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(empty_request("GET", path)).await
    }
}

/// A bodiless request.
///
/// # Panics
///
/// Panics if the method or path is malformed.
#[must_use]
pub fn empty_request(method: &str, path: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .expect("Invalid request")
}

/// A request with a JSON body.
///
/// # Panics
///
/// Panics if the method or path is malformed.
#[must_use]
pub fn json_request(method: &str, path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("Invalid request")
}

/// Multipart form body with text fields and one file part.
#[must_use]
pub fn multipart_body(
    boundary: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &str, &[u8])>,
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((field, file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
