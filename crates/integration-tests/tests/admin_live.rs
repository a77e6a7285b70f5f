//! Live tests against a running admin server.
//!
//! These tests require:
//! - The admin server running (cargo run -p ibulore-admin)
//! - Valid commerce and content credentials in its environment
//!
//! Run with: cargo test -p ibulore-integration-tests -- --ignored

use ibulore_integration_tests::admin_base_url;
use reqwest::{Client, StatusCode};
use serde_json::Value;

fn client() -> Client {
    Client::builder()
        .build()
        .expect("Failed to create HTTP client")
}

async fn get_json(path: &str) -> (StatusCode, Value) {
    let resp = client()
        .get(format!("{}{path}", admin_base_url()))
        .send()
        .await
        .expect("Request failed");
    let status = resp.status();
    let body = resp.json().await.expect("Response is not JSON");
    (status, body)
}

#[tokio::test]
#[ignore = "Requires running admin server"]
async fn test_live_health() {
    let (status, body) = get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
#[ignore = "Requires running admin server and commerce credentials"]
async fn test_live_connection_check() {
    let (status, body) = get_json("/api/orders/test-connection").await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
#[ignore = "Requires running admin server and commerce credentials"]
async fn test_live_orders_exclude_checkout_drafts() {
    let (status, body) = get_json("/api/orders?per_page=50").await;
    assert_eq!(status, StatusCode::OK);
    let orders = body["orders"].as_array().expect("orders array");
    assert!(orders.iter().all(|o| o["status"] != "checkout-draft"));
    assert!(body["pagination"]["total_pages"].as_u64().is_some());
}

#[tokio::test]
#[ignore = "Requires running admin server and commerce credentials"]
async fn test_live_customers_page_is_bounded() {
    let (status, body) = get_json("/api/customers?per_page=20").await;
    assert_eq!(status, StatusCode::OK);
    let customers = body["customers"].as_array().expect("customers array");
    assert!(customers.len() <= 20);
    for customer in customers {
        assert!(customer["email"].as_str().is_some_and(|e| e.contains('@')));
    }
}

#[tokio::test]
#[ignore = "Requires running admin server and commerce credentials"]
async fn test_live_dashboard_stats_shape() {
    let (status, body) = get_json("/api/dashboard/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("sales").is_some());
    assert!(body.get("recent_activity").is_some());
}

#[tokio::test]
#[ignore = "Requires running admin server and content credentials"]
async fn test_live_comment_counts_cover_every_status() {
    let (status, body) = get_json("/api/blog/comments/counts").await;
    assert_eq!(status, StatusCode::OK);
    for key in ["approved", "hold", "spam", "trash"] {
        assert!(body.get(key).is_some(), "missing {key}: {body}");
    }
}

#[tokio::test]
#[ignore = "Requires running admin server and commerce credentials"]
async fn test_live_unknown_order_is_not_found() {
    let (status, body) = get_json("/api/orders/999999999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some());
}
