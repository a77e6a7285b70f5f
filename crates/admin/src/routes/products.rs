//! Product route handlers.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use ibulore_core::{ProductId, amount_to_f64, clamp_per_page, parse_amount};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::routes::{json_object, listing, non_empty};
use crate::state::AppState;
use crate::upstream::commerce::Product;
use crate::upstream::{MAX_PER_PAGE, Params};

const SEARCH_LIMIT: u32 = 50;

/// Build the products router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/search", get(search_products))
        .route("/products/recent", get(recent_products))
        .route("/products/low-stock", get(low_stock_products))
        .route("/products/bulk-delete", post(bulk_delete))
        .route("/products/by-category/{category_id}", get(by_category))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/products/{id}/images", post(upload_image))
        .route("/products/{id}/stock", get(product_stock))
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub orderby: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub in_stock: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryProductsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub orderby: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdQuery {
    pub threshold: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub product_ids: Option<Vec<ProductId>>,
}

// =============================================================================
// Projections
// =============================================================================

fn price(raw: &str) -> f64 {
    amount_to_f64(parse_amount(raw))
}

fn extra_or(product: &Product, key: &str, default: Value) -> Value {
    product.extra.get(key).cloned().unwrap_or(default)
}

/// The order-entry view of a product returned by search.
fn enhanced(product: &Product) -> Value {
    json!({
        "id": product.id,
        "name": product.name,
        "sku": product.sku,
        "price": price(&product.price),
        "regular_price": price(&product.regular_price),
        "sale_price": price(&product.sale_price),
        "stock_quantity": product.stock_quantity.filter(|_| product.manage_stock),
        "manage_stock": product.manage_stock,
        "in_stock": product.stock_status == "instock",
        "stock_status": if product.stock_status.is_empty() { "outofstock" } else { product.stock_status.as_str() },
        "image": product.first_image(),
        "type": if product.product_type.is_empty() { "simple" } else { product.product_type.as_str() },
        "categories": product.category_names(),
        "short_description": extra_or(product, "short_description", json!("")),
        "weight": extra_or(product, "weight", json!("")),
        "dimensions": extra_or(product, "dimensions", json!({})),
        "shipping_required": product.flag("shipping_required", true),
        "virtual": product.flag("virtual", false),
        "downloadable": product.flag("downloadable", false),
    })
}

// =============================================================================
// Handlers
// =============================================================================

/// List products with header pagination.
async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<Value>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = clamp_per_page(query.per_page.unwrap_or(50), MAX_PER_PAGE);
    let params = Params::new()
        .with("page", page)
        .with("per_page", per_page)
        .with("orderby", non_empty(query.orderby.as_deref()).unwrap_or("date"))
        .with("order", non_empty(query.order.as_deref()).unwrap_or("desc"))
        .with_opt("search", non_empty(query.search.as_deref()))
        .with_opt("status", non_empty(query.status.as_deref()))
        .with_opt("category", non_empty(query.category.as_deref()));

    let products = state
        .commerce()?
        .get_page::<Value>("products", &params)
        .await?;
    Ok(Json(listing("products", products, page, per_page)))
}

async fn create_product(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let body = json_object(&body, "No product data provided")?;
    let created: Value = state.commerce()?.post("products", &body).await?;
    tracing::info!(product_id = ?created.get("id"), "Product created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Value>, AppError> {
    let product = state
        .commerce()?
        .get(&format!("products/{id}"), &Params::new())
        .await?;
    Ok(Json(product))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body = json_object(&body, "No product data provided")?;
    let updated = state
        .commerce()?
        .put(&format!("products/{id}"), &body)
        .await?;
    tracing::info!(product_id = %id, "Product updated");
    Ok(Json(updated))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Value>, AppError> {
    let deleted = state
        .commerce()?
        .delete(&format!("products/{id}"), &Params::new().with("force", true))
        .await?;
    tracing::info!(product_id = %id, "Product deleted");
    Ok(Json(deleted))
}

/// Image upload is not offered for products yet.
async fn upload_image(Path(id): Path<ProductId>) -> impl IntoResponse {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "message": "Image upload functionality will be available soon",
            "product_id": id,
        })),
    )
}

/// Delete products one by one, reporting each failure.
async fn bulk_delete(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let request: BulkDeleteRequest = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("No product IDs provided".to_string()))?;
    let ids = request
        .product_ids
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| AppError::BadRequest("product_ids must be a non-empty array".to_string()))?;

    let client = state.commerce()?;
    let mut deleted = Vec::new();
    let mut failed = Vec::new();
    for id in ids {
        match client
            .delete::<Value>(&format!("products/{id}"), &Params::new().with("force", true))
            .await
        {
            Ok(_) => deleted.push(id),
            Err(e) => failed.push(json!({"id": id, "error": e.to_string()})),
        }
    }

    tracing::info!(deleted = deleted.len(), failed = failed.len(), "Bulk product delete");
    Ok(Json(json!({
        "total_deleted": deleted.len(),
        "total_failed": failed.len(),
        "deleted": deleted,
        "failed": failed,
    })))
}

/// Published products matching `q`, shaped for order entry.
async fn search_products(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let Some(q) = non_empty(query.q.as_deref()) else {
        return Ok(Json(json!({"products": []})));
    };
    let params = Params::new()
        .with("search", q)
        .with("per_page", clamp_per_page(query.limit.unwrap_or(10), SEARCH_LIMIT))
        .with("status", "publish")
        .with_opt("category", non_empty(query.category.as_deref()))
        .with_opt(
            "stock_status",
            query.in_stock.unwrap_or(true).then_some("instock"),
        );

    let products = state
        .commerce()?
        .get_page::<Product>("products", &params)
        .await?;
    let products: Vec<Value> = products.items.iter().map(enhanced).collect();
    Ok(Json(json!({"products": products})))
}

async fn by_category(
    State(state): State<AppState>,
    Path(category_id): Path<u64>,
    Query(query): Query<CategoryProductsQuery>,
) -> Result<Json<Value>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = clamp_per_page(query.per_page.unwrap_or(20), MAX_PER_PAGE);
    let params = Params::new()
        .with("category", category_id)
        .with("page", page)
        .with("per_page", per_page)
        .with("orderby", non_empty(query.orderby.as_deref()).unwrap_or("menu_order"))
        .with("order", non_empty(query.order.as_deref()).unwrap_or("asc"))
        .with("status", "publish");

    let products = state
        .commerce()?
        .get_page::<Value>("products", &params)
        .await?;
    let mut body = listing("products", products, page, per_page);
    body["category_id"] = json!(category_id);
    Ok(Json(body))
}

/// Managed products at or under `threshold`, lowest stock first.
async fn low_stock_products(
    State(state): State<AppState>,
    Query(query): Query<ThresholdQuery>,
) -> Result<Json<Value>, AppError> {
    let threshold = query.threshold.unwrap_or(5);
    let params = Params::new()
        .with("per_page", MAX_PER_PAGE)
        .with("status", "publish");
    let mut products: Vec<Product> = state
        .commerce()?
        .get_page::<Product>("products", &params)
        .await?
        .items
        .into_iter()
        .filter(|p| p.manage_stock && p.stock_quantity.is_some_and(|q| q <= threshold))
        .collect();
    products.sort_by_key(|p| p.stock_quantity.unwrap_or(0));

    let products: Vec<Value> = products
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "name": p.name,
                "sku": p.sku,
                "stock_quantity": p.stock_quantity,
                "stock_status": p.stock_status,
                "categories": p.category_names(),
                "price": p.price,
            })
        })
        .collect();
    Ok(Json(json!({
        "total_low_stock": products.len(),
        "products": products,
        "threshold": threshold,
    })))
}

async fn recent_products(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, AppError> {
    let params = Params::new()
        .with("per_page", clamp_per_page(query.limit.unwrap_or(10), SEARCH_LIMIT))
        .with("orderby", "date")
        .with("order", "desc")
        .with("status", "publish");
    let products: Vec<Value> = state
        .commerce()?
        .get_page::<Product>("products", &params)
        .await?
        .items
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "name": p.name,
                "sku": p.sku,
                "price": p.price,
                "date_created": p.date_created,
                "categories": p.category_names(),
                "image": p.first_image(),
                "stock_status": p.stock_status,
                "manage_stock": p.manage_stock,
                "stock_quantity": p.stock_quantity,
            })
        })
        .collect();
    Ok(Json(json!({"products": products})))
}

async fn product_stock(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Value>, AppError> {
    let product = state
        .commerce()?
        .find(&format!("products/{id}"))
        .await?
        .ok_or_else(|| AppError::NotFound("Producto no encontrado".to_string()))?;
    let product: Product = serde_json::from_value(product)
        .map_err(|e| AppError::Internal(format!("product {id}: {e}")))?;

    Ok(Json(json!({
        "product_id": product.id,
        "name": product.name,
        "sku": product.sku,
        "manage_stock": product.manage_stock,
        "stock_quantity": product.stock_quantity,
        "stock_status": product.stock_status,
        "backorders": if product.backorders.is_empty() { "no" } else { product.backorders.as_str() },
        "backorders_allowed": product.flag("backorders_allowed", false),
        "backordered": product.flag("backordered", false),
        "sold_individually": product.flag("sold_individually", false),
        "low_stock_amount": product.low_stock_amount,
    })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_enhanced_projection() {
        let product: Product = serde_json::from_value(json!({
            "id": 5,
            "name": "Collar Yemayá",
            "price": "250.00",
            "regular_price": "300",
            "sale_price": "",
            "manage_stock": false,
            "stock_quantity": 7,
            "stock_status": "instock",
            "images": [{"src": "https://img/1.jpg"}, {"src": "https://img/2.jpg"}],
            "categories": [{"id": 1, "name": "Collares"}],
            "virtual": true,
        }))
        .unwrap();
        let view = enhanced(&product);

        assert!((view["price"].as_f64().unwrap() - 250.0).abs() < f64::EPSILON);
        assert!(view["sale_price"].as_f64().unwrap().abs() < f64::EPSILON);
        assert_eq!(view["stock_quantity"], Value::Null);
        assert_eq!(view["in_stock"], true);
        assert_eq!(view["image"], "https://img/1.jpg");
        assert_eq!(view["categories"], json!(["Collares"]));
        assert_eq!(view["type"], "simple");
        assert_eq!(view["virtual"], true);
        assert_eq!(view["shipping_required"], true);
        assert_eq!(view["dimensions"], json!({}));
    }
}
