//! Inventory projection over commerce products.

use std::future::Future;

use ibulore_core::{ProductId, amount_to_f64, clamp_per_page, parse_amount, round_cents};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::instrument;

use crate::error::AppError;
use crate::upstream::commerce::Product;
use crate::upstream::{CommerceClient, MAX_PER_PAGE, Page, Params, UpstreamError};

/// Threshold used when a product has no (or a zero) `low_stock_amount`.
pub const DEFAULT_LOW_STOCK: i64 = 5;
const DEFAULT_PER_PAGE: u32 = 50;

const STOCK_FIELDS: [&str; 3] = ["stock_quantity", "stock_status", "manage_stock"];
const PRICE_FIELDS: [&str; 2] = ["regular_price", "sale_price"];
const UPDATE_FIELDS: [&str; 7] = [
    "manage_stock",
    "stock_quantity",
    "stock_status",
    "backorders",
    "low_stock_amount",
    "regular_price",
    "sale_price",
];

/// Where inventory reads and writes products.
pub trait ProductSource: Send + Sync {
    fn list_products(
        &self,
        params: &Params,
    ) -> impl Future<Output = Result<Page<Product>, UpstreamError>> + Send;

    fn update_product(
        &self,
        id: ProductId,
        fields: &Map<String, Value>,
    ) -> impl Future<Output = Result<Product, UpstreamError>> + Send;
}

impl ProductSource for CommerceClient {
    async fn list_products(&self, params: &Params) -> Result<Page<Product>, UpstreamError> {
        self.get_page("products", params).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        fields: &Map<String, Value>,
    ) -> Result<Product, UpstreamError> {
        self.put(&format!("products/{id}"), fields).await
    }
}

/// Effective low-stock threshold of a product.
#[must_use]
pub fn low_stock_threshold(product: &Product) -> i64 {
    product
        .low_stock_amount
        .filter(|amount| *amount > 0)
        .unwrap_or(DEFAULT_LOW_STOCK)
}

/// A managed product at or under its threshold.
#[must_use]
pub fn is_low_stock(product: &Product) -> bool {
    product.manage_stock
        && product
            .stock_quantity
            .is_some_and(|qty| qty <= low_stock_threshold(product))
}

/// The inventory view of a product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryItem {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub regular_price: String,
    pub sale_price: String,
    pub manage_stock: bool,
    pub stock_quantity: Option<i64>,
    pub stock_status: String,
    pub backorders: String,
    pub low_stock_amount: Option<i64>,
    pub images: Vec<Value>,
    pub categories: Vec<Value>,
    #[serde(rename = "type")]
    pub product_type: String,
    pub status: String,
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

impl From<Product> for InventoryItem {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            regular_price: or_default(&p.regular_price, "0"),
            stock_status: or_default(&p.stock_status, "instock"),
            backorders: or_default(&p.backorders, "no"),
            product_type: or_default(&p.product_type, "simple"),
            status: or_default(&p.status, "publish"),
            name: p.name,
            sku: p.sku,
            sale_price: p.sale_price,
            manage_stock: p.manage_stock,
            stock_quantity: p.stock_quantity,
            low_stock_amount: p.low_stock_amount,
            images: p.images,
            categories: p.categories,
        }
    }
}

/// Query of `GET /inventory`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub stock_status: Option<String>,
    #[serde(default)]
    pub low_stock: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryList {
    pub products: Vec<InventoryItem>,
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
}

/// Body of `POST /inventory/bulk-update`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkInventoryRequest {
    pub products: Option<Vec<Value>>,
    pub update_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkInventoryResult {
    pub id: ProductId,
    pub success: bool,
    pub data: InventoryItem,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkInventoryOutcome {
    pub success: usize,
    pub errors: usize,
    pub results: Vec<BulkInventoryResult>,
    pub error_details: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryStats {
    pub total_products: usize,
    pub in_stock: usize,
    pub out_of_stock: usize,
    pub low_stock: usize,
    pub total_stock_value: f64,
}

/// Prices are forwarded to the source as strings.
fn price_string(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        Value::Null => Value::String(String::new()),
        other => Value::String(other.to_string()),
    }
}

/// Pick the whitelisted fields out of a request body.
fn pick_fields(body: &Map<String, Value>, fields: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|key| {
            body.get(*key).map(|value| {
                let value = if PRICE_FIELDS.contains(key) {
                    price_string(value)
                } else {
                    value.clone()
                };
                ((*key).to_string(), value)
            })
        })
        .collect()
}

/// Fields a bulk item may carry for an update type.
fn bulk_fields(update_type: &str) -> Vec<&'static str> {
    match update_type {
        "stock" => STOCK_FIELDS.to_vec(),
        "price" => PRICE_FIELDS.to_vec(),
        "individual" => STOCK_FIELDS.iter().chain(&PRICE_FIELDS).copied().collect(),
        _ => Vec::new(),
    }
}

/// Fold a product list into inventory statistics.
#[must_use]
pub fn stats(products: &[Product]) -> InventoryStats {
    let mut stats = InventoryStats {
        total_products: products.len(),
        in_stock: 0,
        out_of_stock: 0,
        low_stock: 0,
        total_stock_value: 0.0,
    };
    let mut value = Decimal::ZERO;
    for product in products {
        match product.stock_status.as_str() {
            "instock" | "" => stats.in_stock += 1,
            "outofstock" => stats.out_of_stock += 1,
            _ => {}
        }
        let Some(qty) = product.stock_quantity.filter(|_| product.manage_stock) else {
            continue;
        };
        if qty > 0 && qty <= low_stock_threshold(product) {
            stats.low_stock += 1;
        }
        value += Decimal::from(qty) * parse_amount(&product.regular_price);
    }
    stats.total_stock_value = amount_to_f64(round_cents(value));
    stats
}

/// Inventory operations over a [`ProductSource`].
#[derive(Debug)]
pub struct InventoryService<'a, S> {
    source: &'a S,
}

impl<'a, S: ProductSource> InventoryService<'a, S> {
    #[must_use]
    pub const fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// One page of products projected for inventory, optionally narrowed
    /// to low stock after the fetch.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    #[instrument(skip(self, query))]
    pub async fn list(&self, query: &InventoryQuery) -> Result<InventoryList, AppError> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = clamp_per_page(query.per_page.unwrap_or(DEFAULT_PER_PAGE), MAX_PER_PAGE);
        let params = Params::new()
            .with("page", page)
            .with("per_page", per_page)
            .with("orderby", "date")
            .with("order", "desc")
            .with_opt("search", query.search.as_deref().filter(|s| !s.is_empty()))
            .with_opt(
                "stock_status",
                query.stock_status.as_deref().filter(|s| !s.is_empty()),
            );

        let fetched = self.source.list_products(&params).await?;
        let products: Vec<InventoryItem> = fetched
            .items
            .into_iter()
            .filter(|p| !query.low_stock || is_low_stock(p))
            .map(InventoryItem::from)
            .collect();

        Ok(InventoryList {
            total: products.len(),
            products,
            page,
            per_page,
        })
    }

    /// Apply a partial inventory update.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` when the body carries no inventory field, or
    /// the upstream error.
    pub async fn update(
        &self,
        id: ProductId,
        body: &Map<String, Value>,
    ) -> Result<InventoryItem, AppError> {
        let fields = pick_fields(body, &UPDATE_FIELDS);
        if fields.is_empty() {
            return Err(AppError::BadRequest(
                "No se proporcionaron datos de inventario".to_string(),
            ));
        }
        let product = self.source.update_product(id, &fields).await?;
        tracing::info!(product_id = %id, fields = fields.len(), "Inventory updated");
        Ok(product.into())
    }

    /// Update many products, each independently.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` when `products` is missing. Per-item failures
    /// land in `error_details`.
    pub async fn bulk_update(
        &self,
        request: BulkInventoryRequest,
    ) -> Result<BulkInventoryOutcome, AppError> {
        let items = request.products.ok_or_else(|| {
            AppError::BadRequest("No se proporcionaron datos para actualización masiva".to_string())
        })?;
        let update_type = request.update_type.unwrap_or_else(|| "individual".to_string());
        let allowed = bulk_fields(&update_type);

        let mut results = Vec::new();
        let mut error_details = Vec::new();
        for item in items {
            let Some(id) = item.get("id").and_then(Value::as_u64).map(ProductId::new) else {
                error_details.push(json!({"error": "ID de producto faltante", "data": item}));
                continue;
            };
            let fields = item
                .as_object()
                .map(|body| pick_fields(body, &allowed))
                .unwrap_or_default();
            if fields.is_empty() {
                error_details.push(json!({"id": id, "error": "No hay datos válidos para actualizar"}));
                continue;
            }
            match self.source.update_product(id, &fields).await {
                Ok(product) => results.push(BulkInventoryResult {
                    id,
                    success: true,
                    data: product.into(),
                }),
                Err(e) => {
                    tracing::warn!(product_id = %id, error = %e, "Bulk inventory update failed");
                    error_details.push(json!({"id": id, "error": e.to_string()}));
                }
            }
        }

        tracing::info!(
            update_type = %update_type,
            updated = results.len(),
            failed = error_details.len(),
            "Bulk inventory update"
        );
        Ok(BulkInventoryOutcome {
            success: results.len(),
            errors: error_details.len(),
            results,
            error_details,
        })
    }

    async fn recent(&self, params: Params) -> Result<Vec<Product>, AppError> {
        let params = params
            .with("per_page", MAX_PER_PAGE)
            .with("orderby", "date")
            .with("order", "desc");
        Ok(self.source.list_products(&params).await?.items)
    }

    /// Managed products at or under their threshold.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    pub async fn low_stock(&self) -> Result<Value, AppError> {
        let products: Vec<Value> = self
            .recent(Params::new())
            .await?
            .iter()
            .filter(|p| is_low_stock(p))
            .map(|p| {
                json!({
                    "id": p.id,
                    "name": p.name,
                    "sku": p.sku,
                    "stock_quantity": p.stock_quantity,
                    "low_stock_amount": low_stock_threshold(p),
                    "stock_status": or_default(&p.stock_status, "instock"),
                    "images": p.images,
                })
            })
            .collect();
        Ok(json!({"total": products.len(), "products": products}))
    }

    /// Products whose stock status is `outofstock`.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    pub async fn out_of_stock(&self) -> Result<Value, AppError> {
        let products: Vec<Value> = self
            .recent(Params::new().with("stock_status", "outofstock"))
            .await?
            .into_iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "name": p.name,
                    "sku": p.sku,
                    "stock_quantity": p.stock_quantity,
                    "stock_status": or_default(&p.stock_status, "outofstock"),
                    "manage_stock": p.manage_stock,
                    "images": p.images,
                    "regular_price": or_default(&p.regular_price, "0"),
                })
            })
            .collect();
        Ok(json!({"total": products.len(), "products": products}))
    }

    /// Stock statistics over the most recent products.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    pub async fn stats(&self) -> Result<InventoryStats, AppError> {
        Ok(stats(&self.recent(Params::new()).await?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeProducts {
        products: Vec<Product>,
        failing_ids: Vec<u64>,
        requests: Mutex<Vec<Params>>,
        updates: Mutex<Vec<(u64, Map<String, Value>)>>,
    }

    fn product(id: u64, manage: bool, qty: Option<i64>, threshold: Option<i64>) -> Product {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("Producto {id}"),
            "manage_stock": manage,
            "stock_quantity": qty,
            "low_stock_amount": threshold,
            "regular_price": "10.50",
            "stock_status": if qty == Some(0) { "outofstock" } else { "instock" },
        }))
        .unwrap()
    }

    impl ProductSource for FakeProducts {
        async fn list_products(&self, params: &Params) -> Result<Page<Product>, UpstreamError> {
            self.requests.lock().unwrap().push(params.clone());
            let items: Vec<Product> = self.products.clone();
            Ok(Page {
                total: items.len() as u64,
                items,
                total_pages: 1,
                total_reported: true,
            })
        }

        async fn update_product(
            &self,
            id: ProductId,
            fields: &Map<String, Value>,
        ) -> Result<Product, UpstreamError> {
            if self.failing_ids.contains(&id.as_u64()) {
                return Err(UpstreamError::NotFound(format!("product {id}")));
            }
            self.updates.lock().unwrap().push((id.as_u64(), fields.clone()));
            let mut body = json!({"id": id});
            body.as_object_mut().unwrap().extend(fields.clone());
            Ok(serde_json::from_value(body).unwrap())
        }
    }

    #[test]
    fn test_low_stock_predicate() {
        assert!(is_low_stock(&product(1, true, Some(5), None)));
        assert!(!is_low_stock(&product(2, true, Some(6), None)));
        assert!(is_low_stock(&product(3, true, Some(8), Some(10))));
        assert!(is_low_stock(&product(4, true, Some(4), Some(0))));
        assert!(!is_low_stock(&product(5, false, Some(1), None)));
        assert!(!is_low_stock(&product(6, true, None, None)));
    }

    #[test]
    fn test_projection_defaults() {
        let p: Product = serde_json::from_value(json!({"id": 3, "name": "Collar"})).unwrap();
        let item = serde_json::to_value(InventoryItem::from(p)).unwrap();
        assert_eq!(item["regular_price"], "0");
        assert_eq!(item["stock_status"], "instock");
        assert_eq!(item["backorders"], "no");
        assert_eq!(item["type"], "simple");
        assert_eq!(item["status"], "publish");
        assert_eq!(item["stock_quantity"], Value::Null);
    }

    #[test]
    fn test_stats() {
        let products = vec![
            product(1, true, Some(0), None),
            product(2, true, Some(3), None),
            product(3, true, Some(20), None),
            product(4, false, Some(2), None),
        ];
        let s = stats(&products);
        assert_eq!(s.total_products, 4);
        assert_eq!(s.in_stock, 3);
        assert_eq!(s.out_of_stock, 1);
        // zero quantity is out of stock, not low
        assert_eq!(s.low_stock, 1);
        assert!((s.total_stock_value - 241.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_list_low_stock_filter() {
        let source = FakeProducts {
            products: vec![
                product(1, true, Some(2), None),
                product(2, true, Some(50), None),
                product(3, false, Some(1), None),
            ],
            ..FakeProducts::default()
        };
        let list = InventoryService::new(&source)
            .list(&InventoryQuery {
                per_page: Some(500),
                low_stock: true,
                search: Some(String::new()),
                ..InventoryQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.products[0].id, ProductId::new(1));
        assert_eq!(list.per_page, 100);

        let params = source.requests.lock().unwrap()[0].clone();
        assert_eq!(params.get("per_page"), Some("100"));
        assert_eq!(params.get("search"), None);
    }

    #[tokio::test]
    async fn test_update_stringifies_prices() {
        let source = FakeProducts::default();
        let body = json!({"regular_price": 199.5, "stock_quantity": 4, "color": "rojo"});
        let item = InventoryService::new(&source)
            .update(ProductId::new(7), body.as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(item.regular_price, "199.5");
        assert_eq!(item.stock_quantity, Some(4));

        let updates = source.updates.lock().unwrap();
        assert_eq!(updates[0].1.get("regular_price"), Some(&json!("199.5")));
        assert!(!updates[0].1.contains_key("color"));
    }

    #[tokio::test]
    async fn test_empty_update_rejected() {
        let source = FakeProducts::default();
        let err = InventoryService::new(&source)
            .update(ProductId::new(7), &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_bulk_update_isolates_items() {
        let source = FakeProducts {
            failing_ids: vec![9],
            ..FakeProducts::default()
        };
        let outcome = InventoryService::new(&source)
            .bulk_update(BulkInventoryRequest {
                products: Some(vec![
                    json!({"id": 1, "stock_quantity": 10, "regular_price": "5"}),
                    json!({"stock_quantity": 3}),
                    json!({"id": 2, "regular_price": "12"}),
                    json!({"id": 9, "stock_quantity": 1}),
                ]),
                update_type: Some("stock".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(outcome.success, 1);
        assert_eq!(outcome.errors, 3);
        assert_eq!(outcome.results[0].id, ProductId::new(1));
        assert_eq!(outcome.error_details[0]["error"], "ID de producto faltante");
        assert_eq!(outcome.error_details[1]["id"], 2);
        assert_eq!(outcome.error_details[2]["id"], 9);

        // stock updates never carry prices
        let updates = source.updates.lock().unwrap();
        assert!(!updates[0].1.contains_key("regular_price"));
    }

    #[tokio::test]
    async fn test_bulk_update_requires_products() {
        let source = FakeProducts::default();
        let err = InventoryService::new(&source)
            .bulk_update(BulkInventoryRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_low_stock_report_uses_effective_threshold() {
        let source = FakeProducts {
            products: vec![product(1, true, Some(3), None), product(2, true, Some(30), None)],
            ..FakeProducts::default()
        };
        let report = InventoryService::new(&source).low_stock().await.unwrap();
        assert_eq!(report["total"], 1);
        assert_eq!(report["products"][0]["low_stock_amount"], 5);
    }
}
