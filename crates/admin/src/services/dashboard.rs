//! Dashboard statistics.
//!
//! Fetching and folding are separate: [`collect`] reads the commerce source
//! and degrades each failed section to empty, [`compose`] is a pure fold
//! over what was read.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use ibulore_core::{amount_to_f64, parse_amount, round_cents};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::services::inventory::is_low_stock;
use crate::upstream::commerce::{Customer, Order, Product};
use crate::upstream::{CommerceClient, MAX_PER_PAGE, Params, UpstreamError};

pub const CURRENCY: &str = "MXN";
/// Trailing window for order and customer statistics.
const WINDOW_DAYS: i64 = 30;
const RECENT_PRODUCTS: u32 = 5;
const RECENT_CUSTOMERS: u32 = 10;
const ACTIVITY_ORDERS: usize = 3;
const ACTIVITY_PRODUCTS: usize = 2;
const ACTIVITY_LIMIT: usize = 5;
const CHART_POINTS: i64 = 12;

/// Everything the dashboard reads from the commerce source.
#[derive(Debug, Clone, Default)]
pub struct DashboardInputs {
    pub orders: Vec<Order>,
    pub total_products: u64,
    pub recent_products: Vec<Product>,
    pub total_customers: u64,
    pub recent_customers: Vec<Customer>,
    pub stock_products: Vec<Product>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesSummary {
    pub total: f64,
    pub currency: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrdersSummary {
    pub total: u64,
    pub completed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductsSummary {
    pub total: u64,
    pub low_stock: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomersSummary {
    pub total: u64,
    pub new_this_month: u64,
}

/// One entry of the recent activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityItem {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub time: String,
    pub status: String,
    #[serde(skip)]
    at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub month: String,
    pub revenue: f64,
}

/// Response of `GET /dashboard/stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub sales: SalesSummary,
    pub orders: OrdersSummary,
    pub products: ProductsSummary,
    pub customers: CustomersSummary,
    pub recent_activity: Vec<ActivityItem>,
    pub sales_chart: Vec<ChartPoint>,
}

/// Response of `GET /dashboard/quick-stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickStats {
    pub total_orders: u64,
    pub total_products: u64,
    pub total_customers: u64,
    pub timestamp: String,
}

/// Response of `GET /orders/stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStats {
    pub total_orders: u64,
    pub orders_by_status: BTreeMap<String, u64>,
    pub pending_orders: u64,
    pub processing_orders: u64,
    pub completed_orders: u64,
    pub cancelled_orders: u64,
    pub total_revenue: f64,
    pub average_order_value: f64,
    pub top_products: Vec<Value>,
}

/// Order totals over a set of orders, abandoned carts skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct OrderTotals {
    count: u64,
    completed: u64,
    revenue: Decimal,
}

impl OrderTotals {
    fn of(orders: &[Order]) -> Self {
        orders
            .iter()
            .filter(|o| !o.is_abandoned_cart())
            .fold(Self::default(), |mut acc, order| {
                acc.count += 1;
                if order.status == "completed" {
                    acc.completed += 1;
                }
                if order.counts_toward_revenue() {
                    acc.revenue += parse_amount(&order.total);
                }
                acc
            })
    }
}

/// Parse a source timestamp. Offsets are honoured; naive values are UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// The most precise timestamp of a record: the `_gmt` field when present.
fn record_time(gmt: Option<&Value>, local: Option<&str>) -> Option<DateTime<Utc>> {
    gmt.and_then(Value::as_str)
        .and_then(parse_timestamp)
        .or_else(|| local.and_then(parse_timestamp))
}

fn plural(n: i64, word: &str) -> String {
    if n == 1 {
        format!("Hace {n} {word}")
    } else {
        format!("Hace {n} {word}s")
    }
}

/// Relative time in Spanish: days, else hours past the first hour, else
/// minutes.
#[must_use]
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - then).max(Duration::zero());
    let days = diff.num_days();
    if days > 0 {
        return plural(days, "día");
    }
    let seconds = diff.num_seconds();
    if seconds > 3600 {
        return plural(seconds / 3600, "hora");
    }
    plural(seconds / 60, "minuto")
}

/// Twelve synthetic monthly points scaled from the window's revenue.
#[must_use]
pub fn sales_chart(total_revenue: Decimal, now: DateTime<Utc>) -> Vec<ChartPoint> {
    (0..CHART_POINTS)
        .map(|i| {
            let month = now - Duration::days(30 * (CHART_POINTS - i));
            let factor = Decimal::new(80 + 2 * i, 2);
            ChartPoint {
                month: month.format("%B %Y").to_string(),
                revenue: amount_to_f64(total_revenue * factor),
            }
        })
        .collect()
}

fn activity(inputs: &DashboardInputs, now: DateTime<Utc>) -> Vec<ActivityItem> {
    let orders = inputs
        .orders
        .iter()
        .filter(|o| !o.is_abandoned_cart())
        .take(ACTIVITY_ORDERS)
        .filter_map(|order| {
            let at = record_time(
                order.extra.get("date_created_gmt"),
                order.date_created.as_deref(),
            )?;
            let number = if order.number.is_empty() {
                order.id.to_string()
            } else {
                order.number.clone()
            };
            Some(ActivityItem {
                kind: "order",
                title: format!("Nuevo pedido #{number}"),
                time: time_ago(at, now),
                status: if order.status.is_empty() {
                    "pending".to_string()
                } else {
                    order.status.clone()
                },
                at,
            })
        });

    let products = inputs
        .recent_products
        .iter()
        .take(ACTIVITY_PRODUCTS)
        .filter_map(|product| {
            let at = record_time(
                product.extra.get("date_modified_gmt"),
                product
                    .date_modified
                    .as_deref()
                    .or(product.date_created.as_deref()),
            )?;
            (now - at < Duration::hours(1)).then(|| ActivityItem {
                kind: "product",
                title: format!(
                    "Producto actualizado: {}",
                    if product.name.is_empty() {
                        "Sin nombre"
                    } else {
                        product.name.as_str()
                    }
                ),
                time: time_ago(at, now),
                status: "updated".to_string(),
                at,
            })
        });

    let mut feed: Vec<ActivityItem> = orders.chain(products).collect();
    feed.sort_by(|a, b| b.at.cmp(&a.at));
    feed.truncate(ACTIVITY_LIMIT);
    feed
}

/// Fold the inputs into the dashboard snapshot.
#[must_use]
pub fn compose(inputs: &DashboardInputs, now: DateTime<Utc>) -> DashboardStats {
    let totals = OrderTotals::of(&inputs.orders);
    let revenue = round_cents(totals.revenue);
    let month_ago = now - Duration::days(WINDOW_DAYS);

    let new_this_month = inputs
        .recent_customers
        .iter()
        .filter_map(|c| {
            record_time(c.extra.get("date_created_gmt"), c.date_created.as_deref())
        })
        .filter(|created| *created > month_ago)
        .count() as u64;

    let low_stock = inputs
        .stock_products
        .iter()
        .filter(|p| is_low_stock(p))
        .count() as u64;

    DashboardStats {
        sales: SalesSummary {
            total: amount_to_f64(revenue),
            currency: CURRENCY,
        },
        orders: OrdersSummary {
            total: totals.count,
            completed: totals.completed,
        },
        products: ProductsSummary {
            total: inputs.total_products,
            low_stock,
        },
        customers: CustomersSummary {
            total: inputs.total_customers,
            new_this_month,
        },
        recent_activity: activity(inputs, now),
        sales_chart: sales_chart(revenue, now),
    }
}

/// Order statistics over the trailing window.
#[must_use]
pub fn order_stats(orders: &[Order]) -> OrderStats {
    let totals = OrderTotals::of(orders);
    let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
    for order in orders.iter().filter(|o| !o.is_abandoned_cart()) {
        *by_status.entry(order.status.clone()).or_default() += 1;
    }
    let count = |status: &str| by_status.get(status).copied().unwrap_or(0);
    let revenue = round_cents(totals.revenue);
    let average = if totals.count == 0 {
        Decimal::ZERO
    } else {
        revenue / Decimal::from(totals.count)
    };

    OrderStats {
        total_orders: totals.count,
        pending_orders: count("pending"),
        processing_orders: count("processing"),
        completed_orders: count("completed"),
        cancelled_orders: count("cancelled"),
        orders_by_status: by_status,
        total_revenue: amount_to_f64(revenue),
        average_order_value: amount_to_f64(average),
        top_products: Vec::new(),
    }
}

fn window_start(now: DateTime<Utc>) -> String {
    (now - Duration::days(WINDOW_DAYS))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

/// Orders created in the trailing window, abandoned carts removed.
///
/// # Errors
///
/// Returns error if the upstream call fails.
pub async fn window_orders(
    client: &CommerceClient,
    now: DateTime<Utc>,
) -> Result<Vec<Order>, UpstreamError> {
    let params = Params::new()
        .with("after", window_start(now))
        .with("per_page", MAX_PER_PAGE)
        .with("status", "any");
    Ok(client.list_orders(&params).await?.items)
}

async fn count_or_zero(client: &CommerceClient, path: &str, params: Params) -> u64 {
    client.count(path, params).await.unwrap_or_else(|e| {
        tracing::warn!(path, error = %e, "Failed to count records");
        0
    })
}

async fn list_or_empty<T: serde::de::DeserializeOwned>(
    client: &CommerceClient,
    path: &str,
    params: Params,
) -> Vec<T> {
    match client.get_page::<T>(path, &params).await {
        Ok(page) => page.items,
        Err(e) => {
            tracing::warn!(path, error = %e, "Failed to fetch dashboard section");
            Vec::new()
        }
    }
}

/// Read every dashboard section, degrading failures to empty.
pub async fn collect(client: &CommerceClient, now: DateTime<Utc>) -> DashboardInputs {
    let orders = window_orders(client, now).await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to fetch recent orders for stats");
        Vec::new()
    });
    let total_products = count_or_zero(client, "products", Params::new()).await;
    let recent_products = list_or_empty(
        client,
        "products",
        Params::new()
            .with("per_page", RECENT_PRODUCTS)
            .with("orderby", "date")
            .with("order", "desc"),
    )
    .await;
    let total_customers = count_or_zero(client, "customers", Params::new()).await;
    let recent_customers = list_or_empty(
        client,
        "customers",
        Params::new()
            .with("per_page", RECENT_CUSTOMERS)
            .with("orderby", "registered_date")
            .with("order", "desc"),
    )
    .await;
    let stock_products = list_or_empty(
        client,
        "products",
        Params::new()
            .with("per_page", MAX_PER_PAGE)
            .with("status", "publish")
            .with("orderby", "date")
            .with("order", "desc"),
    )
    .await;

    DashboardInputs {
        orders,
        total_products,
        recent_products,
        total_customers,
        recent_customers,
        stock_products,
    }
}

/// Header totals for orders, products and customers.
pub async fn quick_stats(client: &CommerceClient, now: DateTime<Utc>) -> QuickStats {
    QuickStats {
        total_orders: count_or_zero(client, "orders", Params::new().with("status", "any")).await,
        total_products: count_or_zero(client, "products", Params::new()).await,
        total_customers: count_or_zero(client, "customers", Params::new()).await,
        timestamp: now.to_rfc3339(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn order(id: u64, status: &str, total: &str, created: &str) -> Order {
        serde_json::from_value(json!({
            "id": id,
            "number": id.to_string(),
            "status": status,
            "total": total,
            "date_created": created,
        }))
        .unwrap()
    }

    fn product(id: u64, name: &str, modified: &str, qty: Option<i64>) -> Product {
        serde_json::from_value(json!({
            "id": id,
            "name": name,
            "date_modified": modified,
            "manage_stock": qty.is_some(),
            "stock_quantity": qty,
        }))
        .unwrap()
    }

    #[test]
    fn test_time_ago() {
        let now = now();
        assert_eq!(time_ago(now - Duration::days(1), now), "Hace 1 día");
        assert_eq!(time_ago(now - Duration::days(3), now), "Hace 3 días");
        assert_eq!(time_ago(now - Duration::hours(5), now), "Hace 5 horas");
        assert_eq!(time_ago(now - Duration::minutes(90), now), "Hace 1 hora");
        assert_eq!(time_ago(now - Duration::minutes(60), now), "Hace 60 minutos");
        assert_eq!(time_ago(now - Duration::minutes(1), now), "Hace 1 minuto");
        assert_eq!(time_ago(now + Duration::minutes(5), now), "Hace 0 minutos");
    }

    #[test]
    fn test_parse_timestamp() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-06-01T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-06-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-06-01T04:00:00-06:00"), Some(expected));
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_sales_chart() {
        let chart = sales_chart(Decimal::new(1000, 0), now());
        assert_eq!(chart.len(), 12);
        assert!((chart[0].revenue - 800.0).abs() < f64::EPSILON);
        assert!((chart[11].revenue - 1020.0).abs() < f64::EPSILON);
        // 360 days before 2024-06-15
        assert_eq!(chart[0].month, "June 2023");
        assert_eq!(chart[11].month, "May 2024");
    }

    #[test]
    fn test_abandoned_carts_excluded_from_stats() {
        let inputs = DashboardInputs {
            orders: vec![
                order(1, "completed", "100.00", "2024-06-15T11:00:00"),
                order(2, "checkout-draft", "500.00", "2024-06-15T11:59:00"),
                order(3, "processing", "50.50", "2024-06-14T12:00:00"),
                order(4, "pending", "20.00", "2024-06-10T12:00:00"),
            ],
            ..DashboardInputs::default()
        };
        let stats = compose(&inputs, now());
        assert_eq!(stats.orders.total, 3);
        assert_eq!(stats.orders.completed, 1);
        assert!((stats.sales.total - 150.5).abs() < f64::EPSILON);
        assert_eq!(stats.sales.currency, "MXN");
        assert!(stats.recent_activity.iter().all(|a| a.title != "Nuevo pedido #2"));

        let order_stats = order_stats(&inputs.orders);
        assert_eq!(order_stats.total_orders, 3);
        assert!(!order_stats.orders_by_status.contains_key("checkout-draft"));
    }

    #[test]
    fn test_activity_feed() {
        let inputs = DashboardInputs {
            orders: vec![
                order(10, "processing", "1", "2024-06-15T11:30:00"),
                order(11, "completed", "1", "2024-06-13T12:00:00"),
                order(12, "completed", "1", "2024-06-12T12:00:00"),
                order(13, "completed", "1", "2024-06-11T12:00:00"),
            ],
            recent_products: vec![
                product(1, "Collar", "2024-06-15T11:50:00", None),
                product(2, "Pulsera", "2024-06-14T11:50:00", None),
            ],
            ..DashboardInputs::default()
        };
        let feed = compose(&inputs, now()).recent_activity;

        let titles: Vec<&str> = feed.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Producto actualizado: Collar",
                "Nuevo pedido #10",
                "Nuevo pedido #11",
                "Nuevo pedido #12",
            ]
        );
        assert_eq!(feed[0].time, "Hace 10 minutos");
        assert_eq!(feed[0].status, "updated");
        assert_eq!(feed[1].time, "Hace 30 minutos");
        assert_eq!(feed[2].time, "Hace 2 días");

        let json = serde_json::to_value(&feed[1]).unwrap();
        assert_eq!(json, json!({"type": "order", "title": "Nuevo pedido #10", "time": "Hace 30 minutos", "status": "processing"}));
    }

    #[test]
    fn test_customers_and_low_stock() {
        let customer = |id: u64, created: &str| -> Customer {
            serde_json::from_value(json!({"id": id, "date_created": created})).unwrap()
        };
        let inputs = DashboardInputs {
            total_customers: 40,
            total_products: 12,
            recent_customers: vec![
                customer(1, "2024-06-10T00:00:00"),
                customer(2, "2024-05-20T00:00:00"),
                customer(3, "2024-04-01T00:00:00"),
            ],
            stock_products: vec![
                product(1, "A", "", Some(2)),
                product(2, "B", "", Some(5)),
                product(3, "C", "", Some(6)),
                product(4, "D", "", None),
            ],
            ..DashboardInputs::default()
        };
        let stats = compose(&inputs, now());
        assert_eq!(stats.customers.total, 40);
        assert_eq!(stats.customers.new_this_month, 2);
        assert_eq!(stats.products.total, 12);
        assert_eq!(stats.products.low_stock, 2);
    }

    #[test]
    fn test_order_stats_average() {
        let orders = vec![
            order(1, "completed", "30.00", "2024-06-01T00:00:00"),
            order(2, "processing", "10.00", "2024-06-01T00:00:00"),
            order(3, "cancelled", "99.00", "2024-06-01T00:00:00"),
            order(4, "pending", "5.00", "2024-06-01T00:00:00"),
        ];
        let stats = order_stats(&orders);
        assert_eq!(stats.total_orders, 4);
        assert_eq!(stats.cancelled_orders, 1);
        assert_eq!(stats.pending_orders, 1);
        assert!((stats.total_revenue - 40.0).abs() < f64::EPSILON);
        assert!((stats.average_order_value - 10.0).abs() < f64::EPSILON);

        let empty = order_stats(&[]);
        assert!(empty.average_order_value.abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_change_fields() {
        let json = serde_json::to_value(compose(&DashboardInputs::default(), now())).unwrap();
        assert!(json["sales"].get("change").is_none());
        assert!(json["orders"].get("change").is_none());
        assert_eq!(json["sales_chart"].as_array().unwrap().len(), 12);
    }
}
