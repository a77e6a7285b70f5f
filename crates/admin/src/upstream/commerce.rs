//! Commerce source records and helpers.
//!
//! Records keep the fields the aggregation layer reads as typed values and
//! carry everything else in `extra`, so responses built from them lose
//! nothing the upstream sent.

use ibulore_core::order_status::{self, is_abandoned_cart};
use ibulore_core::{CustomerId, OrderId, ProductId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use super::{CommerceClient, Page, Params, UpstreamError};

/// Billing or shipping address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub address_1: String,
    pub address_2: String,
    pub city: String,
    pub state: String,
    pub postcode: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// An order as returned by `GET orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub number: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub total: String,
    #[serde(default)]
    pub customer_id: u64,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub date_modified: Option<String>,
    #[serde(default)]
    pub billing: Address,
    #[serde(default)]
    pub shipping: Address,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Order {
    /// Whether this order is a draft checkout that was never placed.
    #[must_use]
    pub fn is_abandoned_cart(&self) -> bool {
        is_abandoned_cart(&self.status)
    }

    /// Whether this order counts toward revenue.
    #[must_use]
    pub fn counts_toward_revenue(&self) -> bool {
        order_status::counts_toward_revenue(&self.status)
    }

    /// The billing email, if any.
    #[must_use]
    pub fn billing_email(&self) -> Option<&str> {
        self.billing
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

/// A registered account as returned by `GET customers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub date_modified: Option<String>,
    #[serde(default)]
    pub is_paying_customer: bool,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub billing: Address,
    #[serde(default)]
    pub shipping: Address,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A product as returned by `GET products`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub regular_price: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sale_price: String,
    #[serde(default)]
    pub manage_stock: bool,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub stock_status: String,
    #[serde(default)]
    pub backorders: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub low_stock_amount: Option<i64>,
    #[serde(default)]
    pub images: Vec<Value>,
    #[serde(default)]
    pub categories: Vec<Value>,
    #[serde(default, rename = "type")]
    pub product_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub date_modified: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Product {
    /// URL of the first image, if any.
    #[must_use]
    pub fn first_image(&self) -> Option<&str> {
        self.images.first()?.get("src")?.as_str()
    }

    /// Names of the categories the product belongs to.
    #[must_use]
    pub fn category_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .filter_map(|c| c.get("name").and_then(Value::as_str))
            .map(String::from)
            .collect()
    }

    /// An extra field as a boolean.
    #[must_use]
    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.extra.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// An extra field, or `Null`.
    #[must_use]
    pub fn field(&self, key: &str) -> Value {
        self.extra.get(key).cloned().unwrap_or(Value::Null)
    }
}

impl CommerceClient {
    /// List orders with abandoned carts removed.
    ///
    /// Every order listing and statistic goes through here so draft
    /// checkouts never leak into counts or revenue. The reported total is
    /// reduced by the number of drafts dropped from this page.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    #[instrument(skip(self, params))]
    pub async fn list_orders(&self, params: &Params) -> Result<Page<Order>, UpstreamError> {
        let page: Page<Order> = self.get_page("orders", params).await?;
        Ok(without_abandoned_carts(page))
    }

    /// Total record count for a list endpoint, read from the headers of a
    /// one-item request.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    pub async fn count(&self, path: &str, params: Params) -> Result<u64, UpstreamError> {
        let page: Page<Value> = self.get_page(path, &params.with("per_page", 1)).await?;
        Ok(page.total)
    }

    /// Fetch a record, mapping an upstream 404 or an empty body to `None`.
    ///
    /// # Errors
    ///
    /// Returns error for any failure other than not found.
    pub async fn find(&self, path: &str) -> Result<Option<Value>, UpstreamError> {
        match self.get::<Value>(path, &Params::new()).await {
            Ok(Value::Null) => Ok(None),
            Ok(value) if value.get("id").is_none() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(UpstreamError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Drop abandoned carts from a page of orders.
#[must_use]
pub fn without_abandoned_carts(page: Page<Order>) -> Page<Order> {
    let before = page.items.len();
    let items: Vec<Order> = page
        .items
        .into_iter()
        .filter(|o| !o.is_abandoned_cart())
        .collect();
    let dropped = (before - items.len()) as u64;
    Page {
        items,
        total: page.total.saturating_sub(dropped),
        ..page
    }
}

/// Accept a string, a number, or `null` and produce a string.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// Accept an integer, a numeric string, or `null`.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
