//! Guest customer reconciliation.
//!
//! The commerce source only lists registered accounts. Shoppers who checked
//! out as guests exist only as billing emails on orders. This module merges
//! both into one customer list:
//!
//! 1. registered accounts, each annotated with its latest order date
//! 2. guest aggregates, one per normalized billing email on `customer=0`
//!    orders, unless a registered account with role `customer` owns the email
//!
//! Ownership is always decided against the unfiltered account list, so a
//! search that skips an account never resurrects its guest orders.
//!
//! Either source failing degrades to an empty contribution.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::future::Future;

use futures::StreamExt;
use futures::stream;
use ibulore_core::{
    CustomerId, Pagination, clamp_per_page, format_amount, guest_id, normalize_email, paginate,
    parse_amount, round_cents,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::upstream::commerce::{Address, Customer, Order};
use crate::upstream::{CommerceClient, MAX_PER_PAGE, Params, UpstreamError};

/// Accounts fetched per request, and guest orders scanned per request.
const FETCH_LIMIT: u32 = 100;
const DEFAULT_PER_PAGE: u32 = 20;
const GUEST_ROLE: &str = "guest";
const CUSTOMER_ROLE: &str = "customer";

/// Where the reconciler reads accounts and orders from.
pub trait CustomerSource: Send + Sync {
    /// Registered accounts of every role, optionally filtered upstream.
    fn registered_customers(
        &self,
        search: Option<&str>,
        email: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Customer>, UpstreamError>> + Send;

    /// `date_created` of the account's most recent order.
    fn latest_order_date(
        &self,
        customer: CustomerId,
    ) -> impl Future<Output = Result<Option<String>, UpstreamError>> + Send;

    /// Orders placed without an account.
    fn guest_orders(&self) -> impl Future<Output = Result<Vec<Order>, UpstreamError>> + Send;
}

impl CustomerSource for CommerceClient {
    async fn registered_customers(
        &self,
        search: Option<&str>,
        email: Option<&str>,
    ) -> Result<Vec<Customer>, UpstreamError> {
        let params = Params::new()
            .with("per_page", FETCH_LIMIT)
            .with("role", "all")
            .with_opt("search", search)
            .with_opt("email", email);
        Ok(self.get_page("customers", &params).await?.items)
    }

    async fn latest_order_date(
        &self,
        customer: CustomerId,
    ) -> Result<Option<String>, UpstreamError> {
        let params = Params::new()
            .with("customer", customer)
            .with("per_page", 1)
            .with("orderby", "date")
            .with("order", "desc");
        let page = self.list_orders(&params).await?;
        Ok(page.items.into_iter().next().and_then(|o| o.date_created))
    }

    async fn guest_orders(&self) -> Result<Vec<Order>, UpstreamError> {
        let params = Params::new()
            .with("customer", 0)
            .with("per_page", FETCH_LIMIT);
        Ok(self.list_orders(&params).await?.items)
    }
}

/// Identifier of a merged customer: an account id or a guest key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CustomerKey {
    Registered(CustomerId),
    Guest(String),
}

/// One entry of the merged customer list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedCustomer {
    pub id: CustomerKey,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub role: String,
    pub date_created: Option<String>,
    pub date_modified: Option<String>,
    pub last_order_date: Option<String>,
    pub is_paying_customer: bool,
    pub orders_count: u64,
    pub total_spent: String,
    pub billing: Address,
    pub shipping: Address,
    pub avatar_url: String,
    /// Remaining upstream fields of a registered account.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UnifiedCustomer {
    /// Wrap a registered account.
    #[must_use]
    pub fn registered(mut customer: Customer, last_order_date: Option<String>) -> Self {
        let orders_count = customer
            .extra
            .remove("orders_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let total_spent = customer
            .extra
            .remove("total_spent")
            .map_or(Decimal::ZERO, |v| ibulore_core::parse_amount_value(Some(&v)));
        customer.extra.remove("last_order_date");

        Self {
            id: CustomerKey::Registered(customer.id),
            first_name: customer.first_name,
            last_name: customer.last_name,
            email: customer.email,
            username: customer.username,
            role: customer.role,
            date_created: customer.date_created,
            date_modified: customer.date_modified,
            last_order_date,
            is_paying_customer: customer.is_paying_customer,
            orders_count,
            total_spent: format_amount(total_spent),
            billing: customer.billing,
            shipping: customer.shipping,
            avatar_url: customer.avatar_url,
            extra: customer.extra,
        }
    }

    /// Aggregate one guest's orders. `orders` must share a normalized
    /// billing email and be non-empty.
    #[must_use]
    pub fn guest(email: &str, orders: &[&Order]) -> Option<Self> {
        let mut sorted: Vec<&Order> = orders.to_vec();
        sorted.sort_by(|a, b| date_key(&a.date_created).cmp(date_key(&b.date_created)));
        let earliest = *sorted.first()?;
        let latest = *sorted.last()?;

        let total_spent = round_cents(
            sorted
                .iter()
                .filter(|o| o.counts_toward_revenue())
                .map(|o| parse_amount(&o.total))
                .sum::<Decimal>(),
        );

        Some(Self {
            id: CustomerKey::Guest(guest_id(email)),
            first_name: earliest.billing.first_name.clone(),
            last_name: earliest.billing.last_name.clone(),
            email: earliest
                .billing_email()
                .map_or_else(|| email.to_string(), str::to_string),
            username: String::new(),
            role: GUEST_ROLE.to_string(),
            date_created: earliest.date_created.clone(),
            date_modified: latest.date_modified.clone(),
            last_order_date: latest.date_created.clone(),
            is_paying_customer: total_spent > Decimal::ZERO,
            orders_count: sorted.len() as u64,
            total_spent: format_amount(total_spent),
            billing: earliest.billing.clone(),
            shipping: earliest.shipping.clone(),
            avatar_url: String::new(),
            extra: Map::new(),
        })
    }

    /// Whether this entry is a guest aggregate.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self.id, CustomerKey::Guest(_))
    }

    /// `"first last"`, trimmed.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Case-insensitive substring match on name, email and username.
    fn matches(&self, needle_lower: &str, include_full_name: bool) -> bool {
        let fields = [
            &self.first_name,
            &self.last_name,
            &self.email,
            &self.username,
        ];
        fields
            .iter()
            .any(|f| f.to_lowercase().contains(needle_lower))
            || (include_full_name && self.full_name().to_lowercase().contains(needle_lower))
    }
}

fn date_key(date: &Option<String>) -> &str {
    date.as_deref().unwrap_or_default()
}

/// Normalized emails owned by accounts with role `customer`.
#[must_use]
pub fn customer_emails(accounts: &[Customer]) -> HashSet<String> {
    accounts
        .iter()
        .filter(|c| c.role == CUSTOMER_ROLE)
        .map(|c| normalize_email(&c.email))
        .collect()
}

/// Merge registered accounts with guest aggregates built from `orders`.
/// Orders billed to an email in `owned_by_customers` are skipped.
///
/// Guests appear in first-seen email order after every registered account.
#[must_use]
pub fn merge_guests(
    registered: Vec<UnifiedCustomer>,
    orders: &[Order],
    owned_by_customers: &HashSet<String>,
) -> Vec<UnifiedCustomer> {
    let mut groups: Vec<(String, Vec<&Order>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for order in orders {
        let Some(email) = order.billing_email().map(normalize_email) else {
            continue;
        };
        if owned_by_customers.contains(&email) {
            continue;
        }
        match index.get(&email).and_then(|&i| groups.get_mut(i)) {
            Some((_, group)) => group.push(order),
            None => {
                index.insert(email.clone(), groups.len());
                groups.push((email, vec![order]));
            }
        }
    }

    let guests = groups
        .iter()
        .filter_map(|(email, orders)| UnifiedCustomer::guest(email, orders));
    registered.into_iter().chain(guests).collect()
}

/// Sort key for customer lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CustomerOrderBy {
    #[default]
    Date,
    Name,
    Email,
}

impl CustomerOrderBy {
    /// `name` and `email` select those keys; anything else sorts by date.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("name") => Self::Name,
            Some("email") => Self::Email,
            _ => Self::Date,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// `asc` in any case is ascending; anything else is descending.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("asc") => Self::Asc,
            _ => Self::Desc,
        }
    }

    /// Token understood by the upstream APIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    /// Apply the direction to an ascending comparison.
    #[must_use]
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// Stable sort of a merged list.
pub fn sort_customers(customers: &mut [UnifiedCustomer], by: CustomerOrderBy, order: SortOrder) {
    customers.sort_by(|a, b| {
        let ordering = match by {
            CustomerOrderBy::Date => date_key(&a.date_created).cmp(date_key(&b.date_created)),
            CustomerOrderBy::Name => a.full_name().cmp(&b.full_name()),
            CustomerOrderBy::Email => a.email.cmp(&b.email),
        };
        order.apply(ordering)
    });
}

/// Query parameters of `GET /customers`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub email: Option<String>,
    pub orderby: Option<String>,
    pub order: Option<String>,
}

impl CustomerListQuery {
    #[must_use]
    pub fn order_by(&self) -> CustomerOrderBy {
        CustomerOrderBy::parse(self.orderby.as_deref())
    }

    #[must_use]
    pub fn sort_order(&self) -> SortOrder {
        SortOrder::parse(self.order.as_deref())
    }
}

/// Response of `GET /customers`.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerList {
    pub customers: Vec<UnifiedCustomer>,
    pub pagination: Pagination,
}

/// Slim entry returned by customer search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerMatch {
    pub id: CustomerKey,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub name: String,
    pub username: String,
    pub role: String,
    pub billing: Address,
    pub shipping: Address,
    pub orders_count: u64,
    pub total_spent: f64,
    pub is_guest: bool,
}

impl From<UnifiedCustomer> for CustomerMatch {
    fn from(customer: UnifiedCustomer) -> Self {
        Self {
            name: customer.full_name(),
            is_guest: customer.is_guest(),
            total_spent: ibulore_core::amount_to_f64(parse_amount(&customer.total_spent)),
            id: customer.id,
            first_name: customer.first_name,
            last_name: customer.last_name,
            email: customer.email,
            username: customer.username,
            role: customer.role,
            billing: customer.billing,
            shipping: customer.shipping,
            orders_count: customer.orders_count,
        }
    }
}

/// Builds merged customer lists from a [`CustomerSource`].
#[derive(Debug)]
pub struct CustomerReconciler<'a, S> {
    source: &'a S,
    concurrency: usize,
}

impl<'a, S: CustomerSource> CustomerReconciler<'a, S> {
    /// `concurrency` bounds the in-flight latest-order lookups; zero is
    /// treated as one.
    #[must_use]
    pub fn new(source: &'a S, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    async fn accounts(&self, search: Option<&str>, email: Option<&str>) -> Vec<Customer> {
        self.source
            .registered_customers(search, email)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to fetch registered customers");
                Vec::new()
            })
    }

    /// Wrap accounts with their latest order dates, keeping upstream order.
    async fn with_last_orders(&self, accounts: Vec<Customer>) -> Vec<UnifiedCustomer> {
        stream::iter(accounts.into_iter().map(|account| async move {
            let last_order_date = match self.source.latest_order_date(account.id).await {
                Ok(date) => date,
                Err(e) => {
                    tracing::warn!(customer_id = %account.id, error = %e, "Failed to fetch last order");
                    None
                }
            };
            UnifiedCustomer::registered(account, last_order_date)
        }))
        .buffered(self.concurrency)
        .collect()
        .await
    }

    async fn guest_orders(&self) -> Vec<Order> {
        self.source.guest_orders().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to fetch guest orders");
            Vec::new()
        })
    }

    /// Merged list, unsorted. `search` and `email` narrow the registered
    /// accounts upstream; guest ownership still uses every account.
    pub async fn merged(&self, search: Option<&str>, email: Option<&str>) -> Vec<UnifiedCustomer> {
        let accounts = self.accounts(search, email).await;
        let owned = if search.is_none() && email.is_none() {
            customer_emails(&accounts)
        } else {
            customer_emails(&self.accounts(None, None).await)
        };
        let registered = self.with_last_orders(accounts).await;
        let orders = self.guest_orders().await;
        merge_guests(registered, &orders, &owned)
    }

    /// One page of the merged list.
    pub async fn list(&self, query: &CustomerListQuery) -> CustomerList {
        let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let email = query.email.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let page = query.page.unwrap_or(1).max(1);
        let per_page = clamp_per_page(query.per_page.unwrap_or(DEFAULT_PER_PAGE), MAX_PER_PAGE);

        let mut customers = self.merged(search, email).await;
        if let Some(search) = search {
            let needle = search.to_lowercase();
            customers.retain(|c| c.matches(&needle, false));
        }
        if let Some(email) = email {
            customers.retain(|c| c.email.eq_ignore_ascii_case(email));
        }
        sort_customers(&mut customers, query.order_by(), query.sort_order());

        let total = customers.len() as u64;
        tracing::info!(total, page, per_page, "Merged customer list");
        CustomerList {
            customers: paginate(&customers, page, per_page).to_vec(),
            pagination: Pagination::new(page, per_page, total),
        }
    }

    /// Search the merged list, matching full names too.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<CustomerMatch> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        self.merged(None, None)
            .await
            .into_iter()
            .filter(|c| c.matches(&needle, true))
            .take(limit)
            .map(CustomerMatch::from)
            .collect()
    }
}
