//! REST clients for the two upstream sources.
//!
//! Both sources speak the same dialect: JSON bodies, HTTP basic auth,
//! `page`/`per_page` pagination and totals in the `X-WP-Total` and
//! `X-WP-TotalPages` response headers. One generic [`RestClient`] handles the
//! transport; the [`Source`] marker selects which upstream a client talks to
//! so each can carry its own resource helpers.
//!
//! # Retries
//!
//! No call is retried. GETs, PUTs of a full field value and DELETEs are safe
//! to repeat; POSTs that create records (orders, comments, media) are not.

pub mod commerce;
pub mod content;

use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;
use url::Url;

/// Response header carrying the total number of matching records.
pub const TOTAL_HEADER: &str = "X-WP-Total";
/// Response header carrying the total number of pages.
pub const TOTAL_PAGES_HEADER: &str = "X-WP-TotalPages";
/// Largest page size either source accepts.
pub const MAX_PER_PAGE: u32 = 100;

const USER_AGENT: &str = concat!("ibulore-admin/", env!("CARGO_PKG_VERSION"));
/// Longest upstream body kept in logs and error messages.
const MAX_LOGGED_BODY: usize = 512;

/// Errors that can occur when calling an upstream source.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api {
        status: u16,
        /// Machine-readable error code (`rest_cannot_delete`, ...)
        code: Option<String>,
        message: String,
        /// Parsed error body, `Null` if it was not JSON
        body: Value,
    },

    /// Rate limited by the upstream.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    /// The upstream status code, when one was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            Self::NotFound(_) => Some(404),
            Self::Unauthorized(_) => Some(401),
            Self::Http(_) | Self::Parse(_) | Self::InvalidRequest(_) => None,
        }
    }

    /// The upstream error code, when the body carried one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Marker for one upstream source.
pub trait Source: Send + Sync + 'static {
    /// Name used in logs.
    const NAME: &'static str;
}

/// The commerce source (products, orders, customers, taxonomy).
#[derive(Debug, Clone, Copy)]
pub struct Commerce;

impl Source for Commerce {
    const NAME: &'static str = "commerce";
}

/// The content source (posts, comments, media).
#[derive(Debug, Clone, Copy)]
pub struct Content;

impl Source for Content {
    const NAME: &'static str = "content";
}

/// Client for the commerce source.
pub type CommerceClient = RestClient<Commerce>;
/// Client for the content source.
pub type ContentClient = RestClient<Content>;

/// Query parameters for an upstream request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a parameter.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Display) -> Self {
        self.0.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a parameter when `value` is present.
    #[must_use]
    pub fn with_opt(self, key: &str, value: Option<impl Display>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    /// Look up a parameter value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }
}

/// One page of records plus the totals reported by the upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub total_pages: u64,
    /// The upstream sent a total header, so `total` is authoritative.
    pub total_reported: bool,
}

impl<T> Page<T> {
    /// Build a page whose totals come from response headers, falling back to
    /// the item count (and one page) when a header is absent.
    #[must_use]
    pub fn from_headers(items: Vec<T>, headers: &HeaderMap) -> Self {
        let reported = header_u64(headers, TOTAL_HEADER);
        let total_pages = header_u64(headers, TOTAL_PAGES_HEADER).unwrap_or(1);
        Self {
            total: reported.unwrap_or(items.len() as u64),
            total_reported: reported.is_some(),
            items,
            total_pages,
        }
    }

    /// Whether rows exist beyond this page. Without a total header, a full
    /// window of [`MAX_PER_PAGE`] rows is assumed to be cut short.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        let returned = self.items.len() as u64;
        if self.total_reported {
            self.total > returned
        } else {
            returned >= u64::from(MAX_PER_PAGE)
        }
    }
}

/// Parse a numeric response header leniently.
#[must_use]
pub fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Authenticated JSON client for one upstream source.
pub struct RestClient<S: Source> {
    inner: Arc<RestClientInner>,
    _source: PhantomData<S>,
}

struct RestClientInner {
    client: reqwest::Client,
    api_base: Url,
    username: String,
    password: SecretString,
}

impl<S: Source> Clone for RestClient<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _source: PhantomData,
        }
    }
}

impl<S: Source> RestClient<S> {
    /// Create a new client.
    ///
    /// `api_base` must end in `/` so relative paths keep its version segment.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(
        api_base: Url,
        username: String,
        password: SecretString,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(RestClientInner {
                client,
                api_base,
                username,
                password,
            }),
            _source: PhantomData,
        })
    }

    /// The versioned API base URL.
    #[must_use]
    pub fn api_base(&self) -> &Url {
        &self.inner.api_base
    }

    /// Resolve a resource path such as `products/12` against the API base.
    fn url(&self, path: &str, params: &Params) -> Result<Url, UpstreamError> {
        let mut url = self
            .inner
            .api_base
            .join(path.trim_start_matches('/'))
            .map_err(|e| UpstreamError::InvalidRequest(format!("{path}: {e}")))?;
        if !params.0.is_empty() {
            url.query_pairs_mut().extend_pairs(params.as_slice());
        }
        Ok(url)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        params: &Params,
    ) -> Result<RequestBuilder, UpstreamError> {
        let url = self.url(path, params)?;
        Ok(self
            .inner
            .client
            .request(method, url)
            .basic_auth(&self.inner.username, Some(self.inner.password.expose_secret())))
    }

    /// Execute a GET request and parse the body.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, non-success status, or a body
    /// that does not parse as `T`.
    #[instrument(skip(self, params), fields(source = S::NAME))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &Params,
    ) -> Result<T, UpstreamError> {
        let request = self.request(Method::GET, path, params)?;
        let response = self.send(path, request).await?;
        parse_body(response).await
    }

    /// Execute a GET request for a list and keep the pagination headers.
    ///
    /// # Errors
    ///
    /// Same as [`RestClient::get`].
    #[instrument(skip(self, params), fields(source = S::NAME))]
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &Params,
    ) -> Result<Page<T>, UpstreamError> {
        let request = self.request(Method::GET, path, params)?;
        let response = self.send(path, request).await?;
        let headers = response.headers().clone();
        let items: Option<Vec<T>> = parse_body(response).await?;
        Ok(Page::from_headers(items.unwrap_or_default(), &headers))
    }

    /// Execute a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Same as [`RestClient::get`].
    #[instrument(skip(self, body), fields(source = S::NAME))]
    pub async fn post<T: DeserializeOwned, B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, UpstreamError> {
        let request = self.request(Method::POST, path, &Params::new())?.json(body);
        let response = self.send(path, request).await?;
        parse_body(response).await
    }

    /// Execute a PUT request with a JSON body.
    ///
    /// # Errors
    ///
    /// Same as [`RestClient::get`].
    #[instrument(skip(self, body), fields(source = S::NAME))]
    pub async fn put<T: DeserializeOwned, B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, UpstreamError> {
        let request = self.request(Method::PUT, path, &Params::new())?.json(body);
        let response = self.send(path, request).await?;
        parse_body(response).await
    }

    /// Execute a PATCH request with a JSON body.
    ///
    /// # Errors
    ///
    /// Same as [`RestClient::get`].
    #[instrument(skip(self, body), fields(source = S::NAME))]
    pub async fn patch<T: DeserializeOwned, B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, UpstreamError> {
        let request = self.request(Method::PATCH, path, &Params::new())?.json(body);
        let response = self.send(path, request).await?;
        parse_body(response).await
    }

    /// Execute a DELETE request.
    ///
    /// # Errors
    ///
    /// Same as [`RestClient::get`].
    #[instrument(skip(self, params), fields(source = S::NAME))]
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &Params,
    ) -> Result<T, UpstreamError> {
        let request = self.request(Method::DELETE, path, params)?;
        let response = self.send(path, request).await?;
        parse_body(response).await
    }

    /// POST a raw body with extra headers (file uploads).
    pub(crate) async fn post_raw<T: DeserializeOwned>(
        &self,
        path: &str,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Result<T, UpstreamError> {
        let request = self.request(Method::POST, path, &Params::new())?
            .headers(headers)
            .body(body);
        let response = self.send(path, request).await?;
        parse_body(response).await
    }

    /// Send a request, turning non-success statuses into errors.
    async fn send(&self, path: &str, request: RequestBuilder) -> Result<Response, UpstreamError> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let error = parse_error(response).await;
        tracing::warn!(
            source = S::NAME,
            path,
            status = ?error.status(),
            error = %error,
            "Upstream request failed"
        );
        Err(error)
    }
}

impl<S: Source> std::fmt::Debug for RestClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("source", &S::NAME)
            .field("api_base", &self.inner.api_base.as_str())
            .finish_non_exhaustive()
    }
}

/// Parse a success body. An empty body parses as JSON `null`, which lets
/// `Value` and `Option<_>` callers tell "no content" apart from a record.
async fn parse_body<T: DeserializeOwned>(response: Response) -> Result<T, UpstreamError> {
    let bytes = response.bytes().await?;
    let trimmed = bytes.trim_ascii();
    if trimmed.is_empty() {
        return serde_json::from_value(Value::Null)
            .map_err(|e| UpstreamError::Parse(format!("empty response body: {e}")));
    }
    serde_json::from_slice(trimmed).map_err(|e| UpstreamError::Parse(e.to_string()))
}

/// Map an error response to an [`UpstreamError`].
async fn parse_error(response: Response) -> UpstreamError {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return UpstreamError::RateLimited(retry_after);
    }

    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    error_from_body(status.as_u16(), &text)
}

/// Build an error from a status code and raw body text.
fn error_from_body(status: u16, text: &str) -> UpstreamError {
    let body: Value = serde_json::from_str(text).unwrap_or(Value::Null);
    let code = body.get("code").and_then(Value::as_str).map(String::from);
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| truncate(text), String::from);

    match status {
        401 => UpstreamError::Unauthorized(message),
        404 => UpstreamError::NotFound(message),
        _ => UpstreamError::Api {
            status,
            code,
            message,
            body,
        },
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_LOGGED_BODY) {
        Some((idx, _)) => format!("{}…", text.get(..idx).unwrap_or_default()),
        None => text.to_string(),
    }
}
