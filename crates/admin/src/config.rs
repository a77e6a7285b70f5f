//! Admin configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Commerce source (all three together)
//! - `WC_STORE_URL` - Store root URL (e.g., `https://shop.example.com`)
//! - `WC_CONSUMER_KEY` - REST API consumer key
//! - `WC_CONSUMER_SECRET` - REST API consumer secret
//!
//! ## Content source (requires `WC_STORE_URL`)
//! - `WP_USER_LOGIN` - User that owns the application password
//! - `WP_APPLICATION_PASSWORD` - Application password
//!
//! ## Optional
//! - `HOST` - Bind address (default: 127.0.0.1)
//! - `PORT` - Listen port (default: 5001)
//! - `OPENAI_API_KEY` / `OPENAI_MODEL` - Completion API for blog drafts
//! - `WC_WEBHOOK_SECRET` - Shared secret for signed order webhooks
//! - `GENERATED_IMAGES_DIR` - Image registry directory (default: static/generated-images)
//! - `LAST_ORDER_CONCURRENCY` - Concurrent last-order lookups per customer list (default: 8)
//! - `UPSTREAM_TIMEOUT_SECS` - Outbound request timeout (default: 30)
//! - `CORS_ALLOWED_ORIGINS` - Comma separated dashboard origins (default: any)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//!
//! Missing source credentials do not stop the server from starting. Requests
//! that need an unconfigured source fail with a configuration error instead.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_COMPLETION_MODEL: &str = "gpt-4-1106-preview";
const DEFAULT_LAST_ORDER_CONCURRENCY: usize = 8;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Path segment the commerce REST API lives under.
const COMMERCE_API_PATH: &str = "/wp-json/wc/v3";
/// Path segment the content REST API lives under.
const CONTENT_API_PATH: &str = "/wp-json/wp/v2";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &["your-", "changeme", "placeholder", "xxx", "todo"];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Admin application configuration.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Commerce source credentials (products, orders, customers, ...)
    pub commerce: Option<CommerceConfig>,
    /// Content source credentials (posts, comments, media, ...)
    pub content: Option<ContentConfig>,
    /// Completion API used for blog drafts
    pub completion: Option<CompletionConfig>,
    /// Shared secret for `X-WC-Webhook-Signature` verification
    pub webhook_secret: Option<SecretString>,
    /// Directory holding generated images and their `metadata.json`
    pub generated_images_dir: PathBuf,
    /// Maximum in-flight last-order lookups while listing customers
    pub last_order_concurrency: usize,
    /// Timeout applied to every outbound request
    pub upstream_timeout: Duration,
    /// Allowed CORS origins; empty allows any origin
    pub cors_allowed_origins: Vec<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Commerce REST API configuration.
///
/// Implements `Debug` manually to redact the consumer credentials.
#[derive(Clone)]
pub struct CommerceConfig {
    /// Versioned API base, always ending in `/`
    pub api_base: Url,
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
}

impl std::fmt::Debug for CommerceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommerceConfig")
            .field("api_base", &self.api_base.as_str())
            .field("consumer_key", &"[REDACTED]")
            .field("consumer_secret", &"[REDACTED]")
            .finish()
    }
}

/// Content REST API configuration.
#[derive(Clone)]
pub struct ContentConfig {
    /// Versioned API base, always ending in `/`
    pub api_base: Url,
    pub user_login: String,
    pub application_password: SecretString,
}

impl std::fmt::Debug for ContentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentConfig")
            .field("api_base", &self.api_base.as_str())
            .field("user_login", &self.user_login)
            .field("application_password", &"[REDACTED]")
            .finish()
    }
}

/// Chat-completion API configuration.
#[derive(Clone)]
pub struct CompletionConfig {
    pub api_key: SecretString,
    pub model: String,
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl AdminConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is malformed or a credential pair
    /// is only partially set.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`AdminConfig::from_env`].
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = parse_or_default(&var, "HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = parse_or_default(&var, "PORT", 5001_u16)?;

        let store_url = var("WC_STORE_URL");
        let commerce = CommerceConfig::from_vars(&var, store_url.as_deref())?;
        let content = ContentConfig::from_vars(&var, store_url.as_deref())?;
        let completion = CompletionConfig::from_vars(&var);

        let webhook_secret = var("WC_WEBHOOK_SECRET").map(|secret| {
            if let Err(e) = validate_secret_strength(&secret, "WC_WEBHOOK_SECRET") {
                tracing::warn!("WC_WEBHOOK_SECRET validation warning: {e}");
            }
            SecretString::from(secret)
        });

        let generated_images_dir = var("GENERATED_IMAGES_DIR")
            .map_or_else(|| PathBuf::from("static/generated-images"), PathBuf::from);
        let last_order_concurrency = parse_or_default(
            &var,
            "LAST_ORDER_CONCURRENCY",
            DEFAULT_LAST_ORDER_CONCURRENCY,
        )?
        .max(1);
        let upstream_timeout = Duration::from_secs(parse_or_default(
            &var,
            "UPSTREAM_TIMEOUT_SECS",
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
        )?);
        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let sentry_dsn = var("SENTRY_DSN");
        let sentry_environment = var("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = var("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = var("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            host,
            port,
            commerce,
            content,
            completion,
            webhook_secret,
            generated_images_dir,
            last_order_concurrency,
            upstream_timeout,
            cors_allowed_origins,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl CommerceConfig {
    fn from_vars<F>(var: &F, store_url: Option<&str>) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match (var("WC_CONSUMER_KEY"), var("WC_CONSUMER_SECRET")) {
            (Some(key), Some(secret)) => {
                let store_url = store_url
                    .ok_or_else(|| ConfigError::MissingEnvVar("WC_STORE_URL".to_string()))?;
                Ok(Some(Self {
                    api_base: api_base(store_url, COMMERCE_API_PATH)?,
                    consumer_key: SecretString::from(key),
                    consumer_secret: SecretString::from(secret),
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "WC_CONSUMER_*".to_string(),
                "Both WC_CONSUMER_KEY and WC_CONSUMER_SECRET must be set together".to_string(),
            )),
        }
    }
}

impl ContentConfig {
    fn from_vars<F>(var: &F, store_url: Option<&str>) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match (var("WP_USER_LOGIN"), var("WP_APPLICATION_PASSWORD")) {
            (Some(user_login), Some(password)) => {
                let store_url = store_url
                    .ok_or_else(|| ConfigError::MissingEnvVar("WC_STORE_URL".to_string()))?;
                Ok(Some(Self {
                    api_base: api_base(store_url, CONTENT_API_PATH)?,
                    user_login,
                    application_password: SecretString::from(password),
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "WP_*".to_string(),
                "Both WP_USER_LOGIN and WP_APPLICATION_PASSWORD must be set together"
                    .to_string(),
            )),
        }
    }
}

impl CompletionConfig {
    /// Returns `None` if `OPENAI_API_KEY` is not set (blog drafting disabled).
    fn from_vars<F>(var: &F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        var("OPENAI_API_KEY").map(|key| {
            if let Err(e) = validate_secret_strength(&key, "OPENAI_API_KEY") {
                tracing::warn!("OPENAI_API_KEY validation warning: {e}");
            }
            Self {
                api_key: SecretString::from(key),
                model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            }
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// The site root a store URL points at, with any REST suffix removed.
///
/// `https://shop.example.com/wp-json/wc/v3` and `https://shop.example.com/`
/// both yield `https://shop.example.com`.
#[must_use]
pub fn site_root(store_url: &str) -> &str {
    let trimmed = store_url.trim();
    trimmed
        .find(COMMERCE_API_PATH)
        .map_or(trimmed, |idx| trimmed.get(..idx).unwrap_or(trimmed))
        .trim_end_matches('/')
}

/// Build a versioned API base URL that always ends in `/` so relative joins
/// keep the version segment.
fn api_base(store_url: &str, api_path: &str) -> Result<Url, ConfigError> {
    let raw = format!("{}{api_path}/", site_root(store_url));
    let url = Url::parse(&raw)
        .map_err(|e| ConfigError::InvalidEnvVar("WC_STORE_URL".to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "WC_STORE_URL".to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Parse a variable, falling back to `default` when unset.
fn parse_or_default<F, T>(var: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Check that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_credentials() {
        let config = AdminConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:5001");
        assert!(config.commerce.is_none());
        assert!(config.content.is_none());
        assert!(config.completion.is_none());
        assert_eq!(config.last_order_concurrency, DEFAULT_LAST_ORDER_CONCURRENCY);
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        assert!(config.cors_allowed_origins.is_empty());
    }

    #[test]
    fn test_full_credentials() {
        let config = AdminConfig::from_vars(vars(&[
            ("WC_STORE_URL", "https://shop.example.com/"),
            ("WC_CONSUMER_KEY", "ck_123"),
            ("WC_CONSUMER_SECRET", "cs_456"),
            ("WP_USER_LOGIN", "editor"),
            ("WP_APPLICATION_PASSWORD", "abcd efgh"),
            ("PORT", "8080"),
            ("CORS_ALLOWED_ORIGINS", "http://localhost:3000, https://panel.example.com"),
        ]))
        .unwrap();

        let commerce = config.commerce.unwrap();
        assert_eq!(
            commerce.api_base.as_str(),
            "https://shop.example.com/wp-json/wc/v3/"
        );
        let content = config.content.unwrap();
        assert_eq!(
            content.api_base.as_str(),
            "https://shop.example.com/wp-json/wp/v2/"
        );
        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_allowed_origins.len(), 2);
    }

    #[test]
    fn test_partial_commerce_credentials_rejected() {
        let err = AdminConfig::from_vars(vars(&[
            ("WC_STORE_URL", "https://shop.example.com"),
            ("WC_CONSUMER_KEY", "ck_123"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(..)));
    }

    #[test]
    fn test_content_credentials_need_store_url() {
        let err = AdminConfig::from_vars(vars(&[
            ("WP_USER_LOGIN", "editor"),
            ("WP_APPLICATION_PASSWORD", "abcd efgh"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "WC_STORE_URL"));
    }

    #[test]
    fn test_invalid_port() {
        let err = AdminConfig::from_vars(vars(&[("PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "PORT"));
    }

    #[test]
    fn test_concurrency_is_at_least_one() {
        let config = AdminConfig::from_vars(vars(&[("LAST_ORDER_CONCURRENCY", "0")])).unwrap();
        assert_eq!(config.last_order_concurrency, 1);
    }

    #[test]
    fn test_site_root_strips_rest_suffix() {
        assert_eq!(
            site_root("https://shop.example.com/wp-json/wc/v3"),
            "https://shop.example.com"
        );
        assert_eq!(
            site_root("https://shop.example.com/wp-json/wc/v3/"),
            "https://shop.example.com"
        );
        assert_eq!(site_root("https://shop.example.com/"), "https://shop.example.com");
        assert_eq!(site_root("https://shop.example.com/store"), "https://shop.example.com/store");
    }

    #[test]
    fn test_completion_model_default() {
        let config = AdminConfig::from_vars(vars(&[("OPENAI_API_KEY", "sk-abc")])).unwrap();
        assert_eq!(config.completion.unwrap().model, DEFAULT_COMPLETION_MODEL);
    }

    #[test]
    fn test_validate_secret_strength() {
        assert!(validate_secret_strength("changeme-now", "X").is_err());
        assert!(validate_secret_strength("aaaaaaaa", "X").is_err());
        assert!(validate_secret_strength("k8#Qz!v2Lp9@wR4m", "X").is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let commerce = CommerceConfig {
            api_base: Url::parse("https://shop.example.com/wp-json/wc/v3/").unwrap(),
            consumer_key: SecretString::from("ck_super_secret"),
            consumer_secret: SecretString::from("cs_super_secret"),
        };
        let debug_output = format!("{commerce:?}");
        assert!(debug_output.contains("shop.example.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret"));

        let content = ContentConfig {
            api_base: Url::parse("https://shop.example.com/wp-json/wp/v2/").unwrap(),
            user_login: "editor".to_string(),
            application_password: SecretString::from("app pass word"),
        };
        let debug_output = format!("{content:?}");
        assert!(debug_output.contains("editor"));
        assert!(!debug_output.contains("app pass word"));

        let completion = CompletionConfig {
            api_key: SecretString::from("sk-live-secret"),
            model: "gpt-test".to_string(),
        };
        let debug_output = format!("{completion:?}");
        assert!(debug_output.contains("gpt-test"));
        assert!(!debug_output.contains("sk-live-secret"));
    }
}
