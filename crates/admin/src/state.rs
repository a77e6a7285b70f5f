//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::config::AdminConfig;
use crate::error::AppError;
use crate::services::{CompletionClient, ImageRegistry};
use crate::upstream::{CommerceClient, ContentClient};

/// Application state shared across all handlers.
///
/// Sources whose credentials are absent are `None`; handlers that need one
/// get a configuration error from its accessor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AdminConfig,
    commerce: Option<CommerceClient>,
    content: Option<ContentClient>,
    completion: Option<CompletionClient>,
    images: ImageRegistry,
}

impl AppState {
    /// Build the state and its outbound clients.
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client fails to build.
    pub fn new(config: AdminConfig) -> Result<Self, AppError> {
        let commerce = config
            .commerce
            .as_ref()
            .map(|c| {
                CommerceClient::new(
                    c.api_base.clone(),
                    c.consumer_key.expose_secret().to_string(),
                    c.consumer_secret.clone(),
                    config.upstream_timeout,
                )
            })
            .transpose()?;
        let content = config
            .content
            .as_ref()
            .map(|c| {
                ContentClient::new(
                    c.api_base.clone(),
                    c.user_login.clone(),
                    c.application_password.clone(),
                    config.upstream_timeout,
                )
            })
            .transpose()?;
        let completion = config
            .completion
            .as_ref()
            .map(CompletionClient::new)
            .transpose()?;
        let images = ImageRegistry::new(config.generated_images_dir.clone());

        tracing::info!(
            commerce = commerce.is_some(),
            content = content.is_some(),
            completion = completion.is_some(),
            "Outbound sources configured"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                commerce,
                content,
                completion,
                images,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    /// The commerce client.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the commerce credentials are not set.
    pub fn commerce(&self) -> Result<&CommerceClient, AppError> {
        self.inner.commerce.as_ref().ok_or_else(|| {
            AppError::Config(
                "Commerce source not configured (WC_STORE_URL, WC_CONSUMER_KEY, WC_CONSUMER_SECRET)"
                    .to_string(),
            )
        })
    }

    /// The content client.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the content credentials are not set.
    pub fn content(&self) -> Result<&ContentClient, AppError> {
        self.inner.content.as_ref().ok_or_else(|| {
            AppError::Config(
                "Content source not configured (WP_USER_LOGIN, WP_APPLICATION_PASSWORD)"
                    .to_string(),
            )
        })
    }

    /// The completion client.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `OPENAI_API_KEY` is not set.
    pub fn completion(&self) -> Result<&CompletionClient, AppError> {
        self.inner
            .completion
            .as_ref()
            .ok_or_else(|| AppError::Config("OPENAI_API_KEY not configured".to_string()))
    }

    #[must_use]
    pub fn images(&self) -> &ImageRegistry {
        &self.inner.images
    }
}
