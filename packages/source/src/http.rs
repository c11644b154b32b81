//! HTTP access used by the handlers.
//!
//! Handlers talk to the network only through [`HttpClient`], so tests can
//! substitute canned responses.

use std::time::Duration;

use async_trait::async_trait;

use crate::SourceError;

/// Timeout for a single page of a paginated API.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a full archive download.
pub const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Minimal GET-only HTTP client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetches `url` and returns the body as text.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport failure or a non-success status.
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, SourceError>;

    /// Fetches `url` and returns the raw body.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport failure or a non-success status.
    async fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, SourceError>;
}

/// [`HttpClient`] backed by [`reqwest`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Builds a client with the crate's user agent.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the TLS backend fails to initialize.
    pub fn new() -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tw-parking/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, SourceError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    async fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, SourceError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        log::debug!("Downloaded {} bytes from {url}", bytes.len());
        Ok(bytes.to_vec())
    }
}
