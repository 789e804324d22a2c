//! REST Sender Configuration
//!
//! [`RestSenderBuilder`] collects the settings of a
//! [`RestKafkaSender`](crate::RestKafkaSender). Only the proxy URL and the
//! schema cache are required.
//!
//! ## Examples
//!
//! ```ignore
//! use radar_client::RestKafkaSender;
//!
//! let sender = RestKafkaSender::builder()
//!     .base_url("https://radar.example.com/kafka")
//!     .schema_cache(schema_cache)
//!     .binary_content(true)
//!     .compression(true)
//!     .build()?;
//! ```

use crate::auth::{TokenHolder, TokenSource};
use crate::connection::{ConnectionState, DEFAULT_CONNECTION_TIMEOUT};
use crate::error::{ClientError, Result};
use crate::rest::RestKafkaSender;
use radar_schema_registry::SchemaCache;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default timeout of a single proxy request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolved settings of a REST sender.
#[derive(Debug, Clone)]
pub struct RestSenderConfig {
    /// Proxy base URL without trailing slash.
    pub base_url: String,

    /// Send RADAR binary bodies when keys allow it (default: false).
    pub binary_content: bool,

    /// Gzip request bodies (default: false).
    pub compression: bool,

    /// Extra headers on every request.
    pub headers: Vec<(String, String)>,

    /// HTTP proxy URL.
    pub proxy: Option<String>,

    /// Timeout of a single request (default: 10s).
    pub request_timeout: Duration,

    /// How long a successful request keeps the sender connected (default: 10s).
    pub connection_timeout: Duration,
}

/// Builder for [`RestKafkaSender`].
pub struct RestSenderBuilder {
    base_url: Option<String>,
    schema_cache: Option<Arc<SchemaCache>>,
    binary_content: bool,
    compression: bool,
    headers: Vec<(String, String)>,
    proxy: Option<String>,
    request_timeout: Duration,
    connection_timeout: Duration,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl RestSenderBuilder {
    /// Create a builder with default settings.
    ///
    /// `base_url` and `schema_cache` must be set before calling `build()`.
    pub fn new() -> Self {
        Self {
            base_url: None,
            schema_cache: None,
            binary_content: false,
            compression: false,
            headers: Vec::new(),
            proxy: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            token_source: None,
        }
    }

    /// Set the REST proxy URL (required).
    ///
    /// Records of topic `t` are posted to `{base_url}/topics/t`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the schema cache used to resolve registry schemas (required).
    pub fn schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.schema_cache = Some(cache);
        self
    }

    /// Send the compact RADAR binary format when record keys carry a
    /// `sourceId`.
    ///
    /// The sender falls back to JSON for good when the proxy rejects binary
    /// bodies with HTTP 415.
    ///
    /// # Default
    ///
    /// false
    pub fn binary_content(mut self, enabled: bool) -> Self {
        self.binary_content = enabled;
        self
    }

    /// Gzip request bodies and send `Content-Encoding: gzip`.
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Add a header to every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Route requests through an HTTP proxy.
    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy = Some(url.into());
        self
    }

    /// Set the timeout of a single request.
    ///
    /// # Default
    ///
    /// 10 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set how long a successful request keeps the sender `Connected`.
    ///
    /// # Default
    ///
    /// 10 seconds
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Authenticate requests with bearer tokens from `source`.
    pub fn token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    /// Build the sender.
    ///
    /// # Errors
    ///
    /// `ClientError::Config` if a required setting is missing, the URL is
    /// invalid, or a header or proxy cannot be used.
    pub fn build(self) -> Result<RestKafkaSender> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Config("base_url is required".to_string()))?;
        let schema_cache = self
            .schema_cache
            .ok_or_else(|| ClientError::Config("schema_cache is required".to_string()))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| ClientError::Config(format!("Invalid base URL {}: {}", base_url, e)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::Config(format!("Invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::Config(format!("Invalid header value: {}", e)))?;
            headers.append(name, value);
        }

        let mut client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.request_timeout)
            .default_headers(headers);
        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ClientError::Config(format!("Invalid proxy {}: {}", proxy, e)))?;
            client = client.proxy(proxy);
        }
        let http_client = client
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let config = RestSenderConfig {
            base_url,
            binary_content: self.binary_content,
            compression: self.compression,
            headers: self.headers,
            proxy: self.proxy,
            request_timeout: self.request_timeout,
            connection_timeout: self.connection_timeout,
        };

        info!(
            base_url = %config.base_url,
            binary = config.binary_content,
            compression = config.compression,
            "REST sender initialized"
        );

        Ok(RestKafkaSender::from_parts(
            config.clone(),
            http_client,
            schema_cache,
            ConnectionState::new(config.connection_timeout),
            self.token_source.map(TokenHolder::new),
        ))
    }
}

impl Default for RestSenderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
