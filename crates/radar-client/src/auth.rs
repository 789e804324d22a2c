//! Bearer Token Authentication
//!
//! Requests to the REST proxy may carry an `Authorization: Bearer <token>`
//! header. Tokens come from a [`TokenSource`] and are held by a
//! [`TokenHolder`], which:
//!
//! - fetches at most one token at a time, however many requests need one
//! - refreshes the token before it expires (proactive refresh margin)
//! - drops the token when the proxy rejects it, so the next request fetches
//!   a fresh one
//!
//! ## Examples
//!
//! ```ignore
//! use radar_client::auth::{StaticTokenSource, TokenHolder};
//!
//! let holder = TokenHolder::new(Arc::new(StaticTokenSource::new("secret")));
//! let token = holder.token().await?;
//! ```

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use radar_core::{CacheConfig, CacheResult, TimedCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Time before expiry at which a token is refreshed.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// An access token with an optional expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken {
    pub token: String,
    pub expires_at: Option<Instant>,
}

impl BearerToken {
    /// Token that never expires.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Token that expires after `lifetime`.
    pub fn expiring_in(token: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            token: token.into(),
            expires_at: Some(Instant::now() + lifetime),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::ZERO)
    }

    /// Whether the token expires less than `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() + margin >= expires_at,
            None => false,
        }
    }
}

/// Source of bearer tokens, e.g. an OAuth2 client.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Obtain a new token.
    ///
    /// # Errors
    ///
    /// `ClientError::Authentication` when credentials are rejected, or
    /// `ClientError::Io` when the token endpoint is unreachable.
    async fn fetch_token(&self) -> Result<BearerToken>;
}

/// Token source that always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> Result<BearerToken> {
        Ok(BearerToken::new(self.token.clone()))
    }
}

/// Caches the token of a [`TokenSource`] until it nears expiry or is rejected.
pub struct TokenHolder {
    cache: TimedCache<BearerToken, ClientError>,
    refresh_margin: Duration,
}

impl TokenHolder {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self::with_refresh_margin(source, DEFAULT_REFRESH_MARGIN)
    }

    /// Create a holder that refreshes tokens `refresh_margin` before expiry.
    pub fn with_refresh_margin(source: Arc<dyn TokenSource>, refresh_margin: Duration) -> Self {
        // Expiry is checked per token, so a stale-looking token is always refetched.
        let config = CacheConfig::default().with_retry_duration(Duration::ZERO);
        let cache = TimedCache::new(config, move || {
            let source = source.clone();
            async move {
                debug!("Fetching bearer token");
                source.fetch_token().await
            }
        });
        Self {
            cache,
            refresh_margin,
        }
    }

    /// Current token, fetching a new one if none is held or it nears expiry.
    ///
    /// # Errors
    ///
    /// Fails when the source fails, or with `ClientError::Authentication`
    /// when even a freshly fetched token is already expired.
    pub async fn token(&self) -> Result<String> {
        let margin = self.refresh_margin;
        match self
            .cache
            .query(|token| token.clone(), |token| !token.expires_within(margin))
            .await?
        {
            CacheResult::Hit(token) => Ok(token.token),
            CacheResult::Miss(token) if !token.is_expired() => Ok(token.token),
            CacheResult::Miss(_) => Err(ClientError::Authentication(
                "Token source returned an expired token".to_string(),
            )),
        }
    }

    /// Drop the held token, e.g. after the proxy rejected it.
    pub fn invalidate(&self) {
        debug!("Invalidating bearer token");
        self.cache.clear();
    }
}

impl std::fmt::Debug for TokenHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHolder")
            .field("refresh_margin", &self.refresh_margin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        fetches: AtomicUsize,
        lifetime: Duration,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> Result<BearerToken> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(BearerToken::expiring_in(format!("token-{}", n), self.lifetime))
        }
    }

    fn counting(lifetime: Duration) -> Arc<CountingSource> {
        Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
            lifetime,
        })
    }

    #[tokio::test]
    async fn test_static_token() {
        let holder = TokenHolder::new(Arc::new(StaticTokenSource::new("secret")));
        assert_eq!(holder.token().await.unwrap(), "secret");
        assert_eq!(holder.token().await.unwrap(), "secret");
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_refreshed_before_expiry() {
        let source = counting(Duration::from_secs(300));
        let holder = TokenHolder::with_refresh_margin(source.clone(), Duration::from_secs(60));

        assert_eq!(holder.token().await.unwrap(), "token-0");
        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(holder.token().await.unwrap(), "token-0");

        // Within the refresh margin
        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(holder.token().await.unwrap(), "token-1");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_fetches_new_token() {
        let source = counting(Duration::from_secs(3600));
        let holder = TokenHolder::new(source.clone());

        assert_eq!(holder.token().await.unwrap(), "token-0");
        holder.invalidate();
        assert_eq!(holder.token().await.unwrap(), "token-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_lived_token_still_used() {
        // Lifetime shorter than the margin: fetched every time but usable
        let source = counting(Duration::from_secs(10));
        let holder = TokenHolder::with_refresh_margin(source.clone(), Duration::from_secs(60));

        assert_eq!(holder.token().await.unwrap(), "token-0");
        assert_eq!(holder.token().await.unwrap(), "token-1");
    }

    #[test]
    fn test_token_without_expiry_never_expires() {
        let token = BearerToken::new("t");
        assert!(!token.is_expired());
        assert!(!token.expires_within(Duration::from_secs(1_000_000)));
    }
}
