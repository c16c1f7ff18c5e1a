//! Access token caching for Firestore authentication.
//!
//! Tokens are refreshed a minute before expiry. Refresh happens under a
//! single lock so concurrent webhook handlers do not stampede the token
//! endpoint. If a refresh fails while the old token is still technically
//! valid, the old token is used.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh this long before the token expires.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// OAuth scope for Firestore REST access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }

    fn usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Where bearer tokens come from.
pub enum TokenSource {
    /// Service account credentials with caching.
    ServiceAccount(TokenCache),
    /// Fixed token, used against the Firestore emulator.
    Static(String),
}

impl TokenSource {
    pub async fn token(&self) -> FirestoreResult<String> {
        match self {
            TokenSource::ServiceAccount(cache) => cache.get_token().await,
            TokenSource::Static(token) => Ok(token.clone()),
        }
    }

    pub async fn invalidate(&self) {
        if let TokenSource::ServiceAccount(cache) = self {
            cache.invalidate().await;
        }
    }
}

/// Cache around a [`TokenProvider`].
pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            slot: Mutex::new(None),
        }
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    /// Return a fresh token, refreshing when close to expiry.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref().filter(|c| c.fresh()) {
            return Ok(cached.value.clone());
        }

        match self.provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                // An already-expired token gets zero TTL and is refreshed next call.
                let ttl = (token.expires_at() - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                let value = token.as_str().to_string();

                *slot = Some(CachedToken {
                    value: value.clone(),
                    expires_at: Instant::now() + ttl,
                });
                debug!(ttl_secs = ttl.as_secs(), "Refreshed Firestore access token");
                Ok(value)
            }
            Err(e) => match slot.as_ref().filter(|c| c.usable()) {
                Some(stale) => {
                    warn!("Token refresh failed, reusing current token: {}", e);
                    Ok(stale.value.clone())
                }
                None => Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                ))),
            },
        }
    }
}
