//! AniList request interceptor.
//!
//! AniList tokens cannot be refreshed: once the cached and stored token are
//! both expired the session is logged out and the request fails with
//! [`TrackerError::LoginExpired`] without reaching the network.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue, USER_AGENT};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::{
    AnilistOAuth, HttpChain, Interceptor, RateLimitRetry, TokenStore, Tracker, TrackerError,
    TrackerRequest, TrackerResponse,
};
use crate::{clock, user_agent};

/// Cached token with its expiry normalized to epoch millis at assignment.
#[derive(Debug, Clone)]
struct CachedToken {
    oauth: AnilistOAuth,
    expires_at_millis: i64,
}

impl CachedToken {
    fn new(oauth: AnilistOAuth) -> Self {
        let expires_at_millis = oauth.expires_at_millis();
        Self {
            oauth,
            expires_at_millis,
        }
    }

    fn is_expired(&self, now_millis: i64) -> bool {
        now_millis > self.expires_at_millis
    }
}

/// Adds AniList bearer auth and 429 handling to outgoing requests.
#[derive(Debug)]
pub struct AnilistInterceptor<S> {
    store: S,
    cached: Mutex<Option<CachedToken>>,
    rate_limit: RateLimitRetry,
    user_agent: HeaderValue,
    now: fn() -> i64,
}

impl<S: TokenStore<AnilistOAuth>> AnilistInterceptor<S> {
    /// Creates an interceptor reading tokens from `store`.
    #[must_use]
    pub fn new(store: S) -> Self {
        let user_agent = HeaderValue::from_str(&user_agent::tracker_user_agent())
            .unwrap_or_else(|_| HeaderValue::from_static("aniqueue"));
        Self {
            store,
            cached: Mutex::new(None),
            rate_limit: RateLimitRetry::new(),
            user_agent,
            now: clock::epoch_millis,
        }
    }

    /// Replaces the wall clock used for expiry checks.
    #[must_use]
    pub fn with_clock(mut self, now: fn() -> i64) -> Self {
        self.now = now;
        self
    }

    /// The backing token store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Logs in with `token`, or logs out with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Storage`] if the store cannot be written.
    #[instrument(skip_all, fields(login = token.is_some()))]
    pub async fn set_auth(&self, token: Option<AnilistOAuth>) -> Result<(), TrackerError> {
        let mut cached = self.cached.lock().await;
        self.store.save_token(token.as_ref())?;
        *cached = token.map(CachedToken::new);
        Ok(())
    }

    /// Returns a usable access token, reloading from the store when the cache
    /// is empty or stale and logging out when the stored token expired too.
    async fn access_token(&self) -> Result<String, TrackerError> {
        let now = (self.now)();
        let mut cached = self.cached.lock().await;

        if cached.as_ref().is_none_or(|token| token.is_expired(now)) {
            *cached = self.store.load_token()?.map(CachedToken::new);
        }

        match cached.as_ref() {
            None => Err(TrackerError::NotAuthenticated {
                tracker: Tracker::Anilist,
            }),
            Some(token) if token.is_expired(now) => {
                warn!(
                    expired_at = token.expires_at_millis,
                    "AniList token expired, logging out"
                );
                self.store.save_token(None)?;
                *cached = None;
                Err(TrackerError::LoginExpired {
                    tracker: Tracker::Anilist,
                })
            }
            Some(token) => Ok(token.oauth.access_token.clone()),
        }
    }
}

#[async_trait]
impl<S: TokenStore<AnilistOAuth>> Interceptor for AnilistInterceptor<S> {
    #[instrument(skip_all, fields(tracker = "anilist", url = %request.url))]
    async fn intercept(
        &self,
        mut request: TrackerRequest,
        chain: &dyn HttpChain,
    ) -> Result<TrackerResponse, TrackerError> {
        let access_token = self.access_token().await?;
        let bearer = HeaderValue::from_str(&format!("Bearer {access_token}")).map_err(|_| {
            TrackerError::InvalidCredential {
                tracker: Tracker::Anilist,
            }
        })?;
        request.headers.insert(AUTHORIZATION, bearer);
        request.headers.insert(USER_AGENT, self.user_agent.clone());

        debug!("Forwarding authenticated AniList request");
        Ok(self.rate_limit.proceed(chain, request).await?)
    }
}
