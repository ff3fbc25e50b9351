//! MyAnimeList request interceptor.
//!
//! MAL access tokens are short-lived and refreshed transparently. Refreshes
//! are single-flight: the cached token lives behind an async mutex held only
//! for the refresh call, so concurrent requests that find the token expired
//! wait for the first refresh and then reuse its result. A refresh rejected
//! with HTTP 401 sets the store's auth-expired flag; until the next login every
//! request fails with [`TrackerError::TokenExpired`] without network access.

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{
    AuthExpiryFlag, HttpChain, Interceptor, MalOAuth, MalTokenResponse, RateLimitRetry,
    TokenStore, Tracker, TrackerError, TrackerRequest, TrackerResponse,
};
use crate::clock;

/// MyAnimeList OAuth token endpoint.
pub const MAL_TOKEN_URL: &str = "https://myanimelist.net/v1/oauth2/token";

/// MyAnimeList OAuth authorization page.
pub const MAL_AUTHORIZE_URL: &str = "https://myanimelist.net/v1/oauth2/authorize";

/// PKCE verifier length; MAL accepts 43..=128 characters.
const CODE_VERIFIER_LEN: usize = 128;

const TRACKER: Tracker = Tracker::MyAnimeList;

/// Generates a PKCE code verifier for the login flow.
///
/// MAL only supports the `plain` challenge method, so the verifier doubles as
/// the challenge.
#[must_use]
pub fn generate_code_verifier() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_VERIFIER_LEN)
        .map(char::from)
        .collect()
}

/// Builds the URL the user opens to authorize the client.
///
/// # Errors
///
/// Returns the parse error if [`MAL_AUTHORIZE_URL`] cannot be parsed.
pub fn authorization_url(client_id: &str, code_verifier: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(MAL_AUTHORIZE_URL)?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("code_challenge", code_verifier)
        .append_pair("code_challenge_method", "plain");
    Ok(url)
}

/// Adds MyAnimeList bearer auth, token refresh and 429 handling to outgoing
/// requests.
#[derive(Debug)]
pub struct MyAnimeListInterceptor<S> {
    client_id: String,
    token_url: Url,
    store: S,
    cached: Mutex<Option<MalOAuth>>,
    rate_limit: RateLimitRetry,
    now: fn() -> i64,
}

impl<S> MyAnimeListInterceptor<S>
where
    S: TokenStore<MalOAuth> + AuthExpiryFlag,
{
    /// Creates an interceptor for the registered `client_id`.
    ///
    /// # Errors
    ///
    /// Returns the parse error if [`MAL_TOKEN_URL`] cannot be parsed.
    pub fn new(client_id: impl Into<String>, store: S) -> Result<Self, url::ParseError> {
        Ok(Self::with_token_url(client_id, store, Url::parse(MAL_TOKEN_URL)?))
    }

    /// Creates an interceptor that refreshes against `token_url`.
    pub fn with_token_url(client_id: impl Into<String>, store: S, token_url: Url) -> Self {
        Self {
            client_id: client_id.into(),
            token_url,
            store,
            cached: Mutex::new(None),
            rate_limit: RateLimitRetry::new(),
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
    /// Either way the auth-expired flag is cleared, in the same store write
    /// as the token.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Storage`] if the store cannot be written.
    #[instrument(skip_all, fields(login = token.is_some()))]
    pub async fn set_auth(&self, token: Option<MalOAuth>) -> Result<(), TrackerError> {
        let mut cached = self.cached.lock().await;
        self.store.save_login(token.as_ref())?;
        *cached = token;
        Ok(())
    }

    /// Exchanges an authorization code for a token and logs in with it.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::TokenRefreshFailed`] when the token endpoint is
    /// unreachable, rejects the code, or returns an unreadable body.
    #[instrument(skip_all)]
    pub async fn login_with_code(
        &self,
        chain: &dyn HttpChain,
        code: &str,
        code_verifier: &str,
    ) -> Result<MalOAuth, TrackerError> {
        let request = TrackerRequest::post_form(
            self.token_url.clone(),
            &[
                ("client_id", self.client_id.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("code_verifier", code_verifier),
            ],
        );
        let response = chain
            .proceed(request)
            .await
            .map_err(|e| TrackerError::refresh_failed(TRACKER, e.to_string()))?;
        let token = self.token_from_response(&response)?;
        self.set_auth(Some(token.clone())).await?;
        info!("Logged in to MyAnimeList");
        Ok(token)
    }

    fn token_from_response(&self, response: &TrackerResponse) -> Result<MalOAuth, TrackerError> {
        if !response.is_success() {
            return Err(TrackerError::refresh_failed(
                TRACKER,
                format!("token endpoint returned HTTP {}", response.status),
            ));
        }
        let body: MalTokenResponse = response.json().map_err(|e| {
            TrackerError::refresh_failed(TRACKER, format!("unreadable token response: {e}"))
        })?;
        Ok(MalOAuth::from_response(body, (self.now)()))
    }

    async fn refresh(
        &self,
        chain: &dyn HttpChain,
        refresh_token: &str,
    ) -> Result<MalOAuth, TrackerError> {
        let request = TrackerRequest::post_form(
            self.token_url.clone(),
            &[
                ("client_id", self.client_id.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        );
        let response = chain
            .proceed(request)
            .await
            .map_err(|e| TrackerError::refresh_failed(TRACKER, e.to_string()))?;

        if response.status == 401 {
            warn!("MyAnimeList refresh token rejected, marking auth expired");
            self.store.set_auth_expired()?;
            return Err(TrackerError::TokenExpired { tracker: TRACKER });
        }
        self.token_from_response(&response)
    }

    /// Returns a usable access token, refreshing it at most once across
    /// concurrent callers.
    async fn access_token(&self, chain: &dyn HttpChain) -> Result<String, TrackerError> {
        if self.store.is_auth_expired()? {
            return Err(TrackerError::TokenExpired { tracker: TRACKER });
        }

        let mut cached = self.cached.lock().await;
        let now = (self.now)();
        if cached.as_ref().is_none_or(|token| token.is_expired(now)) {
            *cached = self.store.load_token()?;
        }

        let Some(token) = cached.as_ref() else {
            return Err(TrackerError::NotAuthenticated { tracker: TRACKER });
        };
        if !token.is_expired(now) {
            return Ok(token.access_token.clone());
        }

        // A caller that held the lock before us may have hit a 401.
        if self.store.is_auth_expired()? {
            return Err(TrackerError::TokenExpired { tracker: TRACKER });
        }

        debug!(expired_at = token.expires_at, "Refreshing MyAnimeList token");
        let refreshed = self.refresh(chain, &token.refresh_token).await?;
        self.store.save_token(Some(&refreshed))?;
        let access_token = refreshed.access_token.clone();
        *cached = Some(refreshed);
        info!("MyAnimeList token refreshed");
        Ok(access_token)
    }
}

#[async_trait]
impl<S> Interceptor for MyAnimeListInterceptor<S>
where
    S: TokenStore<MalOAuth> + AuthExpiryFlag,
{
    #[instrument(skip_all, fields(tracker = "myanimelist", url = %request.url))]
    async fn intercept(
        &self,
        mut request: TrackerRequest,
        chain: &dyn HttpChain,
    ) -> Result<TrackerResponse, TrackerError> {
        let access_token = self.access_token(chain).await?;
        let bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|_| TrackerError::InvalidCredential { tracker: TRACKER })?;
        request.headers.insert(AUTHORIZATION, bearer);

        Ok(self.rate_limit.proceed(chain, request).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use super::*;
    use crate::tracker::{MemoryTokenStore, StorageError, TransportError};

    const NOW: i64 = 1_700_000_000_000;
    const TOKEN_URL: &str = "https://mal.test/v1/oauth2/token";

    fn fixed_now() -> i64 {
        NOW
    }

    const TOKEN_BODY: &[u8] =
        br#"{"token_type":"Bearer","expires_in":3600,"access_token":"fresh","refresh_token":"r2"}"#;

    /// Answers the token endpoint with `refresh_status` and `refresh_body` (or
    /// a timeout) and every API call with 200, recording each request.
    struct FakeMal {
        refresh_status: u16,
        refresh_body: &'static [u8],
        refresh_times_out: bool,
        refresh_calls: AtomicUsize,
        api_calls: AtomicUsize,
        refresh_delay: Duration,
        api_auth: StdMutex<Vec<String>>,
        refresh_bodies: StdMutex<Vec<String>>,
    }

    impl FakeMal {
        fn new(refresh_status: u16) -> Self {
            Self {
                refresh_status,
                refresh_body: TOKEN_BODY,
                refresh_times_out: false,
                refresh_calls: AtomicUsize::new(0),
                api_calls: AtomicUsize::new(0),
                refresh_delay: Duration::ZERO,
                api_auth: StdMutex::new(Vec::new()),
                refresh_bodies: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpChain for FakeMal {
        async fn proceed(&self, request: TrackerRequest) -> Result<TrackerResponse, TransportError> {
            if request.url.as_str() == TOKEN_URL {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                self.refresh_bodies
                    .lock()
                    .unwrap()
                    .push(String::from_utf8(request.body.unwrap_or_default()).unwrap());
                tokio::time::sleep(self.refresh_delay).await;
                if self.refresh_times_out {
                    return Err(TransportError::timeout(TOKEN_URL));
                }
                return Ok(TrackerResponse::new(
                    self.refresh_status,
                    self.refresh_body.to_vec(),
                ));
            }
            self.api_calls.fetch_add(1, Ordering::SeqCst);
            self.api_auth.lock().unwrap().push(
                request
                    .headers
                    .get(AUTHORIZATION)
                    .unwrap()
                    .to_str()
                    .unwrap()
                    .to_string(),
            );
            Ok(TrackerResponse::new(200, b"{}".to_vec()))
        }
    }

    fn token(access: &str, expires_at: i64) -> MalOAuth {
        MalOAuth {
            token_type: "Bearer".to_string(),
            access_token: access.to_string(),
            refresh_token: "r1".to_string(),
            expires_at,
        }
    }

    fn interceptor(
        store: Arc<MemoryTokenStore<MalOAuth>>,
    ) -> MyAnimeListInterceptor<Arc<MemoryTokenStore<MalOAuth>>> {
        MyAnimeListInterceptor::with_token_url("client-123", store, Url::parse(TOKEN_URL).unwrap())
            .with_clock(fixed_now)
    }

    fn request() -> TrackerRequest {
        TrackerRequest::get(Url::parse("https://api.myanimelist.net/v2/users/@me").unwrap())
    }

    #[test]
    fn test_generate_code_verifier_is_alphanumeric() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), CODE_VERIFIER_LEN);
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_authorization_url_uses_plain_pkce() {
        let url = authorization_url("client-123", "verifier").unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("client_id=client-123"));
        assert!(query.contains("code_challenge=verifier"));
        assert!(query.contains("code_challenge_method=plain"));
    }

    #[tokio::test]
    async fn test_no_token_fails_without_network() {
        let interceptor = interceptor(Arc::new(MemoryTokenStore::new()));
        let chain = FakeMal::new(200);

        let err = interceptor.intercept(request(), &chain).await.unwrap_err();

        assert!(matches!(err, TrackerError::NotAuthenticated { .. }));
        assert_eq!(chain.api_calls.load(Ordering::SeqCst), 0);
        assert_eq!(chain.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_token_is_used_without_refresh() {
        let store = Arc::new(MemoryTokenStore::with_token(token("current", NOW + 60_000)));
        let interceptor = interceptor(store);
        let chain = FakeMal::new(200);

        interceptor.intercept(request(), &chain).await.unwrap();

        assert_eq!(chain.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(chain.api_auth.lock().unwrap()[0], "Bearer current");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_persisted() {
        let store = Arc::new(MemoryTokenStore::with_token(token("old", NOW - 1)));
        let interceptor = interceptor(Arc::clone(&store));
        let chain = FakeMal::new(200);

        interceptor.intercept(request(), &chain).await.unwrap();

        assert_eq!(chain.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.api_auth.lock().unwrap()[0], "Bearer fresh");
        let body = chain.refresh_bodies.lock().unwrap()[0].clone();
        assert_eq!(
            body,
            "client_id=client-123&grant_type=refresh_token&refresh_token=r1"
        );
        let stored = store.load_token().unwrap().unwrap();
        assert_eq!(stored.access_token, "fresh");
        assert_eq!(stored.refresh_token, "r2");
        assert_eq!(stored.expires_at, NOW + 3_600_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_refresh_once() {
        let store = Arc::new(MemoryTokenStore::with_token(token("old", NOW - 1)));
        let interceptor = Arc::new(interceptor(store));
        let chain = Arc::new(FakeMal {
            refresh_delay: Duration::from_millis(200),
            ..FakeMal::new(200)
        });

        let mut handles = Vec::new();
        for _ in 0..8 {
            let interceptor = Arc::clone(&interceptor);
            let chain = Arc::clone(&chain);
            handles.push(tokio::spawn(async move {
                interceptor.intercept(request(), chain.as_ref()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(chain.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.api_calls.load(Ordering::SeqCst), 8);
        assert!(
            chain
                .api_auth
                .lock()
                .unwrap()
                .iter()
                .all(|auth| auth == "Bearer fresh")
        );
    }

    #[tokio::test]
    async fn test_refresh_401_sets_expired_flag() {
        let store = Arc::new(MemoryTokenStore::with_token(token("old", NOW - 1)));
        let interceptor = interceptor(Arc::clone(&store));
        let chain = FakeMal::new(401);

        let err = interceptor.intercept(request(), &chain).await.unwrap_err();
        assert!(matches!(err, TrackerError::TokenExpired { .. }));
        assert!(store.is_auth_expired().unwrap());

        // Later requests fail without touching the network.
        let again = interceptor.intercept(request(), &chain).await.unwrap_err();
        assert!(matches!(again, TrackerError::TokenExpired { .. }));
        assert_eq!(chain.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.api_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_behind_rejected_refresh_fail_fast() {
        let store = Arc::new(MemoryTokenStore::with_token(token("old", NOW - 1)));
        let interceptor = Arc::new(interceptor(Arc::clone(&store)));
        let chain = Arc::new(FakeMal {
            refresh_delay: Duration::from_millis(200),
            ..FakeMal::new(401)
        });

        let mut handles = Vec::new();
        for _ in 0..6 {
            let interceptor = Arc::clone(&interceptor);
            let chain = Arc::clone(&chain);
            handles.push(tokio::spawn(async move {
                interceptor.intercept(request(), chain.as_ref()).await
            }));
        }
        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, TrackerError::TokenExpired { .. }), "got {err:?}");
            assert!(err.requires_login());
        }

        assert_eq!(chain.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.api_calls.load(Ordering::SeqCst), 0);
        assert!(store.is_auth_expired().unwrap());
    }

    #[tokio::test]
    async fn test_refresh_transport_failure_is_refresh_failed() {
        let store = Arc::new(MemoryTokenStore::with_token(token("old", NOW - 1)));
        let interceptor = interceptor(Arc::clone(&store));
        let chain = FakeMal {
            refresh_times_out: true,
            ..FakeMal::new(200)
        };

        let err = interceptor.intercept(request(), &chain).await.unwrap_err();

        assert!(matches!(err, TrackerError::TokenRefreshFailed { .. }), "got {err:?}");
        assert!(!err.requires_login());
        assert!(!store.is_auth_expired().unwrap());
        assert_eq!(chain.api_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.load_token().unwrap().unwrap().access_token, "old");
    }

    #[tokio::test]
    async fn test_refresh_unreadable_body_is_refresh_failed() {
        let store = Arc::new(MemoryTokenStore::with_token(token("old", NOW - 1)));
        let interceptor = interceptor(Arc::clone(&store));
        let chain = FakeMal {
            refresh_body: b"<html>maintenance</html>",
            ..FakeMal::new(200)
        };

        let err = interceptor.intercept(request(), &chain).await.unwrap_err();

        assert!(matches!(err, TrackerError::TokenRefreshFailed { .. }), "got {err:?}");
        assert!(!err.requires_login());
        assert!(!store.is_auth_expired().unwrap());
        assert_eq!(store.load_token().unwrap().unwrap().access_token, "old");
    }

    #[tokio::test]
    async fn test_refresh_server_error_is_refresh_failed() {
        let store = Arc::new(MemoryTokenStore::with_token(token("old", NOW - 1)));
        let interceptor = interceptor(Arc::clone(&store));
        let chain = FakeMal::new(503);

        let err = interceptor.intercept(request(), &chain).await.unwrap_err();
        assert!(matches!(err, TrackerError::TokenRefreshFailed { .. }));
        assert!(!err.requires_login());
        assert!(!store.is_auth_expired().unwrap());
    }

    #[tokio::test]
    async fn test_set_auth_clears_expired_flag() {
        let store = Arc::new(MemoryTokenStore::<MalOAuth>::new());
        store.set_auth_expired().unwrap();
        let interceptor = interceptor(Arc::clone(&store));
        let chain = FakeMal::new(200);

        assert!(matches!(
            interceptor.intercept(request(), &chain).await,
            Err(TrackerError::TokenExpired { .. })
        ));

        interceptor
            .set_auth(Some(token("new-login", NOW + 60_000)))
            .await
            .unwrap();
        assert!(!store.is_auth_expired().unwrap());
        interceptor.intercept(request(), &chain).await.unwrap();
        assert_eq!(chain.api_auth.lock().unwrap()[0], "Bearer new-login");
    }

    /// Memory store whose standalone flag writes always fail.
    struct FlagWriteFails(MemoryTokenStore<MalOAuth>);

    impl TokenStore<MalOAuth> for FlagWriteFails {
        fn load_token(&self) -> Result<Option<MalOAuth>, StorageError> {
            self.0.load_token()
        }

        fn save_token(&self, token: Option<&MalOAuth>) -> Result<(), StorageError> {
            self.0.save_token(token)
        }

        fn save_login(&self, token: Option<&MalOAuth>) -> Result<(), StorageError> {
            self.0.save_login(token)
        }
    }

    impl AuthExpiryFlag for FlagWriteFails {
        fn is_auth_expired(&self) -> Result<bool, StorageError> {
            self.0.is_auth_expired()
        }

        fn set_auth_expired(&self) -> Result<(), StorageError> {
            Err(std::io::Error::other("flag write failed").into())
        }

        fn clear_auth_expired(&self) -> Result<(), StorageError> {
            Err(std::io::Error::other("flag write failed").into())
        }
    }

    #[tokio::test]
    async fn test_set_auth_writes_token_and_flag_together() {
        let inner = MemoryTokenStore::with_token(token("old", NOW - 1));
        inner.set_auth_expired().unwrap();
        let interceptor = MyAnimeListInterceptor::with_token_url(
            "client-123",
            FlagWriteFails(inner),
            Url::parse(TOKEN_URL).unwrap(),
        )
        .with_clock(fixed_now);

        interceptor
            .set_auth(Some(token("relogin", NOW + 60_000)))
            .await
            .unwrap();

        assert!(!interceptor.store().is_auth_expired().unwrap());
        let chain = FakeMal::new(200);
        interceptor.intercept(request(), &chain).await.unwrap();
        assert_eq!(chain.api_auth.lock().unwrap()[0], "Bearer relogin");
    }

    #[tokio::test]
    async fn test_login_with_code_exchanges_and_stores_token() {
        let store = Arc::new(MemoryTokenStore::<MalOAuth>::new());
        let interceptor = interceptor(Arc::clone(&store));
        let chain = FakeMal::new(200);

        let token = interceptor
            .login_with_code(&chain, "auth-code", "verifier")
            .await
            .unwrap();

        assert_eq!(token.access_token, "fresh");
        assert_eq!(store.load_token().unwrap(), Some(token));
        let body = chain.refresh_bodies.lock().unwrap()[0].clone();
        assert!(body.contains("grant_type=authorization_code"));
        assert!(body.contains("code=auth-code"));
        assert!(body.contains("code_verifier=verifier"));
    }
}
