//! Tracker HTTP plumbing: auth interceptors for AniList and MyAnimeList.
//!
//! # Overview
//!
//! - [`HttpChain`] - the next hop ([`ReqwestChain`] in production)
//! - [`Interceptor`] - adds auth to a request and forwards it through a chain
//! - [`AnilistInterceptor`] / [`MyAnimeListInterceptor`] - token lifecycle and
//!   single retry after HTTP 429
//! - [`TokenStore`] / [`AuthExpiryFlag`] - authoritative token persistence
//! - [`TrackerClient`] - an interceptor bound to a chain
//!
//! # Example
//!
//! ```no_run
//! use aniqueue_core::tracker::{
//!     AnilistInterceptor, AnilistOAuth, EncryptedFileTokenStore, ReqwestChain, Tracker,
//!     TrackerClient,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = EncryptedFileTokenStore::<AnilistOAuth>::for_tracker(Tracker::Anilist)?;
//! let client = TrackerClient::new(AnilistInterceptor::new(store), ReqwestChain::new()?);
//! let response = client.get(url::Url::parse("https://graphql.anilist.co")?).await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```

mod anilist;
mod error;
mod http;
mod myanimelist;
mod rate_limit;
mod store;
mod token;

use std::fmt;

use async_trait::async_trait;
use url::Url;

pub use anilist::AnilistInterceptor;
pub use error::{TrackerError, TransportError};
pub use http::{
    CONNECT_TIMEOUT_SECS, HttpChain, READ_TIMEOUT_SECS, ReqwestChain, TrackerRequest,
    TrackerResponse,
};
pub use myanimelist::{
    MAL_AUTHORIZE_URL, MAL_TOKEN_URL, MyAnimeListInterceptor, authorization_url,
    generate_code_verifier,
};
pub use rate_limit::{
    BACKOFF_WARNING_THRESHOLD, DEFAULT_RATE_LIMIT_WAIT, MAX_RATE_LIMIT_WAIT, RateLimitRetry,
    parse_retry_after,
};
pub use store::{
    AuthExpiryFlag, EncryptedFileTokenStore, MemoryTokenStore, StorageError, TokenStore,
    default_config_dir,
};
pub use token::{ANILIST_EXPIRY_MARGIN_MS, AnilistOAuth, MalOAuth, MalTokenResponse};

/// Supported tracking services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tracker {
    /// anilist.co (GraphQL API, non-refreshable tokens).
    Anilist,
    /// myanimelist.net (REST API v2, refreshable tokens).
    MyAnimeList,
}

impl Tracker {
    /// Returns the stable lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anilist => "anilist",
            Self::MyAnimeList => "myanimelist",
        }
    }

    /// File name of the tracker's encrypted token file.
    #[must_use]
    pub fn token_file_name(&self) -> String {
        format!("{}.token", self.as_str())
    }
}

impl fmt::Display for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Tracker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anilist" => Ok(Self::Anilist),
            "myanimelist" | "mal" => Ok(Self::MyAnimeList),
            _ => Err(format!("invalid tracker: {s}")),
        }
    }
}

/// Adds authentication to a request and forwards it through `chain`.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Authenticates `request`, sends it through `chain` and returns the response.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] when no usable token is available or the
    /// request cannot be delivered.
    async fn intercept(
        &self,
        request: TrackerRequest,
        chain: &dyn HttpChain,
    ) -> Result<TrackerResponse, TrackerError>;
}

/// An interceptor bound to the chain it forwards through.
#[derive(Debug)]
pub struct TrackerClient<I, C> {
    interceptor: I,
    chain: C,
}

impl<I: Interceptor, C: HttpChain> TrackerClient<I, C> {
    /// Binds `interceptor` to `chain`.
    pub fn new(interceptor: I, chain: C) -> Self {
        Self { interceptor, chain }
    }

    /// The interceptor, for login and logout.
    pub fn interceptor(&self) -> &I {
        &self.interceptor
    }

    /// The underlying chain.
    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// Sends `request` through the interceptor.
    ///
    /// # Errors
    ///
    /// See [`Interceptor::intercept`].
    pub async fn execute(&self, request: TrackerRequest) -> Result<TrackerResponse, TrackerError> {
        self.interceptor.intercept(request, &self.chain).await
    }

    /// Sends an authenticated GET to `url`.
    ///
    /// # Errors
    ///
    /// See [`Interceptor::intercept`].
    pub async fn get(&self, url: Url) -> Result<TrackerResponse, TrackerError> {
        self.execute(TrackerRequest::get(url)).await
    }
}
