//! OAuth token values for AniList and MyAnimeList.

use serde::{Deserialize, Serialize};

/// AniList tokens are treated as expired this long before their real expiry.
pub const ANILIST_EXPIRY_MARGIN_MS: i64 = 60_000;

/// AniList access token as persisted.
///
/// AniList issues long-lived tokens through the implicit grant and offers no
/// refresh; once expired, the user has to log in again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnilistOAuth {
    pub access_token: String,
    pub token_type: String,
    /// Expiry in epoch seconds.
    pub expires: i64,
}

impl AnilistOAuth {
    /// Builds a token from an implicit-grant response received at `now_millis`.
    #[must_use]
    pub fn from_implicit_grant(access_token: String, expires_in_secs: i64, now_millis: i64) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires: (now_millis / 1000).saturating_add(expires_in_secs),
        }
    }

    /// Parses the fragment of the OAuth redirect
    /// (`access_token=...&token_type=Bearer&expires_in=...`).
    ///
    /// Accepts either the bare fragment or the full redirect URL.
    #[must_use]
    pub fn from_redirect_fragment(redirect: &str, now_millis: i64) -> Option<Self> {
        let fragment = redirect.rsplit_once('#').map_or(redirect, |(_, f)| f);
        let mut access_token = None;
        let mut expires_in = None;
        let mut token_type = None;
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            match key.as_ref() {
                "access_token" => access_token = Some(value.into_owned()),
                "expires_in" => expires_in = value.parse::<i64>().ok(),
                "token_type" => token_type = Some(value.into_owned()),
                _ => {}
            }
        }

        let access_token = access_token.filter(|t| !t.is_empty())?;
        let mut token = Self::from_implicit_grant(access_token, expires_in?, now_millis);
        if let Some(token_type) = token_type {
            token.token_type = token_type;
        }
        Some(token)
    }

    /// Expiry in epoch millis, moved earlier by [`ANILIST_EXPIRY_MARGIN_MS`].
    #[must_use]
    pub fn expires_at_millis(&self) -> i64 {
        self.expires
            .saturating_mul(1000)
            .saturating_sub(ANILIST_EXPIRY_MARGIN_MS)
    }

    /// True once `now_millis` is past the margin-adjusted expiry.
    #[must_use]
    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis > self.expires_at_millis()
    }
}

/// MyAnimeList token as returned by the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MalTokenResponse {
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
    pub access_token: String,
    pub refresh_token: String,
}

/// MyAnimeList token as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalOAuth {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry in epoch millis.
    pub expires_at: i64,
}

impl MalOAuth {
    /// Stamps a token endpoint response received at `received_at_millis`.
    #[must_use]
    pub fn from_response(response: MalTokenResponse, received_at_millis: i64) -> Self {
        Self {
            token_type: response.token_type,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: received_at_millis.saturating_add(response.expires_in.saturating_mul(1000)),
        }
    }

    /// True once `now_millis` is past the expiry.
    #[must_use]
    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis > self.expires_at
    }
}
