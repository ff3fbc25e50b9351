//! Shared User-Agent string for tracker HTTP traffic.
//!
//! AniList rejects anonymous clients, so every request the AniList interceptor
//! forwards carries this fixed identifier; the reqwest transport uses it as its
//! default too.

/// Product token used in the User-Agent.
const PRODUCT: &str = "aniqueue";

/// Fixed User-Agent for tracker requests (`aniqueue/<version>`).
#[must_use]
pub(crate) fn tracker_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (media-library-client)")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_user_agent_contains_crate_version() {
        let ua = tracker_user_agent();
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("aniqueue/")
                .and_then(|s| s.split(' ').next())
                .unwrap(),
        );
    }

    #[test]
    fn test_tracker_user_agent_is_valid_header_value() {
        assert!(reqwest::header::HeaderValue::from_str(&tracker_user_agent()).is_ok());
    }
}
