//! Integration tests for the tracker interceptors over real HTTP.
//!
//! These tests run the interceptors through [`ReqwestChain`] against a local
//! wiremock server standing in for AniList and MyAnimeList.

mod support;
use support::socket_guard::{should_skip_socket_bound_test, start_mock_server_or_skip};

use std::net::TcpListener;
use std::sync::Arc;

use aniqueue_core::clock;
use aniqueue_core::tracker::{
    AnilistInterceptor, AnilistOAuth, AuthExpiryFlag, MalOAuth, MemoryTokenStore,
    MyAnimeListInterceptor, ReqwestChain, TokenStore, TrackerClient, TrackerError,
    TrackerRequest, TransportError,
};
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn valid_anilist_token() -> AnilistOAuth {
    AnilistOAuth::from_implicit_grant("anilist-token".to_string(), 3600, clock::epoch_millis())
}

fn mal_token(access: &str, expires_at: i64) -> MalOAuth {
    MalOAuth {
        token_type: "Bearer".to_string(),
        access_token: access.to_string(),
        refresh_token: "refresh-1".to_string(),
        expires_at,
    }
}

fn graphql_request(server_uri: &str) -> TrackerRequest {
    TrackerRequest::post_json(
        Url::parse(server_uri).expect("mock server uri"),
        &serde_json::json!({"query": "{ Viewer { id name } }"}),
    )
}

// ==================== AniList ====================

#[tokio::test]
async fn test_anilist_request_carries_bearer_and_user_agent() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("authorization", "Bearer anilist-token"))
        .and(header("content-type", "application/json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"data":{"Viewer":{"id":1}}}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = TrackerClient::new(
        AnilistInterceptor::new(MemoryTokenStore::with_token(valid_anilist_token())),
        ReqwestChain::new().expect("client"),
    );
    let response = client
        .execute(graphql_request(&server.uri()))
        .await
        .expect("request should succeed");

    assert_eq!(response.status, 200);
    assert!(response.text().contains("Viewer"));

    let received = server.received_requests().await.expect("recorded requests");
    let user_agent = received[0]
        .headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(user_agent.starts_with("aniqueue/"), "got {user_agent}");
}

#[tokio::test]
async fn test_anilist_429_is_resent_once_after_retry_after() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":{}}"#))
        .mount(&server)
        .await;

    let client = TrackerClient::new(
        AnilistInterceptor::new(MemoryTokenStore::with_token(valid_anilist_token())),
        ReqwestChain::new().expect("client"),
    );
    let start = std::time::Instant::now();
    let response = client
        .execute(graphql_request(&server.uri()))
        .await
        .expect("request should succeed");

    assert_eq!(response.status, 200);
    assert!(start.elapsed() >= std::time::Duration::from_secs(1));

    let received = server.received_requests().await.expect("recorded requests");
    assert_eq!(received.len(), 2);
    assert_eq!(
        received[0].headers.get("authorization"),
        received[1].headers.get("authorization")
    );
    assert_eq!(received[0].body, received[1].body);
}

#[tokio::test]
async fn test_anilist_second_429_is_returned_to_caller() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(2)
        .mount(&server)
        .await;

    let client = TrackerClient::new(
        AnilistInterceptor::new(MemoryTokenStore::with_token(valid_anilist_token())),
        ReqwestChain::new().expect("client"),
    );
    let response = client
        .execute(graphql_request(&server.uri()))
        .await
        .expect("a second 429 is a response, not an error");

    assert_eq!(response.status, 429);
}

#[tokio::test]
async fn test_anilist_without_token_never_reaches_server() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = TrackerClient::new(
        AnilistInterceptor::new(MemoryTokenStore::<AnilistOAuth>::new()),
        ReqwestChain::new().expect("client"),
    );
    let err = client
        .execute(graphql_request(&server.uri()))
        .await
        .expect_err("no token");

    assert!(matches!(err, TrackerError::NotAuthenticated { .. }));
    assert!(err.requires_login());
}

// ==================== MyAnimeList ====================

#[tokio::test]
async fn test_mal_expired_token_refreshes_then_calls_api() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"token_type":"Bearer","expires_in":2678400,"access_token":"fresh","refresh_token":"refresh-2"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/users/@me"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":7,"name":"me"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_token(mal_token("stale", 1)));
    let token_url = Url::parse(&format!("{}/v1/oauth2/token", server.uri())).expect("url");
    let interceptor =
        MyAnimeListInterceptor::with_token_url("client-123", Arc::clone(&store), token_url);
    let client = TrackerClient::new(interceptor, ReqwestChain::new().expect("client"));

    let response = client
        .get(Url::parse(&format!("{}/v2/users/@me", server.uri())).expect("url"))
        .await
        .expect("request should succeed");

    assert_eq!(response.status, 200);
    let persisted = store.load_token().expect("load").expect("token persisted");
    assert_eq!(persisted.access_token, "fresh");
    assert_eq!(persisted.refresh_token, "refresh-2");
}

#[tokio::test]
async fn test_mal_refresh_rejected_sets_expired_flag() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_grant"}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_token(mal_token("stale", 1)));
    let token_url = Url::parse(&format!("{}/v1/oauth2/token", server.uri())).expect("url");
    let client = TrackerClient::new(
        MyAnimeListInterceptor::with_token_url("client-123", Arc::clone(&store), token_url),
        ReqwestChain::new().expect("client"),
    );
    let api = Url::parse(&format!("{}/v2/anime/1", server.uri())).expect("url");

    let err = client.get(api.clone()).await.expect_err("refresh rejected");
    assert!(matches!(err, TrackerError::TokenExpired { .. }));
    assert!(store.is_auth_expired().expect("flag"));

    // The flag short-circuits later requests without another refresh attempt.
    let again = client.get(api).await.expect_err("still expired");
    assert!(matches!(again, TrackerError::TokenExpired { .. }));
}

#[tokio::test]
async fn test_mal_login_with_code_stores_token() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .and(body_string_contains("code_verifier=verifier-xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"token_type":"Bearer","expires_in":3600,"access_token":"first","refresh_token":"r"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::<MalOAuth>::new());
    store.set_auth_expired().expect("flag");
    let token_url = Url::parse(&format!("{}/v1/oauth2/token", server.uri())).expect("url");
    let interceptor =
        MyAnimeListInterceptor::with_token_url("client-123", Arc::clone(&store), token_url);
    let chain = ReqwestChain::new().expect("client");

    let token = interceptor
        .login_with_code(&chain, "auth-code", "verifier-xyz")
        .await
        .expect("login");

    assert_eq!(token.access_token, "first");
    assert_eq!(store.load_token().expect("load"), Some(token));
    assert!(!store.is_auth_expired().expect("flag"));
}

#[tokio::test]
async fn test_mal_unreachable_token_endpoint_is_refresh_failure() {
    if should_skip_socket_bound_test() {
        return;
    }
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    let store = Arc::new(MemoryTokenStore::with_token(mal_token("stale", 1)));
    let token_url = Url::parse(&format!("http://127.0.0.1:{port}/v1/oauth2/token")).expect("url");
    let client = TrackerClient::new(
        MyAnimeListInterceptor::with_token_url("client-123", Arc::clone(&store), token_url),
        ReqwestChain::with_timeouts(2, 2).expect("client"),
    );
    let api = Url::parse(&format!("http://127.0.0.1:{port}/v2/anime/1")).expect("url");

    let err = client.get(api).await.expect_err("token endpoint is down");
    assert!(matches!(err, TrackerError::TokenRefreshFailed { .. }), "got {err:?}");
    assert!(!err.requires_login());
    assert!(!store.is_auth_expired().expect("flag"));
}

// ==================== Transport ====================

#[tokio::test]
async fn test_refused_connection_maps_to_transport_error() {
    if should_skip_socket_bound_test() {
        return;
    }
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    let client = TrackerClient::new(
        AnilistInterceptor::new(MemoryTokenStore::with_token(valid_anilist_token())),
        ReqwestChain::with_timeouts(2, 2).expect("client"),
    );
    let err = client
        .execute(graphql_request(&format!("http://127.0.0.1:{port}/")))
        .await
        .expect_err("nothing listens on the port");

    assert!(
        matches!(
            err,
            TrackerError::Transport(TransportError::Connection { .. } | TransportError::Network { .. })
        ),
        "got {err:?}"
    );
    assert!(!err.requires_login());
}
