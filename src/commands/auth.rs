//! Auth command handlers: tracker login, logout and status.

use std::io::{self, IsTerminal, Read};
use std::time::{Duration, SystemTime};

use aniqueue_core::clock;
use aniqueue_core::tracker::{
    AnilistInterceptor, AnilistOAuth, AuthExpiryFlag, EncryptedFileTokenStore, MalOAuth,
    MyAnimeListInterceptor, TokenStore, Tracker, authorization_url, generate_code_verifier,
};
use anyhow::{Context, Result, anyhow, bail};
use tracing::info;
use url::Url;

use super::{build_chain, mal_client_id};
use crate::app_config::FileConfig;
use crate::cli::LoginCommand;

const ANILIST_AUTHORIZE_URL: &str = "https://anilist.co/api/v2/oauth/authorize";

pub async fn run_auth_login_command(command: LoginCommand, config: &FileConfig) -> Result<()> {
    match command {
        LoginCommand::Anilist { redirect } => login_anilist(redirect, config).await,
        LoginCommand::MyAnimeList {
            code,
            code_verifier,
        } => match (code, code_verifier) {
            (Some(code), Some(verifier)) => login_mal(&code, &verifier, config).await,
            _ => print_mal_login_url(config),
        },
    }
}

pub async fn run_auth_logout_command(tracker: Tracker) -> Result<()> {
    match tracker {
        Tracker::Anilist => {
            let interceptor = AnilistInterceptor::new(anilist_store()?);
            interceptor.set_auth(None).await?;
        }
        Tracker::MyAnimeList => {
            mal_store()?.save_login(None)?;
        }
    }
    info!(tracker = %tracker, "Logged out");
    Ok(())
}

pub fn run_auth_status_command() -> Result<()> {
    let now = clock::epoch_millis();

    let anilist = match anilist_store()?.load_token()? {
        None => "not logged in".to_string(),
        Some(token) if token.is_expired(now) => "login expired (log in again)".to_string(),
        Some(token) => format!(
            "logged in, expires {}",
            format_epoch_millis(token.expires_at_millis())
        ),
    };
    println!("anilist = {anilist}");

    let store = mal_store()?;
    let mal = if store.is_auth_expired()? {
        "session expired (log in again)".to_string()
    } else {
        match store.load_token()? {
            None => "not logged in".to_string(),
            Some(token) if token.is_expired(now) => {
                "logged in, access token refreshes on next request".to_string()
            }
            Some(token) => format!(
                "logged in, access token expires {}",
                format_epoch_millis(token.expires_at)
            ),
        }
    };
    println!("myanimelist = {mal}");

    Ok(())
}

async fn login_anilist(redirect: Option<String>, config: &FileConfig) -> Result<()> {
    let input = match redirect {
        Some(redirect) => redirect,
        None => read_redirect_input(config.anilist_client_id.as_deref())?,
    };
    let token = AnilistOAuth::from_redirect_fragment(input.trim(), clock::epoch_millis())
        .ok_or_else(|| {
            anyhow!(
                "No access token found in the redirect\n  Suggestion: Paste the full redirect URL, including the part after '#'"
            )
        })?;
    let expires_at = token.expires_at_millis();

    AnilistInterceptor::new(anilist_store()?)
        .set_auth(Some(token))
        .await?;
    info!(
        expires = %format_epoch_millis(expires_at),
        "Logged in to AniList"
    );
    Ok(())
}

fn anilist_login_url(client_id: &str) -> Result<Url> {
    let url = Url::parse_with_params(
        ANILIST_AUTHORIZE_URL,
        &[("client_id", client_id), ("response_type", "token")],
    )?;
    Ok(url)
}

fn read_redirect_input(client_id: Option<&str>) -> Result<String> {
    if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        if buffer.trim().is_empty() {
            bail!("No redirect provided on stdin");
        }
        return Ok(buffer);
    }

    match client_id {
        Some(client_id) => info!("Open {} and approve access.", anilist_login_url(client_id)?),
        None => info!("Open the AniList authorize page for your API client and approve access."),
    }
    info!("Paste the URL you were redirected to, then press Enter:");

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    if line.trim().is_empty() {
        bail!("No redirect provided");
    }
    Ok(line)
}

async fn login_mal(code: &str, code_verifier: &str, config: &FileConfig) -> Result<()> {
    let client_id = mal_client_id(config)?;
    let chain = build_chain(config)?;
    let interceptor = MyAnimeListInterceptor::new(client_id, mal_store()?)
        .context("Invalid MyAnimeList token endpoint")?;
    let token = interceptor
        .login_with_code(&chain, code, code_verifier)
        .await?;
    info!(
        expires = %format_epoch_millis(token.expires_at),
        "Logged in to MyAnimeList"
    );
    Ok(())
}

fn print_mal_login_url(config: &FileConfig) -> Result<()> {
    let client_id = mal_client_id(config)?;
    let verifier = generate_code_verifier();
    let url = authorization_url(client_id, &verifier)?;
    println!("Open this URL and approve access:");
    println!("{url}");
    println!();
    println!("Then run:");
    println!("aniqueue auth login myanimelist --code <CODE> --code-verifier {verifier}");
    Ok(())
}

fn anilist_store() -> Result<EncryptedFileTokenStore<AnilistOAuth>> {
    EncryptedFileTokenStore::for_tracker(Tracker::Anilist)
        .context("Cannot open AniList token storage")
}

fn mal_store() -> Result<EncryptedFileTokenStore<MalOAuth>> {
    EncryptedFileTokenStore::for_tracker(Tracker::MyAnimeList)
        .context("Cannot open MyAnimeList token storage")
}

fn format_epoch_millis(millis: i64) -> String {
    u64::try_from(millis).map_or_else(
        |_| "<unknown>".to_string(),
        |millis| httpdate::fmt_http_date(SystemTime::UNIX_EPOCH + Duration::from_millis(millis)),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_anilist_login_url_uses_implicit_grant() {
        let url = anilist_login_url("4242").unwrap();
        assert_eq!(url.host_str(), Some("anilist.co"));
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("client_id".to_string(), "4242".to_string())));
        assert!(query.contains(&("response_type".to_string(), "token".to_string())));
    }

    #[test]
    fn test_format_epoch_millis() {
        assert_eq!(format_epoch_millis(0), "Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(format_epoch_millis(-1), "<unknown>");
    }
}
