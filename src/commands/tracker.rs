//! Tracker command: authenticated requests through the interceptors.

use aniqueue_core::tracker::{
    AnilistInterceptor, AnilistOAuth, EncryptedFileTokenStore, MalOAuth, MyAnimeListInterceptor,
    Tracker, TrackerClient, TrackerResponse,
};
use anyhow::{Context, Result, bail};
use tracing::debug;
use url::Url;

use super::{build_chain, mal_client_id};
use crate::app_config::FileConfig;

pub async fn run_tracker_get_command(tracker: Tracker, url: Url, config: &FileConfig) -> Result<()> {
    let chain = build_chain(config)?;

    let response = match tracker {
        Tracker::Anilist => {
            let store = EncryptedFileTokenStore::<AnilistOAuth>::for_tracker(Tracker::Anilist)
                .context("Cannot open AniList token storage")?;
            let client = TrackerClient::new(AnilistInterceptor::new(store), chain);
            client.get(url).await?
        }
        Tracker::MyAnimeList => {
            let store = EncryptedFileTokenStore::<MalOAuth>::for_tracker(Tracker::MyAnimeList)
                .context("Cannot open MyAnimeList token storage")?;
            let interceptor = MyAnimeListInterceptor::new(mal_client_id(config)?, store)
                .context("Invalid MyAnimeList token endpoint")?;
            TrackerClient::new(interceptor, chain).get(url).await?
        }
    };

    print_response(tracker, &response)
}

fn print_response(tracker: Tracker, response: &TrackerResponse) -> Result<()> {
    debug!(status = response.status, bytes = response.body.len(), "Tracker response");
    println!("{}", response.text());
    if !response.is_success() {
        bail!("{tracker} answered with HTTP {}", response.status);
    }
    Ok(())
}
