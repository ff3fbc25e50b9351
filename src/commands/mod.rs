//! CLI command handlers.

mod auth;
mod queue;
mod status;
mod tracker;

use std::path::Path;

use aniqueue_core::tracker::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, ReqwestChain};
use aniqueue_core::{Database, TransferQueue};
use anyhow::{Context, Result};

use crate::app_config::FileConfig;

pub use auth::{run_auth_login_command, run_auth_logout_command, run_auth_status_command};
pub use queue::run_queue_command;
pub use status::run_status_command;
pub use tracker::run_tracker_get_command;

pub fn connect_timeout_secs(config: &FileConfig) -> u64 {
    config.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS)
}

pub fn read_timeout_secs(config: &FileConfig) -> u64 {
    config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS)
}

async fn open_queue(db_path: &Path) -> Result<TransferQueue> {
    let db = Database::new(db_path)
        .await
        .with_context(|| format!("Cannot open transfer database '{}'", db_path.display()))?;
    Ok(TransferQueue::new(db))
}

fn build_chain(config: &FileConfig) -> Result<ReqwestChain> {
    ReqwestChain::with_timeouts(connect_timeout_secs(config), read_timeout_secs(config))
        .context("Failed to build HTTP client")
}

fn mal_client_id(config: &FileConfig) -> Result<&str> {
    config.mal_client_id.as_deref().context(
        "MyAnimeList client id is not configured\n  Suggestion: Add `mal_client_id = \"...\"` to the config file (see `aniqueue config show`)",
    )
}
