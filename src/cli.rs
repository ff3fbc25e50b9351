//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use aniqueue_core::{DEFAULT_MAX_RETRIES, DisplayStatus, MediaKind, Tracker};
use clap::{Args, Parser, Subcommand};
use url::Url;

/// Inspect the download queue and manage tracker logins.
///
/// aniqueue reads the transfer queue shared by the anime, manga and
/// light-novel downloaders and talks to AniList and MyAnimeList on your behalf.
#[derive(Parser, Debug)]
#[command(name = "aniqueue")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Transfer database path (overrides `database_path` from the config file)
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show queue counts and the reason line for each transfer
    Status(StatusArgs),

    /// Modify transfers in the queue
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },

    /// Log in to or out of a tracker
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },

    /// Send authenticated requests to a tracker
    Tracker {
        #[command(subcommand)]
        command: TrackerCommand,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {
    /// Only show transfers of this media kind (anime, manga, novel)
    #[arg(long)]
    pub kind: Option<MediaKind>,

    /// Print machine-readable JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Mark running transfers without recent progress as stalled first
    #[arg(long)]
    pub reclassify: bool,

    /// JSON file of translated status strings keyed by resource name
    #[arg(long, value_name = "FILE")]
    pub strings: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Add a transfer waiting for a slot
    Add {
        /// Media kind (anime, manga, novel)
        #[arg(long)]
        kind: MediaKind,
        /// Stable key of the episode or chapter
        item_key: String,
        /// Title shown in listings
        title: String,
    },

    /// Set the display status of a transfer
    SetStatus {
        id: i64,
        /// Status name, e.g. downloading, paused_by_user, completed
        status: DisplayStatus,
    },

    /// Record downloaded bytes for a transfer
    Progress {
        id: i64,
        /// Bytes downloaded so far
        bytes: i64,
        /// Total size announced by the source
        #[arg(long)]
        total: Option<i64>,
    },

    /// Record a failed attempt and schedule a retry or give up
    Fail(FailArgs),

    /// Remove a transfer from the queue
    Remove { id: i64 },
}

#[derive(Args, Debug, Clone)]
pub struct FailArgs {
    pub id: i64,

    /// HTTP status returned by the source
    #[arg(long, conflicts_with_all = ["timeout", "network", "storage"])]
    pub http_status: Option<u16>,

    /// The source did not answer in time
    #[arg(long, conflicts_with_all = ["network", "storage"])]
    pub timeout: bool,

    /// Network error text
    #[arg(long, value_name = "MESSAGE", conflicts_with = "storage")]
    pub network: Option<String>,

    /// Local storage error text
    #[arg(long, value_name = "MESSAGE")]
    pub storage: Option<String>,

    /// Maximum attempts including the first one (1-10)
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: u32,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Log in to a tracker
    Login {
        #[command(subcommand)]
        tracker: LoginCommand,
    },

    /// Forget the stored token for a tracker
    Logout {
        /// Tracker name (anilist, myanimelist)
        tracker: Tracker,
    },

    /// Show login state for every tracker
    Status,
}

#[derive(Subcommand, Debug)]
pub enum LoginCommand {
    /// Store the token from an AniList implicit-grant redirect
    Anilist {
        /// Redirect URL or its fragment; read from stdin when omitted
        redirect: Option<String>,
    },

    /// Exchange a MyAnimeList authorization code for tokens
    #[command(name = "myanimelist", alias = "mal")]
    MyAnimeList {
        /// Authorization code from the redirect; prints the login URL when omitted
        #[arg(long, requires = "code_verifier")]
        code: Option<String>,
        /// PKCE verifier printed together with the login URL
        #[arg(long)]
        code_verifier: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TrackerCommand {
    /// Authenticated GET through the tracker's interceptor
    Get {
        /// Tracker name (anilist, myanimelist)
        tracker: Tracker,
        /// Request URL
        url: Url,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
}
