//! Command-line interface for the mbxgroups console
//!
//! The tool always acts on behalf of one user (`--user`). By default it opens
//! the interactive console; `discover` and `members` are one-shot commands
//! that print JSON and exit.
//!
//! # Backends
//!
//! - Microsoft Graph (default): authenticate with `--access-token`, or with
//!   `--tenant-id`, `--client-id` and `--client-secret` for an app
//!   registration. Each credential can also be supplied through its
//!   `MBX_*` environment variable.
//! - Snapshot: `--snapshot <file>` answers every query from a JSON export and
//!   keeps changes in memory, for rehearsing a session offline.
//!
//! # Naming convention
//!
//! Managed groups are mail-enabled security groups whose display name starts
//! with `--group-prefix`. A group carrying the `--owners-segment` has sibling
//! groups named by replacing that segment with each `--sibling-segments`
//! value.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::http::GRAPH_V1_URL;

/// Main command-line interface structure
///
/// # Examples
///
/// ```
/// use clap::Parser;
/// use mbxgroups::cli::Cli;
///
/// let cli = Cli::try_parse_from(["mbxgroups", "--user", "ada@contoso.com", "--dry-run"]).unwrap();
/// assert!(cli.dry_run);
/// assert!(cli.command.is_none());
/// ```
#[derive(Parser)]
#[command(
    name = "mbxgroups",
    about = "Discover and manage the mailbox permission groups of a Microsoft 365 user",
    version
)]
pub struct Cli {
    /// Command to execute; the interactive console when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// User principal name whose groups are discovered and managed
    #[arg(short, long)]
    pub user: String,

    /// Report membership changes without applying them
    #[arg(long)]
    pub dry_run: bool,

    /// Display-name prefix of manageable groups
    #[arg(long, default_value = "MBX-")]
    pub group_prefix: String,

    /// Name segment marking an Owners group
    #[arg(long, default_value = "Owners")]
    pub owners_segment: String,

    /// Segments substituted for the Owners segment to find sibling groups
    #[arg(long, value_delimiter = ',', default_value = "SendAs,SendOnBehalf")]
    pub sibling_segments: Vec<String>,

    /// Maximum number of candidates returned by a user search
    #[arg(long, default_value = "20")]
    pub search_limit: usize,

    /// Request timeout in milliseconds for Graph operations
    #[arg(short = 't', long, default_value = "30000")]
    pub timeout_ms: u64,

    /// Answer from a JSON directory snapshot instead of Microsoft Graph
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Microsoft Graph endpoint
    #[arg(long, default_value = GRAPH_V1_URL)]
    pub graph_url: String,

    /// Directory (tenant) id or domain of the app registration
    #[arg(long, env = "MBX_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Application (client) id of the app registration
    #[arg(long, env = "MBX_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Client secret of the app registration
    #[arg(long, env = "MBX_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Pre-acquired Graph access token
    #[arg(long, env = "MBX_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
}

/// Available subcommands
///
/// ```text
/// mbxgroups --user ada@contoso.com                       # interactive console
/// mbxgroups --user ada@contoso.com discover              # groups as JSON
/// mbxgroups --user ada@contoso.com members --group MBX-Finance-Owners
/// ```
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Open the interactive membership console (default)
    Manage,
    /// Run group discovery once and print the groups as JSON
    Discover,
    /// Print the members of one group as JSON
    Members {
        /// Exact display name of the group
        #[arg(short, long)]
        group: String,
    },
}

impl Cli {
    /// The command to run, defaulting to the console
    pub fn selected_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Manage)
    }
}
