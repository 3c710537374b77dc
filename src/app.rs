//! Application wiring
//!
//! Turns parsed command-line options into a connected directory, a discovery
//! strategy and the selected command. Connection and authentication failures
//! are returned from [`connect`] and end the program before any discovery.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use secrecy::SecretString;
use tracing::info;

use crate::auth::Credentials;
use crate::cli::{Cli, Commands};
use crate::console::{Session, SessionSettings};
use crate::directory::{Directory, NameFilter};
use crate::discovery::{FallbackDiscovery, GroupDiscovery};
use crate::graph::GraphDirectory;
use crate::http::HttpClient;
use crate::naming::NamingRules;
use crate::sanitize::{sanitize_error, sanitize_group, sanitize_recipient};
use crate::snapshot::SnapshotDirectory;

/// Graph credentials from the command line or environment
///
/// An access token wins over app-registration settings.
pub fn credentials_from(cli: &Cli) -> Result<Credentials> {
    if let Some(token) = &cli.access_token {
        return Ok(Credentials::AccessToken(SecretString::new(token.clone())));
    }

    match (&cli.tenant_id, &cli.client_id, &cli.client_secret) {
        (Some(tenant_id), Some(client_id), Some(client_secret)) => Ok(Credentials::ClientSecret {
            tenant_id: tenant_id.clone(),
            client_id: client_id.clone(),
            client_secret: SecretString::new(client_secret.clone()),
        }),
        _ => bail!(
            "No Graph credentials: pass --access-token, or --tenant-id, --client-id and --client-secret \
             (or set MBX_ACCESS_TOKEN / MBX_TENANT_ID, MBX_CLIENT_ID, MBX_CLIENT_SECRET)"
        ),
    }
}

/// Naming convention from the command line
pub fn naming_rules_from(cli: &Cli) -> NamingRules {
    NamingRules::new(&cli.group_prefix, &cli.owners_segment, &cli.sibling_segments)
}

/// Opens the directory session selected on the command line
pub async fn connect(cli: &Cli) -> Result<Arc<dyn Directory>> {
    if let Some(path) = &cli.snapshot {
        let directory = SnapshotDirectory::load(path)
            .await
            .with_context(|| format!("Failed to open snapshot {}", path.display()))?;
        info!("Using directory snapshot {}", path.display());
        return Ok(Arc::new(directory));
    }

    let credentials = credentials_from(cli)?;
    let http = HttpClient::new(
        &cli.graph_url,
        Duration::from_millis(cli.timeout_ms),
        credentials,
    )?;

    let directory = GraphDirectory::connect(http).await.map_err(|e| {
        anyhow!(
            "Failed to connect to Microsoft Graph: {}",
            sanitize_error(&e.to_string())
        )
    })?;
    Ok(Arc::new(directory))
}

/// Runs the selected command against an open directory
///
/// `input` feeds the interactive console; results and prompts go to `output`.
pub async fn run_command<R: BufRead, W: Write>(
    cli: &Cli,
    directory: Arc<dyn Directory>,
    input: R,
    mut output: W,
) -> Result<()> {
    let discovery: Arc<dyn GroupDiscovery> = Arc::new(FallbackDiscovery::standard(
        directory.clone(),
        naming_rules_from(cli),
    ));

    match cli.selected_command() {
        Commands::Manage => {
            let settings = SessionSettings {
                principal: cli.user.clone(),
                dry_run: cli.dry_run,
                search_limit: cli.search_limit,
            };
            let mut session = Session::new(directory, discovery, settings, input, output);
            session.run().await
        }
        Commands::Discover => {
            let groups = discovery
                .discover(&cli.user)
                .await
                .map_err(|e| anyhow!("Group discovery failed: {}", sanitize_error(&e.to_string())))?;
            let groups: Vec<_> = groups.iter().map(sanitize_group).collect();
            writeln!(output, "{}", serde_json::to_string_pretty(&groups)?)?;
            Ok(())
        }
        Commands::Members { group } => {
            let found = directory
                .find_groups(&NameFilter::Exact(group.clone()))
                .await
                .map_err(|e| anyhow!("Group lookup failed: {}", sanitize_error(&e.to_string())))?;
            let target = match found.into_iter().next() {
                Some(target) => target,
                None => bail!("No group named {}", group),
            };

            let members = directory.list_members(&target).await.map_err(|e| {
                anyhow!(
                    "Could not list members of {}: {}",
                    target.display_name,
                    sanitize_error(&e.to_string())
                )
            })?;
            let members: Vec<_> = members.iter().map(sanitize_recipient).collect();
            writeln!(output, "{}", serde_json::to_string_pretty(&members)?)?;
            Ok(())
        }
    }
}
