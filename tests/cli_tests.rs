use anyhow::Result;
use clap::Parser;
use mbxgroups::app::{credentials_from, naming_rules_from};
use mbxgroups::auth::Credentials;
use mbxgroups::cli::{Cli, Commands};
use std::path::PathBuf;

#[test]
fn test_cli_defaults() -> Result<()> {
    let cli = Cli::try_parse_from(["mbxgroups", "--user", "ada@contoso.com"])?;

    assert_eq!(cli.user, "ada@contoso.com");
    assert!(cli.command.is_none());
    assert_eq!(cli.selected_command(), Commands::Manage);

    // Default values
    assert!(!cli.dry_run);
    assert_eq!(cli.group_prefix, "MBX-");
    assert_eq!(cli.owners_segment, "Owners");
    assert_eq!(cli.sibling_segments, vec!["SendAs", "SendOnBehalf"]);
    assert_eq!(cli.search_limit, 20);
    assert_eq!(cli.timeout_ms, 30000);
    assert_eq!(cli.graph_url, "https://graph.microsoft.com/v1.0");
    assert!(cli.snapshot.is_none());

    Ok(())
}

#[test]
fn test_cli_discover_command() -> Result<()> {
    let cli = Cli::try_parse_from(["mbxgroups", "-u", "ada@contoso.com", "discover"])?;
    assert_eq!(cli.selected_command(), Commands::Discover);
    Ok(())
}

#[test]
fn test_cli_members_command() -> Result<()> {
    let cli = Cli::try_parse_from([
        "mbxgroups",
        "--user",
        "ada@contoso.com",
        "members",
        "--group",
        "MBX-Finance-Owners",
    ])?;

    match cli.selected_command() {
        Commands::Members { group } => assert_eq!(group, "MBX-Finance-Owners"),
        other => panic!("Expected Members command, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_cli_with_naming_options() -> Result<()> {
    let cli = Cli::try_parse_from([
        "mbxgroups",
        "--user",
        "ada@contoso.com",
        "--dry-run",
        "--group-prefix",
        "PERM_",
        "--owners-segment",
        "Full",
        "--sibling-segments",
        "Send,Calendar",
        "--snapshot",
        "tenant.json",
        "manage",
    ])?;

    assert!(cli.dry_run);
    assert_eq!(cli.group_prefix, "PERM_");
    assert_eq!(cli.sibling_segments, vec!["Send", "Calendar"]);
    assert_eq!(cli.snapshot, Some(PathBuf::from("tenant.json")));
    assert_eq!(cli.selected_command(), Commands::Manage);

    let rules = naming_rules_from(&cli);
    assert_eq!(rules.prefix, "PERM_");
    assert_eq!(rules.owners_segment, "Full");

    Ok(())
}

#[test]
fn test_cli_requires_user() {
    assert!(Cli::try_parse_from(["mbxgroups"]).is_err());
    assert!(Cli::try_parse_from(["mbxgroups", "discover"]).is_err());
}

#[test]
fn test_cli_rejects_bad_values() {
    assert!(Cli::try_parse_from(["mbxgroups", "-u", "a@b.com", "--search-limit", "many"]).is_err());
    assert!(Cli::try_parse_from(["mbxgroups", "-u", "a@b.com", "members"]).is_err());
    assert!(Cli::try_parse_from(["mbxgroups", "-u", "a@b.com", "bogus"]).is_err());
}

#[test]
fn test_credentials_prefer_access_token() -> Result<()> {
    let cli = Cli::try_parse_from([
        "mbxgroups",
        "--user",
        "ada@contoso.com",
        "--access-token",
        "token-value",
        "--tenant-id",
        "contoso.onmicrosoft.com",
    ])?;

    match credentials_from(&cli)? {
        Credentials::AccessToken(_) => {}
        other => panic!("Expected an access token, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_credentials_from_app_registration() -> Result<()> {
    let cli = Cli::try_parse_from([
        "mbxgroups",
        "--user",
        "ada@contoso.com",
        "--tenant-id",
        "contoso.onmicrosoft.com",
        "--client-id",
        "11111111-2222-3333-4444-555555555555",
        "--client-secret",
        "hunter2",
    ])?;

    match credentials_from(&cli)? {
        Credentials::ClientSecret {
            tenant_id,
            client_id,
            ..
        } => {
            assert_eq!(tenant_id, "contoso.onmicrosoft.com");
            assert_eq!(client_id, "11111111-2222-3333-4444-555555555555");
        }
        other => panic!("Expected client credentials, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_credentials_incomplete_registration() -> Result<()> {
    let cli = Cli::try_parse_from([
        "mbxgroups",
        "--user",
        "ada@contoso.com",
        "--tenant-id",
        "contoso.onmicrosoft.com",
    ])?;

    let error = match credentials_from(&cli) {
        Ok(_) => panic!("Expected missing credentials to fail"),
        Err(e) => e.to_string(),
    };
    assert!(error.contains("--client-secret"));

    Ok(())
}
