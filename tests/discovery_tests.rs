use std::collections::HashSet;
use std::sync::Arc;

use mbxgroups::directory::{Directory, DirectoryError, Group};
use mbxgroups::discovery::{
    dedup_groups, FallbackDiscovery, GroupDiscovery, MembershipScanDiscovery,
    ReverseMembershipDiscovery,
};
use mbxgroups::naming::NamingRules;
use mbxgroups::snapshot::SnapshotDirectory;
use serde_json::{json, Value};

const ADA: &str = "ada@contoso.com";

/// Tenant with ten prefixed mail-enabled security groups.
///
/// Ada belongs to MBX-Finance-Owners and MBX-HR-SendAs. The Finance Owners
/// group has both siblings among the candidates. Ada is also a member of a
/// distribution group and an unprefixed security group, neither manageable.
fn tenant(failures: Value) -> Value {
    let mut groups = vec![
        json!({ "id": "g0", "display_name": "MBX-Finance-Owners", "kind": "mail_enabled_security", "members": ["u1", "u2"] }),
        json!({ "id": "g1", "display_name": "MBX-Finance-SendAs", "kind": "mail_enabled_security", "members": ["u2"] }),
        json!({ "id": "g2", "display_name": "MBX-Finance-SendOnBehalf", "kind": "mail_enabled_security", "members": [] }),
        json!({ "id": "g3", "display_name": "MBX-HR-SendAs", "kind": "mail_enabled_security", "members": ["u1"] }),
    ];
    for i in 4..10 {
        groups.push(json!({
            "id": format!("g{}", i),
            "display_name": format!("MBX-Team{}-Owners", i),
            "kind": "mail_enabled_security",
            "members": ["u2"]
        }));
    }
    groups.push(json!({ "id": "d1", "display_name": "MBX-Newsletter", "kind": "distribution", "members": ["u1"] }));
    groups.push(json!({ "id": "s1", "display_name": "Finance-Owners", "kind": "mail_enabled_security", "members": ["u1"] }));

    json!({
        "users": [
            { "id": "u1", "display_name": "Ada Lovelace", "address": ADA },
            { "id": "u2", "display_name": "Alan Turing", "address": "alan@contoso.com" }
        ],
        "groups": groups,
        "failures": failures
    })
}

fn directory(failures: Value) -> Arc<dyn Directory> {
    let snapshot = tenant(failures).to_string();
    Arc::new(SnapshotDirectory::from_json(&snapshot).unwrap())
}

fn ids(groups: &[Group]) -> Vec<String> {
    groups.iter().map(|group| group.id.clone()).collect()
}

fn id_set(groups: &[Group]) -> HashSet<String> {
    groups.iter().map(|group| group.id.clone()).collect()
}

#[tokio::test]
async fn test_reverse_membership_discovery() {
    let discovery = ReverseMembershipDiscovery::new(directory(json!({})), NamingRules::default());
    let groups = discovery.discover(ADA).await.unwrap();

    assert_eq!(ids(&groups), vec!["g0", "g3", "g1", "g2"]);
}

#[tokio::test]
async fn test_reverse_membership_unknown_user() {
    let discovery = ReverseMembershipDiscovery::new(directory(json!({})), NamingRules::default());
    match discovery.discover("nobody@contoso.com").await {
        Err(DirectoryError::NotFound(_)) => {}
        other => panic!("Expected NotFound, got {:?}", other.map(|g| ids(&g))),
    }
}

#[tokio::test]
async fn test_fallback_after_reverse_lookup_failure() {
    let discovery = FallbackDiscovery::standard(
        directory(json!({ "reverse_membership": true })),
        NamingRules::default(),
    );
    let groups = discovery.discover(ADA).await.unwrap();

    // Two direct memberships plus the two Finance siblings
    assert_eq!(groups.len(), 4);
    assert_eq!(id_set(&groups).len(), 4);
    assert_eq!(
        id_set(&groups),
        ["g0", "g1", "g2", "g3"].iter().map(|s| s.to_string()).collect()
    );
}

#[tokio::test]
async fn test_scan_agrees_with_reverse_lookup() {
    let directory = directory(json!({}));
    let rules = NamingRules::default();

    let primary = ReverseMembershipDiscovery::new(directory.clone(), rules.clone())
        .discover(ADA)
        .await
        .unwrap();
    let scanned = MembershipScanDiscovery::new(directory, rules)
        .discover(ADA)
        .await
        .unwrap();

    assert_eq!(id_set(&primary), id_set(&scanned));
}

#[tokio::test]
async fn test_scan_matches_principal_case_insensitively() {
    let discovery = MembershipScanDiscovery::new(directory(json!({})), NamingRules::default());
    let groups = discovery.discover("ADA@Contoso.com").await.unwrap();
    assert_eq!(groups.len(), 4);
}

#[tokio::test]
async fn test_scan_skips_groups_that_fail_to_list() {
    let discovery = FallbackDiscovery::standard(
        directory(json!({ "reverse_membership": true, "list_members": ["g3"] })),
        NamingRules::default(),
    );
    let groups = discovery.discover(ADA).await.unwrap();

    assert_eq!(id_set(&groups).len(), 3);
    assert!(!id_set(&groups).contains("g3"));
}

#[tokio::test]
async fn test_fallback_listing_failure_is_returned() {
    let discovery = FallbackDiscovery::standard(
        directory(json!({ "reverse_membership": true, "group_listing": true })),
        NamingRules::default(),
    );

    match discovery.discover(ADA).await {
        Err(DirectoryError::Connection(message)) => assert!(message.contains("listing")),
        other => panic!("Expected Connection error, got {:?}", other.map(|g| ids(&g))),
    }
}

#[tokio::test]
async fn test_fallback_not_used_when_primary_succeeds() {
    // Listing is broken, but the primary path never lists by prefix
    let discovery = FallbackDiscovery::standard(
        directory(json!({ "group_listing": true })),
        NamingRules::default(),
    );
    let groups = discovery.discover(ADA).await.unwrap();
    assert_eq!(groups.len(), 4);
}

#[tokio::test]
async fn test_custom_naming_rules() {
    let snapshot = json!({
        "users": [{ "id": "u1", "display_name": "Ada", "address": ADA }],
        "groups": [
            { "id": "a", "display_name": "perm_sales_full", "kind": "mail_enabled_security", "members": ["u1"] },
            { "id": "b", "display_name": "perm_sales_send", "kind": "mail_enabled_security" },
            { "id": "c", "display_name": "perm_sales_SendAs", "kind": "mail_enabled_security" }
        ]
    })
    .to_string();
    let directory: Arc<dyn Directory> = Arc::new(SnapshotDirectory::from_json(&snapshot).unwrap());
    let rules = NamingRules::new("PERM_", "Full", &["Send".to_string()]);

    let groups = ReverseMembershipDiscovery::new(directory, rules)
        .discover(ADA)
        .await
        .unwrap();
    assert_eq!(ids(&groups), vec!["a", "b"]);
}

#[tokio::test]
async fn test_ambiguous_owners_group_has_no_siblings() {
    let snapshot = json!({
        "users": [{ "id": "u1", "display_name": "Ada", "address": ADA }],
        "groups": [
            { "id": "a", "display_name": "MBX-Owners-Owners", "kind": "mail_enabled_security", "members": ["u1"] },
            { "id": "b", "display_name": "MBX-SendAs-Owners", "kind": "mail_enabled_security" },
            { "id": "c", "display_name": "MBX-Owners-SendAs", "kind": "mail_enabled_security" }
        ]
    })
    .to_string();
    let directory: Arc<dyn Directory> = Arc::new(SnapshotDirectory::from_json(&snapshot).unwrap());

    let groups = FallbackDiscovery::standard(directory, NamingRules::default())
        .discover(ADA)
        .await
        .unwrap();
    assert_eq!(ids(&groups), vec!["a"]);
}

#[test]
fn test_dedup_groups_property() {
    let directory_groups: Vec<Group> = (0..20)
        .map(|i| Group {
            id: format!("g{}", i % 7),
            display_name: format!("MBX-{}", i),
            mail: None,
            kind: mbxgroups::directory::GroupKind::MailEnabledSecurity,
        })
        .collect();

    let unique = dedup_groups(directory_groups);
    assert_eq!(unique.len(), 7);
    assert_eq!(id_set(&unique).len(), unique.len());
    // First occurrence wins
    assert_eq!(unique[3].display_name, "MBX-3");
}
