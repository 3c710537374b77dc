//! Discovery of the groups a user can manage
//!
//! Two strategies implement the same contract behind [`GroupDiscovery`]:
//!
//! - [`ReverseMembershipDiscovery`] asks the directory which groups contain
//!   the user, then looks up the siblings of every Owners group by name.
//! - [`MembershipScanDiscovery`] lists every group with the naming prefix and
//!   checks each membership list for the user, resolving siblings from the
//!   candidates it already fetched.
//!
//! [`FallbackDiscovery`] composes them: the primary strategy runs first and
//! the scan only runs when the primary reports an error. Every strategy
//! returns a list free of duplicate group identifiers.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::directory::{Directory, DirectoryError, Group, NameFilter};
use crate::naming::{NamingRules, SiblingDerivation};

/// Finds the manageable groups a principal belongs to
#[async_trait]
pub trait GroupDiscovery: Send + Sync {
    async fn discover(&self, principal: &str) -> Result<Vec<Group>, DirectoryError>;
}

/// Removes repeated group identifiers, keeping the first occurrence
pub fn dedup_groups(groups: Vec<Group>) -> Vec<Group> {
    let mut seen = HashSet::new();
    groups
        .into_iter()
        .filter(|group| seen.insert(group.id.clone()))
        .collect()
}

/// Sibling names of every Owners group in `groups`
fn sibling_names(rules: &NamingRules, groups: &[Group]) -> Vec<String> {
    groups
        .iter()
        .filter_map(|group| match rules.derive_siblings(&group.display_name) {
            SiblingDerivation::Siblings(names) => {
                debug!("Derived {} sibling names from {}", names.len(), group.display_name);
                Some(names)
            }
            SiblingDerivation::NotOwners | SiblingDerivation::Ambiguous => None,
        })
        .flatten()
        .collect()
}

/// Primary strategy based on the directory's reverse-membership query
pub struct ReverseMembershipDiscovery {
    directory: Arc<dyn Directory>,
    rules: NamingRules,
}

impl ReverseMembershipDiscovery {
    pub fn new(directory: Arc<dyn Directory>, rules: NamingRules) -> Self {
        Self { directory, rules }
    }
}

#[async_trait]
impl GroupDiscovery for ReverseMembershipDiscovery {
    async fn discover(&self, principal: &str) -> Result<Vec<Group>, DirectoryError> {
        let user = self.directory.resolve_user(principal).await?;
        debug!("Resolved {} to directory id {}", principal, user.id);

        let mut groups: Vec<Group> = self
            .directory
            .groups_with_member(&user)
            .await?
            .into_iter()
            .filter(|group| self.rules.is_manageable(group))
            .collect();
        debug!("{} direct groups match prefix {:?}", groups.len(), self.rules.prefix);

        for name in sibling_names(&self.rules, &groups) {
            let found = self.directory.find_groups(&NameFilter::Exact(name.clone())).await?;
            match found.into_iter().find(|group| self.rules.is_manageable(group)) {
                Some(sibling) => groups.push(sibling),
                None => debug!("No manageable group named {}", name),
            }
        }

        Ok(dedup_groups(groups))
    }
}

/// Alternate strategy that scans the membership of every prefixed group
pub struct MembershipScanDiscovery {
    directory: Arc<dyn Directory>,
    rules: NamingRules,
}

impl MembershipScanDiscovery {
    pub fn new(directory: Arc<dyn Directory>, rules: NamingRules) -> Self {
        Self { directory, rules }
    }
}

#[async_trait]
impl GroupDiscovery for MembershipScanDiscovery {
    async fn discover(&self, principal: &str) -> Result<Vec<Group>, DirectoryError> {
        let candidates = dedup_groups(
            self.directory
                .find_groups(&self.rules.prefix_filter())
                .await?
                .into_iter()
                .filter(|group| self.rules.is_manageable(group))
                .collect(),
        );
        info!("Scanning membership of {} candidate groups", candidates.len());

        let mut groups = Vec::new();
        for candidate in &candidates {
            match self.directory.list_members(candidate).await {
                Ok(members) => {
                    if members.iter().any(|member| member.matches_identity(principal)) {
                        groups.push(candidate.clone());
                    }
                }
                Err(e) => warn!("Skipping {}: failed to list members: {}", candidate, e),
            }
        }

        for name in sibling_names(&self.rules, &groups) {
            match candidates
                .iter()
                .find(|group| group.display_name.eq_ignore_ascii_case(&name))
            {
                Some(sibling) => groups.push(sibling.clone()),
                None => debug!("No candidate group named {}", name),
            }
        }

        Ok(dedup_groups(groups))
    }
}

/// Runs `primary`, falling back to `fallback` when it fails
///
/// The primary error is logged and never returned; a fallback error is.
pub struct FallbackDiscovery<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> FallbackDiscovery<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl FallbackDiscovery<ReverseMembershipDiscovery, MembershipScanDiscovery> {
    /// Reverse-membership lookup with a membership scan as fallback
    pub fn standard(directory: Arc<dyn Directory>, rules: NamingRules) -> Self {
        Self::new(
            ReverseMembershipDiscovery::new(directory.clone(), rules.clone()),
            MembershipScanDiscovery::new(directory, rules),
        )
    }
}

#[async_trait]
impl<P, F> GroupDiscovery for FallbackDiscovery<P, F>
where
    P: GroupDiscovery,
    F: GroupDiscovery,
{
    async fn discover(&self, principal: &str) -> Result<Vec<Group>, DirectoryError> {
        match self.primary.discover(principal).await {
            Ok(groups) => Ok(groups),
            Err(e) => {
                warn!("Direct group lookup failed, scanning group membership instead: {}", e);
                self.fallback.discover(principal).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::GroupKind;

    fn group(id: &str, name: &str) -> Group {
        Group {
            id: id.to_string(),
            display_name: name.to_string(),
            mail: None,
            kind: GroupKind::MailEnabledSecurity,
        }
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let groups = vec![
            group("1", "MBX-A-Owners"),
            group("2", "MBX-A-SendAs"),
            group("1", "MBX-A-Owners (renamed)"),
            group("3", "MBX-B"),
            group("2", "MBX-A-SendAs"),
        ];

        let deduped = dedup_groups(groups);
        let ids: Vec<&str> = deduped.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(deduped[0].display_name, "MBX-A-Owners");
    }

    #[test]
    fn test_sibling_names_skip_plain_groups() {
        let rules = NamingRules::default();
        let names = sibling_names(
            &rules,
            &[group("1", "MBX-A-Owners"), group("2", "MBX-B-SendAs")],
        );
        assert_eq!(names, vec!["MBX-A-SendAs", "MBX-A-SendOnBehalf"]);
    }
}
