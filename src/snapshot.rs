//! Offline directory backed by a JSON snapshot
//!
//! The snapshot backend answers every [`Directory`] operation from memory. It
//! is used to rehearse a session without touching the tenant (`--snapshot`)
//! and as the deterministic directory in tests. Membership changes are kept in
//! memory only and every mutating call is recorded in a log.
//!
//! A snapshot can also declare failures, so the fallback paths can be
//! exercised without a misbehaving service:
//!
//! ```json
//! {
//!   "users": [
//!     { "id": "u1", "display_name": "Ada Lovelace", "address": "ada@contoso.com" }
//!   ],
//!   "groups": [
//!     {
//!       "id": "g1",
//!       "display_name": "MBX-Finance-Owners",
//!       "kind": "mail_enabled_security",
//!       "members": ["u1"]
//!     }
//!   ],
//!   "failures": { "reverse_membership": true, "list_members": ["g7"] }
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::directory::{Directory, DirectoryError, Group, GroupKind, NameFilter, Recipient};

/// Group entry of a snapshot file
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotGroup {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub mail: Option<String>,
    pub kind: GroupKind,
    /// Recipient ids, in membership order
    #[serde(default)]
    pub members: Vec<String>,
}

impl SnapshotGroup {
    fn to_group(&self) -> Group {
        Group {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            mail: self.mail.clone(),
            kind: self.kind,
        }
    }
}

/// Failures the snapshot directory reports instead of answering
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotFailures {
    /// Fail every reverse-membership lookup
    #[serde(default)]
    pub reverse_membership: bool,
    /// Fail prefix listings of groups
    #[serde(default)]
    pub group_listing: bool,
    /// Group ids whose member listing fails
    #[serde(default)]
    pub list_members: HashSet<String>,
    /// Group ids whose membership changes fail
    #[serde(default)]
    pub mutations: HashSet<String>,
}

/// Serialized form of a snapshot file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<Recipient>,
    #[serde(default)]
    pub groups: Vec<SnapshotGroup>,
    #[serde(default)]
    pub failures: SnapshotFailures,
}

/// A membership change applied to the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Add { group_id: String, address: String },
    Remove { group_id: String, address: String },
}

struct SnapshotState {
    groups: Vec<SnapshotGroup>,
    mutations: Vec<Mutation>,
}

/// In-memory [`Directory`] built from a [`Snapshot`]
pub struct SnapshotDirectory {
    users: Vec<Recipient>,
    failures: SnapshotFailures,
    state: Mutex<SnapshotState>,
}

impl SnapshotDirectory {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            users: snapshot.users,
            failures: snapshot.failures,
            state: Mutex::new(SnapshotState {
                groups: snapshot.groups,
                mutations: Vec::new(),
            }),
        }
    }

    /// Loads a snapshot from a JSON file
    pub async fn load(path: &Path) -> Result<Self, DirectoryError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            DirectoryError::Snapshot(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, DirectoryError> {
        let snapshot: Snapshot = serde_json::from_str(content)
            .map_err(|e| DirectoryError::Snapshot(format!("invalid snapshot: {}", e)))?;
        debug!(
            "Loaded snapshot with {} users and {} groups",
            snapshot.users.len(),
            snapshot.groups.len()
        );
        Ok(Self::new(snapshot))
    }

    /// Every membership change applied so far, in order
    pub async fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().await.mutations.clone()
    }

    fn user_by_identity(&self, identity: &str) -> Option<&Recipient> {
        self.users
            .iter()
            .find(|user| user.id == identity || user.matches_identity(identity))
    }

    fn check_mutation(&self, group: &Group) -> Result<(), DirectoryError> {
        if self.failures.mutations.contains(&group.id) {
            return Err(DirectoryError::Request {
                status: 403,
                message: format!("insufficient privileges to modify {}", group.display_name),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for SnapshotDirectory {
    async fn resolve_user(&self, principal: &str) -> Result<Recipient, DirectoryError> {
        self.user_by_identity(principal)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("user {}", principal)))
    }

    async fn groups_with_member(&self, member: &Recipient) -> Result<Vec<Group>, DirectoryError> {
        if self.failures.reverse_membership {
            return Err(DirectoryError::Connection(
                "reverse membership lookup unavailable".to_string(),
            ));
        }

        let state = self.state.lock().await;
        Ok(state
            .groups
            .iter()
            .filter(|group| group.members.contains(&member.id))
            .map(SnapshotGroup::to_group)
            .collect())
    }

    async fn find_groups(&self, filter: &NameFilter) -> Result<Vec<Group>, DirectoryError> {
        if self.failures.group_listing && matches!(filter, NameFilter::Prefix(_)) {
            return Err(DirectoryError::Connection("group listing unavailable".to_string()));
        }

        let state = self.state.lock().await;
        Ok(state
            .groups
            .iter()
            .filter(|group| filter.matches(&group.display_name))
            .map(SnapshotGroup::to_group)
            .collect())
    }

    async fn list_members(&self, group: &Group) -> Result<Vec<Recipient>, DirectoryError> {
        if self.failures.list_members.contains(&group.id) {
            return Err(DirectoryError::Request {
                status: 500,
                message: format!("member listing failed for {}", group.display_name),
            });
        }

        let state = self.state.lock().await;
        let entry = state
            .groups
            .iter()
            .find(|entry| entry.id == group.id)
            .ok_or_else(|| DirectoryError::NotFound(format!("group {}", group.display_name)))?;

        Ok(entry
            .members
            .iter()
            .map(|id| {
                self.users.iter().find(|user| &user.id == id).cloned().unwrap_or_else(|| {
                    Recipient {
                        id: id.clone(),
                        display_name: id.clone(),
                        address: None,
                        user_principal_name: None,
                    }
                })
            })
            .collect())
    }

    async fn add_member(&self, group: &Group, member: &str) -> Result<(), DirectoryError> {
        self.check_mutation(group)?;
        let user = self
            .user_by_identity(member)
            .ok_or_else(|| DirectoryError::NotFound(format!("recipient {}", member)))?;
        let address = user.preferred_address();

        let mut state = self.state.lock().await;
        let entry = state
            .groups
            .iter_mut()
            .find(|entry| entry.id == group.id)
            .ok_or_else(|| DirectoryError::NotFound(format!("group {}", group.display_name)))?;

        if entry.members.contains(&user.id) {
            return Err(DirectoryError::Request {
                status: 400,
                message: format!("{} is already a member of {}", address, group.display_name),
            });
        }
        entry.members.push(user.id.clone());
        state.mutations.push(Mutation::Add {
            group_id: group.id.clone(),
            address: address.to_string(),
        });
        Ok(())
    }

    async fn remove_member(&self, group: &Group, member: &str) -> Result<(), DirectoryError> {
        self.check_mutation(group)?;
        let user = self
            .user_by_identity(member)
            .ok_or_else(|| DirectoryError::NotFound(format!("recipient {}", member)))?;
        let address = user.preferred_address();

        let mut state = self.state.lock().await;
        let entry = state
            .groups
            .iter_mut()
            .find(|entry| entry.id == group.id)
            .ok_or_else(|| DirectoryError::NotFound(format!("group {}", group.display_name)))?;

        let before = entry.members.len();
        entry.members.retain(|id| id != &user.id);
        if entry.members.len() == before {
            return Err(DirectoryError::NotFound(format!(
                "{} is not a member of {}",
                address, group.display_name
            )));
        }
        state.mutations.push(Mutation::Remove {
            group_id: group.id.clone(),
            address: address.to_string(),
        });
        Ok(())
    }

    async fn search_recipients(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Recipient>, DirectoryError> {
        let needle = term.trim().to_lowercase();
        Ok(self
            .users
            .iter()
            .filter(|user| {
                user.display_name.to_lowercase().contains(&needle)
                    || user
                        .address
                        .as_ref()
                        .is_some_and(|address| address.to_lowercase().contains(&needle))
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
