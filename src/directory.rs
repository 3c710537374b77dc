//! Directory boundary for mailbox group management
//!
//! This module defines the operations the tool consumes from the mail
//! directory (Microsoft Graph in production, a JSON snapshot offline) and the
//! value types that cross that boundary:
//!
//! - `Group` and `GroupKind` for directory groups
//! - `Recipient` for users and other mail recipients
//! - `NameFilter` for prefix and exact-name group queries
//! - `DirectoryError` for every failure a backend can report
//!
//! Every operation is a single blocking round trip from the caller's point of
//! view: it returns either the full result or an error. Backends never retry
//! failed operations on behalf of the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a directory group by its mail and security flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Mail-enabled security group (usable for permissions and as a list)
    MailEnabledSecurity,
    /// Plain distribution list
    Distribution,
    /// Security group without a mailbox address
    Security,
    /// Microsoft 365 (unified) group
    Microsoft365,
}

impl GroupKind {
    /// Derives the kind from the flags Graph reports on a group object
    pub fn from_flags(mail_enabled: bool, security_enabled: bool, unified: bool) -> Self {
        match (unified, mail_enabled, security_enabled) {
            (true, _, _) => GroupKind::Microsoft365,
            (false, true, true) => GroupKind::MailEnabledSecurity,
            (false, true, false) => GroupKind::Distribution,
            (false, false, _) => GroupKind::Security,
        }
    }
}

/// A directory group as read from the backend
///
/// Groups are never created or destroyed by this tool. Membership is read
/// on demand with [`Directory::list_members`].
///
/// # Examples
///
/// ```
/// use mbxgroups::directory::{Group, GroupKind};
///
/// let group = Group {
///     id: "3f2a".to_string(),
///     display_name: "MBX-Finance-Owners".to_string(),
///     mail: Some("mbx-finance-owners@contoso.com".to_string()),
///     kind: GroupKind::MailEnabledSecurity,
/// };
/// assert_eq!(group.to_string(), "MBX-Finance-Owners");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique directory key
    pub id: String,
    /// Display name, the subject of naming-convention matching
    pub display_name: String,
    /// Primary SMTP address, if the group is mail-enabled
    #[serde(default)]
    pub mail: Option<String>,
    /// Mail/security classification
    pub kind: GroupKind,
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// A mail recipient (user, contact or nested group member)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Unique directory key
    pub id: String,
    pub display_name: String,
    /// Primary SMTP address
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

impl Recipient {
    /// Returns true when `identity` names this recipient by address or UPN
    ///
    /// Directory addresses are case-insensitive, so the comparison is too.
    pub fn matches_identity(&self, identity: &str) -> bool {
        let identity = identity.trim();
        self.address
            .iter()
            .chain(self.user_principal_name.iter())
            .any(|value| value.eq_ignore_ascii_case(identity))
    }

    /// Best address to show the operator and to hand to mutating calls
    pub fn preferred_address(&self) -> &str {
        self.address
            .as_deref()
            .or(self.user_principal_name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Name-based group query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameFilter {
    /// Display name starts with the given prefix
    Prefix(String),
    /// Display name equals the given value
    Exact(String),
}

impl NameFilter {
    /// Case-insensitive evaluation of the filter against a display name
    pub fn matches(&self, display_name: &str) -> bool {
        match self {
            NameFilter::Prefix(prefix) => display_name
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
            NameFilter::Exact(name) => display_name.eq_ignore_ascii_case(name),
        }
    }
}

/// Errors reported by a directory backend
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Directory request failed with status {status}: {message}")]
    Request { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// Operations consumed from the mail directory
///
/// Implementations hold an already-established session; `close` releases it.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolves a user principal name or address to a directory recipient
    async fn resolve_user(&self, principal: &str) -> Result<Recipient, DirectoryError>;

    /// Groups that directly contain `member` (reverse-membership lookup)
    async fn groups_with_member(&self, member: &Recipient) -> Result<Vec<Group>, DirectoryError>;

    /// Groups whose display name matches `filter`
    async fn find_groups(&self, filter: &NameFilter) -> Result<Vec<Group>, DirectoryError>;

    /// Current membership of `group`, in directory order
    async fn list_members(&self, group: &Group) -> Result<Vec<Recipient>, DirectoryError>;

    /// Adds `member` to `group`
    ///
    /// `member` is an SMTP address, a user principal name or a directory id.
    async fn add_member(&self, group: &Group, member: &str) -> Result<(), DirectoryError>;

    /// Removes `member` (address, UPN or directory id) from `group`
    async fn remove_member(&self, group: &Group, member: &str) -> Result<(), DirectoryError>;

    /// Substring search on recipient name or address, returning at most `limit` entries
    async fn search_recipients(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Recipient>, DirectoryError>;

    /// Releases the session held by this backend
    async fn close(&self) -> Result<(), DirectoryError> {
        Ok(())
    }
}
