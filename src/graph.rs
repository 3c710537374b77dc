//! Microsoft Graph implementation of the directory boundary
//!
//! Operation mapping:
//!
//! | Operation            | Graph request |
//! |----------------------|---------------|
//! | `resolve_user`       | `GET /users/{principal}`, then `GET /users?$filter=mail eq '…' or …` for addresses that are not UPNs |
//! | `groups_with_member` | `GET /users/{id}/memberOf/microsoft.graph.group` |
//! | `find_groups`        | `GET /groups?$filter=startswith(displayName,'…')` or `displayName eq '…'` |
//! | `list_members`       | `GET /groups/{id}/members` |
//! | `add_member`         | `POST /groups/{id}/members/$ref` |
//! | `remove_member`      | `DELETE /groups/{id}/members/{userId}/$ref` |
//!
//! Members given as an object id are used as-is; addresses are resolved
//! through `resolve_user` first.
//! | `search_recipients`  | `GET /users?$search="displayName:…" OR "mail:…"` |

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::directory::{Directory, DirectoryError, Group, GroupKind, NameFilter, Recipient};
use crate::http::HttpClient;

const GROUP_SELECT: &str = "id,displayName,mail,mailEnabled,securityEnabled,groupTypes";
const RECIPIENT_SELECT: &str = "id,displayName,mail,userPrincipalName";

/// Group object as returned by Graph
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphGroup {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub mail_enabled: Option<bool>,
    #[serde(default)]
    pub security_enabled: Option<bool>,
    #[serde(default)]
    pub group_types: Vec<String>,
}

impl From<GraphGroup> for Group {
    fn from(group: GraphGroup) -> Self {
        let unified = group
            .group_types
            .iter()
            .any(|kind| kind.eq_ignore_ascii_case("Unified"));
        Group {
            kind: GroupKind::from_flags(
                group.mail_enabled.unwrap_or(false),
                group.security_enabled.unwrap_or(false),
                unified,
            ),
            display_name: group.display_name.unwrap_or_else(|| group.id.clone()),
            mail: group.mail,
            id: group.id,
        }
    }
}

/// User or other directory object with mail attributes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRecipient {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

impl From<GraphRecipient> for Recipient {
    fn from(recipient: GraphRecipient) -> Self {
        Recipient {
            display_name: recipient.display_name.unwrap_or_else(|| recipient.id.clone()),
            address: recipient.mail,
            user_principal_name: recipient.user_principal_name,
            id: recipient.id,
        }
    }
}

/// Quotes a value for use inside an OData string literal
pub fn odata_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// OData `$filter` expression for a name filter
pub fn odata_name_filter(filter: &NameFilter) -> String {
    match filter {
        NameFilter::Prefix(prefix) => format!("startswith(displayName,{})", odata_quote(prefix)),
        NameFilter::Exact(name) => format!("displayName eq {}", odata_quote(name)),
    }
}

/// OData `$filter` expression matching a user by any of its addresses
///
/// `proxyAddresses` needs an advanced query (`ConsistencyLevel: eventual`
/// with `$count=true`).
pub fn odata_address_filter(address: &str) -> String {
    let quoted = odata_quote(address);
    format!(
        "mail eq {q} or userPrincipalName eq {q} or proxyAddresses/any(p:p eq {smtp})",
        q = quoted,
        smtp = odata_quote(&format!("smtp:{}", address)),
    )
}

/// `$search` expression matching a term in display name or address
pub fn search_expression(term: &str) -> String {
    let term: String = term.chars().filter(|c| *c != '"' && *c != '\\').collect();
    format!("\"displayName:{}\" OR \"mail:{}\"", term.trim(), term.trim())
}

/// Directory backed by Microsoft Graph
pub struct GraphDirectory {
    http: HttpClient,
}

impl GraphDirectory {
    /// Establishes the session by acquiring an access token
    ///
    /// Authentication problems are reported here, before any discovery runs.
    pub async fn connect(http: HttpClient) -> Result<Self, DirectoryError> {
        http.authenticate().await?;
        info!("Connected to Microsoft Graph");
        Ok(Self { http })
    }

    /// Absolute URL from individually encoded path segments
    fn resource(&self, segments: &[&str]) -> Result<String, DirectoryError> {
        let mut url = Url::parse(&self.http.url(""))
            .map_err(|e| DirectoryError::Connection(format!("invalid Graph URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| DirectoryError::Connection("Graph URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.to_string())
    }

    /// Finds a user by primary SMTP address, UPN or proxy address
    async fn find_user_by_address(&self, address: &str) -> Result<Option<Recipient>, DirectoryError> {
        let users: Vec<GraphRecipient> = self
            .http
            .get_first_page(
                "users",
                &[
                    ("$filter", odata_address_filter(address)),
                    ("$select", RECIPIENT_SELECT.to_string()),
                    ("$count", "true".to_string()),
                    ("$top", "1".to_string()),
                ],
                &[("ConsistencyLevel", "eventual")],
            )
            .await?;
        Ok(users.into_iter().next().map(Recipient::from))
    }

    /// Object id of a member given as an address, a UPN or an object id
    async fn member_id(&self, member: &str) -> Result<String, DirectoryError> {
        let member = member.trim();
        if member.contains('@') {
            Ok(self.resolve_user(member).await?.id)
        } else {
            Ok(member.to_string())
        }
    }
}

#[async_trait]
impl Directory for GraphDirectory {
    async fn resolve_user(&self, principal: &str) -> Result<Recipient, DirectoryError> {
        let principal = principal.trim();
        let url = self.resource(&["users", principal])?;
        let direct: Result<GraphRecipient, DirectoryError> = self
            .http
            .get_json(&url, &[("$select", RECIPIENT_SELECT.to_string())], &[])
            .await;

        match direct {
            Ok(user) => Ok(user.into()),
            // `/users/{key}` only knows object ids and UPNs
            Err(DirectoryError::NotFound(message)) if principal.contains('@') => {
                debug!("{} is not a UPN, looking it up by address", principal);
                self.find_user_by_address(principal)
                    .await?
                    .ok_or(DirectoryError::NotFound(message))
            }
            Err(e) => Err(e),
        }
    }

    async fn groups_with_member(&self, member: &Recipient) -> Result<Vec<Group>, DirectoryError> {
        let url = self.resource(&["users", &member.id, "memberOf", "microsoft.graph.group"])?;
        let groups: Vec<GraphGroup> = self
            .http
            .get_collection(&url, &[("$select", GROUP_SELECT.to_string())], &[])
            .await?;
        debug!("{} is a direct member of {} groups", member.display_name, groups.len());
        Ok(groups.into_iter().map(Group::from).collect())
    }

    async fn find_groups(&self, filter: &NameFilter) -> Result<Vec<Group>, DirectoryError> {
        let groups: Vec<GraphGroup> = self
            .http
            .get_collection(
                "groups",
                &[
                    ("$filter", odata_name_filter(filter)),
                    ("$select", GROUP_SELECT.to_string()),
                ],
                &[],
            )
            .await?;

        // Local re-check of the filter
        Ok(groups
            .into_iter()
            .map(Group::from)
            .filter(|group| filter.matches(&group.display_name))
            .collect())
    }

    async fn list_members(&self, group: &Group) -> Result<Vec<Recipient>, DirectoryError> {
        let url = self.resource(&["groups", &group.id, "members"])?;
        let members: Vec<GraphRecipient> = self
            .http
            .get_collection(&url, &[("$select", RECIPIENT_SELECT.to_string())], &[])
            .await?;
        Ok(members.into_iter().map(Recipient::from).collect())
    }

    async fn add_member(&self, group: &Group, member: &str) -> Result<(), DirectoryError> {
        let member_id = self.member_id(member).await?;
        let object = self.resource(&["directoryObjects", &member_id])?;
        let url = self.resource(&["groups", &group.id, "members", "$ref"])?;

        self.http
            .post_json(&url, &json!({ "@odata.id": object }))
            .await
    }

    async fn remove_member(&self, group: &Group, member: &str) -> Result<(), DirectoryError> {
        let member_id = self.member_id(member).await?;
        let url = self.resource(&["groups", &group.id, "members", &member_id, "$ref"])?;
        self.http.delete(&url).await
    }

    async fn search_recipients(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Recipient>, DirectoryError> {
        let recipients: Vec<GraphRecipient> = self
            .http
            .get_first_page(
                "users",
                &[
                    ("$search", search_expression(term)),
                    ("$select", RECIPIENT_SELECT.to_string()),
                    ("$top", limit.max(1).to_string()),
                ],
                &[("ConsistencyLevel", "eventual")],
            )
            .await?;

        Ok(recipients
            .into_iter()
            .take(limit)
            .map(Recipient::from)
            .collect())
    }

    async fn close(&self) -> Result<(), DirectoryError> {
        self.http.sign_out().await;
        info!("Disconnected from Microsoft Graph");
        Ok(())
    }
}
