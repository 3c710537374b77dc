//! Group naming convention
//!
//! Manageable groups are mail-enabled security groups whose display name
//! starts with a fixed prefix. Within that set, a group whose name carries the
//! Owners segment (for example `MBX-Finance-Owners`) has sibling groups that
//! grant the other mailbox permissions for the same mailbox
//! (`MBX-Finance-SendAs`, `MBX-Finance-SendOnBehalf`).
//!
//! Sibling names are derived by replacing exactly one delimiter-bounded
//! segment. A segment is a run of characters between delimiters
//! (`-`, `_`, `.` or a space) or the ends of the name. A name in which the
//! Owners segment occurs more than once is ambiguous and yields no siblings.

use tracing::warn;

use crate::directory::{Group, GroupKind, NameFilter};

const SEGMENT_DELIMITERS: [char; 4] = ['-', '_', '.', ' '];

/// Outcome of matching a group name against the Owners segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiblingDerivation {
    /// The name has no Owners segment
    NotOwners,
    /// The Owners segment occurs more than once; nothing is derived
    Ambiguous,
    /// Sibling names, in the configured sibling order
    Siblings(Vec<String>),
}

/// Naming convention for manageable groups
///
/// # Examples
///
/// ```
/// use mbxgroups::naming::{NamingRules, SiblingDerivation};
///
/// let rules = NamingRules::default();
/// assert_eq!(
///     rules.derive_siblings("MBX-Finance-Owners"),
///     SiblingDerivation::Siblings(vec![
///         "MBX-Finance-SendAs".to_string(),
///         "MBX-Finance-SendOnBehalf".to_string(),
///     ])
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingRules {
    /// Display-name prefix every manageable group starts with
    pub prefix: String,
    /// Segment marking an Owners group
    pub owners_segment: String,
    /// Segments substituted for the Owners segment to name the siblings
    pub sibling_segments: Vec<String>,
}

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            prefix: "MBX-".to_string(),
            owners_segment: "Owners".to_string(),
            sibling_segments: vec!["SendAs".to_string(), "SendOnBehalf".to_string()],
        }
    }
}

impl NamingRules {
    pub fn new(prefix: &str, owners_segment: &str, sibling_segments: &[String]) -> Self {
        Self {
            prefix: prefix.to_string(),
            owners_segment: owners_segment.to_string(),
            sibling_segments: sibling_segments.to_vec(),
        }
    }

    /// Directory query listing every group with the configured prefix
    pub fn prefix_filter(&self) -> NameFilter {
        NameFilter::Prefix(self.prefix.clone())
    }

    /// True for mail-enabled security groups carrying the prefix
    pub fn is_manageable(&self, group: &Group) -> bool {
        group.kind == GroupKind::MailEnabledSecurity && self.prefix_filter().matches(&group.display_name)
    }

    /// Derives the sibling group names of an Owners group
    ///
    /// Only the matching segment is replaced; the rest of the name, including
    /// its delimiters and casing, is carried over unchanged.
    pub fn derive_siblings(&self, display_name: &str) -> SiblingDerivation {
        let matches = owners_segment_spans(display_name, &self.owners_segment);

        match matches.as_slice() {
            [] => SiblingDerivation::NotOwners,
            [(start, end)] => SiblingDerivation::Siblings(
                self.sibling_segments
                    .iter()
                    .map(|sibling| {
                        format!("{}{}{}", &display_name[..*start], sibling, &display_name[*end..])
                    })
                    .collect(),
            ),
            _ => {
                warn!(
                    "Group name {:?} contains the {:?} segment {} times; skipping sibling derivation",
                    display_name,
                    self.owners_segment,
                    matches.len()
                );
                SiblingDerivation::Ambiguous
            }
        }
    }
}

/// Byte spans of every delimiter-bounded segment equal to `segment`
fn owners_segment_spans(name: &str, segment: &str) -> Vec<(usize, usize)> {
    if segment.is_empty() {
        return Vec::new();
    }

    let mut spans = Vec::new();
    let mut start = 0;

    for (index, c) in name.char_indices().chain(std::iter::once((name.len(), '-'))) {
        if SEGMENT_DELIMITERS.contains(&c) {
            if name[start..index].eq_ignore_ascii_case(segment) {
                spans.push((start, index));
            }
            start = index + c.len_utf8();
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, kind: GroupKind) -> Group {
        Group {
            id: name.to_lowercase(),
            display_name: name.to_string(),
            mail: None,
            kind,
        }
    }

    #[test]
    fn test_derive_replaces_only_owners_segment() {
        let rules = NamingRules::default();

        assert_eq!(
            rules.derive_siblings("MBX-Owners_Shared-Owners-Team"),
            SiblingDerivation::Ambiguous
        );
        assert_eq!(
            rules.derive_siblings("MBX-CoOwnersDesk-Owners"),
            SiblingDerivation::Siblings(vec![
                "MBX-CoOwnersDesk-SendAs".to_string(),
                "MBX-CoOwnersDesk-SendOnBehalf".to_string(),
            ])
        );
        assert_eq!(
            rules.derive_siblings("MBX_Legal owners.EU"),
            SiblingDerivation::Siblings(vec![
                "MBX_Legal SendAs.EU".to_string(),
                "MBX_Legal SendOnBehalf.EU".to_string(),
            ])
        );
    }

    #[test]
    fn test_non_owners_names() {
        let rules = NamingRules::default();

        assert_eq!(rules.derive_siblings("MBX-Finance-SendAs"), SiblingDerivation::NotOwners);
        assert_eq!(rules.derive_siblings("MBX-FinanceOwners"), SiblingDerivation::NotOwners);
        assert_eq!(rules.derive_siblings(""), SiblingDerivation::NotOwners);
    }

    #[test]
    fn test_segment_spans() {
        assert_eq!(owners_segment_spans("A-Owners-B", "Owners"), vec![(2, 8)]);
        assert_eq!(owners_segment_spans("Owners", "Owners"), vec![(0, 6)]);
        assert!(owners_segment_spans("A--B", "").is_empty());
    }

    #[test]
    fn test_is_manageable() {
        let rules = NamingRules::default();

        assert!(rules.is_manageable(&group("MBX-Finance-Owners", GroupKind::MailEnabledSecurity)));
        assert!(!rules.is_manageable(&group("MBX-Finance-Owners", GroupKind::Distribution)));
        assert!(!rules.is_manageable(&group("HR-Finance-Owners", GroupKind::MailEnabledSecurity)));
    }
}
