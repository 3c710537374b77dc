//! Interactive membership console
//!
//! A [`Session`] owns everything the menu loop needs: the directory, the
//! discovery strategy, the acting principal, the dry-run flag and the current
//! list of manageable groups. Input and output are injected, so a session can
//! be driven from a script or a test exactly as from a terminal.
//!
//! The loop is strictly sequential. Each action runs to completion (group
//! selection, user resolution, one directory call per selected group) before
//! the menu is shown again. The group list is only replaced by a refresh.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use console::style;
use tracing::{debug, info, warn};

use crate::directory::{Directory, Group, Recipient};
use crate::discovery::GroupDiscovery;
use crate::resolve::{lookup_user, UserLookup};
use crate::sanitize::{sanitize_error, sanitize_group, sanitize_recipient};

/// Menu entries of the idle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    ViewMembers,
    AddMember,
    RemoveMember,
    Refresh,
    Quit,
}

impl MenuAction {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(MenuAction::ViewMembers),
            "2" => Some(MenuAction::AddMember),
            "3" => Some(MenuAction::RemoveMember),
            "4" => Some(MenuAction::Refresh),
            "q" | "Q" => Some(MenuAction::Quit),
            _ => None,
        }
    }
}

/// Operator answer to a group selection prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSelection {
    Cancel,
    All,
    /// Zero-based indices, in the order given, without repeats
    Indices(Vec<usize>),
    Invalid,
}

/// Parses `1,3`, `a` (all) or `c` (cancel) against a list of `count` groups
pub fn parse_group_selection(input: &str, count: usize) -> GroupSelection {
    let input = input.trim();

    if input.eq_ignore_ascii_case("c") {
        return GroupSelection::Cancel;
    }
    if input.eq_ignore_ascii_case("a") {
        return GroupSelection::All;
    }

    let mut indices = Vec::new();
    for part in input.split(',').map(str::trim) {
        match part.parse::<usize>() {
            Ok(number) if (1..=count).contains(&number) => {
                if !indices.contains(&(number - 1)) {
                    indices.push(number - 1);
                }
            }
            _ => return GroupSelection::Invalid,
        }
    }

    if indices.is_empty() {
        GroupSelection::Invalid
    } else {
        GroupSelection::Indices(indices)
    }
}

/// Operator answer to a single-choice prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Cancel,
    Index(usize),
    Invalid,
}

/// Parses a number in `1..=count` or `c` (cancel)
pub fn parse_choice(input: &str, count: usize) -> Choice {
    let input = input.trim();

    if input.eq_ignore_ascii_case("c") {
        return Choice::Cancel;
    }

    match input.parse::<usize>() {
        Ok(number) if (1..=count).contains(&number) => Choice::Index(number - 1),
        _ => Choice::Invalid,
    }
}

/// Parses a `y`/`n` answer, with `c` cancelling like `n`; anything else is `None`
pub fn parse_confirmation(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" | "c" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Add,
    Remove,
}

/// User picked for a membership change
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    /// Shown to the operator
    address: String,
    /// Handed to the directory: the typed address, or the id of a search result
    member: String,
}

impl Target {
    fn verbatim(address: String) -> Self {
        Self {
            member: address.clone(),
            address,
        }
    }

    fn chosen(candidate: &Recipient) -> Self {
        Self {
            address: candidate.preferred_address().to_string(),
            member: candidate.id.clone(),
        }
    }
}

/// Options fixed for the lifetime of a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// User whose groups are managed
    pub principal: String,
    /// Report mutations instead of applying them
    pub dry_run: bool,
    /// Upper bound on fuzzy user search results
    pub search_limit: usize,
}

/// Interactive session state and menu loop
pub struct Session<R, W> {
    directory: Arc<dyn Directory>,
    discovery: Arc<dyn GroupDiscovery>,
    settings: SessionSettings,
    groups: Vec<Group>,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Session<R, W> {
    pub fn new(
        directory: Arc<dyn Directory>,
        discovery: Arc<dyn GroupDiscovery>,
        settings: SessionSettings,
        input: R,
        output: W,
    ) -> Self {
        Self {
            directory,
            discovery,
            settings,
            groups: Vec::new(),
            input,
            output,
        }
    }

    /// Groups currently offered to the operator
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Consumes the session, returning its output sink
    pub fn into_output(self) -> W {
        self.output
    }

    /// Discovers the groups, then serves the menu until quit or end of input
    pub async fn run(&mut self) -> Result<()> {
        if self.settings.dry_run {
            self.notice("Dry-run mode: membership changes are reported, not applied.")?;
        }
        self.refresh().await?;

        loop {
            self.show_menu()?;
            let line = match self.prompt("Select an option: ")? {
                Some(line) => line,
                None => break,
            };

            match MenuAction::parse(&line) {
                Some(MenuAction::ViewMembers) => self.view_members().await?,
                Some(MenuAction::AddMember) => self.change_membership(Membership::Add).await?,
                Some(MenuAction::RemoveMember) => self.change_membership(Membership::Remove).await?,
                Some(MenuAction::Refresh) => self.refresh().await?,
                Some(MenuAction::Quit) => break,
                None => self.warning(&format!("Unknown option {:?}", line.trim()))?,
            }
        }

        info!("Session for {} ended", self.settings.principal);
        writeln!(self.output, "Goodbye.")?;
        Ok(())
    }

    /// Re-runs discovery and replaces the group list
    pub async fn refresh(&mut self) -> Result<()> {
        writeln!(
            self.output,
            "Discovering groups for {}...",
            style(&self.settings.principal).bold()
        )?;

        match self.discovery.discover(&self.settings.principal).await {
            Ok(groups) => {
                self.groups = groups;
                info!("Discovered {} manageable groups", self.groups.len());
            }
            Err(e) => {
                self.groups = Vec::new();
                self.error(&format!("Group discovery failed: {}", e))?;
            }
        }

        self.show_groups()
    }

    fn show_groups(&mut self) -> Result<()> {
        if self.groups.is_empty() {
            return self.warning(&format!(
                "No manageable groups found for {}",
                self.settings.principal
            ));
        }

        writeln!(self.output, "{}", style("Manageable groups:").bold())?;
        let lines: Vec<String> = self
            .groups
            .iter()
            .map(sanitize_group)
            .enumerate()
            .map(|(index, group)| match group.mail {
                Some(mail) => format!("  [{}] {} <{}>", index + 1, group.display_name, mail),
                None => format!("  [{}] {}", index + 1, group.display_name),
            })
            .collect();
        for line in lines {
            writeln!(self.output, "{}", line)?;
        }
        Ok(())
    }

    fn show_menu(&mut self) -> Result<()> {
        writeln!(self.output)?;
        writeln!(self.output, "{}", style("Menu:").bold())?;
        writeln!(self.output, "  1) View group members")?;
        writeln!(self.output, "  2) Add a member")?;
        writeln!(self.output, "  3) Remove a member")?;
        writeln!(self.output, "  4) Refresh group list")?;
        writeln!(self.output, "  Q) Quit")?;
        Ok(())
    }

    async fn view_members(&mut self) -> Result<()> {
        let groups = match self.select_groups("view")? {
            Some(groups) => groups,
            None => return Ok(()),
        };

        for group in groups {
            let shown = sanitize_group(&group);
            match self.directory.list_members(&group).await {
                Ok(members) => {
                    writeln!(
                        self.output,
                        "{} ({} members)",
                        style(&shown.display_name).bold(),
                        members.len()
                    )?;
                    for member in members.iter().map(sanitize_recipient) {
                        writeln!(self.output, "  - {}", describe_recipient(&member))?;
                    }
                }
                Err(e) => {
                    warn!("Failed to list members of {}: {}", group, e);
                    self.error(&format!("Could not list members of {}: {}", shown.display_name, e))?;
                }
            }
        }

        Ok(())
    }

    async fn change_membership(&mut self, change: Membership) -> Result<()> {
        let verb = match change {
            Membership::Add => "add a member to",
            Membership::Remove => "remove a member from",
        };
        let groups = match self.select_groups(verb)? {
            Some(groups) => groups,
            None => return Ok(()),
        };

        let target = match self.resolve_user().await? {
            Some(target) => target,
            None => return Ok(()),
        };

        for group in groups {
            let shown = sanitize_group(&group).display_name;

            if self.settings.dry_run {
                let message = match change {
                    Membership::Add => format!("[DRY RUN] Would add {} to {}", target.address, shown),
                    Membership::Remove => format!("[DRY RUN] Would remove {} from {}", target.address, shown),
                };
                self.notice(&message)?;
                continue;
            }

            let result = match change {
                Membership::Add => self.directory.add_member(&group, &target.member).await,
                Membership::Remove => self.directory.remove_member(&group, &target.member).await,
            };

            match (change, result) {
                (Membership::Add, Ok(())) => {
                    info!("Added {} to {}", target.address, group);
                    self.success(&format!("Added {} to {}", target.address, shown))?;
                }
                (Membership::Remove, Ok(())) => {
                    info!("Removed {} from {}", target.address, group);
                    self.success(&format!("Removed {} from {}", target.address, shown))?;
                }
                (Membership::Add, Err(e)) => {
                    warn!("Adding {} to {} failed: {}", target.address, group, e);
                    self.error(&format!("Failed to add {} to {}: {}", target.address, shown, e))?;
                }
                (Membership::Remove, Err(e)) => {
                    warn!("Removing {} from {} failed: {}", target.address, group, e);
                    self.error(&format!("Failed to remove {} from {}: {}", target.address, shown, e))?;
                }
            }
        }

        Ok(())
    }

    /// Asks for one or more groups; `None` when cancelled or nothing to pick
    fn select_groups(&mut self, purpose: &str) -> Result<Option<Vec<Group>>> {
        if self.groups.is_empty() {
            self.warning("There are no groups to choose from; try refreshing the list.")?;
            return Ok(None);
        }

        self.show_groups()?;
        let question = format!(
            "Groups to {} (e.g. 1,3; 'a' for all, 'c' to cancel): ",
            purpose
        );

        loop {
            let line = match self.prompt(&question)? {
                Some(line) => line,
                None => return Ok(None),
            };

            match parse_group_selection(&line, self.groups.len()) {
                GroupSelection::Cancel => return Ok(None),
                GroupSelection::All => return Ok(Some(self.groups.clone())),
                GroupSelection::Indices(indices) => {
                    return Ok(Some(
                        indices.into_iter().map(|i| self.groups[i].clone()).collect(),
                    ))
                }
                GroupSelection::Invalid => self.warning(&format!(
                    "Enter numbers between 1 and {}, 'a' or 'c'",
                    self.groups.len()
                ))?,
            }
        }
    }

    /// Resolves the target user; `None` aborts the action
    async fn resolve_user(&mut self) -> Result<Option<Target>> {
        let term = match self.prompt("User email address or search term (blank to cancel): ")? {
            Some(term) if !term.trim().is_empty() => term.trim().to_string(),
            _ => return Ok(None),
        };

        let lookup = lookup_user(self.directory.as_ref(), &term, self.settings.search_limit).await;
        let candidates = match lookup {
            Ok(UserLookup::Address(address)) => return Ok(Some(Target::verbatim(address))),
            Ok(UserLookup::Candidates(candidates)) => candidates,
            Err(e) => {
                warn!("Recipient search for {:?} failed: {}", term, e);
                self.error(&format!("User search failed: {}", e))?;
                return Ok(None);
            }
        };
        debug!("{} candidates for {:?}", candidates.len(), term);

        match candidates.as_slice() {
            [] => {
                self.warning(&format!("No recipients match {:?}", term))?;
                Ok(None)
            }
            [only] => self.confirm_candidate(only).await,
            _ => self.choose_candidate(&candidates),
        }
    }

    async fn confirm_candidate(&mut self, candidate: &Recipient) -> Result<Option<Target>> {
        writeln!(
            self.output,
            "Found: {}",
            describe_recipient(&sanitize_recipient(candidate))
        )?;

        loop {
            let line = match self.prompt("Use this recipient? (y/n, 'c' to cancel): ")? {
                Some(line) => line,
                None => return Ok(None),
            };
            match parse_confirmation(&line) {
                Some(true) => return Ok(Some(Target::chosen(candidate))),
                Some(false) => return Ok(None),
                None => self.warning("Please answer 'y', 'n' or 'c'")?,
            }
        }
    }

    fn choose_candidate(&mut self, candidates: &[Recipient]) -> Result<Option<Target>> {
        writeln!(self.output, "{}", style("Matching recipients:").bold())?;
        for (index, candidate) in candidates.iter().enumerate() {
            writeln!(
                self.output,
                "  [{}] {}",
                index + 1,
                describe_recipient(&sanitize_recipient(candidate))
            )?;
        }

        let question = format!("Select a recipient [1-{}] or 'c' to cancel: ", candidates.len());
        loop {
            let line = match self.prompt(&question)? {
                Some(line) => line,
                None => return Ok(None),
            };
            match parse_choice(&line, candidates.len()) {
                Choice::Index(index) => {
                    return Ok(Some(Target::chosen(&candidates[index])))
                }
                Choice::Cancel => return Ok(None),
                Choice::Invalid => self.warning(&format!(
                    "Enter a number between 1 and {} or 'c'",
                    candidates.len()
                ))?,
            }
        }
    }

    /// Prints `question` and reads one line; `None` at end of input
    fn prompt(&mut self, question: &str) -> Result<Option<String>> {
        write!(self.output, "{}", style(question).cyan())?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn notice(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{}", style(message).cyan())?;
        Ok(())
    }

    fn success(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{}", style(message).green())?;
        Ok(())
    }

    fn warning(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{}", style(format!("WARNING: {}", message)).yellow())?;
        Ok(())
    }

    fn error(&mut self, message: &str) -> Result<()> {
        writeln!(
            self.output,
            "{}",
            style(format!("ERROR: {}", sanitize_error(message))).red()
        )?;
        Ok(())
    }
}

fn describe_recipient(recipient: &Recipient) -> String {
    match (&recipient.address, &recipient.user_principal_name) {
        (Some(address), _) => format!("{} <{}>", recipient.display_name, address),
        (None, Some(upn)) => format!("{} <{}>", recipient.display_name, upn),
        (None, None) => recipient.display_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_parsing() {
        assert_eq!(MenuAction::parse("1"), Some(MenuAction::ViewMembers));
        assert_eq!(MenuAction::parse(" 4 "), Some(MenuAction::Refresh));
        assert_eq!(MenuAction::parse("q"), Some(MenuAction::Quit));
        assert_eq!(MenuAction::parse("Q"), Some(MenuAction::Quit));
        assert_eq!(MenuAction::parse("5"), None);
        assert_eq!(MenuAction::parse("quit"), None);
    }

    #[test]
    fn test_group_selection_parsing() {
        assert_eq!(parse_group_selection("c", 3), GroupSelection::Cancel);
        assert_eq!(parse_group_selection("A", 3), GroupSelection::All);
        assert_eq!(parse_group_selection("2", 3), GroupSelection::Indices(vec![1]));
        assert_eq!(
            parse_group_selection("3, 1,3", 3),
            GroupSelection::Indices(vec![2, 0])
        );
        assert_eq!(parse_group_selection("0", 3), GroupSelection::Invalid);
        assert_eq!(parse_group_selection("4", 3), GroupSelection::Invalid);
        assert_eq!(parse_group_selection("1,x", 3), GroupSelection::Invalid);
        assert_eq!(parse_group_selection("", 3), GroupSelection::Invalid);
    }

    #[test]
    fn test_chosen_target_uses_directory_id() {
        let candidate = Recipient {
            id: "5f1c".to_string(),
            display_name: "First Last".to_string(),
            address: Some("first.last@contoso.com".to_string()),
            user_principal_name: Some("flast@contoso.onmicrosoft.com".to_string()),
        };

        let target = Target::chosen(&candidate);
        assert_eq!(target.address, "first.last@contoso.com");
        assert_eq!(target.member, "5f1c");

        let typed = Target::verbatim("a@b.com".to_string());
        assert_eq!(typed.member, "a@b.com");
    }

    #[test]
    fn test_choice_and_confirmation_parsing() {
        assert_eq!(parse_choice("2", 2), Choice::Index(1));
        assert_eq!(parse_choice("C", 2), Choice::Cancel);
        assert_eq!(parse_choice("3", 2), Choice::Invalid);
        assert_eq!(parse_choice("-1", 2), Choice::Invalid);

        assert_eq!(parse_confirmation("Y"), Some(true));
        assert_eq!(parse_confirmation("no"), Some(false));
        assert_eq!(parse_confirmation("C"), Some(false));
        assert_eq!(parse_confirmation("maybe"), None);
    }
}
