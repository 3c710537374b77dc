//! Resolution of an operator-supplied user reference
//!
//! A well-formed address is used verbatim and never triggers a search. Any
//! other text is treated as a search term and matched as a substring of
//! recipient names and addresses, capped at a configured number of results.
//! Choosing among the candidates is left to the console.

use tracing::debug;

use crate::directory::{Directory, DirectoryError, Recipient};
use crate::validation::is_well_formed_address;

/// Result of looking up a user reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    /// The input was a well-formed address and is used as-is
    Address(String),
    /// Search candidates, possibly empty
    Candidates(Vec<Recipient>),
}

/// Looks up `input` as an address or a search term
pub async fn lookup_user(
    directory: &dyn Directory,
    input: &str,
    limit: usize,
) -> Result<UserLookup, DirectoryError> {
    let input = input.trim();

    if is_well_formed_address(input) {
        return Ok(UserLookup::Address(input.to_string()));
    }

    if input.is_empty() {
        return Ok(UserLookup::Candidates(Vec::new()));
    }

    let candidates = directory.search_recipients(input, limit).await?;
    debug!("Search for {:?} returned {} candidates", input, candidates.len());
    Ok(UserLookup::Candidates(candidates))
}
