// src/sanitize.rs
//
// Output sanitization for directory data and error messages shown on the console

use std::sync::OnceLock;

use regex::Regex;

use crate::directory::{Group, Recipient};

const ANSI_ESCAPE_PATTERN: &str = r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(\x07|\x1b\\)";
const SECRET_PATTERN: &str = r#"(?i)(bearer\s+|client_secret=|access_token"?\s*[:=]\s*"?)[A-Za-z0-9\-\._~\+/=]+"#;

fn ansi_escape() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(ANSI_ESCAPE_PATTERN).ok()).as_ref()
}

fn secret() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(SECRET_PATTERN).ok()).as_ref()
}

/// Sanitizes a group before it is printed
///
/// Display names and addresses come from the directory and may contain
/// terminal escape sequences or control characters.
pub fn sanitize_group(group: &Group) -> Group {
    Group {
        id: sanitize_text(&group.id),
        display_name: sanitize_text(&group.display_name),
        mail: group.mail.as_deref().map(sanitize_text),
        kind: group.kind,
    }
}

/// Sanitizes a recipient before it is printed
pub fn sanitize_recipient(recipient: &Recipient) -> Recipient {
    Recipient {
        id: sanitize_text(&recipient.id),
        display_name: sanitize_text(&recipient.display_name),
        address: recipient.address.as_deref().map(sanitize_text),
        user_principal_name: recipient.user_principal_name.as_deref().map(sanitize_text),
    }
}

/// Strips escape sequences and control characters from a directory string
pub fn sanitize_text(value: &str) -> String {
    let without_escapes = match ansi_escape() {
        Some(pattern) => pattern.replace_all(value, "").into_owned(),
        None => value.to_string(),
    };

    without_escapes
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

/// Sanitizes an error message and masks any credential it carries
pub fn sanitize_error(error: &str) -> String {
    redact_secrets(&sanitize_text(error))
}

/// Replaces bearer tokens and client secrets with a placeholder
pub fn redact_secrets(message: &str) -> String {
    match secret() {
        Some(pattern) => pattern.replace_all(message, "${1}[REDACTED]").into_owned(),
        None => message.to_string(),
    }
}
