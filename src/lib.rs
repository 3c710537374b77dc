// mbxgroups: mailbox permission group discovery and membership console
// Exposes the core functionality of the mbxgroups application as a library

pub mod app;
pub mod auth;
pub mod cli;
pub mod console;
pub mod directory;
pub mod discovery;
pub mod graph;
pub mod http;
pub mod naming;
pub mod rate_limit;
pub mod resolve;
pub mod retry;
pub mod sanitize;
pub mod snapshot;
pub mod validation;
