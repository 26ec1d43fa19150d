//! Remote host checks run before an upload is attempted
//!
//! [`test_connection`] makes one credentialed SSH attempt within a timeout
//! and answers only yes or no. Scrubbing the password buffer afterwards is
//! left to the caller, who owns it.

mod ssh;
mod tester;

pub use ssh::SshConnector;
pub use tester::{test_connection, ConnectError, ConnectionTester, Connector, RemoteTarget, DEFAULT_SSH_PORT};

use regex_lite::Regex;
use std::sync::OnceLock;

/// Whether a login name has the shape of a POSIX user name: a lowercase
/// letter followed by lowercase letters, digits or hyphens
pub fn is_valid_username(username: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z][a-z0-9-]*$").unwrap())
        .is_match(username)
}
