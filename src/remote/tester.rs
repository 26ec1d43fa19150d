//! ConnectionTester: one bounded connection attempt, reported as a bool

use super::ssh::SshConnector;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Port used when the host string names none
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Why a connection attempt failed
///
/// Only the tester's logs see these; callers get `false`.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid host {0:?}")]
    InvalidHost(String),

    #[error("could not resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("host unreachable: {0}")]
    Unreachable(#[from] std::io::Error),

    #[error("timed out")]
    Timeout,

    #[error("SSH handshake failed: {0}")]
    Handshake(#[from] ssh2::Error),

    #[error("authentication rejected: {0}")]
    AuthRejected(String),
}

/// Host and port a connection attempt is aimed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
}

impl RemoteTarget {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// A bare IPv6 address (more than one `:`) is taken as a host without a port.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, ConnectError> {
        let input = input.trim();
        let invalid = || ConnectError::InvalidHost(input.to_string());

        let (host, port) = if let Some(bracketed) = input.strip_prefix('[') {
            let (host, rest) = bracketed.split_once(']').ok_or_else(invalid)?;
            match rest {
                "" => (host, None),
                _ => (host, Some(rest.strip_prefix(':').ok_or_else(invalid)?)),
            }
        } else if input.matches(':').count() == 1 {
            let (host, port) = input.split_once(':').ok_or_else(invalid)?;
            (host, Some(port))
        } else {
            (input, None)
        };

        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        let port = match port {
            Some(raw) => raw.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(invalid)?,
            None => default_port,
        };
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Makes one authenticated connection attempt
///
/// Implementations must give up once `deadline` has passed.
pub trait Connector {
    fn connect(
        &self,
        target: &RemoteTarget,
        username: &str,
        password: &[u8],
        deadline: Instant,
    ) -> Result<(), ConnectError>;
}

/// Checks whether a host accepts a set of credentials
#[derive(Debug, Clone)]
pub struct ConnectionTester<C = SshConnector> {
    connector: C,
    default_port: u16,
}

impl ConnectionTester {
    /// Tester that speaks SSH on port 22 unless the host names another
    pub fn new() -> Self {
        Self::with_connector(SshConnector)
    }
}

impl Default for ConnectionTester {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> ConnectionTester<C> {
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector,
            default_port: DEFAULT_SSH_PORT,
        }
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Attempt one authenticated session within `timeout`.
    ///
    /// Returns `true` only when the host was reached and accepted the
    /// credentials. Every failure is logged and reported as `false`. No
    /// retries.
    pub fn test(&self, timeout: Duration, host: &str, username: &str, password: &[u8]) -> bool {
        let deadline = Instant::now() + timeout;
        let target = match RemoteTarget::parse(host, self.default_port) {
            Ok(target) => target,
            Err(e) => {
                info!(host, error = %e, "connection test failed");
                return false;
            }
        };

        debug!(remote = %target, username, timeout_ms = timeout.as_millis() as u64, "testing connection");
        match self.connector.connect(&target, username, password, deadline) {
            Ok(()) => {
                info!(remote = %target, username, "connection test succeeded");
                true
            }
            Err(e) => {
                info!(remote = %target, username, error = %e, "connection test failed");
                false
            }
        }
    }
}

/// Test SSH credentials against `host` within `timeout_ms` milliseconds.
pub fn test_connection(timeout_ms: u64, host: &str, username: &str, password: &[u8]) -> bool {
    ConnectionTester::new().test(Duration::from_millis(timeout_ms), host, username, password)
}

/// Time left before `deadline`, or `Timeout` once it has passed
pub(crate) fn remaining(deadline: Instant) -> Result<Duration, ConnectError> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or(ConnectError::Timeout)
}
