//! Per-graph namespace table: short prefixes bound to IRI bases

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix for the machine running the workbench
pub const LOCAL_PREFIX: &str = "local";

/// Prefix for the remote host of the most recent upload
pub const REMOTE_PREFIX: &str = "remote";

/// Base bound to `local` unless configured otherwise
pub const DEFAULT_LOCAL_NAMESPACE: &str = "http://localhost/";

/// Map a remote location onto an IRI base.
///
/// Bare host names become `ssh://<host>/`; values that already carry a
/// scheme are used as-is, with a trailing `/` added when they end in
/// neither `/` nor `#`.
pub fn host_namespace(location: &str) -> String {
    let location = location.trim();
    if location.contains("://") {
        if location.ends_with('/') || location.ends_with('#') {
            location.to_string()
        } else {
            format!("{}/", location)
        }
    } else {
        format!("ssh://{}/", location.trim_end_matches('/'))
    }
}

/// Prefix → base IRI bindings
///
/// `local` and `remote` are always bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespaces {
    bindings: BTreeMap<String, String>,
}

impl Namespaces {
    /// Create a table with `local` bound to the given base
    pub fn new(local_base: impl Into<String>) -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(LOCAL_PREFIX.to_string(), local_base.into());
        bindings.insert(REMOTE_PREFIX.to_string(), host_namespace("localhost"));
        Self { bindings }
    }

    /// Rebuild a table from stored bindings, filling in any missing well-known prefix
    pub fn from_bindings<I, P, B>(bindings: I) -> Self
    where
        I: IntoIterator<Item = (P, B)>,
        P: Into<String>,
        B: Into<String>,
    {
        let mut table = Self::default();
        for (prefix, base) in bindings {
            table.bind(prefix, base);
        }
        table
    }

    /// Bind (or rebind) a prefix
    pub fn bind(&mut self, prefix: impl Into<String>, base: impl Into<String>) {
        self.bindings.insert(prefix.into(), base.into());
    }

    /// Base currently bound to a prefix
    pub fn base(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }

    /// All bindings in prefix order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, b)| (p.as_str(), b.as_str()))
    }

    /// Resolve a short identifier against the current bindings.
    ///
    /// - `prefix:name` with a bound prefix expands to `base + name`
    /// - an identifier without `:` is a name on the local machine
    /// - anything else is already an absolute IRI
    pub fn resolve(&self, id: &str) -> String {
        match id.split_once(':') {
            Some((prefix, rest)) if !rest.starts_with("//") => match self.bindings.get(prefix) {
                Some(base) => format!("{}{}", base, rest),
                None => id.to_string(),
            },
            Some(_) => id.to_string(),
            None => format!("{}{}", self.local_base(), id),
        }
    }

    /// Split an IRI into `(prefix, local name)` using the longest matching base
    pub fn compact<'a>(&'a self, iri: &'a str) -> Option<(&'a str, &'a str)> {
        self.bindings
            .iter()
            .filter(|(_, base)| !base.is_empty() && iri.starts_with(base.as_str()))
            .max_by_key(|(_, base)| base.len())
            .map(|(prefix, base)| (prefix.as_str(), &iri[base.len()..]))
    }

    fn local_base(&self) -> &str {
        self.base(LOCAL_PREFIX).unwrap_or(DEFAULT_LOCAL_NAMESPACE)
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_NAMESPACE)
    }
}
