//! Node representation in the provenance graph

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a node
///
/// Always a fully resolved IRI once stored in a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a NodeId from an already resolved IRI
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// PROV node classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A file at a point in its history
    Entity,
    /// A time-bounded occurrence (upload, copy)
    Activity,
    /// The software responsible for an activity
    Agent,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Activity => "activity",
            Self::Agent => "agent",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entity" => Ok(Self::Entity),
            "activity" => Ok(Self::Activity),
            "agent" => Ok(Self::Agent),
            _ => Err(format!("unknown node kind: {}", s)),
        }
    }
}

/// Free-form attributes attached to a node
pub type Attributes = BTreeMap<String, String>;

/// A node in the provenance graph
///
/// Nodes are immutable once added; a changed artifact is recorded as a new
/// version node instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvNode {
    /// Resolved IRI
    pub id: NodeId,
    /// Entity, activity or agent
    pub kind: NodeKind,
    /// Human-readable label
    pub label: Option<String>,
    /// Machine holding the artifact, for entities created on a remote host
    pub location: Option<String>,
    /// Version number, 1 for the first definition of an IRI
    pub version: u32,
    /// Additional attributes
    pub extra: Attributes,
}

impl ProvNode {
    /// Create a first-version node of the given kind
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            label: None,
            location: None,
            version: 1,
            extra: Attributes::new(),
        }
    }

    /// Set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Merge additional attributes
    pub fn with_extra(mut self, extra: &Attributes) -> Self {
        self.extra
            .extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Handle to an entity node known to exist in a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef(NodeId);

/// Handle to an activity node known to exist in a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivityRef(NodeId);

/// Handle to an agent node known to exist in a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentRef(NodeId);

impl EntityRef {
    pub(crate) fn new(id: NodeId) -> Self {
        Self(id)
    }

    pub fn id(&self) -> &NodeId {
        &self.0
    }
}

impl ActivityRef {
    pub(crate) fn new(id: NodeId) -> Self {
        Self(id)
    }

    pub fn id(&self) -> &NodeId {
        &self.0
    }
}

impl AgentRef {
    pub(crate) fn new(id: NodeId) -> Self {
        Self(id)
    }

    pub fn id(&self) -> &NodeId {
        &self.0
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for ActivityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for AgentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
