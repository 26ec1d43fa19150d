//! Relations between provenance nodes

use super::node::{ActivityRef, EntityRef, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relation classification, named after the PROV-O properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    StartedAtTime,
    EndedAtTime,
    WasAssociatedWith,
    Used,
    Generated,
    WasDerivedFrom,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartedAtTime => "startedAtTime",
            Self::EndedAtTime => "endedAtTime",
            Self::WasAssociatedWith => "wasAssociatedWith",
            Self::Used => "used",
            Self::Generated => "generated",
            Self::WasDerivedFrom => "wasDerivedFrom",
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startedAtTime" => Ok(Self::StartedAtTime),
            "endedAtTime" => Ok(Self::EndedAtTime),
            "wasAssociatedWith" => Ok(Self::WasAssociatedWith),
            "used" => Ok(Self::Used),
            "generated" => Ok(Self::Generated),
            "wasDerivedFrom" => Ok(Self::WasDerivedFrom),
            _ => Err(format!("unknown relation: {}", s)),
        }
    }
}

/// A typed relation in the provenance graph
///
/// Operands are named by role, so a relation has exactly one reading
/// whatever order the caller supplied them in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "relation", rename_all = "camelCase")]
pub enum Relation {
    StartedAtTime { activity: NodeId, at: DateTime<Utc> },
    EndedAtTime { activity: NodeId, at: DateTime<Utc> },
    WasAssociatedWith { activity: NodeId, agent: NodeId },
    Used { activity: NodeId, entity: NodeId },
    Generated { producer: NodeId, product: NodeId },
    WasDerivedFrom { derived: NodeId, source: NodeId },
}

impl Relation {
    pub fn kind(&self) -> RelationKind {
        match self {
            Self::StartedAtTime { .. } => RelationKind::StartedAtTime,
            Self::EndedAtTime { .. } => RelationKind::EndedAtTime,
            Self::WasAssociatedWith { .. } => RelationKind::WasAssociatedWith,
            Self::Used { .. } => RelationKind::Used,
            Self::Generated { .. } => RelationKind::Generated,
            Self::WasDerivedFrom { .. } => RelationKind::WasDerivedFrom,
        }
    }

    /// The node the relation is about: the activity, the producer, or the derived entity
    pub fn subject(&self) -> &NodeId {
        match self {
            Self::StartedAtTime { activity, .. }
            | Self::EndedAtTime { activity, .. }
            | Self::WasAssociatedWith { activity, .. }
            | Self::Used { activity, .. } => activity,
            Self::Generated { producer, .. } => producer,
            Self::WasDerivedFrom { derived, .. } => derived,
        }
    }

    /// The second node, absent for timing relations
    pub fn object(&self) -> Option<&NodeId> {
        match self {
            Self::StartedAtTime { .. } | Self::EndedAtTime { .. } => None,
            Self::WasAssociatedWith { agent, .. } => Some(agent),
            Self::Used { entity, .. } => Some(entity),
            Self::Generated { product, .. } => Some(product),
            Self::WasDerivedFrom { source, .. } => Some(source),
        }
    }

    /// The timestamp carried by timing relations
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::StartedAtTime { at, .. } | Self::EndedAtTime { at, .. } => Some(*at),
            _ => None,
        }
    }

    /// Whether the relation references the given node in any role
    pub fn touches(&self, id: &NodeId) -> bool {
        self.subject() == id || self.object() == Some(id)
    }

    /// Rebuild a relation from its flattened parts (storage rows, RDF triples)
    ///
    /// Returns `None` when the parts don't fit the kind.
    pub fn from_parts(
        kind: RelationKind,
        subject: NodeId,
        object: Option<NodeId>,
        at: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        let relation = match (kind, object, at) {
            (RelationKind::StartedAtTime, None, Some(at)) => Self::StartedAtTime { activity: subject, at },
            (RelationKind::EndedAtTime, None, Some(at)) => Self::EndedAtTime { activity: subject, at },
            (RelationKind::WasAssociatedWith, Some(agent), None) => {
                Self::WasAssociatedWith { activity: subject, agent }
            }
            (RelationKind::Used, Some(entity), None) => Self::Used { activity: subject, entity },
            (RelationKind::Generated, Some(product), None) => Self::Generated { producer: subject, product },
            (RelationKind::WasDerivedFrom, Some(source), None) => {
                Self::WasDerivedFrom { derived: subject, source }
            }
            _ => return None,
        };
        Some(relation)
    }
}

/// Operands of a generation, normalized by role
///
/// Converts from either `(&activity, &entity)` or `(&entity, &activity)`;
/// both mean "the activity produced the entity".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub producer: ActivityRef,
    pub product: EntityRef,
}

impl From<(&ActivityRef, &EntityRef)> for Generation {
    fn from((producer, product): (&ActivityRef, &EntityRef)) -> Self {
        Self {
            producer: producer.clone(),
            product: product.clone(),
        }
    }
}

impl From<(&EntityRef, &ActivityRef)> for Generation {
    fn from((product, producer): (&EntityRef, &ActivityRef)) -> Self {
        Self {
            producer: producer.clone(),
            product: product.clone(),
        }
    }
}
