//! Core provenance graph data structures

mod edge;
mod engine;
mod error;
mod namespace;
mod node;
mod store;


pub use edge::{Generation, Relation, RelationKind};
pub use engine::{ProvenanceEngine, SessionId};
pub use error::{ProvError, ProvResult, TimingViolation};
pub use namespace::{host_namespace, Namespaces, DEFAULT_LOCAL_NAMESPACE, LOCAL_PREFIX, REMOTE_PREFIX};
pub use node::{ActivityRef, AgentRef, Attributes, EntityRef, NodeId, NodeKind, ProvNode};
pub use store::{ActivityTimes, GraphMark, ProvenanceGraph};
