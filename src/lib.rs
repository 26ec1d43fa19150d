//! simprov: provenance ledger for simulation workbench file transfers
//!
//! Records where simulation input files came from and where they went, as a
//! PROV-O graph (entities, activities, agents and the relations between
//! them), and checks remote hosts before an upload is attempted.
//!
//! # Core Concepts
//!
//! - **Graph**: an append-only store of provenance nodes and relations with
//!   its own namespace table (`local:` and `remote:` prefixes)
//! - **Recorder**: writes the canonical subgraph for an upload or a copy
//! - **Engine**: one graph per workbench session, optionally persisted
//! - **Connection tester**: one bounded SSH login attempt, reported as a bool
//!
//! # Example
//!
//! ```
//! use simprov::provenance::{record_upload, FileTransfer};
//! use simprov::ProvenanceGraph;
//!
//! let mut graph = ProvenanceGraph::new();
//! let transfer = FileTransfer::new("local:sim.cfg", "remote:sim.cfg", "config", "act:upload1");
//! let activity = record_upload(&mut graph, &transfer, "cluster1").unwrap();
//!
//! assert_eq!(activity.id().as_str(), "act:upload1");
//! assert!(graph.entity("ssh://cluster1/sim.cfg").is_some());
//! ```

pub mod config;
mod graph;
pub mod provenance;
pub mod rdf;
pub mod remote;
pub mod storage;

pub use graph::{
    host_namespace, ActivityRef, ActivityTimes, AgentRef, Attributes, EntityRef, Generation, GraphMark, Namespaces,
    NodeId, NodeKind, ProvError, ProvNode, ProvResult, ProvenanceEngine, ProvenanceGraph, Relation, RelationKind,
    SessionId, TimingViolation, DEFAULT_LOCAL_NAMESPACE, LOCAL_PREFIX, REMOTE_PREFIX,
};
pub use storage::{LedgerStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
