//! Storage trait definitions

use crate::graph::{GraphMark, ProvenanceGraph, SessionId};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Corrupt ledger for session {session}: {reason}")]
    Corrupt { session: String, reason: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for provenance ledger storage backends
///
/// Ledgers are append-only, so saving a graph only ever adds rows.
/// Implementations must be thread-safe (Send + Sync) so an engine can share
/// one store between sessions.
pub trait LedgerStore: Send + Sync {
    /// Persist what a session's graph gained after `since`, plus its
    /// current namespace bindings
    fn append_graph(&self, session: &SessionId, graph: &ProvenanceGraph, since: GraphMark) -> StorageResult<()>;

    /// Persist a session's whole graph (namespaces, nodes, relations)
    fn save_graph(&self, session: &SessionId, graph: &ProvenanceGraph) -> StorageResult<()> {
        self.append_graph(session, graph, GraphMark::default())
    }

    /// Check whether a session has been persisted
    fn has_session(&self, session: &SessionId) -> StorageResult<bool>;

    /// Load a session's graph
    fn load_graph(&self, session: &SessionId) -> StorageResult<Option<ProvenanceGraph>>;

    /// List all persisted session IDs
    fn list_sessions(&self) -> StorageResult<Vec<SessionId>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: LedgerStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
