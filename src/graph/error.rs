//! Errors raised by provenance graph operations

use super::node::{NodeId, NodeKind};
use crate::storage::StorageError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur in provenance operations
#[derive(Debug, Error)]
pub enum ProvError {
    #[error("Invalid reference: {0} is not in the provenance graph")]
    InvalidReference(NodeId),

    #[error("Node {id} is an {found}, expected an {expected}")]
    KindMismatch {
        id: NodeId,
        expected: NodeKind,
        found: NodeKind,
    },

    #[error("Ordering violation on activity {activity}: {violation}")]
    OrderingViolation {
        activity: NodeId,
        violation: TimingViolation,
    },

    #[error("Entity {0} cannot be derived from itself")]
    SelfDerivation(NodeId),

    #[error("Session {0} already exists")]
    SessionExists(String),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// How an activity timing record broke the start/end ordering
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimingViolation {
    #[error("already started at {0}")]
    AlreadyStarted(DateTime<Utc>),

    #[error("end recorded before any start")]
    NotStarted,

    #[error("already ended at {0}")]
    AlreadyEnded(DateTime<Utc>),

    #[error("end {ended} precedes start {started}")]
    EndBeforeStart {
        started: DateTime<Utc>,
        ended: DateTime<Utc>,
    },
}

/// Result type for provenance operations
pub type ProvResult<T> = Result<T, ProvError>;
