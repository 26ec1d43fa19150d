//! ProvenanceEngine: per-session provenance graphs behind one handle

use super::error::{ProvError, ProvResult};
use super::namespace::{Namespaces, DEFAULT_LOCAL_NAMESPACE};
use super::store::{GraphMark, ProvenanceGraph};
use crate::storage::LedgerStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier for a workbench session (one provenance graph each)
///
/// Serializes as a plain string (UUID or a project name like "tiny-network").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new random SessionId (UUID-based)
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a SessionId from a string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The main provenance engine
///
/// Holds one graph per session. [`ProvenanceEngine::record`] keeps the
/// session's entry locked for the whole closure, so multi-step recording
/// sequences from concurrent callers never interleave on the same graph.
/// When a store is attached every recording is written through to it,
/// appending only what the recording added.
pub struct ProvenanceEngine {
    graphs: DashMap<SessionId, Ledger>,
    store: Option<Arc<dyn LedgerStore>>,
    local_namespace: String,
}

/// A session's graph and how much of it the store already holds
struct Ledger {
    graph: ProvenanceGraph,
    persisted: GraphMark,
}

impl Ledger {
    fn stored(graph: ProvenanceGraph) -> Self {
        Self {
            persisted: graph.mark(),
            graph,
        }
    }

    fn fresh(graph: ProvenanceGraph) -> Self {
        Self {
            graph,
            persisted: GraphMark::default(),
        }
    }
}

impl ProvenanceEngine {
    /// Create an in-memory engine
    pub fn new() -> Self {
        Self {
            graphs: DashMap::new(),
            store: None,
            local_namespace: DEFAULT_LOCAL_NAMESPACE.to_string(),
        }
    }

    /// Create an engine that persists graphs to the given store
    pub fn with_store(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    /// Base bound to `local` in graphs this engine creates
    pub fn with_local_namespace(mut self, base: impl Into<String>) -> Self {
        self.local_namespace = base.into();
        self
    }

    /// Load every persisted session into memory, returning how many were loaded
    pub fn load_all(&self) -> ProvResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let mut loaded = 0;
        for session in store.list_sessions()? {
            if let Some(graph) = store.load_graph(&session)? {
                self.graphs.insert(session, Ledger::stored(graph));
                loaded += 1;
            }
        }
        debug!(loaded, "loaded provenance sessions");
        Ok(loaded)
    }

    /// Run a recording sequence against a session's graph.
    ///
    /// The graph is created on first use (or loaded from the store). The
    /// graph is persisted afterwards even when the closure fails part-way,
    /// because whatever it already wrote stays in the graph. Anything a
    /// failed save left behind is written by the next successful one.
    pub fn record<T, F>(&self, session: &SessionId, f: F) -> ProvResult<T>
    where
        F: FnOnce(&mut ProvenanceGraph) -> ProvResult<T>,
    {
        self.ensure_loaded(session)?;
        let mut entry = self
            .graphs
            .entry(session.clone())
            .or_insert_with(|| Ledger::fresh(self.empty_graph()));
        let ledger = entry.value_mut();

        let outcome = f(&mut ledger.graph);

        if let Some(store) = &self.store {
            match store.append_graph(session, &ledger.graph, ledger.persisted) {
                Ok(()) => ledger.persisted = ledger.graph.mark(),
                Err(e) if outcome.is_ok() => return Err(e.into()),
                Err(e) => {
                    warn!(session = %session, error = %e, "failed to persist partially recorded graph");
                }
            }
        }
        outcome
    }

    /// Create a session from a complete graph (e.g. after an import).
    ///
    /// Ledgers are append-only, so a session already in memory or in the
    /// store is never overwritten: that fails with
    /// [`ProvError::SessionExists`].
    pub fn insert_graph(&self, session: &SessionId, graph: ProvenanceGraph) -> ProvResult<()> {
        let Entry::Vacant(slot) = self.graphs.entry(session.clone()) else {
            return Err(ProvError::SessionExists(session.to_string()));
        };
        let mut ledger = Ledger::fresh(graph);
        if let Some(store) = &self.store {
            if store.has_session(session)? {
                return Err(ProvError::SessionExists(session.to_string()));
            }
            store.save_graph(session, &ledger.graph)?;
            ledger.persisted = ledger.graph.mark();
        }
        slot.insert(ledger);
        Ok(())
    }

    /// Get a snapshot of a session's graph
    pub fn get_graph(&self, session: &SessionId) -> Option<ProvenanceGraph> {
        self.graphs.get(session).map(|r| r.graph.clone())
    }

    /// List all session IDs
    pub fn list_sessions(&self) -> Vec<SessionId> {
        self.graphs.iter().map(|r| r.key().clone()).collect()
    }

    /// Get the number of sessions
    pub fn session_count(&self) -> usize {
        self.graphs.len()
    }

    /// Check if a session exists
    pub fn has_session(&self, session: &SessionId) -> bool {
        self.graphs.contains_key(session)
    }

    fn ensure_loaded(&self, session: &SessionId) -> ProvResult<()> {
        if self.graphs.contains_key(session) {
            return Ok(());
        }
        if let Some(store) = &self.store {
            if let Some(graph) = store.load_graph(session)? {
                self.graphs.entry(session.clone()).or_insert_with(|| Ledger::stored(graph));
            }
        }
        Ok(())
    }

    fn empty_graph(&self) -> ProvenanceGraph {
        ProvenanceGraph::with_namespaces(Namespaces::new(self.local_namespace.clone()))
    }
}

impl Default for ProvenanceEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, ProvError};
    use crate::provenance::{record_upload, FileTransfer};
    use crate::storage::{OpenStore, SqliteStore, StorageError, StorageResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store whose next append fails once when armed
    struct FlakyStore {
        inner: SqliteStore,
        fail_next: AtomicBool,
    }

    impl LedgerStore for FlakyStore {
        fn append_graph(&self, session: &SessionId, graph: &ProvenanceGraph, since: GraphMark) -> StorageResult<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other("disk unavailable")));
            }
            self.inner.append_graph(session, graph, since)
        }

        fn has_session(&self, session: &SessionId) -> StorageResult<bool> {
            self.inner.has_session(session)
        }

        fn load_graph(&self, session: &SessionId) -> StorageResult<Option<ProvenanceGraph>> {
            self.inner.load_graph(session)
        }

        fn list_sessions(&self) -> StorageResult<Vec<SessionId>> {
            self.inner.list_sessions()
        }
    }

    fn transfer(n: usize) -> FileTransfer {
        FileTransfer::new(
            format!("local:input{}.xml", n),
            format!("remote:input{}.xml", n),
            "stimulus",
            format!("act:upload{}", n),
        )
    }

    #[test]
    fn test_create_engine() {
        let engine = ProvenanceEngine::new();
        assert_eq!(engine.session_count(), 0);
    }

    #[test]
    fn test_record_creates_session_on_first_use() {
        let engine = ProvenanceEngine::new();
        let session = SessionId::from("tiny-network");

        engine
            .record(&session, |graph| record_upload(graph, &transfer(1), "cluster1"))
            .unwrap();

        assert!(engine.has_session(&session));
        let graph = engine.get_graph(&session).unwrap();
        assert_eq!(graph.count(NodeKind::Activity), 1);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let engine = ProvenanceEngine::new();
        let a = SessionId::from("a");
        let b = SessionId::from("b");

        engine.record(&a, |graph| record_upload(graph, &transfer(1), "hostA")).unwrap();
        engine.record(&b, |graph| record_upload(graph, &transfer(2), "hostB")).unwrap();

        let graph_a = engine.get_graph(&a).unwrap();
        let graph_b = engine.get_graph(&b).unwrap();
        assert_eq!(graph_a.namespaces().base("remote"), Some("ssh://hostA/"));
        assert_eq!(graph_b.namespaces().base("remote"), Some("ssh://hostB/"));
        assert!(graph_a.activity("act:upload2").is_none());
    }

    #[test]
    fn test_local_namespace_applies_to_new_graphs() {
        let engine = ProvenanceEngine::new().with_local_namespace("file:///lab/");
        let session = SessionId::from("s");
        engine.record(&session, |graph| record_upload(graph, &transfer(1), "cluster1")).unwrap();

        let graph = engine.get_graph(&session).unwrap();
        assert!(graph.get(&"file:///lab/input1.xml".into()).is_some());
    }

    #[test]
    fn test_concurrent_records_never_interleave() {
        let engine = ProvenanceEngine::new();
        let session = SessionId::from("shared");

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let engine = &engine;
                let session = &session;
                scope.spawn(move || {
                    for i in 0..10 {
                        let n = worker * 100 + i;
                        engine
                            .record(session, |graph| record_upload(graph, &transfer(n), "cluster1"))
                            .unwrap();
                    }
                });
            }
        });

        let graph = engine.get_graph(&session).unwrap();
        assert_eq!(graph.count(NodeKind::Activity), 80);
        assert_eq!(graph.count(NodeKind::Entity), 160);
        assert_eq!(graph.count(NodeKind::Agent), 1);
        // 80 uploads x (start, end, association, used, generated, derivation)
        assert_eq!(graph.relation_count(), 480);
    }

    #[test]
    fn test_record_persists_to_store_and_reloads() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let session = SessionId::from("persisted");

        let engine = ProvenanceEngine::with_store(store.clone());
        engine.record(&session, |graph| record_upload(graph, &transfer(1), "cluster1")).unwrap();
        let expected = engine.get_graph(&session).unwrap();

        let reopened = ProvenanceEngine::with_store(store);
        assert_eq!(reopened.load_all().unwrap(), 1);
        assert_eq!(reopened.get_graph(&session).unwrap(), expected);
    }

    #[test]
    fn test_failed_record_keeps_partial_writes() {
        let engine = ProvenanceEngine::new();
        let session = SessionId::from("partial");

        let result: ProvResult<()> = engine.record(&session, |graph| {
            let activity = graph.add_activity("act:broken", "upload", false, false)?;
            let other = ProvenanceGraph::new().add_entity("local:elsewhere", "x", None, None, false)?;
            graph.used(&activity, &other)
        });

        assert!(matches!(result, Err(ProvError::InvalidReference(_))));
        let graph = engine.get_graph(&session).unwrap();
        assert!(graph.activity("act:broken").is_some());
    }

    #[test]
    fn test_insert_graph_creates_session() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let session = SessionId::from("imported");
        let mut graph = ProvenanceGraph::new();
        record_upload(&mut graph, &transfer(1), "cluster1").unwrap();

        let engine = ProvenanceEngine::with_store(store.clone());
        engine.insert_graph(&session, graph.clone()).unwrap();
        assert_eq!(engine.get_graph(&session).unwrap(), graph);
        assert_eq!(store.load_graph(&session).unwrap().unwrap(), graph);
    }

    #[test]
    fn test_insert_graph_refuses_existing_session() {
        let engine = ProvenanceEngine::new();
        let session = SessionId::from("s");
        engine.record(&session, |graph| record_upload(graph, &transfer(1), "cluster1")).unwrap();
        let before = engine.get_graph(&session).unwrap();

        let err = engine.insert_graph(&session, ProvenanceGraph::new()).unwrap_err();
        assert!(matches!(err, ProvError::SessionExists(ref id) if id == "s"));
        assert_eq!(engine.get_graph(&session).unwrap(), before);
    }

    #[test]
    fn test_insert_graph_refuses_session_only_in_store() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let session = SessionId::from("s");
        ProvenanceEngine::with_store(store.clone())
            .record(&session, |graph| record_upload(graph, &transfer(1), "cluster1"))
            .unwrap();
        let persisted = store.load_graph(&session).unwrap().unwrap();

        // Nothing loaded into this engine yet
        let engine = ProvenanceEngine::with_store(store.clone());
        let err = engine.insert_graph(&session, ProvenanceGraph::new()).unwrap_err();
        assert!(matches!(err, ProvError::SessionExists(_)));
        assert!(!engine.has_session(&session));
        assert_eq!(store.load_graph(&session).unwrap().unwrap(), persisted);
    }

    #[test]
    fn test_failed_save_is_caught_up_by_next_record() {
        let store = Arc::new(FlakyStore {
            inner: SqliteStore::open_in_memory().unwrap(),
            fail_next: AtomicBool::new(false),
        });
        let session = SessionId::from("s");
        let engine = ProvenanceEngine::with_store(store.clone());

        engine.record(&session, |graph| record_upload(graph, &transfer(1), "cluster1")).unwrap();
        store.fail_next.store(true, Ordering::SeqCst);
        let err = engine
            .record(&session, |graph| record_upload(graph, &transfer(2), "cluster1"))
            .unwrap_err();
        assert!(matches!(err, ProvError::Storage(_)));
        engine.record(&session, |graph| record_upload(graph, &transfer(3), "cluster1")).unwrap();

        let persisted = store.load_graph(&session).unwrap().unwrap();
        assert_eq!(persisted, engine.get_graph(&session).unwrap());
        assert_eq!(persisted.count(NodeKind::Activity), 3);
    }
}
