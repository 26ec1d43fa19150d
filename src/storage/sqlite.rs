//! SQLite storage backend for provenance ledgers

use super::traits::{LedgerStore, OpenStore, StorageError, StorageResult};
use crate::graph::{GraphMark, Namespaces, NodeId, ProvNode, ProvenanceGraph, Relation, RelationKind, SessionId};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// SQLite-backed ledger store
///
/// Uses a single SQLite database file with tables for sessions, namespace
/// bindings, nodes and relations. Thread-safe via internal mutex on the
/// connection.
///
/// Saves are append-only: nodes are keyed by IRI and relations by their
/// position in the session's recording order, and rows already present are
/// left alone. Only namespace bindings are updated in place, since
/// uploads rebind the `remote` prefix. A session's rows therefore only
/// ever describe one graph, grown through successive appends.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            -- Namespace bindings per session
            CREATE TABLE IF NOT EXISTS namespaces (
                session_id TEXT NOT NULL,
                prefix TEXT NOT NULL,
                base TEXT NOT NULL,
                PRIMARY KEY (session_id, prefix),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            -- Nodes table
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                label TEXT,
                location TEXT,
                version INTEGER NOT NULL,
                extra_json TEXT NOT NULL,
                PRIMARY KEY (session_id, id),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_kind
                ON nodes(session_id, kind);

            -- Relations table, seq is the recording order within a session
            CREATE TABLE IF NOT EXISTS relations (
                session_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                relation TEXT NOT NULL,
                subject TEXT NOT NULL,
                object TEXT,
                at TEXT,
                PRIMARY KEY (session_id, seq),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_relations_subject
                ON relations(session_id, subject);
            CREATE INDEX IF NOT EXISTS idx_relations_object
                ON relations(session_id, object);

            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    /// Serialize a node to database columns
    #[allow(clippy::type_complexity)]
    fn node_to_row(node: &ProvNode) -> StorageResult<(&str, &str, Option<&str>, Option<&str>, i64, String)> {
        Ok((
            node.id.as_str(),
            node.kind.as_str(),
            node.label.as_deref(),
            node.location.as_deref(),
            i64::from(node.version),
            serde_json::to_string(&node.extra)?,
        ))
    }

    /// Deserialize a node from database columns
    fn row_to_node(
        session: &SessionId,
        id: String,
        kind: String,
        label: Option<String>,
        location: Option<String>,
        version: i64,
        extra_json: String,
    ) -> StorageResult<ProvNode> {
        Ok(ProvNode {
            kind: kind.parse().map_err(|reason| corrupt(session, reason))?,
            id: NodeId::from_string(id),
            label,
            location,
            version: u32::try_from(version)
                .map_err(|e| corrupt(session, format!("bad node version {}: {}", version, e)))?,
            extra: serde_json::from_str(&extra_json)?,
        })
    }

    /// Serialize a relation to database columns
    fn relation_to_row(relation: &Relation) -> (&'static str, &str, Option<&str>, Option<String>) {
        (
            relation.kind().as_str(),
            relation.subject().as_str(),
            relation.object().map(NodeId::as_str),
            relation.timestamp().map(format_timestamp),
        )
    }

    /// Deserialize a relation from database columns
    fn row_to_relation(
        session: &SessionId,
        kind: String,
        subject: String,
        object: Option<String>,
        at: Option<String>,
    ) -> StorageResult<Relation> {
        let kind: RelationKind = kind.parse().map_err(|reason| corrupt(session, reason))?;
        let at = at.as_deref().map(parse_timestamp).transpose()?;
        Relation::from_parts(
            kind,
            NodeId::from_string(subject),
            object.map(NodeId::from_string),
            at,
        )
        .ok_or_else(|| corrupt(session, format!("malformed {} relation", kind)))
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl LedgerStore for SqliteStore {
    fn append_graph(&self, session: &SessionId, graph: &ProvenanceGraph, since: GraphMark) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO sessions (id, created_at) VALUES (?1, ?2)",
            params![session.as_str(), format_timestamp(Utc::now())],
        )?;

        for (prefix, base) in graph.namespaces().iter() {
            tx.execute(
                r#"
                INSERT INTO namespaces (session_id, prefix, base)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(session_id, prefix) DO UPDATE SET base = excluded.base
                "#,
                params![session.as_str(), prefix, base],
            )?;
        }

        let mut new_nodes = 0;
        for node in graph.nodes_since(since) {
            let (id, kind, label, location, version, extra) = Self::node_to_row(node)?;
            new_nodes += tx.execute(
                r#"
                INSERT OR IGNORE INTO nodes (id, session_id, kind, label, location, version, extra_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![id, session.as_str(), kind, label, location, version, extra],
            )?;
        }

        let mut new_relations = 0;
        for (offset, relation) in graph.relations_since(since).iter().enumerate() {
            let seq = since.relations + offset;
            let (kind, subject, object, at) = Self::relation_to_row(relation);
            new_relations += tx.execute(
                r#"
                INSERT OR IGNORE INTO relations (session_id, seq, relation, subject, object, at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![session.as_str(), seq as i64, kind, subject, object, at],
            )?;
        }

        tx.commit()?;
        debug!(session = %session, new_nodes, new_relations, "saved provenance graph");
        Ok(())
    }

    fn has_session(&self, session: &SessionId) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let known: Option<String> = conn
            .query_row(
                "SELECT id FROM sessions WHERE id = ?1",
                params![session.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(known.is_some())
    }

    fn load_graph(&self, session: &SessionId) -> StorageResult<Option<ProvenanceGraph>> {
        let conn = self.conn.lock().unwrap();

        let known: Option<String> = conn
            .query_row(
                "SELECT id FROM sessions WHERE id = ?1",
                params![session.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Ok(None);
        }

        // Load namespace bindings
        let mut stmt = conn.prepare("SELECT prefix, base FROM namespaces WHERE session_id = ?1")?;
        let bindings = stmt
            .query_map(params![session.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        // Load nodes
        let mut stmt = conn.prepare(
            "SELECT id, kind, label, location, version, extra_json
             FROM nodes WHERE session_id = ?1 ORDER BY rowid",
        )?;
        let node_rows = stmt.query_map(params![session.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        let mut nodes = Vec::new();
        for row in node_rows {
            let (id, kind, label, location, version, extra) = row?;
            nodes.push(Self::row_to_node(session, id, kind, label, location, version, extra)?);
        }

        // Load relations in recording order
        let mut stmt = conn.prepare(
            "SELECT relation, subject, object, at
             FROM relations WHERE session_id = ?1 ORDER BY seq",
        )?;
        let relation_rows = stmt.query_map(params![session.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        let mut relations = Vec::new();
        for row in relation_rows {
            let (kind, subject, object, at) = row?;
            relations.push(Self::row_to_relation(session, kind, subject, object, at)?);
        }

        let graph = ProvenanceGraph::restore(Namespaces::from_bindings(bindings), nodes, relations)
            .map_err(|e| corrupt(session, e.to_string()))?;
        Ok(Some(graph))
    }

    fn list_sessions(&self) -> StorageResult<Vec<SessionId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM sessions ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|r| r.map(SessionId::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(e.to_string()))
}

fn corrupt(session: &SessionId, reason: impl Into<String>) -> StorageError {
    StorageError::Corrupt {
        session: session.to_string(),
        reason: reason.into(),
    }
}
