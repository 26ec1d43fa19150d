//! Common test utilities for simprov integration tests
//!
//! Builders for the transfers a workbench session typically records, and
//! an on-disk ledger in a temporary directory.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use simprov::provenance::FileTransfer;
use simprov::{OpenStore, ProvenanceEngine, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Fixed start time so assertions can name it
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
}

/// Upload of `name` from the local machine, started at [`t0`]
pub fn upload(name: &str, activity: &str) -> FileTransfer {
    FileTransfer::new(format!("local:{}", name), format!("remote:{}", name), "config", activity).with_started_at(t0())
}

/// Local copy of `name` into `dir`
pub fn copy(name: &str, dir: &str, activity: &str) -> FileTransfer {
    FileTransfer::new(
        format!("local:{}", name),
        format!("local:{}/{}", dir, name),
        "config",
        activity,
    )
}

/// A ledger database inside a temporary directory
pub struct TempLedger {
    pub dir: TempDir,
}

impl TempLedger {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("ledger.db")
    }

    /// Fresh engine over the ledger with every stored session loaded
    pub fn engine(&self) -> ProvenanceEngine {
        open_engine(&self.path())
    }
}

pub fn open_engine(path: &Path) -> ProvenanceEngine {
    let store = SqliteStore::open(path).unwrap();
    let engine = ProvenanceEngine::with_store(Arc::new(store));
    engine.load_all().unwrap();
    engine
}
