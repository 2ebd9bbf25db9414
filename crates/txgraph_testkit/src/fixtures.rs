//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use crate::faulty::{FaultSwitch, FaultyBackend};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use txgraph_core::{
    parse_mutation, CommitOutcome, CoreConfig, Database, Edit, MutationFormat, StageOutcome,
    GraphView, Timestamp, Uid, Value,
};
use txgraph_server::{GraphServer, ServerConfig};
use txgraph_storage::InMemoryBackend;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::open_in_memory().expect("Failed to open in-memory database"),
            temp_dir: None,
        }
    }

    /// Creates a new file-based test database.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_dir(temp_dir.path(), CoreConfig::default())
            .expect("Failed to open file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the data directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Drops the database and opens it again from the same directory.
    ///
    /// # Panics
    ///
    /// Panics for in-memory databases, which have nothing to reopen.
    pub fn reopen(self) -> Self {
        let temp_dir = self.temp_dir.expect("Only file databases can be reopened");
        drop(self.db);
        let db = Database::open_dir(temp_dir.path(), CoreConfig::default())
            .expect("Failed to reopen file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let db = TestDatabase::memory();
    f(&db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let db = TestDatabase::file();
    f(&db)
}

/// Opens a database over a backend that fails appends on demand.
///
/// The returned [`InMemoryBackend`] shares the log bytes, so a second
/// database can be opened over it to check what survived.
pub fn faulty_db(config: CoreConfig) -> (Database, FaultSwitch, InMemoryBackend) {
    let storage = InMemoryBackend::new();
    let (backend, switch) = FaultyBackend::wrap(storage.clone());
    let db = Database::open(Box::new(backend), config).expect("Failed to open faulty database");
    (db, switch, storage)
}

/// A protocol server over a fresh in-memory database.
pub fn test_server() -> GraphServer {
    GraphServer::open_in_memory(ServerConfig::default()).expect("Failed to open server")
}

/// A protocol server sharing `db`.
pub fn server_for(db: Arc<Database>) -> GraphServer {
    GraphServer::new(ServerConfig::default(), db)
}

/// Parses an RDF mutation, panicking on malformed input.
pub fn rdf(text: &str) -> Vec<Edit> {
    parse_mutation(text.as_bytes(), MutationFormat::Rdf).expect("Invalid RDF mutation")
}

/// Stages `text` in a fresh transaction.
pub fn stage_rdf(db: &Database, text: &str) -> StageOutcome {
    db.stage(Timestamp::ZERO, &rdf(text))
        .expect("Failed to stage mutation")
}

/// Stages and commits `text` in a fresh transaction.
pub fn commit_rdf(db: &Database, text: &str) -> (StageOutcome, CommitOutcome) {
    let staged = stage_rdf(db, text);
    let outcome = db
        .commit(staged.start_ts, &staged.keys)
        .expect("Failed to commit mutation");
    (staged, outcome)
}

/// Values of `predicate` on `uid` as text, read at `ts`.
pub fn text_at(db: &Database, ts: Timestamp, uid: Uid, predicate: &str) -> Vec<String> {
    db.read(ts, |view| {
        view.values(uid, predicate)
            .iter()
            .map(Value::to_text)
            .collect()
    })
    .expect("Failed to read")
    .1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fixture() {
        with_temp_db(|db| {
            let (staged, outcome) = commit_rdf(db, r#"_:a <name> "Alice" ."#);
            assert!(outcome.commit_ts > staged.start_ts);
            let alice = staged.uids["a"];
            assert_eq!(text_at(db, Timestamp::ZERO, alice, "name"), vec!["Alice"]);
        });
    }

    #[test]
    fn file_fixture_reopens() {
        let db = TestDatabase::file();
        assert!(db.path().is_some());
        let (staged, _) = commit_rdf(&db, r#"_:a <name> "Alice" ."#);
        let db = db.reopen();
        assert_eq!(
            text_at(&db, Timestamp::ZERO, staged.uids["a"], "name"),
            vec!["Alice"]
        );
    }
}
