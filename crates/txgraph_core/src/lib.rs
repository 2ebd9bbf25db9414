//! # txgraph Core
//!
//! Transaction coordinator for the txgraph graph store.
//!
//! This crate provides:
//! - A timestamp oracle and uid leasing
//! - A versioned graph store read through point-in-time snapshots
//! - Mutation parsing (RDF n-quads and JSON) and staging
//! - Conflict detection and commit over an ordered commit index
//! - A durable commit log with crash recovery
//!
//! [`Database`] ties these together.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod database;
mod error;
mod gate;
mod log;
mod mutation;
mod oracle;
mod schema;
mod snapshot;
mod stager;
mod store;
mod txn;
mod types;
mod value;

pub use config::CoreConfig;
pub use coordinator::{CommitCoordinator, CommitOutcome, CommitRequest, GcStats};
pub use database::{Alteration, Database, StageOutcome};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use log::{CommitLog, LogRecord, Replay, HEADER_SIZE, LOG_MAGIC, LOG_VERSION};
pub use mutation::{
    parse_json, parse_mutation, parse_rdf, Edit, EditOp, MutationFormat, NodeRef, Object,
    PredicateRef,
};
pub use oracle::{AtomicOracle, TimestampOracle, UidLeaser};
pub use schema::{PredicateSchema, Schema};
pub use snapshot::{GraphView, Snapshot};
pub use stager::RESERVED_UID_PREDICATE;
pub use store::{GraphStore, Write};
pub use txn::{Transaction, TxnHandle, TxnState, TxnTable};
pub use types::{Key, ParseUidError, Timestamp, Uid};
pub use value::{Value, ValueType};
