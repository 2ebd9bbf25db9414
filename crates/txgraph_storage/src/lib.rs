//! # txgraph storage
//!
//! Byte-store backends underneath the txgraph commit log.
//!
//! A backend is an append-only sequence of bytes. It knows nothing about
//! commit records, checksums, or timestamps; the commit log in
//! `txgraph_core` owns the record format and replay.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral coordinators and tests
//! - [`FileBackend`] - a single log file on the local file system
//!
//! ## Example
//!
//! ```rust
//! use txgraph_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut log = InMemoryBackend::new();
//! let first = log.append(b"record-1").unwrap();
//! let second = log.append(b"record-2").unwrap();
//! assert_eq!(first, 0);
//! assert_eq!(second, 8);
//! assert_eq!(log.read_at(second, 8).unwrap(), b"record-2");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, LOG_FILE_NAME};
pub use memory::InMemoryBackend;
