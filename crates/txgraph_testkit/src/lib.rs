//! # txgraph testkit
//!
//! Test utilities for txgraph.
//!
//! This crate provides:
//! - Database fixtures, in memory or backed by a temp directory
//! - A fault-injecting storage backend
//! - Property-based test generators using proptest
//! - Concurrency stress helpers built on scoped threads
//!
//! ## Usage
//!
//! ```rust,ignore
//! use txgraph_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_temp_db(|db| {
//!         let (staged, outcome) = commit_rdf(db, r#"_:a <name> "Alice" ."#);
//!         assert!(outcome.commit_ts > staged.start_ts);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
