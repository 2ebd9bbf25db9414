//! # txgraph Query
//!
//! A small graph query language evaluated against a point-in-time
//! [`txgraph_core::GraphView`].
//!
//! ```text
//! {
//!   people(func: anyofterms(name, "alice bob"), orderasc: name, first: 10) {
//!     uid
//!     name
//!     friend @filter(has(age)) { name age }
//!   }
//! }
//! ```
//!
//! Results are JSON objects keyed by block name. Scalar predicates render
//! as values, list predicates and edges as arrays, and nodes without any
//! selected value are left out.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ast;
mod error;
mod exec;
mod lexer;
mod parser;

pub use error::{QueryError, QueryResult};
pub use exec::{tokenize_terms, QueryEngine};
pub use lexer::{tokenize, Spanned, Token};
pub use parser::{parse_query, MAX_DEPTH};
