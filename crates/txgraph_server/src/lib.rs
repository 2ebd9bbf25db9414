//! # txgraph server
//!
//! Protocol front end for the txgraph transaction coordinator.
//!
//! This crate provides:
//! - Routing for `/query`, `/mutate`, `/commit`, `/abort` and `/alter`
//! - Start timestamp threading through path segments
//! - The JSON response envelope with transaction metadata
//! - Error mapping onto machine-checkable codes
//! - Response compression negotiated through `Accept-Encoding`
//!
//! # Protocol
//!
//! A transaction runs over several calls:
//! 1. `POST /query` or `POST /mutate` without a timestamp allocates one and
//!    reports it in `extensions.txn.start_ts`
//! 2. Later calls pass it back as `/mutate/{ts}` or `/query/{ts}`
//! 3. `POST /commit/{ts}` with the collected keys publishes the writes, or
//!    reports `ErrorAborted` when a later commit touched the same keys
//!
//! Setting `X-Commit-Now: true` on a mutate folds steps 2 and 3 together.
//!
//! The crate is transport-agnostic: [`GraphServer::handle`] maps a
//! [`Request`] to a [`Response`], and the caller owns the wire framing.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod alter;
mod compression;
mod config;
mod envelope;
mod error;
mod handler;
mod request;
mod server;

pub use alter::AlterOptions;
pub use compression::{compress, decompress, negotiate, Encoding};
pub use config::{CompressionConfig, ServerConfig};
pub use envelope::{Envelope, ErrorEntry, Extensions, TxnContext};
pub use error::{ErrorCode, ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use request::{header, Headers, Request, Response, Route};
pub use server::GraphServer;
