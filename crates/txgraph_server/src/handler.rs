//! Request handlers for the query, mutate, commit, abort and alter routes.

use crate::alter::AlterOptions;
use crate::config::ServerConfig;
use crate::envelope::{Envelope, TxnContext};
use crate::error::{ServerError, ServerResult};
use crate::request::{header, Headers};
use serde_json::{Map, Value as Json};
use std::sync::Arc;
use tracing::{debug, info};
use txgraph_core::{parse_mutation, Database, Key, MutationFormat, Timestamp};
use txgraph_query::{parse_query, QueryEngine};

/// Shared state for request handling.
#[derive(Debug)]
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The database every route operates on.
    pub db: Arc<Database>,
    engine: QueryEngine,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, db: Arc<Database>) -> Self {
        Self {
            config,
            db,
            engine: QueryEngine::new(),
        }
    }
}

/// Handler for protocol requests.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Runs a query at `ts`, or at a fresh timestamp when `ts` is zero.
    ///
    /// The query is parsed before a timestamp is allocated.
    pub fn handle_query(&self, ts: Timestamp, body: &[u8]) -> ServerResult<Envelope> {
        let text = utf8(body, "query")?;
        let query = parse_query(text)?;
        let engine = self.context.engine;
        let (read_ts, result) = self.context.db.read(ts, |view| engine.run(&query, view))?;
        let data = result?;
        debug!(read_ts = %read_ts, blocks = query.blocks.len(), "query served");
        Ok(Envelope::ok(data, Some(TxnContext::started(read_ts))))
    }

    /// Stages a mutation, committing it too when the request asks for that.
    pub fn handle_mutate(
        &self,
        ts: Timestamp,
        headers: &Headers,
        body: &[u8],
    ) -> ServerResult<Envelope> {
        let format = match headers
            .get_any(&[header::MUTATION_TYPE, header::MUTATION_TYPE_ALIAS])
            .map(str::trim)
        {
            None => MutationFormat::Rdf,
            Some(kind) if kind.eq_ignore_ascii_case("rdf") => MutationFormat::Rdf,
            Some(kind) if kind.eq_ignore_ascii_case("json") => MutationFormat::Json,
            Some(other) => {
                return Err(ServerError::invalid_request(format!(
                    "unknown mutation type {other:?}"
                )))
            }
        };
        let edits = parse_mutation(body, format)?;
        let staged = self.context.db.stage(ts, &edits)?;

        let mut txn = TxnContext::started(staged.start_ts);
        if headers.flag_any(&[header::COMMIT_NOW, header::COMMIT_NOW_ALIAS]) {
            let outcome = self.context.db.commit(staged.start_ts, &staged.keys)?;
            txn.commit_ts = Some(outcome.commit_ts);
        }
        debug!(
            start_ts = %staged.start_ts,
            edits = edits.len(),
            keys = staged.keys.len(),
            committed = txn.commit_ts.is_some(),
            "mutation served"
        );
        txn.keys = staged.keys;

        let mut data = Envelope::done();
        if self.context.config.expose_uids {
            let uids: Map<String, Json> = staged
                .uids
                .iter()
                .map(|(blank, uid)| (blank.clone(), Json::String(uid.to_string())))
                .collect();
            data.insert("uids".into(), Json::Object(uids));
        }
        Ok(Envelope::ok(Json::Object(data), Some(txn)))
    }

    /// Commits the transaction started at `ts`.
    ///
    /// The body is a JSON array of conflict keys; an empty body means none.
    pub fn handle_commit(&self, ts: Timestamp, body: &[u8]) -> ServerResult<Envelope> {
        let keys: Vec<Key> = if body.iter().all(u8::is_ascii_whitespace) {
            Vec::new()
        } else {
            serde_json::from_slice(body).map_err(|e| {
                ServerError::invalid_request(format!("commit body must be a JSON array of keys: {e}"))
            })?
        };
        let outcome = self.context.db.commit(ts, &keys)?;
        debug!(
            start_ts = %outcome.start_ts,
            commit_ts = %outcome.commit_ts,
            replayed = outcome.replayed,
            "commit served"
        );
        let txn = TxnContext {
            commit_ts: Some(outcome.commit_ts),
            ..TxnContext::started(outcome.start_ts)
        };
        Ok(Envelope::ok(Json::Object(Envelope::done()), Some(txn)))
    }

    /// Aborts the transaction started at `ts`.
    pub fn handle_abort(&self, ts: Timestamp) -> ServerResult<Envelope> {
        self.context.db.abort(ts)?;
        let txn = TxnContext {
            aborted: true,
            ..TxnContext::started(ts)
        };
        Ok(Envelope::ok(Json::Object(Envelope::done()), Some(txn)))
    }

    /// Applies a schema change or drop.
    pub fn handle_alter(&self, body: &[u8]) -> ServerResult<Envelope> {
        let alteration = AlterOptions::from_body(body)?.into_alteration()?;
        info!(alteration = ?alteration, "alter requested");
        self.context.db.alter(alteration)?;
        Ok(Envelope::ok(Json::Object(Envelope::done()), None))
    }
}

fn utf8<'a>(body: &'a [u8], what: &str) -> ServerResult<&'a str> {
    std::str::from_utf8(body)
        .map_err(|e| ServerError::invalid_request(format!("{what} body is not UTF-8: {e}")))
}
