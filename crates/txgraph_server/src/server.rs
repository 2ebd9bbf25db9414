//! Main protocol server.

use crate::compression::{self, Encoding};
use crate::config::ServerConfig;
use crate::envelope::Envelope;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::request::{header, Headers, Request, Response, Route};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};
use txgraph_core::{CoreResult, Database};

/// The graph protocol server.
///
/// Maps transport-agnostic [`Request`]s onto the database and encodes the
/// result as a JSON envelope, compressed when the client allows it. The
/// transport (HTTP framing, connection handling) lives outside this crate.
///
/// # Example
///
/// ```rust,ignore
/// use txgraph_server::{GraphServer, Request, ServerConfig};
///
/// let server = GraphServer::open_in_memory(ServerConfig::default())?;
/// let response = server.handle(&Request::post("/query", "{ q(func: has(name)) { name } }"));
/// assert_eq!(response.status, 200);
/// ```
#[derive(Debug, Clone)]
pub struct GraphServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl GraphServer {
    /// Creates a server over an existing database.
    pub fn new(config: ServerConfig, db: Arc<Database>) -> Self {
        let context = Arc::new(HandlerContext::new(config, db));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Creates a server over a fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Propagates database open failures.
    pub fn open_in_memory(config: ServerConfig) -> CoreResult<Self> {
        Ok(Self::new(config, Arc::new(Database::open_in_memory()?)))
    }

    /// The database behind this server.
    #[must_use]
    pub fn database(&self) -> &Arc<Database> {
        &self.context.db
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Handles one request. Never fails; errors come back in the envelope.
    pub fn handle(&self, request: &Request) -> Response {
        let (status, envelope) = match self.dispatch(request) {
            Ok(envelope) => (200, envelope),
            Err(err) => {
                if err.is_client_error() {
                    debug!(method = %request.method, path = %request.path, error = %err, "request rejected");
                } else {
                    warn!(method = %request.method, path = %request.path, error = %err, "request failed");
                }
                (err.status(), Envelope::error(&err))
            }
        };
        self.encode(request, status, &envelope)
    }

    fn dispatch(&self, request: &Request) -> ServerResult<Envelope> {
        let limit = self.context.config.max_body_bytes;
        if request.body.len() > limit {
            return Err(ServerError::PayloadTooLarge {
                size: request.body.len(),
                limit,
            });
        }
        let route = Route::resolve(&request.method, &request.path)?;
        let body = self.request_body(request)?;
        debug!(route = route.name(), bytes = body.len(), "dispatching request");

        match route {
            Route::Query(ts) => self.handler.handle_query(ts, &body),
            Route::Mutate(ts) => self.handler.handle_mutate(ts, &request.headers, &body),
            Route::Commit(ts) => self.handler.handle_commit(ts, &body),
            Route::Abort(ts) => self.handler.handle_abort(ts),
            Route::Alter => self.handler.handle_alter(&body),
        }
    }

    fn request_body<'a>(&self, request: &'a Request) -> ServerResult<Cow<'a, [u8]>> {
        let encoding = match request.header(header::CONTENT_ENCODING) {
            Some(value) => Encoding::from_header(value)?,
            None => None,
        };
        let Some(encoding) = encoding else {
            return Ok(Cow::Borrowed(&request.body));
        };
        let body = compression::decompress(&request.body, encoding)?;
        let limit = self.context.config.max_body_bytes;
        if body.len() > limit {
            return Err(ServerError::PayloadTooLarge {
                size: body.len(),
                limit,
            });
        }
        Ok(Cow::Owned(body))
    }

    fn encode(&self, request: &Request, status: u16, envelope: &Envelope) -> Response {
        let body = match envelope.to_bytes() {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "envelope encoding failed");
                let fallback = format!(
                    r#"{{"errors":[{{"code":"{}","message":"envelope encoding failed"}}]}}"#,
                    err.code()
                );
                fallback.into_bytes()
            }
        };

        let mut headers = Headers::new();
        headers.set(header::CONTENT_TYPE, "application/json");
        let wanted = compression::negotiate(request.header(header::ACCEPT_ENCODING));
        match compression::compress(&body, wanted, &self.context.config.compression) {
            Ok(Some((encoding, compressed))) => {
                headers.set(header::CONTENT_ENCODING, encoding.as_str());
                return Response {
                    status,
                    headers,
                    body: compressed,
                };
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "response compression failed, sending plain"),
        }
        Response {
            status,
            headers,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionConfig;
    use serde_json::{json, Value as Json};

    fn server() -> GraphServer {
        GraphServer::open_in_memory(ServerConfig::default()).unwrap()
    }

    fn body(response: &Response) -> Json {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[test]
    fn server_lifecycle() {
        let server = server();
        assert_eq!(server.config().max_body_bytes, 4 * 1024 * 1024);
        assert_eq!(server.database().log_size().unwrap(), 0);
    }

    #[test]
    fn transport_errors_have_status_and_envelope() {
        let server = server();
        let missing = server.handle(&Request::post("/nope", ""));
        assert_eq!(missing.status, 404);
        assert_eq!(body(&missing)["errors"][0]["code"], "ErrorInvalidRequest");

        let wrong = server.handle(&Request::new("GET", "/mutate", ""));
        assert_eq!(wrong.status, 405);

        let small = GraphServer::open_in_memory(ServerConfig::default().with_max_body_bytes(4)).unwrap();
        let big = small.handle(&Request::post("/query", "{ q(func: has(x)) { x } }"));
        assert_eq!(big.status, 413);
    }

    #[test]
    fn application_errors_use_status_200() {
        let server = server();
        let response = server.handle(&Request::post("/mutate", "not rdf"));
        assert_eq!(response.status, 200);
        assert_eq!(response.header(header::CONTENT_TYPE), Some("application/json"));
        let value = body(&response);
        assert_eq!(value["errors"].as_array().unwrap().len(), 1);
        assert!(value.get("data").is_none());
    }

    #[test]
    fn compressed_request_body() {
        let server = server();
        let (_, packed) = compression::compress(
            br#"_:a <name> "Alice" ."#,
            Some(Encoding::Gzip),
            &CompressionConfig::default(),
        )
        .unwrap()
        .unwrap();
        let request = Request::post("/mutate", packed)
            .with_header(header::CONTENT_ENCODING, "gzip")
            .with_header(header::COMMIT_NOW, "true");
        let value = body(&server.handle(&request));
        assert!(value["extensions"]["txn"]["commit_ts"].is_u64(), "{value}");

        let garbage = Request::post("/query", "plain").with_header(header::CONTENT_ENCODING, "zstd");
        let value = body(&server.handle(&garbage));
        assert_eq!(value["errors"][0]["code"], "ErrorInvalidRequest");
    }

    #[test]
    fn conflict_envelope_marks_txn_aborted() {
        let server = server();
        let first = body(&server.handle(&Request::post("/mutate", r#"<0x1> <name> "A" ."#)));
        let second = body(&server.handle(&Request::post("/mutate", r#"<0x1> <name> "B" ."#)));
        let ts1 = first["extensions"]["txn"]["start_ts"].as_u64().unwrap();
        let ts2 = second["extensions"]["txn"]["start_ts"].as_u64().unwrap();

        let ok = body(&server.handle(&Request::post(format!("/commit/{ts2}"), "")));
        assert!(ok["extensions"]["txn"]["commit_ts"].is_u64());

        let lost = server.handle(&Request::post(format!("/commit/{ts1}"), ""));
        assert_eq!(lost.status, 200);
        let lost = body(&lost);
        assert_eq!(lost["errors"][0]["code"], "ErrorAborted");
        assert_eq!(lost["extensions"]["txn"], json!({"start_ts": ts1, "aborted": true}));
    }
}
