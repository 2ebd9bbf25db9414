//! Transport-agnostic request and response types, plus routing.

use crate::error::{ServerError, ServerResult};
use txgraph_core::Timestamp;

/// Header names the front end reads or writes.
pub mod header {
    /// Selects the mutation body format; `json` or `rdf`.
    pub const MUTATION_TYPE: &str = "X-Mutation-Type";
    /// Alternate spelling of [`MUTATION_TYPE`] sent by Dgraph clients.
    pub const MUTATION_TYPE_ALIAS: &str = "X-Dgraph-MutationType";
    /// `true` commits right after staging.
    pub const COMMIT_NOW: &str = "X-Commit-Now";
    /// Alternate spelling of [`COMMIT_NOW`] sent by Dgraph clients.
    pub const COMMIT_NOW_ALIAS: &str = "X-Dgraph-CommitNow";
    /// Client compression capabilities.
    pub const ACCEPT_ENCODING: &str = "Accept-Encoding";
    /// Compression applied to a body.
    pub const CONTENT_ENCODING: &str = "Content-Encoding";
    /// Body media type.
    pub const CONTENT_TYPE: &str = "Content-Type";
}

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Creates an empty header list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`, compared case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First value under any of `names`, tried in order.
    #[must_use]
    pub fn get_any(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.get(name))
    }

    /// Replaces any existing value for `name`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.0.push((name, value.into()));
    }

    /// True when `name` is present and equals `true` (any case).
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// [`Headers::flag`] over the first of `names` that is present.
    #[must_use]
    pub fn flag_any(&self, names: &[&str]) -> bool {
        self.get_any(names)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// An inbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Upper-case method, e.g. `POST`.
    pub method: String,
    /// Path without query string.
    pub path: String,
    /// Request headers.
    pub headers: Headers,
    /// Raw body.
    pub body: Vec<u8>,
}

impl Request {
    /// Creates a request.
    pub fn new(method: impl Into<String>, path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// Shorthand for a `POST`.
    pub fn post(path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self::new("POST", path, body)
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Header value, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// True when `name` is present and equals `true` (any case).
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.headers.flag(name)
    }
}

/// An outbound reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Transport status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Possibly compressed body.
    pub body: Vec<u8>,
}

impl Response {
    /// Header value, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// A resolved route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `/query[/{ts}]`
    Query(Timestamp),
    /// `/mutate[/{ts}]`
    Mutate(Timestamp),
    /// `/commit/{ts}`
    Commit(Timestamp),
    /// `/abort/{ts}`
    Abort(Timestamp),
    /// `/alter`
    Alter,
}

impl Route {
    /// Resolves `method` and `path` to a route.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown paths, `MethodNotAllowed` for a known path with
    /// the wrong method, and `InvalidRequest` for a malformed timestamp.
    pub fn resolve(method: &str, path: &str) -> ServerResult<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let (route, methods): (Route, &[&str]) = match segments.as_slice() {
            ["query"] => (Route::Query(Timestamp::ZERO), &["POST"]),
            ["query", ts] => (Route::Query(parse_ts(ts)?), &["POST"]),
            ["mutate"] => (Route::Mutate(Timestamp::ZERO), &["POST"]),
            ["mutate", ts] => (Route::Mutate(parse_ts(ts)?), &["POST"]),
            ["commit", ts] => (Route::Commit(parse_ts(ts)?), &["POST"]),
            ["abort", ts] => (Route::Abort(parse_ts(ts)?), &["POST"]),
            ["alter"] => (Route::Alter, &["POST", "PUT"]),
            _ => return Err(ServerError::NotFound(path.to_string())),
        };
        if methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
            Ok(route)
        } else {
            Err(ServerError::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
            })
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Route::Query(_) => "query",
            Route::Mutate(_) => "mutate",
            Route::Commit(_) => "commit",
            Route::Abort(_) => "abort",
            Route::Alter => "alter",
        }
    }
}

fn parse_ts(segment: &str) -> ServerResult<Timestamp> {
    segment
        .parse::<u64>()
        .map(Timestamp::new)
        .map_err(|_| ServerError::invalid_request(format!("invalid timestamp {segment:?} in path")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive() {
        let mut headers = Headers::new();
        headers.set("Accept-Encoding", "gzip");
        headers.set("accept-encoding", "zstd");
        assert_eq!(headers.get("ACCEPT-ENCODING"), Some("zstd"));
        assert_eq!(headers.iter().count(), 1);
    }

    #[test]
    fn flags() {
        let req = Request::post("/mutate", "").with_header(header::COMMIT_NOW, " True ");
        assert!(req.flag(header::COMMIT_NOW));
        assert!(!req.flag(header::MUTATION_TYPE));
    }

    #[test]
    fn aliases_are_tried_in_order() {
        let mut headers = Headers::new();
        headers.set("x-dgraph-commitnow", "true");
        headers.set(header::MUTATION_TYPE_ALIAS, "json");
        assert!(headers.flag_any(&[header::COMMIT_NOW, header::COMMIT_NOW_ALIAS]));
        assert_eq!(
            headers.get_any(&[header::MUTATION_TYPE, header::MUTATION_TYPE_ALIAS]),
            Some("json")
        );

        headers.set(header::MUTATION_TYPE, "rdf");
        headers.set(header::COMMIT_NOW, "false");
        assert_eq!(
            headers.get_any(&[header::MUTATION_TYPE, header::MUTATION_TYPE_ALIAS]),
            Some("rdf")
        );
        assert!(!headers.flag_any(&[header::COMMIT_NOW, header::COMMIT_NOW_ALIAS]));
    }

    #[test]
    fn routes() {
        assert_eq!(
            Route::resolve("POST", "/query").unwrap(),
            Route::Query(Timestamp::ZERO)
        );
        assert_eq!(
            Route::resolve("post", "/mutate/7/").unwrap(),
            Route::Mutate(Timestamp::new(7))
        );
        assert_eq!(
            Route::resolve("POST", "/commit/12").unwrap(),
            Route::Commit(Timestamp::new(12))
        );
        assert_eq!(Route::resolve("PUT", "/alter").unwrap(), Route::Alter);
    }

    #[test]
    fn route_errors() {
        assert!(matches!(
            Route::resolve("POST", "/commit"),
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            Route::resolve("GET", "/query"),
            Err(ServerError::MethodNotAllowed { .. })
        ));
        assert!(matches!(
            Route::resolve("POST", "/query/abc"),
            Err(ServerError::InvalidRequest(_))
        ));
    }
}
