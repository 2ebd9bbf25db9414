//! Alteration options.

use crate::error::{ServerError, ServerResult};
use serde::Deserialize;
use txgraph_core::Alteration;

/// The structured alteration body. Every field must be present.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlterOptions {
    /// Drop all data and schema.
    pub drop_all: bool,
    /// Predicate to drop; empty for none.
    pub drop_attr: String,
    /// Schema text to merge; empty for none.
    pub schema: String,
}

impl AlterOptions {
    /// Parses a request body.
    ///
    /// A body that is not a JSON object is taken as raw schema text.
    ///
    /// # Errors
    ///
    /// A JSON object with missing, unknown or mistyped fields is invalid.
    pub fn from_body(body: &[u8]) -> ServerResult<Self> {
        let text = std::str::from_utf8(body)
            .map_err(|e| ServerError::invalid_request(format!("alter body is not UTF-8: {e}")))?;
        if !text.trim_start().starts_with('{') {
            return Ok(Self {
                drop_all: false,
                drop_attr: String::new(),
                schema: text.to_string(),
            });
        }
        serde_json::from_str(text)
            .map_err(|e| ServerError::invalid_request(format!("invalid alter options: {e}")))
    }

    /// The single action these options ask for.
    ///
    /// # Errors
    ///
    /// Zero or several active options are invalid.
    pub fn into_alteration(self) -> ServerResult<Alteration> {
        let mut active = Vec::with_capacity(1);
        if self.drop_all {
            active.push(Alteration::DropAll);
        }
        if !self.drop_attr.trim().is_empty() {
            active.push(Alteration::DropAttr(self.drop_attr.trim().to_string()));
        }
        if !self.schema.trim().is_empty() {
            active.push(Alteration::Schema(self.schema));
        }
        match active.len() {
            1 => active
                .pop()
                .ok_or_else(|| ServerError::internal("alteration vanished")),
            0 => Err(ServerError::invalid_request(
                "alter needs one of drop_all, drop_attr or schema",
            )),
            _ => Err(ServerError::invalid_request(
                "only one of drop_all, drop_attr or schema may be set",
            )),
        }
    }
}
