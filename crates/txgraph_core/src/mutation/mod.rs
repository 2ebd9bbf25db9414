//! Mutation bodies.
//!
//! A mutation is a list of [`Edit`]s. Two wire formats are accepted:
//! RDF N-Quads inside `set { }` / `delete { }` blocks, and JSON objects
//! under `"set"` / `"delete"`. Both produce the same edit list.

mod json;
mod nquad;

pub use json::parse_json;
pub use nquad::parse_rdf;

use crate::error::{CoreError, CoreResult};
use crate::types::Uid;
use crate::value::{Value, ValueType};
use std::fmt;

/// Whether an edit adds or removes data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditOp {
    /// Add or replace.
    Set,
    /// Remove.
    Delete,
}

/// A node reference as written by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// An existing node.
    Uid(Uid),
    /// A blank node, resolved to a fresh uid once per stage call.
    Blank(String),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Uid(uid) => write!(f, "<{uid}>"),
            NodeRef::Blank(name) => write!(f, "_:{name}"),
        }
    }
}

/// Predicate position of an edit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PredicateRef {
    /// A named predicate.
    Named(String),
    /// `*`: every predicate of the subject (delete only).
    Star,
}

/// Object position of an edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// RDF literal text with an optional `^^<xs:...>` type hint.
    Text {
        /// Literal contents, unescaped.
        text: String,
        /// Type hint.
        hint: Option<ValueType>,
    },
    /// A typed JSON scalar.
    Scalar(Value),
    /// Edge to a node.
    Node(NodeRef),
    /// `*`: every value (delete only).
    Star,
}

/// One set or delete against one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    /// Set or delete.
    pub op: EditOp,
    /// Node being changed.
    pub subject: NodeRef,
    /// Predicate being changed.
    pub predicate: PredicateRef,
    /// Value added or removed.
    pub object: Object,
}

impl Edit {
    /// A set edit.
    #[must_use]
    pub fn set(subject: NodeRef, predicate: impl Into<String>, object: Object) -> Self {
        Self {
            op: EditOp::Set,
            subject,
            predicate: PredicateRef::Named(predicate.into()),
            object,
        }
    }

    /// A delete edit.
    #[must_use]
    pub fn delete(subject: NodeRef, predicate: PredicateRef, object: Object) -> Self {
        Self {
            op: EditOp::Delete,
            subject,
            predicate,
            object,
        }
    }

    /// Rejects star positions the op does not allow.
    pub(crate) fn check_shape(&self) -> CoreResult<()> {
        match (self.op, &self.predicate, &self.object) {
            (EditOp::Set, PredicateRef::Star, _) | (EditOp::Set, _, Object::Star) => Err(
                CoreError::invalid_edit(format!("{}: set cannot use *", self.subject)),
            ),
            (EditOp::Delete, PredicateRef::Star, object) if *object != Object::Star => {
                Err(CoreError::invalid_edit(format!(
                    "{}: delete with * predicate needs * object",
                    self.subject
                )))
            }
            (EditOp::Delete, _, _) if matches!(self.subject, NodeRef::Blank(_)) => {
                Err(CoreError::invalid_edit(format!(
                    "{}: cannot delete from a blank node",
                    self.subject
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Mutation body format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationFormat {
    /// RDF N-Quads.
    #[default]
    Rdf,
    /// JSON objects.
    Json,
}

/// Parses a mutation body in the given format.
///
/// # Errors
///
/// Returns [`CoreError::InvalidMutation`] or [`CoreError::InvalidEdit`] for
/// malformed bodies, and [`CoreError::EmptyMutation`] when nothing is edited.
pub fn parse_mutation(body: &[u8], format: MutationFormat) -> CoreResult<Vec<Edit>> {
    let text = std::str::from_utf8(body)
        .map_err(|e| CoreError::invalid_mutation(1, format!("body is not UTF-8: {e}")))?;
    let edits = match format {
        MutationFormat::Rdf => parse_rdf(text)?,
        MutationFormat::Json => parse_json(text)?,
    };
    for edit in &edits {
        edit.check_shape()?;
    }
    if edits.is_empty() {
        return Err(CoreError::EmptyMutation);
    }
    Ok(edits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_agree() {
        let rdf = parse_mutation(
            br#"{ set { _:a <name> "Alice" . } }"#,
            MutationFormat::Rdf,
        )
        .unwrap();
        let json = parse_mutation(
            br#"{"set": [{"uid": "_:a", "name": "Alice"}]}"#,
            MutationFormat::Json,
        )
        .unwrap();
        assert_eq!(rdf.len(), 1);
        assert_eq!(json.len(), 1);
        assert_eq!(rdf[0].subject, json[0].subject);
        assert_eq!(rdf[0].predicate, json[0].predicate);
    }

    #[test]
    fn empty_mutation_rejected() {
        assert!(matches!(
            parse_mutation(b"{ set { } }", MutationFormat::Rdf),
            Err(CoreError::EmptyMutation)
        ));
        assert!(matches!(
            parse_mutation(b"{}", MutationFormat::Json),
            Err(CoreError::EmptyMutation)
        ));
    }

    #[test]
    fn star_shapes() {
        let bad = Edit {
            op: EditOp::Set,
            subject: NodeRef::Uid(Uid::new(1)),
            predicate: PredicateRef::Named("name".into()),
            object: Object::Star,
        };
        assert!(bad.check_shape().is_err());

        let bad = Edit::delete(
            NodeRef::Uid(Uid::new(1)),
            PredicateRef::Star,
            Object::Scalar(Value::Int(1)),
        );
        assert!(bad.check_shape().is_err());

        let ok = Edit::delete(NodeRef::Uid(Uid::new(1)), PredicateRef::Star, Object::Star);
        assert!(ok.check_shape().is_ok());

        let blank = Edit::delete(
            NodeRef::Blank("x".into()),
            PredicateRef::Named("name".into()),
            Object::Star,
        );
        assert!(blank.check_shape().is_err());
    }

    #[test]
    fn non_utf8_rejected() {
        assert!(matches!(
            parse_mutation(&[0xff, 0xfe], MutationFormat::Rdf),
            Err(CoreError::InvalidMutation { .. })
        ));
    }
}
