//! Mutation stager.
//!
//! Staging runs in two steps. [`validate`] type-checks every edit against
//! the schema and touches nothing else, so malformed requests are rejected
//! before a timestamp or uid is spent. [`resolve`] then maps blank nodes to
//! fresh uids, decides cardinality, and derives one conflict key per
//! distinct (node, predicate).

use crate::error::{CoreError, CoreResult};
use crate::mutation::{Edit, EditOp, NodeRef, Object, PredicateRef};
use crate::oracle::UidLeaser;
use crate::schema::Schema;
use crate::snapshot::GraphView;
use crate::store::Write;
use crate::types::{Key, Uid};
use crate::value::{Value, ValueType};
use std::collections::{BTreeMap, BTreeSet};

/// Predicate name reserved for node identity in queries and JSON bodies.
pub const RESERVED_UID_PREDICATE: &str = "uid";

/// An edit whose value already has the predicate's type.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedEdit {
    op: EditOp,
    subject: NodeRef,
    predicate: PredicateRef,
    object: CheckedObject,
}

#[derive(Debug, Clone, PartialEq)]
enum CheckedObject {
    Value(Value),
    Node(NodeRef),
    Star,
}

/// Everything one stage call adds to a transaction.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StagePlan {
    /// Writes in edit order.
    pub writes: Vec<Write>,
    /// Conflict keys, deduplicated.
    pub keys: BTreeSet<Key>,
    /// Blank node name to the uid it resolved to.
    pub uids: BTreeMap<String, Uid>,
}

/// Type-checks `edits` against `schema`.
///
/// # Errors
///
/// [`CoreError::SchemaMismatch`] when a value does not fit the declared
/// type, [`CoreError::InvalidEdit`] for writes to the reserved `uid`
/// predicate.
pub fn validate(edits: &[Edit], schema: &Schema) -> CoreResult<Vec<CheckedEdit>> {
    edits
        .iter()
        .map(|edit| {
            edit.check_shape()?;
            let object = match (&edit.predicate, &edit.object) {
                (PredicateRef::Named(predicate), object) => {
                    if predicate == RESERVED_UID_PREDICATE {
                        return Err(CoreError::invalid_edit(
                            "\"uid\" is reserved and cannot be written",
                        ));
                    }
                    check_object(predicate, object, schema)?
                }
                (PredicateRef::Star, _) => CheckedObject::Star,
            };
            Ok(CheckedEdit {
                op: edit.op,
                subject: edit.subject.clone(),
                predicate: edit.predicate.clone(),
                object,
            })
        })
        .collect()
}

fn check_object(predicate: &str, object: &Object, schema: &Schema) -> CoreResult<CheckedObject> {
    let declared = schema.value_type(predicate);
    let mismatch = |message: String| CoreError::schema_mismatch(predicate, message);
    match object {
        Object::Text { text, hint } => {
            let ty = match (declared, hint) {
                (ValueType::Default, Some(hint)) => *hint,
                _ => declared,
            };
            ty.parse_text(text).map(CheckedObject::Value).map_err(mismatch)
        }
        Object::Scalar(value) => declared
            .convert(value.clone())
            .map(CheckedObject::Value)
            .map_err(mismatch),
        Object::Node(node) => match declared {
            ValueType::Default | ValueType::Uid => Ok(CheckedObject::Node(node.clone())),
            other => Err(mismatch(format!("edge given for a {other} predicate"))),
        },
        Object::Star => Ok(CheckedObject::Star),
    }
}

/// Resolves checked edits into writes and conflict keys.
///
/// Blank nodes are resolved once per call: the first occurrence leases a
/// uid and later occurrences reuse it. `view` is the transaction's own
/// view at its start timestamp; a `<uid> * *` delete becomes one clear per
/// predicate the node has there. Predicates other transactions add later
/// are left alone.
pub fn resolve(
    checked: Vec<CheckedEdit>,
    schema: &Schema,
    leaser: &UidLeaser,
    view: &dyn GraphView,
) -> CoreResult<StagePlan> {
    let mut plan = StagePlan::default();
    let mut node = |reference: NodeRef, uids: &mut BTreeMap<String, Uid>| match reference {
        NodeRef::Uid(uid) => {
            leaser.advance_past(uid);
            uid
        }
        NodeRef::Blank(name) => *uids.entry(name).or_insert_with(|| leaser.lease()),
    };

    for edit in checked {
        let uid = node(edit.subject, &mut plan.uids);
        let object = match edit.object {
            CheckedObject::Value(value) => Some(value),
            CheckedObject::Node(target) => Some(Value::Uid(node(target, &mut plan.uids))),
            CheckedObject::Star => None,
        };
        let write = match (edit.op, edit.predicate, object) {
            (EditOp::Set, PredicateRef::Named(predicate), Some(value)) => Write::Set {
                list: schema.is_list(&predicate, &value),
                uid,
                predicate,
                value,
            },
            (EditOp::Delete, PredicateRef::Named(predicate), Some(value)) => Write::Delete {
                uid,
                predicate,
                value,
            },
            (EditOp::Delete, PredicateRef::Named(predicate), None) => {
                Write::ClearPredicate { uid, predicate }
            }
            (EditOp::Delete, PredicateRef::Star, None) => {
                for predicate in view.predicates_of(uid) {
                    plan.keys.insert(Key::for_attr(uid, &predicate));
                    plan.writes.push(Write::ClearPredicate { uid, predicate });
                }
                continue;
            }
            (op, predicate, _) => {
                return Err(CoreError::invalid_edit(format!(
                    "unsupported {op:?} edit on {uid} with predicate {predicate:?}"
                )));
            }
        };
        plan.keys.insert(Key::for_attr(uid, write.predicate()));
        plan.writes.push(write);
    }
    Ok(plan)
}
