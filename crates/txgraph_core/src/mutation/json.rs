//! JSON mutation parser.

use super::{Edit, EditOp, NodeRef, Object, PredicateRef};
use crate::error::{CoreError, CoreResult};
use crate::types::Uid;
use crate::value::Value;
use serde_json::{Map, Value as Json};

/// Parses a JSON mutation body: `{"set": [...], "delete": [...]}`.
///
/// Each entry is a node object. `"uid"` names the node (`"_:x"` for a blank
/// node, `"0x.."` for an existing one); set entries without a uid get an
/// automatic blank name `blank-N`. Nested objects become edges. In delete
/// entries `null` removes every value of a predicate and a node with only a
/// uid removes the whole node.
pub fn parse_json(text: &str) -> CoreResult<Vec<Edit>> {
    let root: Json = serde_json::from_str(text)
        .map_err(|e| CoreError::invalid_mutation(e.line().max(1), e.to_string()))?;
    let Json::Object(root) = root else {
        return Err(CoreError::invalid_mutation(1, "mutation must be a JSON object"));
    };
    if let Some(unknown) = root.keys().find(|k| *k != "set" && *k != "delete") {
        return Err(CoreError::invalid_mutation(
            1,
            format!("unknown field {unknown:?}, expected \"set\" or \"delete\""),
        ));
    }

    let mut edits = Vec::new();
    let mut flattener = Flattener::default();
    if let Some(set) = root.get("set") {
        for node in node_list(set, "set")? {
            flattener.set_node(node, &mut edits)?;
        }
    }
    if let Some(delete) = root.get("delete") {
        for node in node_list(delete, "delete")? {
            delete_node(node, &mut edits)?;
        }
    }
    Ok(edits)
}

fn node_list<'a>(value: &'a Json, field: &str) -> CoreResult<Vec<&'a Map<String, Json>>> {
    match value {
        Json::Object(node) => Ok(vec![node]),
        Json::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object().ok_or_else(|| {
                    CoreError::invalid_mutation(1, format!("{field} entries must be objects"))
                })
            })
            .collect(),
        _ => Err(CoreError::invalid_mutation(
            1,
            format!("{field} must be an object or an array of objects"),
        )),
    }
}

#[derive(Default)]
struct Flattener {
    next_blank: usize,
}

impl Flattener {
    fn set_node(&mut self, node: &Map<String, Json>, edits: &mut Vec<Edit>) -> CoreResult<NodeRef> {
        let subject = match node.get("uid") {
            Some(uid) => node_ref(uid)?,
            None => {
                let name = format!("blank-{}", self.next_blank);
                self.next_blank += 1;
                NodeRef::Blank(name)
            }
        };

        for (predicate, value) in node.iter().filter(|(k, _)| *k != "uid") {
            match value {
                Json::Null => {
                    return Err(CoreError::invalid_mutation(
                        1,
                        format!("{predicate}: null is only allowed in delete"),
                    ));
                }
                Json::Object(child) => {
                    let target = self.set_node(child, edits)?;
                    edits.push(Edit::set(subject.clone(), predicate, Object::Node(target)));
                }
                Json::Array(items) => {
                    for item in items {
                        let object = match item {
                            Json::Object(child) => Object::Node(self.set_node(child, edits)?),
                            other => Object::Scalar(scalar(predicate, other)?),
                        };
                        edits.push(Edit::set(subject.clone(), predicate, object));
                    }
                }
                scalar_value => {
                    let object = Object::Scalar(scalar(predicate, scalar_value)?);
                    edits.push(Edit::set(subject.clone(), predicate, object));
                }
            }
        }
        Ok(subject)
    }
}

fn delete_node(node: &Map<String, Json>, edits: &mut Vec<Edit>) -> CoreResult<()> {
    let subject = match node.get("uid") {
        Some(uid) => node_ref(uid)?,
        None => return Err(CoreError::invalid_mutation(1, "delete entries need a uid")),
    };
    if node.len() == 1 {
        edits.push(Edit::delete(subject, PredicateRef::Star, Object::Star));
        return Ok(());
    }

    for (predicate, value) in node.iter().filter(|(k, _)| *k != "uid") {
        let named = PredicateRef::Named(predicate.clone());
        let objects = match value {
            Json::Null => vec![Object::Star],
            Json::Array(items) => items
                .iter()
                .map(|item| delete_object(predicate, item))
                .collect::<CoreResult<Vec<_>>>()?,
            other => vec![delete_object(predicate, other)?],
        };
        for object in objects {
            edits.push(Edit::delete(subject.clone(), named.clone(), object));
        }
    }
    Ok(())
}

fn delete_object(predicate: &str, value: &Json) -> CoreResult<Object> {
    match value {
        Json::Object(target) => match target.get("uid") {
            Some(uid) => Ok(Object::Node(node_ref(uid)?)),
            None => Err(CoreError::invalid_mutation(
                1,
                format!("{predicate}: deleting an edge needs the target uid"),
            )),
        },
        other => Ok(Object::Scalar(scalar(predicate, other)?)),
    }
}

fn node_ref(uid: &Json) -> CoreResult<NodeRef> {
    let Json::String(raw) = uid else {
        return Err(CoreError::invalid_mutation(1, "uid must be a string"));
    };
    if let Some(name) = raw.strip_prefix("_:") {
        if name.is_empty() {
            return Err(CoreError::invalid_mutation(1, "blank node without a name"));
        }
        return Ok(NodeRef::Blank(name.to_string()));
    }
    raw.parse::<Uid>()
        .map(NodeRef::Uid)
        .map_err(|e| CoreError::invalid_mutation(1, e.to_string()))
}

fn scalar(predicate: &str, value: &Json) -> CoreResult<Value> {
    match value {
        Json::String(s) => Ok(Value::Str(s.clone())),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => n.as_f64().map(Value::Float).ok_or_else(|| {
                CoreError::invalid_mutation(1, format!("{predicate}: number out of range"))
            }),
        },
        _ => Err(CoreError::invalid_mutation(
            1,
            format!("{predicate}: expected a scalar value"),
        )),
    }
}
