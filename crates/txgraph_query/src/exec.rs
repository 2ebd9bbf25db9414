//! Query evaluation over a snapshot.

use crate::ast::{Block, Filter, Function, Page, Query, Selection};
use crate::error::{QueryError, QueryResult};
use crate::parser::parse_query;
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;
use txgraph_core::{GraphView, Uid, Value, ValueType, RESERVED_UID_PREDICATE};

/// Evaluates queries against a [`GraphView`].
///
/// The engine is stateless; one instance can serve any number of views.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryEngine;

impl QueryEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parses and evaluates `text`.
    ///
    /// The result maps each block alias to an array of node objects.
    pub fn execute(&self, text: &str, view: &dyn GraphView) -> QueryResult<Json> {
        let query = parse_query(text)?;
        self.run(&query, view)
    }

    /// Evaluates a parsed query.
    pub fn run(&self, query: &Query, view: &dyn GraphView) -> QueryResult<Json> {
        let mut out = Map::new();
        for block in &query.blocks {
            let nodes = Evaluator { view }.block(block)?;
            debug!(
                block = %block.alias,
                read_ts = %view.read_ts(),
                nodes = nodes.len(),
                "evaluated block"
            );
            out.insert(block.alias.clone(), Json::Array(nodes));
        }
        Ok(Json::Object(out))
    }
}

struct Evaluator<'a> {
    view: &'a dyn GraphView,
}

impl Evaluator<'_> {
    fn block(&self, block: &Block) -> QueryResult<Vec<Json>> {
        self.check_function(&block.root)?;
        if let Some(filter) = &block.filter {
            self.check_filter(filter)?;
        }
        for selection in &block.selections {
            self.check_selection(selection)?;
        }

        let mut candidates = self.roots(&block.root);
        if let Some(filter) = &block.filter {
            candidates.retain(|uid| self.matches(*uid, filter));
        }
        Ok(self.render_page(candidates, &block.page, &block.selections))
    }

    fn check_function(&self, function: &Function) -> QueryResult<()> {
        match function {
            Function::AnyOfTerms(predicate, _) | Function::AllOfTerms(predicate, _) => {
                if self.view.schema().has_term_index(predicate) {
                    Ok(())
                } else {
                    Err(QueryError::missing_index(
                        predicate.clone(),
                        "term",
                        function.name(),
                    ))
                }
            }
            Function::Eq(predicate, value) => {
                match self.view.schema().value_type(predicate) {
                    ValueType::Default | ValueType::String => Ok(()),
                    ty => ty.parse_text(value).map(|_| ()).map_err(|e| {
                        QueryError::invalid_argument(format!("eq({predicate}, {value:?}): {e}"))
                    }),
                }
            }
            Function::Uid(_) | Function::Has(_) => Ok(()),
        }
    }

    fn check_filter(&self, filter: &Filter) -> QueryResult<()> {
        match filter {
            Filter::Func(function) => self.check_function(function),
            Filter::And(a, b) | Filter::Or(a, b) => {
                self.check_filter(a)?;
                self.check_filter(b)
            }
            Filter::Not(inner) => self.check_filter(inner),
        }
    }

    fn check_selection(&self, selection: &Selection) -> QueryResult<()> {
        if let Some(filter) = &selection.filter {
            self.check_filter(filter)?;
        }
        for child in &selection.children {
            self.check_selection(child)?;
        }
        Ok(())
    }

    fn roots(&self, function: &Function) -> Vec<Uid> {
        match function {
            Function::Uid(uids) => uids
                .iter()
                .copied()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            Function::Has(predicate)
            | Function::Eq(predicate, _)
            | Function::AnyOfTerms(predicate, _)
            | Function::AllOfTerms(predicate, _) => self
                .view
                .subjects(predicate)
                .into_iter()
                .filter(|uid| self.satisfies(*uid, function))
                .collect(),
        }
    }

    fn satisfies(&self, uid: Uid, function: &Function) -> bool {
        match function {
            Function::Uid(uids) => uids.contains(&uid),
            Function::Has(predicate) => !self.view.values(uid, predicate).is_empty(),
            Function::Eq(predicate, text) => {
                let typed = match self.view.schema().value_type(predicate) {
                    ValueType::Default | ValueType::String => None,
                    ty => ty.parse_text(text).ok(),
                };
                self.view
                    .values(uid, predicate)
                    .iter()
                    .any(|value| match &typed {
                        Some(typed) => value.total_cmp(typed) == Ordering::Equal,
                        None => value.to_text() == *text,
                    })
            }
            Function::AnyOfTerms(predicate, terms) => {
                let wanted = tokenize_terms(terms);
                self.view
                    .values(uid, predicate)
                    .iter()
                    .any(|value| !tokenize_terms(&value.to_text()).is_disjoint(&wanted))
            }
            Function::AllOfTerms(predicate, terms) => {
                let wanted = tokenize_terms(terms);
                !wanted.is_empty()
                    && self
                        .view
                        .values(uid, predicate)
                        .iter()
                        .any(|value| wanted.is_subset(&tokenize_terms(&value.to_text())))
            }
        }
    }

    fn matches(&self, uid: Uid, filter: &Filter) -> bool {
        match filter {
            Filter::Func(function) => self.satisfies(uid, function),
            Filter::And(a, b) => self.matches(uid, a) && self.matches(uid, b),
            Filter::Or(a, b) => self.matches(uid, a) || self.matches(uid, b),
            Filter::Not(inner) => !self.matches(uid, inner),
        }
    }

    fn render_page(&self, mut uids: Vec<Uid>, page: &Page, selections: &[Selection]) -> Vec<Json> {
        if let Some(order) = &page.order {
            let keys: Vec<Option<Value>> = uids
                .iter()
                .map(|uid| self.view.values(*uid, &order.predicate).into_iter().next())
                .collect();
            let mut keyed: Vec<(Uid, Option<Value>)> = uids.into_iter().zip(keys).collect();
            keyed.sort_by(|(ua, a), (ub, b)| {
                let by_value = match (a, b) {
                    (Some(a), Some(b)) if order.descending => b.total_cmp(a),
                    (Some(a), Some(b)) => a.total_cmp(b),
                    // nodes without the sort predicate go last either way
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                by_value.then(ua.cmp(ub))
            });
            uids = keyed.into_iter().map(|(uid, _)| uid).collect();
        }
        // Pagination counts rendered nodes, so empty ones never use a slot.
        uids.into_iter()
            .filter_map(|uid| self.render_node(uid, selections))
            .skip(page.offset)
            .take(page.first.unwrap_or(usize::MAX))
            .collect()
    }

    fn render_node(&self, uid: Uid, selections: &[Selection]) -> Option<Json> {
        let schema = self.view.schema();
        let mut object = Map::new();
        for selection in selections {
            if selection.predicate == RESERVED_UID_PREDICATE {
                object.insert(selection.key().to_string(), Json::String(uid.to_string()));
                continue;
            }
            let values = self.view.values(uid, &selection.predicate);
            if values.is_empty() {
                continue;
            }
            let rendered = if selection.children.is_empty() {
                let as_list = schema.renders_as_list(&selection.predicate)
                    || values.len() > 1
                    || values.iter().any(|v| matches!(v, Value::Uid(_)));
                if as_list {
                    Json::Array(values.iter().map(node_or_scalar).collect())
                } else {
                    values[0].to_json()
                }
            } else {
                let mut targets: Vec<Uid> = values.iter().filter_map(Value::as_uid).collect();
                if let Some(filter) = &selection.filter {
                    targets.retain(|target| self.matches(*target, filter));
                }
                let children = self.render_page(targets, &selection.page, &selection.children);
                if children.is_empty() {
                    continue;
                }
                Json::Array(children)
            };
            object.insert(selection.key().to_string(), rendered);
        }
        if object.is_empty() {
            None
        } else {
            Some(Json::Object(object))
        }
    }
}

fn node_or_scalar(value: &Value) -> Json {
    match value {
        Value::Uid(uid) => {
            let mut object = Map::new();
            object.insert(
                RESERVED_UID_PREDICATE.to_string(),
                Json::String(uid.to_string()),
            );
            Json::Object(object)
        }
        other => other.to_json(),
    }
}

/// Lower-cased alphanumeric runs, the unit term functions match on.
#[must_use]
pub fn tokenize_terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_are_case_folded() {
        let terms = tokenize_terms("Alice  O'Brien-Smith");
        assert_eq!(
            terms.into_iter().collect::<Vec<_>>(),
            vec!["alice", "brien", "o", "smith"]
        );
        assert!(tokenize_terms("  ,. ").is_empty());
    }
}
