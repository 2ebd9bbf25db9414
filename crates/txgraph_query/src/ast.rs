//! Parsed query.

use txgraph_core::Uid;

/// A whole query: one or more named blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Blocks in text order.
    pub blocks: Vec<Block>,
}

/// One top-level block, `alias(func: ...) @filter(...) { ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Key of the block's result array.
    pub alias: String,
    /// Root function choosing the candidate nodes.
    pub root: Function,
    /// Ordering and pagination.
    pub page: Page,
    /// Optional filter on the candidates.
    pub filter: Option<Filter>,
    /// Selected fields.
    pub selections: Vec<Selection>,
}

/// Ordering and pagination arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Sort predicate and direction.
    pub order: Option<Order>,
    /// Maximum results.
    pub first: Option<usize>,
    /// Results to skip.
    pub offset: usize,
}

/// A sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Predicate sorted on.
    pub predicate: String,
    /// True for `orderdesc`.
    pub descending: bool,
}

/// A function usable at the root and inside filters.
#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    /// `uid(0x1, 0x2)`
    Uid(Vec<Uid>),
    /// `has(pred)`
    Has(String),
    /// `eq(pred, "value")`
    Eq(String, String),
    /// `anyofterms(pred, "a b")`
    AnyOfTerms(String, String),
    /// `allofterms(pred, "a b")`
    AllOfTerms(String, String),
}

impl Function {
    /// Function name as written in queries.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Function::Uid(_) => "uid",
            Function::Has(_) => "has",
            Function::Eq(..) => "eq",
            Function::AnyOfTerms(..) => "anyofterms",
            Function::AllOfTerms(..) => "allofterms",
        }
    }

    /// Predicate the function reads, if any.
    #[must_use]
    pub fn predicate(&self) -> Option<&str> {
        match self {
            Function::Uid(_) => None,
            Function::Has(p)
            | Function::Eq(p, _)
            | Function::AnyOfTerms(p, _)
            | Function::AllOfTerms(p, _) => Some(p),
        }
    }
}

/// A boolean filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// A single function.
    Func(Function),
    /// Both sides match.
    And(Box<Filter>, Box<Filter>),
    /// Either side matches.
    Or(Box<Filter>, Box<Filter>),
    /// The inner filter does not match.
    Not(Box<Filter>),
}

/// A selected field.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Output key; defaults to the predicate.
    pub alias: Option<String>,
    /// Predicate read, or `uid`.
    pub predicate: String,
    /// Ordering and pagination for edge targets.
    pub page: Page,
    /// Filter on edge targets.
    pub filter: Option<Filter>,
    /// Nested selection; non-empty only for edges.
    pub children: Vec<Selection>,
}

impl Selection {
    /// Key the field appears under in results.
    #[must_use]
    pub fn key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.predicate)
    }
}
