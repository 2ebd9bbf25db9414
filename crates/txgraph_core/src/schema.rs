//! Predicate schema.
//!
//! Schema text is a sequence of statements:
//!
//! ```text
//! name: string @index(term) .
//! balance: int .
//! friend: [uid] @count .
//! ```
//!
//! Predicates that were never declared have [`ValueType::Default`]: scalar
//! values are single-valued and edges accumulate.

use crate::error::{CoreError, CoreResult};
use crate::value::{Value, ValueType};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const KNOWN_TOKENIZERS: &[&str] = &[
    "term", "exact", "hash", "fulltext", "trigram", "int", "float", "bool",
];

/// Schema of one predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateSchema {
    /// Declared type.
    pub value_type: ValueType,
    /// Whether the predicate holds a list (`[type]`).
    pub list: bool,
    /// Index tokenizers from `@index(...)`.
    pub tokenizers: BTreeSet<String>,
    /// Other directives (`count`, `reverse`, `upsert`, `lang`).
    pub flags: BTreeSet<String>,
}

impl PredicateSchema {
    /// A scalar predicate of the given type.
    #[must_use]
    pub fn scalar(value_type: ValueType) -> Self {
        Self {
            value_type,
            list: false,
            tokenizers: BTreeSet::new(),
            flags: BTreeSet::new(),
        }
    }

    /// Adds an index tokenizer.
    #[must_use]
    pub fn with_index(mut self, tokenizer: &str) -> Self {
        self.tokenizers.insert(tokenizer.to_string());
        self
    }

    /// Returns true if `@index(term)` is declared.
    #[must_use]
    pub fn has_term_index(&self) -> bool {
        self.tokenizers.contains("term")
    }
}

/// The full schema: predicate name to its declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    predicates: BTreeMap<String, PredicateSchema>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses schema text.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSchema`] with the line of the first
    /// problem. Nothing is returned on error, so callers never apply a
    /// partially parsed schema.
    pub fn parse(text: &str) -> CoreResult<Self> {
        let mut parser = SchemaParser::new(text);
        let mut schema = Schema::new();
        while let Some((name, declared)) = parser.statement()? {
            schema.predicates.insert(name, declared);
        }
        Ok(schema)
    }

    /// Adds or replaces every predicate declared in `other`.
    pub fn merge(&mut self, other: Schema) {
        self.predicates.extend(other.predicates);
    }

    /// Declares a single predicate.
    pub fn insert(&mut self, predicate: impl Into<String>, declared: PredicateSchema) {
        self.predicates.insert(predicate.into(), declared);
    }

    /// Removes a predicate's declaration.
    pub fn remove(&mut self, predicate: &str) -> Option<PredicateSchema> {
        self.predicates.remove(predicate)
    }

    /// Looks up a predicate.
    #[must_use]
    pub fn get(&self, predicate: &str) -> Option<&PredicateSchema> {
        self.predicates.get(predicate)
    }

    /// Declared type, or [`ValueType::Default`].
    #[must_use]
    pub fn value_type(&self, predicate: &str) -> ValueType {
        self.get(predicate)
            .map_or(ValueType::Default, |declared| declared.value_type)
    }

    /// Whether writing `value` to `predicate` adds to a list instead of
    /// replacing the current value.
    #[must_use]
    pub fn is_list(&self, predicate: &str, value: &Value) -> bool {
        match self.get(predicate) {
            Some(declared) => declared.list,
            None => matches!(value, Value::Uid(_)),
        }
    }

    /// Whether results for `predicate` render as arrays.
    #[must_use]
    pub fn renders_as_list(&self, predicate: &str) -> bool {
        self.get(predicate).is_some_and(|declared| declared.list)
    }

    /// Returns true if `predicate` carries a term index.
    #[must_use]
    pub fn has_term_index(&self, predicate: &str) -> bool {
        self.get(predicate)
            .is_some_and(PredicateSchema::has_term_index)
    }

    /// Number of declared predicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Returns true when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Iterates declarations in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PredicateSchema)> {
        self.predicates.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, declared) in &self.predicates {
            write!(f, "{name}: ")?;
            if declared.list {
                write!(f, "[{}]", declared.value_type)?;
            } else {
                write!(f, "{}", declared.value_type)?;
            }
            if !declared.tokenizers.is_empty() {
                let list: Vec<&str> = declared.tokenizers.iter().map(String::as_str).collect();
                write!(f, " @index({})", list.join(", "))?;
            }
            for flag in &declared.flags {
                write!(f, " @{flag}")?;
            }
            writeln!(f, " .")?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum Tok {
    Ident(String),
    Punct(char),
}

struct SchemaParser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    peeked: Option<(Tok, usize)>,
}

impl<'a> SchemaParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
            peeked: None,
        }
    }

    fn lex(&mut self) -> Option<(Tok, usize)> {
        loop {
            let c = *self.chars.peek()?;
            if c == '\n' {
                self.line += 1;
                self.chars.next();
            } else if c.is_whitespace() {
                self.chars.next();
            } else if c == '#' {
                while self.chars.peek().is_some_and(|&c| c != '\n') {
                    self.chars.next();
                }
            } else {
                break;
            }
        }
        let line = self.line;
        let c = self.chars.next()?;
        if is_ident_char(c) {
            let mut ident = String::from(c);
            while let Some(&next) = self.chars.peek() {
                if !is_ident_char(next) {
                    break;
                }
                ident.push(next);
                self.chars.next();
            }
            Some((Tok::Ident(ident), line))
        } else {
            Some((Tok::Punct(c), line))
        }
    }

    fn next(&mut self) -> Option<(Tok, usize)> {
        self.peeked.take().or_else(|| self.lex())
    }

    fn peek(&mut self) -> Option<&Tok> {
        if self.peeked.is_none() {
            self.peeked = self.lex();
        }
        self.peeked.as_ref().map(|(tok, _)| tok)
    }

    fn ident(&mut self, what: &str) -> CoreResult<(String, usize)> {
        match self.next() {
            Some((Tok::Ident(name), line)) => Ok((name, line)),
            Some((Tok::Punct(c), line)) => Err(CoreError::invalid_schema(
                line,
                format!("expected {what}, found {c:?}"),
            )),
            None => Err(CoreError::invalid_schema(
                self.line,
                format!("expected {what}, found end of input"),
            )),
        }
    }

    fn punct(&mut self, expected: char) -> CoreResult<()> {
        match self.next() {
            Some((Tok::Punct(c), _)) if c == expected => Ok(()),
            Some((tok, line)) => Err(CoreError::invalid_schema(
                line,
                format!("expected {expected:?}, found {tok:?}"),
            )),
            None => Err(CoreError::invalid_schema(
                self.line,
                format!("expected {expected:?}, found end of input"),
            )),
        }
    }

    fn statement(&mut self) -> CoreResult<Option<(String, PredicateSchema)>> {
        if self.peek().is_none() {
            return Ok(None);
        }
        let (name, line) = self.ident("predicate name")?;
        self.punct(':')?;

        let list = self.peek() == Some(&Tok::Punct('['));
        if list {
            self.punct('[')?;
        }
        let (type_name, type_line) = self.ident("type name")?;
        let value_type = ValueType::from_name(&type_name).ok_or_else(|| {
            CoreError::invalid_schema(type_line, format!("unknown type {type_name:?}"))
        })?;
        if list {
            self.punct(']')?;
        }
        let mut declared = PredicateSchema {
            value_type,
            list,
            tokenizers: BTreeSet::new(),
            flags: BTreeSet::new(),
        };

        while self.peek() == Some(&Tok::Punct('@')) {
            self.punct('@')?;
            let (directive, directive_line) = self.ident("directive")?;
            match directive.as_str() {
                "index" => {
                    self.punct('(')?;
                    loop {
                        let (tokenizer, tok_line) = self.ident("tokenizer")?;
                        if !KNOWN_TOKENIZERS.contains(&tokenizer.as_str()) {
                            return Err(CoreError::invalid_schema(
                                tok_line,
                                format!("unknown tokenizer {tokenizer:?}"),
                            ));
                        }
                        declared.tokenizers.insert(tokenizer);
                        if self.peek() == Some(&Tok::Punct(',')) {
                            self.punct(',')?;
                        } else {
                            break;
                        }
                    }
                    self.punct(')')?;
                }
                "count" | "reverse" | "upsert" | "lang" => {
                    declared.flags.insert(directive);
                }
                other => {
                    return Err(CoreError::invalid_schema(
                        directive_line,
                        format!("unknown directive @{other}"),
                    ));
                }
            }
        }
        self.punct('.')?;

        if declared.has_term_index()
            && !matches!(value_type, ValueType::String | ValueType::Default)
        {
            return Err(CoreError::invalid_schema(
                line,
                format!("term index on {name} requires a string type, found {value_type}"),
            ));
        }
        if value_type == ValueType::Uid && !declared.tokenizers.is_empty() {
            return Err(CoreError::invalid_schema(
                line,
                format!("uid predicate {name} cannot be indexed"),
            ));
        }
        if declared.flags.contains("reverse") && value_type != ValueType::Uid {
            return Err(CoreError::invalid_schema(
                line,
                format!("@reverse on {name} requires a uid type"),
            ));
        }
        Ok(Some((name, declared)))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '~')
}
