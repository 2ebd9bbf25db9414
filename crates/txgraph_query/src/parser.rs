//! Recursive-descent query parser.
//!
//! ```text
//! query     := '{' block+ '}'
//! block     := NAME '(' arg (',' arg)* ')' filter? '{' selection* '}'
//! arg       := 'func' ':' function | ('orderasc' | 'orderdesc') ':' NAME
//!            | ('first' | 'offset') ':' NUMBER
//! filter    := '@' 'filter' '(' or ')'
//! or        := and ('or' and)*
//! and       := unary ('and' unary)*
//! unary     := 'not' unary | '(' or ')' | function
//! selection := (NAME ':')? NAME ('(' arg (',' arg)* ')')? filter? ('{' selection* '}')?
//! ```

use crate::ast::{Block, Filter, Function, Order, Page, Query, Selection};
use crate::error::{QueryError, QueryResult};
use crate::lexer::{tokenize, Spanned, Token};
use txgraph_core::Uid;

/// Deepest nesting of filters and selections a query may use.
pub const MAX_DEPTH: usize = 128;

/// Parses query text.
///
/// # Errors
///
/// [`QueryError::Parse`] with the position of the first offending token,
/// including for queries nested deeper than [`MAX_DEPTH`].
pub fn parse_query(text: &str) -> QueryResult<Query> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let query = parser.query()?;
    Ok(query)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn current(&self) -> &Spanned {
        // tokenize always ends with Eof and the cursor never moves past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error<T>(&self, message: impl Into<String>) -> QueryResult<T> {
        let at = self.current();
        Err(QueryError::parse(at.line, at.column, message))
    }

    fn unexpected<T>(&self, wanted: &str) -> QueryResult<T> {
        self.error(format!(
            "expected {wanted}, found {}",
            self.current().token.describe()
        ))
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if &self.current().token == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> QueryResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            self.unexpected(&expected.describe())
        }
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> QueryResult<T>) -> QueryResult<T> {
        if self.depth >= MAX_DEPTH {
            return self.error("query nested too deeply");
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(&self.current().token, Token::Word(w) if w == word)
    }

    fn word(&mut self, what: &str) -> QueryResult<String> {
        match &self.current().token {
            Token::Word(w) => {
                let w = w.clone();
                self.advance();
                Ok(w)
            }
            _ => self.unexpected(what),
        }
    }

    fn query(&mut self) -> QueryResult<Query> {
        self.expect(&Token::LBrace)?;
        let mut blocks = Vec::new();
        while !self.eat(&Token::RBrace) {
            let block = self.block()?;
            if blocks.iter().any(|b: &Block| b.alias == block.alias) {
                return self.error(format!("duplicate block name {:?}", block.alias));
            }
            blocks.push(block);
        }
        if blocks.is_empty() {
            return self.error("query has no blocks");
        }
        if self.current().token != Token::Eof {
            return self.unexpected("end of query");
        }
        Ok(Query { blocks })
    }

    fn block(&mut self) -> QueryResult<Block> {
        let alias = self.word("block name")?;
        self.expect(&Token::LParen)?;
        let mut root = None;
        let mut page = Page::default();
        loop {
            if self.peek_word("func") {
                self.advance();
                self.expect(&Token::Colon)?;
                root = Some(self.function()?);
            } else {
                self.page_arg(&mut page)?;
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        let Some(root) = root else {
            return self.error(format!("block {alias:?} has no func argument"));
        };
        let filter = self.directives()?;
        self.expect(&Token::LBrace)?;
        let selections = self.selections()?;
        if selections.is_empty() {
            return self.error(format!("block {alias:?} selects nothing"));
        }
        Ok(Block {
            alias,
            root,
            page,
            filter,
            selections,
        })
    }

    fn page_arg(&mut self, page: &mut Page) -> QueryResult<()> {
        let name = self.word("argument name")?;
        self.expect(&Token::Colon)?;
        match name.as_str() {
            "orderasc" | "orderdesc" => {
                let predicate = self.word("predicate")?;
                page.order = Some(Order {
                    predicate,
                    descending: name == "orderdesc",
                });
            }
            "first" => page.first = Some(self.number()?),
            "offset" => page.offset = self.number()?,
            other => return self.error(format!("unknown argument {other:?}")),
        }
        Ok(())
    }

    fn number(&mut self) -> QueryResult<usize> {
        let word = self.word("number")?;
        word.parse::<usize>().or_else(|_| {
            let at = &self.tokens[self.pos.saturating_sub(1)];
            Err(QueryError::parse(
                at.line,
                at.column,
                format!("{word:?} is not a non-negative integer"),
            ))
        })
    }

    fn directives(&mut self) -> QueryResult<Option<Filter>> {
        let mut filter = None;
        while self.eat(&Token::At) {
            let name = self.word("directive")?;
            if name != "filter" {
                return self.error(format!("unsupported directive @{name}"));
            }
            if filter.is_some() {
                return self.error("more than one @filter");
            }
            self.expect(&Token::LParen)?;
            filter = Some(self.or()?);
            self.expect(&Token::RParen)?;
        }
        Ok(filter)
    }

    fn or(&mut self) -> QueryResult<Filter> {
        let mut left = self.and()?;
        while self.peek_word("or") {
            self.advance();
            let right = self.and()?;
            left = Filter::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> QueryResult<Filter> {
        let mut left = self.unary()?;
        while self.peek_word("and") {
            self.advance();
            let right = self.unary()?;
            left = Filter::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> QueryResult<Filter> {
        if self.peek_word("not") {
            self.advance();
            let inner = self.nested(Self::unary)?;
            return Ok(Filter::Not(Box::new(inner)));
        }
        if self.eat(&Token::LParen) {
            let inner = self.nested(Self::or)?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        Ok(Filter::Func(self.function()?))
    }

    fn function(&mut self) -> QueryResult<Function> {
        let (line, column) = (self.current().line, self.current().column);
        let name = self.word("function")?;
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                let arg = match &self.current().token {
                    Token::Word(w) | Token::Str(w) => w.clone(),
                    _ => return self.unexpected("function argument"),
                };
                self.advance();
                args.push(arg);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma)?;
            }
        }

        let arity = |n: usize| -> QueryResult<()> {
            if args.len() == n {
                Ok(())
            } else {
                Err(QueryError::parse(
                    line,
                    column,
                    format!("{name} takes {n} argument(s), got {}", args.len()),
                ))
            }
        };
        let function = match name.as_str() {
            "uid" => {
                if args.is_empty() {
                    return Err(QueryError::parse(line, column, "uid needs at least one uid"));
                }
                let uids = args
                    .iter()
                    .map(|raw| raw.parse::<Uid>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| QueryError::parse(line, column, e.to_string()))?;
                Function::Uid(uids)
            }
            "has" => {
                arity(1)?;
                Function::Has(args[0].clone())
            }
            "eq" | "anyofterms" | "allofterms" => {
                arity(2)?;
                let (predicate, value) = (args[0].clone(), args[1].clone());
                match name.as_str() {
                    "eq" => Function::Eq(predicate, value),
                    "anyofterms" => Function::AnyOfTerms(predicate, value),
                    _ => Function::AllOfTerms(predicate, value),
                }
            }
            other => {
                return Err(QueryError::parse(
                    line,
                    column,
                    format!("unknown function {other:?}"),
                ));
            }
        };
        Ok(function)
    }

    fn selections(&mut self) -> QueryResult<Vec<Selection>> {
        let mut selections = Vec::new();
        while !self.eat(&Token::RBrace) {
            selections.push(self.selection()?);
        }
        Ok(selections)
    }

    fn selection(&mut self) -> QueryResult<Selection> {
        let first = self.word("predicate")?;
        let (alias, predicate) = if self.eat(&Token::Colon) {
            (Some(first), self.word("predicate")?)
        } else {
            (None, first)
        };

        let mut page = Page::default();
        if self.eat(&Token::LParen) {
            loop {
                self.page_arg(&mut page)?;
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }
        let filter = self.directives()?;
        let children = if self.eat(&Token::LBrace) {
            let children = self.nested(Self::selections)?;
            if children.is_empty() {
                return self.error(format!("empty selection under {predicate:?}"));
            }
            children
        } else {
            Vec::new()
        };
        if predicate == "uid" && (!children.is_empty() || filter.is_some()) {
            return self.error("uid cannot have a nested selection or filter");
        }
        Ok(Selection {
            alias,
            predicate,
            page,
            filter,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_block_with_everything() {
        let query = parse_query(
            r#"{
                people(func: has(name), orderdesc: age, first: 2, offset: 1)
                    @filter(eq(name, "Bob") or not has(deleted)) {
                    uid
                    who: name
                    friend(first: 1) @filter(anyofterms(name, "ann")) { name }
                }
            }"#,
        )
        .unwrap();

        let block = &query.blocks[0];
        assert_eq!(block.alias, "people");
        assert_eq!(block.root, Function::Has("name".into()));
        assert_eq!(
            block.page,
            Page {
                order: Some(Order {
                    predicate: "age".into(),
                    descending: true
                }),
                first: Some(2),
                offset: 1,
            }
        );
        assert!(matches!(block.filter, Some(Filter::Or(..))));
        assert_eq!(block.selections.len(), 3);
        assert_eq!(block.selections[1].key(), "who");
        assert_eq!(block.selections[2].children.len(), 1);
        assert_eq!(block.selections[2].page.first, Some(1));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let query =
            parse_query("{ q(func: uid(0x1)) @filter(has(a) or has(b) and has(c)) { uid } }")
                .unwrap();
        match &query.blocks[0].filter {
            Some(Filter::Or(left, right)) => {
                assert_eq!(**left, Filter::Func(Function::Has("a".into())));
                assert!(matches!(**right, Filter::And(..)));
            }
            other => panic!("unexpected filter {other:?}"),
        }
    }

    #[test]
    fn uid_function_accepts_hex_and_decimal() {
        let query = parse_query("{ q(func: uid(0x1a, 27)) { uid } }").unwrap();
        assert_eq!(
            query.blocks[0].root,
            Function::Uid(vec![Uid::new(26), Uid::new(27)])
        );
    }

    #[test]
    fn errors_point_at_the_problem() {
        let err = parse_query("{\n  q(func: has(name)) {\n    name\n  }\n").unwrap_err();
        assert!(
            matches!(err, QueryError::Parse { line: 5, .. }),
            "{err}"
        );

        let err = parse_query("{ q(func: nope(x)) { uid } }").unwrap_err();
        assert_eq!(
            err,
            QueryError::parse(1, 11, "unknown function \"nope\"")
        );

        let err = parse_query("{ q(first: 2) { uid } }").unwrap_err();
        assert!(err.to_string().contains("no func"), "{err}");

        assert!(parse_query("{ q(func: eq(name)) { uid } }").is_err());
        assert!(parse_query("{ q(func: uid(0x0)) { uid } }").is_err());
        assert!(parse_query("{ q(func: has(a)) { uid } } extra").is_err());
        assert!(parse_query("{ q(func: has(a)) { } }").is_err());
        assert!(parse_query("{ }").is_err());
        assert!(parse_query("{ q(func: has(a)) @cascade { uid } }").is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let nots = format!(
            "{{ q(func: has(a)) @filter({}has(a)) {{ uid }} }}",
            "not ".repeat(200_000)
        );
        let err = parse_query(&nots).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"), "{err}");

        let parens = format!(
            "{{ q(func: has(a)) @filter({}has(a){}) {{ uid }} }}",
            "(".repeat(100_000),
            ")".repeat(100_000)
        );
        assert!(parse_query(&parens).is_err());

        let selections = format!(
            "{{ q(func: has(a)) {{ {}uid{} }} }}",
            "friend { ".repeat(50_000),
            " }".repeat(50_000)
        );
        let err = parse_query(&selections).unwrap_err();
        assert!(matches!(err, QueryError::Parse { .. }), "{err}");

        let fits = format!(
            "{{ q(func: has(a)) @filter({}has(a){}) {{ uid }} }}",
            "(".repeat(MAX_DEPTH - 1),
            ")".repeat(MAX_DEPTH - 1)
        );
        assert!(parse_query(&fits).is_ok());
    }
}
