//! RDF N-Quad mutation parser.

use super::{Edit, EditOp, NodeRef, Object, PredicateRef};
use crate::error::{CoreError, CoreResult};
use crate::types::Uid;
use crate::value::ValueType;

/// Parses an RDF mutation body.
///
/// Accepted shapes:
///
/// ```text
/// { set { _:a <name> "Alice" . } delete { <0x1> <name> * . } }
/// set { _:a <name> "Alice" . }
/// _:a <name> "Alice" .
/// ```
///
/// Bare statements are treated as a `set` block.
pub fn parse_rdf(text: &str) -> CoreResult<Vec<Edit>> {
    let mut scanner = Scanner::new(text);
    let mut edits = Vec::new();
    scanner.skip_ws();
    if scanner.eat('{') {
        scanner.blocks(&mut edits)?;
        scanner.skip_ws();
        scanner.expect('}')?;
    } else if scanner.at_keyword("set") || scanner.at_keyword("delete") {
        scanner.blocks(&mut edits)?;
    } else {
        scanner.statements(EditOp::Set, None, &mut edits)?;
    }
    scanner.skip_ws();
    if !scanner.at_end() {
        return Err(scanner.error("unexpected input after mutation"));
    }
    Ok(edits)
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Scanner {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> CoreError {
        CoreError::invalid_mutation(self.line, message)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> CoreResult<()> {
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected {expected:?}, found {c:?}"))),
            None => Err(self.error(format!("expected {expected:?}, found end of input"))),
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        let end = self.pos + keyword.chars().count();
        if end > self.chars.len() {
            return false;
        }
        let word: String = self.chars[self.pos..end].iter().collect();
        word == keyword
            && self
                .chars
                .get(end)
                .map_or(true, |c| c.is_whitespace() || *c == '{')
    }

    fn blocks(&mut self, edits: &mut Vec<Edit>) -> CoreResult<()> {
        loop {
            self.skip_ws();
            let op = if self.at_keyword("set") {
                self.pos += 3;
                EditOp::Set
            } else if self.at_keyword("delete") {
                self.pos += 6;
                EditOp::Delete
            } else {
                return Ok(());
            };
            self.skip_ws();
            self.expect('{')?;
            self.statements(op, Some('}'), edits)?;
            self.expect('}')?;
        }
    }

    fn statements(
        &mut self,
        op: EditOp,
        close: Option<char>,
        edits: &mut Vec<Edit>,
    ) -> CoreResult<()> {
        loop {
            self.skip_ws();
            match self.peek() {
                None if close.is_some() => return Err(self.error("unclosed block")),
                None => return Ok(()),
                Some(c) if Some(c) == close => return Ok(()),
                Some(_) => edits.push(self.statement(op)?),
            }
        }
    }

    fn statement(&mut self, op: EditOp) -> CoreResult<Edit> {
        let subject = self.node_ref()?;
        self.skip_ws();
        let predicate = if self.eat('*') {
            PredicateRef::Star
        } else {
            PredicateRef::Named(self.iri("predicate")?)
        };
        self.skip_ws();
        let object = match self.peek() {
            Some('"') => self.literal()?,
            Some('*') => {
                self.bump();
                Object::Star
            }
            Some('<') | Some('_') => Object::Node(self.node_ref()?),
            Some(c) => return Err(self.error(format!("unexpected {c:?} in object position"))),
            None => return Err(self.error("missing object")),
        };
        self.skip_ws();
        if self.peek() == Some('(') {
            return Err(self.error("facets are not supported"));
        }
        self.expect('.')?;
        Ok(Edit {
            op,
            subject,
            predicate,
            object,
        })
    }

    fn node_ref(&mut self) -> CoreResult<NodeRef> {
        match self.peek() {
            Some('<') => {
                let raw = self.iri("node")?;
                raw.parse::<Uid>()
                    .map(NodeRef::Uid)
                    .map_err(|e| self.error(e.to_string()))
            }
            Some('_') => {
                self.bump();
                self.expect(':')?;
                let name = self.take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-'));
                if name.is_empty() {
                    return Err(self.error("blank node without a name"));
                }
                Ok(NodeRef::Blank(name))
            }
            Some(c) => Err(self.error(format!("expected node, found {c:?}"))),
            None => Err(self.error("expected node, found end of input")),
        }
    }

    fn iri(&mut self, what: &str) -> CoreResult<String> {
        self.expect('<')?;
        let inner = self.take_while(|c| c != '>' && c != '\n');
        self.expect('>')?;
        let inner = inner.trim();
        if inner.is_empty() || inner.contains(char::is_whitespace) {
            return Err(self.error(format!("invalid {what} <{inner}>")));
        }
        Ok(inner.to_string())
    }

    fn literal(&mut self) -> CoreResult<Object> {
        self.expect('"')?;
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some('"') => break,
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('u') => self.unicode_escape()?,
                        Some(c) => return Err(self.error(format!("unknown escape \\{c}"))),
                        None => return Err(self.error("unterminated string literal")),
                    };
                    text.push(escaped);
                }
                Some(c) => text.push(c),
            }
        }
        if self.peek() == Some('@') {
            return Err(self.error("language tags are not supported"));
        }
        let hint = if self.eat('^') {
            self.expect('^')?;
            let name = self.iri("type")?;
            Some(
                ValueType::from_xsd(&name)
                    .ok_or_else(|| self.error(format!("unknown type <{name}>")))?,
            )
        } else {
            None
        };
        Ok(Object::Text { text, hint })
    }

    fn unicode_escape(&mut self) -> CoreResult<char> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid \\u escape"))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid \\u escape"))
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&keep) {
            self.bump();
        }
        self.chars[start..self.pos].iter().collect()
    }
}
