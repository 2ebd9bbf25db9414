//! Query tokenizer.

use crate::error::{QueryError, QueryResult};

/// A token kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `@`
    At,
    /// Names, keywords, numbers and uid literals.
    Word(String),
    /// Double-quoted string, unescaped.
    Str(String),
    /// End of input.
    Eof,
}

impl Token {
    /// Short description used in error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Token::LBrace => "'{'".into(),
            Token::RBrace => "'}'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::Colon => "':'".into(),
            Token::Comma => "','".into(),
            Token::At => "'@'".into(),
            Token::Word(word) => format!("{word:?}"),
            Token::Str(_) => "string".into(),
            Token::Eof => "end of query".into(),
        }
    }
}

/// A token and where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '~' | '-')
}

/// Splits query text into tokens, ending with [`Token::Eof`].
///
/// `#` starts a comment running to the end of the line.
pub fn tokenize(text: &str) -> QueryResult<Vec<Spanned>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    let mut column = 1;

    while i < chars.len() {
        let c = chars[i];
        let (start_line, start_column) = (line, column);
        let mut push = |token: Token| {
            tokens.push(Spanned {
                token,
                line: start_line,
                column: start_column,
            });
        };

        if c == '\n' {
            i += 1;
            line += 1;
            column = 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            column += 1;
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        let single = match c {
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ':' => Some(Token::Colon),
            ',' => Some(Token::Comma),
            '@' => Some(Token::At),
            _ => None,
        };
        if let Some(token) = single {
            push(token);
            i += 1;
            column += 1;
            continue;
        }

        if c == '"' {
            i += 1;
            column += 1;
            let mut value = String::new();
            loop {
                let Some(&c) = chars.get(i) else {
                    return Err(QueryError::parse(
                        start_line,
                        start_column,
                        "unterminated string",
                    ));
                };
                i += 1;
                column += 1;
                match c {
                    '"' => break,
                    '\\' => {
                        let escaped = chars.get(i).copied();
                        i += 1;
                        column += 1;
                        value.push(match escaped {
                            Some('"') => '"',
                            Some('\\') => '\\',
                            Some('n') => '\n',
                            Some('t') => '\t',
                            other => {
                                return Err(QueryError::parse(
                                    line,
                                    column - 2,
                                    format!("invalid escape {other:?}"),
                                ));
                            }
                        });
                    }
                    '\n' => {
                        return Err(QueryError::parse(
                            start_line,
                            start_column,
                            "newline in string",
                        ));
                    }
                    c => value.push(c),
                }
            }
            push(Token::Str(value));
            continue;
        }

        if is_word_char(c) {
            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            column += i - start;
            push(Token::Word(chars[start..i].iter().collect()));
            continue;
        }

        return Err(QueryError::parse(
            line,
            column,
            format!("unexpected character {c:?}"),
        ));
    }

    tokens.push(Spanned {
        token: Token::Eof,
        line,
        column,
    });
    Ok(tokens)
}
