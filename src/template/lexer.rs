//! Splits template text into literal text and `{{ … }}` actions, and lexes the
//! inside of each action.

use crate::error::ParseError;

pub(crate) const LEFT_DELIM: &str = "{{";
pub(crate) const RIGHT_DELIM: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// `.` (empty path) or `.A.B`.
    Field(Vec<String>),
    /// `$` (empty path) or `$.A.B`.
    Variable(Vec<String>),
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Pipe,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment<'a> {
    Text(&'a str),
    Action { tokens: Vec<Spanned>, offset: usize },
}

pub(crate) fn segments(src: &str) -> Result<Vec<Segment<'_>>, ParseError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(found) = src[pos..].find(LEFT_DELIM) {
        let start = pos + found;
        if start > pos {
            out.push(Segment::Text(&src[pos..start]));
        }
        let mut lexer = ActionLexer {
            src,
            pos: start + LEFT_DELIM.len(),
            action: start,
        };
        let tokens = lexer.run()?;
        out.push(Segment::Action {
            tokens,
            offset: start,
        });
        pos = lexer.pos;
    }
    if pos < src.len() {
        out.push(Segment::Text(&src[pos..]));
    }
    Ok(out)
}

/// Actions are lexed from serialized XML, so literals arrive entity-encoded.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

struct ActionLexer<'a> {
    src: &'a str,
    pos: usize,
    action: usize,
}

impl<'a> ActionLexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.pos, message)
    }

    /// Lex up to and including the closing delimiter.
    fn run(&mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let trimmed = self.rest().trim_start();
            self.pos = self.src.len() - trimmed.len();

            if self.rest().starts_with(RIGHT_DELIM) {
                self.pos += RIGHT_DELIM.len();
                return Ok(tokens);
            }
            let Some(c) = self.peek() else {
                return Err(ParseError::new(self.action, "unclosed action"));
            };

            let offset = self.pos;
            let token = match c {
                '|' => {
                    self.pos += 1;
                    Token::Pipe
                }
                '"' => Token::Str(self.quoted()?),
                '`' => Token::Str(self.raw_string()?),
                '.' => Token::Field(self.path()?),
                '$' => {
                    self.pos += 1;
                    if self.peek().is_some_and(is_ident_char) {
                        return Err(self.error("variables other than $ are not supported"));
                    }
                    Token::Variable(self.path()?)
                }
                c if c.is_ascii_digit() || c == '-' || c == '+' => self.number()?,
                c if c.is_alphabetic() || c == '_' => Token::Ident(self.ident()),
                other => return Err(self.error(format!("unexpected {other:?} in action"))),
            };
            tokens.push(Spanned { token, offset });
        }
    }

    fn ident(&mut self) -> String {
        let len = self
            .rest()
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(self.rest().len());
        let ident = self.rest()[..len].to_string();
        self.pos += len;
        ident
    }

    /// Zero or more `.name` segments. A lone `.` is the empty path.
    fn path(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = Vec::new();
        while self.peek() == Some('.') {
            self.pos += 1;
            if !self.peek().is_some_and(is_ident_char) {
                if names.is_empty() {
                    break;
                }
                return Err(self.error("bad field syntax"));
            }
            names.push(self.ident());
        }
        Ok(names)
    }

    fn quoted(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(decode_entities(&out));
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, other)) => {
                        return Err(ParseError::new(
                            start,
                            format!("unknown escape sequence \\{other}"),
                        ))
                    }
                    None => break,
                },
                _ => out.push(c),
            }
        }
        Err(ParseError::new(start, "unterminated quoted string"))
    }

    fn raw_string(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        self.pos += 1;
        match self.rest().find('`') {
            Some(end) => {
                let text = decode_entities(&self.rest()[..end]);
                self.pos += end + 1;
                Ok(text)
            }
            None => Err(ParseError::new(start, "unterminated raw quoted string")),
        }
    }

    fn number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let rest = self.rest();
        let mut len = 0;
        if rest.starts_with(['-', '+']) {
            len = 1;
        }
        let mut seen_dot = false;
        for c in rest[len..].chars() {
            match c {
                '0'..='9' => {}
                '.' if !seen_dot => seen_dot = true,
                _ => break,
            }
            len += 1;
        }
        let text = &rest[..len];
        self.pos += len;

        let parsed = if seen_dot {
            text.parse().map(Token::Float).ok()
        } else {
            text.parse().map(Token::Int).ok()
        };
        parsed.ok_or_else(|| ParseError::new(start, format!("bad number syntax: {text:?}")))
    }
}
