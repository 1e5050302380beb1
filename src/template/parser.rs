//! Builds the node tree for a template from lexed segments.

use std::vec::IntoIter;

use crate::error::ParseError;
use crate::functions::Functions;
use crate::value::Value;

use super::lexer::{self, Segment, Spanned, Token};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If(Branch),
    Range(Branch),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Branch {
    pub pipeline: Pipeline,
    pub body: Vec<Node>,
    pub otherwise: Vec<Node>,
}

/// Commands separated by `|`. The value of each command is passed as the last
/// argument of the next.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    /// Field path from dot, or from the root data for `$`.
    Field { from_root: bool, path: Vec<String> },
    Function(String),
    Literal(Value),
}

/// How a node list was closed.
enum Close {
    Eof,
    End,
    Else(Option<Pipeline>),
}

pub(crate) fn parse(src: &str, functions: &Functions) -> Result<Vec<Node>, ParseError> {
    let mut parser = Parser {
        segments: lexer::segments(src)?.into_iter(),
        functions,
        src_len: src.len(),
    };
    let (nodes, close, offset) = parser.list()?;
    match close {
        Close::Eof => Ok(nodes),
        Close::End => Err(ParseError::new(offset, "unexpected {{end}}")),
        Close::Else(_) => Err(ParseError::new(offset, "unexpected {{else}}")),
    }
}

struct Parser<'a, 'f> {
    segments: IntoIter<Segment<'a>>,
    functions: &'f Functions,
    src_len: usize,
}

impl Parser<'_, '_> {
    /// Parse nodes until end of input, `{{end}}` or `{{else}}`.
    fn list(&mut self) -> Result<(Vec<Node>, Close, usize), ParseError> {
        let mut nodes = Vec::new();
        while let Some(segment) = self.segments.next() {
            let (tokens, offset) = match segment {
                Segment::Text(text) => {
                    nodes.push(Node::Text(text.to_string()));
                    continue;
                }
                Segment::Action { tokens, offset } => (tokens, offset),
            };

            match tokens.first().map(|t| &t.token) {
                None => return Err(ParseError::new(offset, "missing value for command")),
                Some(Token::Ident(kw)) if kw == "end" => {
                    if tokens.len() > 1 {
                        return Err(ParseError::new(offset, "unexpected arguments to end"));
                    }
                    return Ok((nodes, Close::End, offset));
                }
                Some(Token::Ident(kw)) if kw == "else" => {
                    let chained = match tokens.get(1).map(|t| &t.token) {
                        None => None,
                        Some(Token::Ident(kw)) if kw == "if" => {
                            Some(self.pipeline(&tokens[2..], offset)?)
                        }
                        Some(_) => {
                            return Err(ParseError::new(offset, "unexpected arguments to else"))
                        }
                    };
                    return Ok((nodes, Close::Else(chained), offset));
                }
                Some(Token::Ident(kw)) if kw == "if" => {
                    let pipeline = self.pipeline(&tokens[1..], offset)?;
                    nodes.push(Node::If(self.branch(pipeline, offset, true)?));
                }
                Some(Token::Ident(kw)) if kw == "range" => {
                    let pipeline = self.pipeline(&tokens[1..], offset)?;
                    nodes.push(Node::Range(self.branch(pipeline, offset, false)?));
                }
                Some(_) => nodes.push(Node::Action(self.pipeline(&tokens, offset)?)),
            }
        }
        Ok((nodes, Close::Eof, self.src_len))
    }

    /// Body and optional else body of an `if` or `range`, through its `{{end}}`.
    fn branch(&mut self, pipeline: Pipeline, offset: usize, allow_else_if: bool) -> Result<Branch, ParseError> {
        let (body, close, close_offset) = self.list()?;
        let otherwise = match close {
            Close::End => Vec::new(),
            Close::Eof => return Err(ParseError::new(offset, "unexpected EOF: missing {{end}}")),
            Close::Else(None) => {
                let (otherwise, close, close_offset) = self.list()?;
                match close {
                    Close::End => otherwise,
                    Close::Eof => {
                        return Err(ParseError::new(offset, "unexpected EOF: missing {{end}}"))
                    }
                    Close::Else(_) => {
                        return Err(ParseError::new(close_offset, "expected end; found {{else}}"))
                    }
                }
            }
            Close::Else(Some(chained)) if allow_else_if => {
                // {{else if x}} shares the {{end}} of the outer if
                vec![Node::If(self.branch(chained, close_offset, true)?)]
            }
            Close::Else(Some(_)) => {
                return Err(ParseError::new(close_offset, "else if is only allowed inside if"))
            }
        };
        Ok(Branch {
            pipeline,
            body,
            otherwise,
        })
    }

    fn pipeline(&self, tokens: &[Spanned], offset: usize) -> Result<Pipeline, ParseError> {
        if tokens.is_empty() {
            return Err(ParseError::new(offset, "missing value for command"));
        }

        let mut commands = Vec::new();
        for group in tokens.split(|t| t.token == Token::Pipe) {
            if group.is_empty() {
                return Err(ParseError::new(offset, "missing command in pipeline"));
            }
            let operands = group
                .iter()
                .map(|t| self.operand(t))
                .collect::<Result<Vec<_>, _>>()?;
            commands.push(Command { operands });
        }
        Ok(Pipeline { commands })
    }

    fn operand(&self, spanned: &Spanned) -> Result<Operand, ParseError> {
        let operand = match &spanned.token {
            Token::Field(path) => Operand::Field {
                from_root: false,
                path: path.clone(),
            },
            Token::Variable(path) => Operand::Field {
                from_root: true,
                path: path.clone(),
            },
            Token::Str(s) => Operand::Literal(Value::String(s.clone())),
            Token::Int(i) => Operand::Literal(Value::Int(*i)),
            Token::Float(f) => Operand::Literal(Value::Float(*f)),
            Token::Ident(name) => match name.as_str() {
                "true" => Operand::Literal(Value::Bool(true)),
                "false" => Operand::Literal(Value::Bool(false)),
                "nil" => Operand::Literal(Value::Null),
                "if" | "range" | "else" | "end" => {
                    return Err(ParseError::new(spanned.offset, format!("unexpected {name} in operand")))
                }
                _ if self.functions.contains(name) => Operand::Function(name.clone()),
                _ => {
                    return Err(ParseError::new(
                        spanned.offset,
                        format!("function {name:?} not defined"),
                    ))
                }
            },
            Token::Pipe => return Err(ParseError::new(spanned.offset, "unexpected |")),
        };
        Ok(operand)
    }
}
