//! Evaluation of a parsed template against a [`Value`] tree.

use std::borrow::Cow;

use crate::config::MissingKey;
use crate::error::ExecError;
use crate::escape::escape_xml;
use crate::functions::Functions;
use crate::value::Value;

use super::parser::{Branch, Command, Node, Operand, Pipeline};

static NULL: Value = Value::Null;

type ExecResult<T> = Result<T, ExecError>;

pub(crate) struct Exec<'a> {
    pub root: &'a Value,
    pub functions: &'a Functions,
    pub missing_key: MissingKey,
}

impl<'a> Exec<'a> {
    pub(crate) fn walk<'d>(&self, nodes: &[Node], dot: &'d Value, out: &mut String) -> ExecResult<()>
    where
        'a: 'd,
    {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => {
                    let value = self.pipeline(pipeline, dot)?;
                    print(&value, out)?;
                }
                Node::If(branch) => {
                    let nodes = if self.pipeline(&branch.pipeline, dot)?.is_truthy() {
                        &branch.body
                    } else {
                        &branch.otherwise
                    };
                    self.walk(nodes, dot, out)?;
                }
                Node::Range(branch) => self.range(branch, dot, out)?,
            }
        }
        Ok(())
    }

    fn range<'d>(&self, branch: &Branch, dot: &'d Value, out: &mut String) -> ExecResult<()>
    where
        'a: 'd,
    {
        let value = self.pipeline(&branch.pipeline, dot)?;
        let items: Vec<&Value> = match value.as_ref() {
            Value::Seq(items) => items.iter().collect(),
            Value::Dict(dict) => dict.values().collect(),
            Value::Null => Vec::new(),
            other => return Err(ExecError::NotIterable(other.kind())),
        };

        if items.is_empty() {
            return self.walk(&branch.otherwise, dot, out);
        }
        for item in items {
            self.walk(&branch.body, item, out)?;
        }
        Ok(())
    }

    fn pipeline<'d>(&self, pipeline: &Pipeline, dot: &'d Value) -> ExecResult<Cow<'d, Value>>
    where
        'a: 'd,
    {
        let mut piped = None;
        for command in &pipeline.commands {
            piped = Some(self.command(command, dot, piped)?);
        }
        Ok(piped.unwrap_or(Cow::Borrowed(&NULL)))
    }

    fn command<'d>(
        &self,
        command: &Command,
        dot: &'d Value,
        piped: Option<Cow<'d, Value>>,
    ) -> ExecResult<Cow<'d, Value>>
    where
        'a: 'd,
    {
        let Some((first, rest)) = command.operands.split_first() else {
            return Ok(piped.unwrap_or(Cow::Borrowed(&NULL)));
        };

        let Operand::Function(name) = first else {
            if !rest.is_empty() || piped.is_some() {
                return Err(ExecError::NotAFunction(describe(first)));
            }
            return self.operand(first, dot);
        };

        let mut args = rest
            .iter()
            .map(|op| self.operand(op, dot).and_then(|v| text_of(&v)))
            .collect::<ExecResult<Vec<_>>>()?;
        if let Some(value) = piped {
            args.push(text_of(&value)?);
        }
        self.call(name, &args)
    }

    fn operand<'d>(&self, operand: &Operand, dot: &'d Value) -> ExecResult<Cow<'d, Value>>
    where
        'a: 'd,
    {
        match operand {
            Operand::Field { from_root, path } => {
                let start = if *from_root { self.root } else { dot };
                self.field(start, path)
            }
            Operand::Literal(value) => Ok(Cow::Owned(value.clone())),
            Operand::Function(name) => self.call(name, &[]),
        }
    }

    fn call<'d>(&self, name: &str, args: &[String]) -> ExecResult<Cow<'d, Value>> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| ExecError::NotAFunction(name.to_string()))?;
        Ok(Cow::Owned(Value::String(function.call(name, args)?)))
    }

    fn field<'d>(&self, start: &'d Value, path: &[String]) -> ExecResult<Cow<'d, Value>> {
        let mut current = start;
        for name in path {
            current = match current {
                Value::Dict(dict) => match dict.get(name) {
                    Some(value) => value,
                    None => return self.missing(name),
                },
                Value::Null => return self.missing(name),
                other => {
                    return Err(ExecError::FieldOnNonDict {
                        field: name.clone(),
                        kind: other.kind(),
                    })
                }
            };
        }
        Ok(Cow::Borrowed(current))
    }

    fn missing<'d>(&self, name: &str) -> ExecResult<Cow<'d, Value>> {
        match self.missing_key {
            MissingKey::Empty => Ok(Cow::Borrowed(&NULL)),
            MissingKey::Error => Err(ExecError::MissingKey(name.to_string())),
        }
    }
}

fn describe(operand: &Operand) -> String {
    match operand {
        Operand::Field { from_root, path } => {
            let root = if *from_root { "$" } else { "" };
            if path.is_empty() {
                if *from_root { "$" } else { "." }.to_string()
            } else {
                format!("{root}.{}", path.join("."))
            }
        }
        Operand::Function(name) => name.clone(),
        Operand::Literal(value) => value.as_text().map(Cow::into_owned).unwrap_or_default(),
    }
}

fn text_of(value: &Value) -> ExecResult<String> {
    value
        .as_text()
        .map(Cow::into_owned)
        .ok_or(ExecError::Unprintable(value.kind()))
}

/// Markup goes in verbatim, scalars are escaped.
fn print(value: &Value, out: &mut String) -> ExecResult<()> {
    if let Value::Markup(markup) = value {
        out.push_str(markup.as_str());
        return Ok(());
    }
    let text = value
        .as_text()
        .ok_or(ExecError::Unprintable(value.kind()))?;
    out.push_str(&escape_xml(&text));
    Ok(())
}
