//! A small text template language over [`Value`] trees.
//!
//! Actions are delimited by `{{` and `}}`:
//!
//! - `{{.Name}}`, `{{.Nested.Field}}`, `{{.}}`, `{{$.Top}}`: field lookup
//! - `{{upper .Name}}`, `{{.Name | lower | title}}`: function pipelines
//! - `{{range .Items}} … {{else}} … {{end}}`: iteration
//! - `{{if .Flag}} … {{else if .Other}} … {{else}} … {{end}}`: conditionals
//!
//! Scalar output is XML-escaped; [`Markup`](crate::Markup) values are inserted
//! as they are.

mod exec;
mod lexer;
mod parser;

use crate::config::MissingKey;
use crate::error::{ExecError, ParseError};
use crate::functions::Functions;
use crate::value::Value;

use exec::Exec;
use parser::Node;

/// A parsed template, ready to execute.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parse `src`. Function names are resolved against `functions` here, so an
    /// unknown function is a parse error.
    pub fn parse(src: &str, functions: &Functions) -> Result<Self, ParseError> {
        Ok(Self {
            nodes: parser::parse(src, functions)?,
        })
    }

    pub fn execute(
        &self,
        data: &Value,
        functions: &Functions,
        missing_key: MissingKey,
    ) -> Result<String, ExecError> {
        let exec = Exec {
            root: data,
            functions,
            missing_key,
        };
        let mut out = String::new();
        exec.walk(&self.nodes, data, &mut out)?;
        Ok(out)
    }
}
