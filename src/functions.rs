//! Named functions callable from template pipelines.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, ExecError, Result};

/// Error returned by a fallible template function.
pub type FunctionError = Box<dyn std::error::Error + Send + Sync>;

type FunctionResult = std::result::Result<String, FunctionError>;
type NullaryFn = dyn Fn() -> FunctionResult + Send + Sync;
type UnaryFn = dyn Fn(&str) -> FunctionResult + Send + Sync;

/// A function registered under a name: no argument or one string argument,
/// returning a string or a string-or-error.
#[derive(Clone)]
pub enum TemplateFunction {
    Nullary(Arc<NullaryFn>),
    Unary(Arc<UnaryFn>),
}

impl TemplateFunction {
    pub fn nullary<F>(f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self::Nullary(Arc::new(move || Ok(f())))
    }

    pub fn try_nullary<F, E>(f: F) -> Self
    where
        F: Fn() -> std::result::Result<String, E> + Send + Sync + 'static,
        E: Into<FunctionError>,
    {
        Self::Nullary(Arc::new(move || f().map_err(Into::into)))
    }

    /// ```
    /// use docx_template::TemplateFunction;
    /// let greet = TemplateFunction::unary(|name| format!("Hello {name}"));
    /// assert_eq!(greet.arity(), 1);
    /// ```
    pub fn unary<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::Unary(Arc::new(move |s| Ok(f(s))))
    }

    pub fn try_unary<F, E>(f: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<String, E> + Send + Sync + 'static,
        E: Into<FunctionError>,
    {
        Self::Unary(Arc::new(move |s| f(s).map_err(Into::into)))
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Nullary(_) => 0,
            Self::Unary(_) => 1,
        }
    }

    /// Invoke with already rendered arguments. Panics inside the function are
    /// caught and reported as [`ExecError::FunctionPanicked`].
    pub(crate) fn call(&self, name: &str, args: &[String]) -> std::result::Result<String, ExecError> {
        if args.len() != self.arity() {
            return Err(ExecError::Arity {
                name: name.to_string(),
                want: self.arity(),
                got: args.len(),
            });
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match self {
            Self::Nullary(f) => f(),
            Self::Unary(f) => f(&args[0]),
        }));

        match outcome {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(source)) => Err(ExecError::Function {
                name: name.to_string(),
                source,
            }),
            Err(payload) => Err(ExecError::FunctionPanicked {
                name: name.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for TemplateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TemplateFunction(arity {})", self.arity())
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A letter or `_` followed by letters, digits and underscores.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// A function table. Each document owns its own copy, seeded from
/// [`Functions::builtin`].
#[derive(Debug, Clone, Default)]
pub struct Functions {
    table: BTreeMap<String, TemplateFunction>,
}

impl Functions {
    /// `upper`, `lower` and `title`.
    pub fn builtin() -> Self {
        let mut table = BTreeMap::new();
        table.insert("upper".to_string(), TemplateFunction::unary(str::to_uppercase));
        table.insert("lower".to_string(), TemplateFunction::unary(str::to_lowercase));
        table.insert("title".to_string(), TemplateFunction::unary(title_case));
        Self { table }
    }

    /// Add or replace a function. The name must be a valid identifier.
    pub fn register(&mut self, name: &str, function: TemplateFunction) -> Result<()> {
        if !is_valid_name(name) {
            return Err(Error::InvalidFunctionName(name.to_string()));
        }
        if self.table.insert(name.to_string(), function).is_some() {
            debug!("Replaced function {}", name);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TemplateFunction> {
        self.table.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Capitalise the first letter of every word and lowercase the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            // apostrophes stay inside a word: "o'neil" -> "O'neil"
            at_word_start = c != '\'' && c != '\u{2019}';
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("hello", true)]
    #[case("hello123", true)]
    #[case("my_function", true)]
    #[case("_private", true)]
    #[case("größe", true)]
    #[case("", false)]
    #[case("1", false)]
    #[case("hello!", false)]
    #[case("with space", false)]
    fn test_is_valid_name(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_valid_name(name), expected);
    }

    #[rstest]
    #[case("tom watkins", "Tom Watkins")]
    #[case("TOM WATKINS", "Tom Watkins")]
    #[case("o'neil-smith", "O'neil-Smith")]
    #[case("élan vital", "Élan Vital")]
    #[case("", "")]
    fn test_title_case(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(title_case(input), expected);
    }

    #[test]
    fn test_builtins() {
        let functions = Functions::builtin();
        assert_eq!(functions.names().collect::<Vec<_>>(), vec!["lower", "title", "upper"]);
        let upper = functions.get("upper").unwrap();
        assert_eq!(upper.call("upper", &["tom".to_string()]).unwrap(), "TOM");
    }

    #[test]
    fn test_register_rejects_bad_names() {
        let mut functions = Functions::builtin();
        let err = functions
            .register("bad name", TemplateFunction::nullary(String::new))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFunctionName(name) if name == "bad name"));
        assert_eq!(functions.len(), 3);
    }

    #[test]
    fn test_register_overwrites() {
        let mut functions = Functions::builtin();
        functions
            .register("upper", TemplateFunction::unary(|s| format!("<{s}>")))
            .unwrap();
        let upper = functions.get("upper").unwrap();
        assert_eq!(upper.call("upper", &["x".to_string()]).unwrap(), "<x>");
    }

    #[test]
    fn test_arity_mismatch() {
        let hello = TemplateFunction::nullary(|| "hello".to_string());
        let err = hello.call("hello", &["x".to_string()]).unwrap_err();
        assert!(matches!(err, ExecError::Arity { want: 0, got: 1, .. }));
    }

    #[test]
    fn test_fallible_function_error() {
        let check = TemplateFunction::try_unary(|s: &str| {
            if s.is_empty() {
                Err("empty input")
            } else {
                Ok(s.to_string())
            }
        });
        assert_eq!(check.call("check", &["ok".to_string()]).unwrap(), "ok");
        let err = check.call("check", &[String::new()]).unwrap_err();
        assert_eq!(err.to_string(), "error calling check: empty input");
    }

    #[test]
    fn test_panicking_function_is_caught() {
        let boom = TemplateFunction::nullary(|| panic!("boom"));
        let err = boom.call("boom", &[]).unwrap_err();
        assert!(matches!(err, ExecError::FunctionPanicked { message, .. } if message == "boom"));
    }
}
