//! XML escaping of substituted values and repair of drawings placed in text.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Escape the five XML special characters.
pub fn escape_xml(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Escape character data for a text node: `&`, `<` and `>` only, so quotes in
/// template actions survive serialization.
pub(crate) fn escape_text(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
    )
}

static TEXT_OPEN_BEFORE_DRAWING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<w:t(?:\s[^>]*)?><w:drawing>").unwrap());
static TEXT_CLOSE_AFTER_DRAWING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</w:drawing></w:t>").unwrap());
static TEXT_LEADING_DRAWING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(<w:t(?:\s[^>]*)?>)([^<]+)<w:drawing>").unwrap());
static TEXT_TRAILING_DRAWING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</w:drawing>([^<]+)</w:t>").unwrap());

/// Lift drawings out of the `<w:t>` elements they were substituted into.
///
/// A wrapper tag directly touching a drawing is dropped. Text sharing a `<w:t>`
/// with a drawing keeps its own `<w:t>` and the drawing becomes its sibling.
pub fn repair_drawings(xml: &str) -> String {
    if !xml.contains("<w:drawing>") {
        return xml.to_string();
    }

    let xml = TEXT_OPEN_BEFORE_DRAWING.replace_all(xml, "<w:drawing>");
    let xml = TEXT_CLOSE_AFTER_DRAWING.replace_all(&xml, "</w:drawing>");
    let xml = TEXT_LEADING_DRAWING.replace_all(&xml, "$1$2</w:t><w:drawing>");
    let xml = TEXT_TRAILING_DRAWING.replace_all(&xml, r#"</w:drawing><w:t xml:space="preserve">$1</w:t>"#);
    xml.into_owned()
}
