//! Collapses table rows that carry block markers (`{{range …}}`, `{{if …}}`,
//! `{{else}}`, `{{else if …}}`, `{{end}}`) into the bare markers, so the rows
//! between them repeat once per element or show conditionally.
//!
//! ```text
//! <w:tr>…{{range .People}}…</w:tr>        {{range .People}}
//! <w:tr>…{{.Name}}…</w:tr>          =>    <w:tr>…{{.Name}}…</w:tr>
//! <w:tr>…{{end}}…</w:tr>                  {{end}}
//! ```
//!
//! Rows are found with a scanner that tracks row nesting, so a match never
//! spans into a sibling or nested row. Only rows with no nested row are
//! collapsed.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};

const ROW_OPEN: &str = "<w:tr";
const ROW_CLOSE: &str = "</w:tr>";

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(?:(range|if)\s[^}]*?|(else)(?:\s+if\s[^}]*?)?|(end))\s*\}\}").unwrap()
});

enum RowTag {
    Open { end: usize, self_closing: bool },
    Close { end: usize },
}

/// Next row start or end tag at or after `from`, with its byte offset.
fn next_row_tag(xml: &str, from: usize) -> Option<(usize, RowTag)> {
    let mut pos = from;
    while let Some(found) = xml[pos..].find('<') {
        let at = pos + found;
        let rest = &xml[at..];
        if rest.starts_with(ROW_CLOSE) {
            return Some((at, RowTag::Close { end: at + ROW_CLOSE.len() }));
        }
        if rest.starts_with(ROW_OPEN)
            && rest[ROW_OPEN.len()..].starts_with(|c: char| c == '>' || c == '/' || c.is_whitespace())
        {
            let gt = rest.find('>')?;
            return Some((
                at,
                RowTag::Open {
                    end: at + gt + 1,
                    self_closing: rest[..gt].ends_with('/'),
                },
            ));
        }
        pos = at + 1;
    }
    None
}

/// The markers a row collapses to, if it is a block row.
///
/// A row is a block row when its markers do not balance inside it: an opener
/// without its `{{end}}`, an `{{end}}` or `{{else}}` belonging to an outer
/// block. A row whose blocks open and close within itself
/// (`{{range .Tags}}{{.}}{{end}}` in one cell) is an ordinary row and is left
/// alone.
fn block_markers(row: &str) -> Option<String> {
    let mut depth: usize = 0;
    let mut unbalanced = false;
    let mut markers = String::new();
    for caps in MARKER.captures_iter(row) {
        if caps.get(1).is_some() {
            depth += 1;
        } else if caps.get(2).is_some() {
            unbalanced |= depth == 0;
        } else if depth == 0 {
            unbalanced = true;
        } else {
            depth -= 1;
        }
        markers.push_str(&caps[0]);
    }
    (unbalanced || depth > 0).then_some(markers)
}

/// Collapse every block row in `xml`. Fails with [`Error::RangeTimeout`] when the
/// pass takes longer than `limit`.
pub fn normalize_range_rows(xml: &str, limit: Duration) -> Result<String> {
    let deadline = Instant::now() + limit;
    let mut xml = xml.to_string();
    // (start offset, contains a nested row)
    let mut open_rows: Vec<(usize, bool)> = Vec::new();
    let mut pos = 0;
    let mut collapsed = 0;

    while let Some((at, tag)) = next_row_tag(&xml, pos) {
        if Instant::now() >= deadline {
            return Err(Error::RangeTimeout { limit });
        }

        match tag {
            RowTag::Open { end, self_closing } => {
                if let Some(parent) = open_rows.last_mut() {
                    parent.1 = true;
                }
                if !self_closing {
                    open_rows.push((at, false));
                }
                pos = end;
            }
            RowTag::Close { end } => {
                pos = end;
                let Some((start, nested)) = open_rows.pop() else {
                    continue;
                };
                if nested {
                    continue;
                }
                if let Some(markers) = block_markers(&xml[start..end]) {
                    xml.replace_range(start..end, &markers);
                    pos = start + markers.len();
                    collapsed += 1;
                }
            }
        }
    }

    debug!("Collapsed {} table block rows", collapsed);
    Ok(xml)
}
