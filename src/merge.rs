//! Reassembly of template tags that the authoring tool split across runs.
//!
//! Word freely splits `{{.Name}}` into `{{`, `.Na`, `me}}` when formatting,
//! spell-check marks or revision ids change mid-tag. Merging moves every tag
//! back into a single text item so the template parser sees it whole.

use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, warn};

use crate::document::{Block, Paragraph, ParagraphChild, RunChild, Text};
use crate::error::{Error, Result};
use crate::functions::panic_message;

static CONTAINS_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{.*?\}\}").unwrap());

pub(crate) fn contains_tag(text: &str) -> bool {
    CONTAINS_TAG.is_match(text)
}

/// A `{{` whose closing `}}` has not arrived yet, or a half delimiter at either end.
pub(crate) fn contains_incomplete_tag(text: &str) -> bool {
    if text.starts_with('}') || text.ends_with('{') {
        return true;
    }
    text.match_indices("{{").any(|(i, _)| {
        let rest = &text[i + 2..];
        match rest.find('}') {
            None => true,
            Some(j) => j + 1 == rest.len(),
        }
    })
}

/// Merge tags in every block, one task per top-level block and per cell
/// paragraph. Block order is untouched; the first failing task is reported.
pub fn merge_tags(blocks: &mut [Block]) -> Result<()> {
    debug!("Merging tags across {} blocks", blocks.len());
    let outcomes: Vec<Result<()>> = blocks.par_iter_mut().map(merge_block).collect();
    outcomes.into_iter().collect()
}

fn merge_block(block: &mut Block) -> Result<()> {
    match block {
        Block::Paragraph(paragraph) => guarded(|| merge_paragraph(paragraph)),
        Block::Table(table) => {
            let cells: Vec<&mut Vec<Block>> = table
                .rows_mut()
                .flat_map(|row| row.cells_mut())
                .map(|cell| &mut cell.content)
                .collect();
            let outcomes: Vec<Result<()>> = cells
                .into_par_iter()
                .flat_map_iter(|content| content.iter_mut())
                .map(merge_block)
                .collect();
            outcomes.into_iter().collect()
        }
        Block::Raw(_) => Ok(()),
    }
}

fn guarded(task: impl FnOnce()) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(task))
        .map_err(|payload| Error::MergeTask(panic_message(payload.as_ref())))
}

fn text_at(paragraph: &mut Paragraph, child: usize, item: usize) -> Option<&mut Text> {
    match paragraph.children.get_mut(child)? {
        ParagraphChild::Run(run) => match run.children.get_mut(item)? {
            RunChild::Text(text) => Some(text),
            _ => None,
        },
        ParagraphChild::Raw(_) => None,
    }
}

/// Put absorbed fragments back where they came from.
fn restore(paragraph: &mut Paragraph, absorbed: &mut Vec<(usize, usize, String)>) {
    for (child, item, original) in absorbed.drain(..) {
        if let Some(text) = text_at(paragraph, child, item) {
            text.text = original;
        }
    }
}

pub(crate) fn merge_paragraph(paragraph: &mut Paragraph) {
    let mut current = String::new();
    let mut in_incomplete_tag = false;
    let mut absorbed: Vec<(usize, usize, String)> = Vec::new();

    let positions: Vec<(usize, usize)> = paragraph
        .children
        .iter()
        .enumerate()
        .filter_map(|(c, child)| match child {
            ParagraphChild::Run(run) => Some((c, run)),
            ParagraphChild::Raw(_) => None,
        })
        .flat_map(|(c, run)| {
            run.children
                .iter()
                .enumerate()
                .filter(|(_, item)| matches!(item, RunChild::Text(_)))
                .map(move |(i, _)| (c, i))
        })
        .collect();

    for (child, item) in positions {
        let Some(text) = text_at(paragraph, child, item) else {
            continue;
        };
        if !in_incomplete_tag {
            current.clear();
        }
        current.push_str(&text.text);

        if contains_incomplete_tag(&current) {
            absorbed.push((child, item, std::mem::take(&mut text.text)));
            in_incomplete_tag = true;
            continue;
        }

        in_incomplete_tag = false;
        if contains_tag(&current) {
            text.text.clone_from(&current);
            absorbed.clear();
        } else {
            restore(paragraph, &mut absorbed);
        }
    }

    // an unterminated tag at the end of the paragraph stays as literal text
    if in_incomplete_tag {
        warn!("Unterminated tag left as text: {:?}", current);
        restore(paragraph, &mut absorbed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Cell, Row, Run, Table};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn paragraph(runs: &[&[&str]]) -> Paragraph {
        Paragraph::new(runs.iter().map(|texts| Run::from_texts(texts.iter().copied())).collect())
    }

    fn texts(paragraph: &Paragraph) -> Vec<&str> {
        paragraph.texts().collect()
    }

    #[rstest]
    #[case("{{.Name}}", false)]
    #[case("{{.Na", true)]
    #[case("{{.Name}", true)]
    #[case("Hello {", true)]
    #[case("} there", true)]
    #[case("{{.A}} and {{.B", true)]
    #[case("plain", false)]
    fn test_contains_incomplete_tag(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(contains_incomplete_tag(text), expected);
    }

    #[test]
    fn test_tag_split_across_runs() {
        let mut p = paragraph(&[&["Author: {{"], &[".Na"], &["me}}"]]);
        merge_paragraph(&mut p);
        assert_eq!(texts(&p), vec!["", "", "Author: {{.Name}}"]);
    }

    #[test]
    fn test_every_split_point_merges() {
        let tag = "{{upper .Name}}";
        for a in 1..tag.len() {
            for b in a + 1..tag.len() {
                let runs: &[&[&str]] = &[&[&tag[..a]], &[&tag[a..b], &tag[b..]]];
                let mut p = paragraph(runs);
                merge_paragraph(&mut p);
                let merged = texts(&p);
                assert_eq!(merged.iter().filter(|t| !t.is_empty()).count(), 1);
                assert_eq!(merged[2], tag, "split at {a}/{b}");
            }
        }
    }

    /// `{{upper .Name}}` cut into `sizes.iter().sum()` pieces, laid out as one
    /// run per entry of `sizes` holding that many text items.
    #[rstest]
    #[case(&[1])]
    #[case(&[2])]
    #[case(&[1, 1])]
    #[case(&[1, 2, 1])]
    #[case(&[3, 1, 2])]
    #[case(&[4, 4, 4, 3])]
    fn test_split_into_many_items_merges_into_last(#[case] sizes: &[usize]) {
        let tag = "{{upper .Name}}";
        let count: usize = sizes.iter().sum();
        let bounds: Vec<usize> = (0..=count).map(|i| i * tag.len() / count).collect();
        let mut pieces = bounds.windows(2).map(|w| &tag[w[0]..w[1]]);
        let groups: Vec<Vec<&str>> = sizes
            .iter()
            .map(|&n| pieces.by_ref().take(n).collect())
            .collect();
        let runs: Vec<&[&str]> = groups.iter().map(Vec::as_slice).collect();

        let mut p = paragraph(&runs);
        merge_paragraph(&mut p);
        let merged = texts(&p);
        assert_eq!(merged.len(), count);
        assert_eq!(merged[count - 1], tag);
        assert!(merged[..count - 1].iter().all(|t| t.is_empty()), "{merged:?}");
    }

    #[test]
    fn test_text_without_tags_is_unchanged() {
        let runs: &[&[&str]] = &[&["Hello "], &["world", "!"], &["{ not a tag"]];
        let mut p = paragraph(runs);
        let before = p.clone();
        merge_paragraph(&mut p);
        assert_eq!(p, before);
    }

    #[test]
    fn test_unterminated_tag_is_left_literal() {
        let mut p = paragraph(&[&["Hello "], &["{{.Na"], &["me"]]);
        merge_paragraph(&mut p);
        assert_eq!(texts(&p), vec!["Hello ", "{{.Na", "me"]);
    }

    #[test]
    fn test_two_tags_in_one_paragraph() {
        let mut p = paragraph(&[&["{{.A"], &["}} and {{"], &[".B}}"]]);
        merge_paragraph(&mut p);
        assert_eq!(texts(&p), vec!["", "", "{{.A}} and {{.B}}"]);
    }

    #[test]
    fn test_merge_tags_in_tables_and_keeps_order() {
        let cell = Cell::new(vec![Block::Paragraph(paragraph(&[&["{{.Na"], &["me}}"]]))]);
        let mut blocks = vec![
            Block::Paragraph(paragraph(&[&["{{"], &[".First}}"]])),
            Block::Table(Table::new(vec![Row::new(vec![cell])])),
            Block::Raw("<w:sectPr/>".to_string()),
        ];
        merge_tags(&mut blocks).unwrap();

        let Block::Paragraph(first) = &blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(first.text(), "{{.First}}");
        let Block::Table(table) = &blocks[1] else {
            panic!("expected table");
        };
        let cell = table.rows().next().unwrap().cells().next().unwrap();
        let Block::Paragraph(inner) = &cell.content[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(texts(inner), vec!["", "{{.Name}}"]);
        assert_eq!(blocks[2], Block::Raw("<w:sectPr/>".to_string()));
    }
}
