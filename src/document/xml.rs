use roxmltree::Node;

use crate::error::{Error, Result};

use super::{
    Block, Cell, Document, Paragraph, ParagraphChild, Row, RowChild, Run, RunChild, Table,
    TableChild, Tag, Text, W_NS,
};

pub(super) fn parse_document(part: &str, xml: &str) -> Result<Document> {
    let doc = roxmltree::Document::parse(xml).map_err(|source| Error::Xml {
        part: part.to_string(),
        source,
    })?;

    let body = doc
        .root_element()
        .children()
        .find(|n| is_w(n, "body"))
        .ok_or_else(|| Error::MalformedPart {
            part: part.to_string(),
            message: "no w:body element".to_string(),
        })?;

    let range = body.range();
    Ok(Document {
        part: part.to_string(),
        prefix: xml[..range.start].to_string(),
        body_tag: start_tag(xml, &body),
        blocks: blocks(xml, &body),
        suffix: xml[range.end..].to_string(),
    })
}

fn is_w(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == Some(W_NS)
}

fn raw(src: &str, node: &Node) -> String {
    src[node.range()].to_string()
}

/// Source of the start tag up to, not including, `>` or `/>`.
fn start_tag(src: &str, node: &Node) -> Tag {
    let tag_src = &src[node.range()];
    let mut quote = None;
    let mut end = tag_src.len();
    for (i, c) in tag_src.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => {
                end = i;
                break;
            }
            _ => {}
        }
    }
    let open = tag_src[..end].trim_end_matches('/').trim_end();
    let name_len = open[1..]
        .find(|c: char| c.is_whitespace())
        .unwrap_or(open.len() - 1);
    Tag {
        open: open.to_string(),
        name: open[1..1 + name_len].to_string(),
    }
}

fn blocks(src: &str, parent: &Node) -> Vec<Block> {
    parent
        .children()
        .map(|node| {
            if is_w(&node, "p") {
                Block::Paragraph(paragraph(src, &node))
            } else if is_w(&node, "tbl") {
                Block::Table(table(src, &node))
            } else {
                Block::Raw(raw(src, &node))
            }
        })
        .collect()
}

fn paragraph(src: &str, node: &Node) -> Paragraph {
    Paragraph {
        tag: start_tag(src, node),
        children: node
            .children()
            .map(|child| {
                if is_w(&child, "r") {
                    ParagraphChild::Run(run(src, &child))
                } else {
                    ParagraphChild::Raw(raw(src, &child))
                }
            })
            .collect(),
    }
}

fn run(src: &str, node: &Node) -> Run {
    Run {
        tag: start_tag(src, node),
        children: node
            .children()
            .map(|child| {
                if is_w(&child, "t") {
                    RunChild::Text(Text {
                        tag: start_tag(src, &child),
                        text: child.text().unwrap_or_default().to_string(),
                    })
                } else if is_w(&child, "drawing") {
                    RunChild::Drawing(raw(src, &child))
                } else {
                    RunChild::Raw(raw(src, &child))
                }
            })
            .collect(),
    }
}

fn table(src: &str, node: &Node) -> Table {
    Table {
        tag: start_tag(src, node),
        children: node
            .children()
            .map(|child| {
                if is_w(&child, "tr") {
                    TableChild::Row(row(src, &child))
                } else {
                    TableChild::Raw(raw(src, &child))
                }
            })
            .collect(),
    }
}

fn row(src: &str, node: &Node) -> Row {
    Row {
        tag: start_tag(src, node),
        children: node
            .children()
            .map(|child| {
                if is_w(&child, "tc") {
                    RowChild::Cell(Cell {
                        tag: start_tag(src, &child),
                        content: blocks(src, &child),
                    })
                } else {
                    RowChild::Raw(raw(src, &child))
                }
            })
            .collect(),
    }
}
