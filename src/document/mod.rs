//! The main document part as a tree of blocks.
//!
//! Only the structure the renderer touches is modelled: paragraphs, runs,
//! text, drawings and tables. Everything else is kept as raw markup and written
//! back byte-for-byte.

mod xml;

use crate::error::Result;
use crate::escape::escape_text;

pub(crate) const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// The start tag of an element we re-serialize: `<w:p w:rsidR="…"` without the
/// closing `>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    open: String,
    name: String,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self {
            open: format!("<{name}"),
            name: name.to_string(),
        }
    }

    fn write_open(&self, out: &mut String) {
        out.push_str(&self.open);
        out.push('>');
    }

    fn write_close(&self, out: &mut String) {
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub(crate) tag: Tag,
    pub children: Vec<ParagraphChild>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParagraphChild {
    Run(Run),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub(crate) tag: Tag,
    pub children: Vec<RunChild>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunChild {
    Text(Text),
    Drawing(String),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub(crate) tag: Tag,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub(crate) tag: Tag,
    pub children: Vec<TableChild>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableChild {
    Row(Row),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub(crate) tag: Tag,
    pub children: Vec<RowChild>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowChild {
    Cell(Cell),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub(crate) tag: Tag,
    pub content: Vec<Block>,
}

impl Paragraph {
    pub fn new(runs: Vec<Run>) -> Self {
        Self {
            tag: Tag::new("w:p"),
            children: runs.into_iter().map(ParagraphChild::Run).collect(),
        }
    }

    /// Text items of every run, in document order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.children
            .iter()
            .filter_map(|child| match child {
                ParagraphChild::Run(run) => Some(run),
                ParagraphChild::Raw(_) => None,
            })
            .flat_map(|run| run.texts())
    }

    /// Concatenated text of the paragraph.
    pub fn text(&self) -> String {
        self.texts().collect()
    }
}

impl Run {
    pub fn new(children: Vec<RunChild>) -> Self {
        Self {
            tag: Tag::new("w:r"),
            children,
        }
    }

    /// A run holding one text item per fragment.
    pub fn from_texts<'a>(fragments: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(
            fragments
                .into_iter()
                .map(|t| RunChild::Text(Text::new(t)))
                .collect(),
        )
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.children.iter().filter_map(|child| match child {
            RunChild::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
    }
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            tag: Tag::new("w:t"),
            text: text.into(),
        }
    }
}

impl Cell {
    pub fn new(content: Vec<Block>) -> Self {
        Self {
            tag: Tag::new("w:tc"),
            content,
        }
    }
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            tag: Tag::new("w:tr"),
            children: cells.into_iter().map(RowChild::Cell).collect(),
        }
    }
}

impl Table {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            tag: Tag::new("w:tbl"),
            children: rows.into_iter().map(TableChild::Row).collect(),
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.children.iter().filter_map(|child| match child {
            TableChild::Row(row) => Some(row),
            TableChild::Raw(_) => None,
        })
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut Row> {
        self.children.iter_mut().filter_map(|child| match child {
            TableChild::Row(row) => Some(row),
            TableChild::Raw(_) => None,
        })
    }
}

impl Row {
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.children.iter().filter_map(|child| match child {
            RowChild::Cell(cell) => Some(cell),
            RowChild::Raw(_) => None,
        })
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.children.iter_mut().filter_map(|child| match child {
            RowChild::Cell(cell) => Some(cell),
            RowChild::Raw(_) => None,
        })
    }
}

fn needs_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

trait WriteXml {
    fn write_xml(&self, out: &mut String);
}

impl WriteXml for Block {
    fn write_xml(&self, out: &mut String) {
        match self {
            Block::Paragraph(p) => p.write_xml(out),
            Block::Table(t) => t.write_xml(out),
            Block::Raw(raw) => out.push_str(raw),
        }
    }
}

impl WriteXml for Paragraph {
    fn write_xml(&self, out: &mut String) {
        self.tag.write_open(out);
        for child in &self.children {
            match child {
                ParagraphChild::Run(run) => run.write_xml(out),
                ParagraphChild::Raw(raw) => out.push_str(raw),
            }
        }
        self.tag.write_close(out);
    }
}

impl WriteXml for Run {
    fn write_xml(&self, out: &mut String) {
        self.tag.write_open(out);
        for child in &self.children {
            match child {
                RunChild::Text(text) => text.write_xml(out),
                RunChild::Drawing(raw) | RunChild::Raw(raw) => out.push_str(raw),
            }
        }
        self.tag.write_close(out);
    }
}

impl WriteXml for Text {
    fn write_xml(&self, out: &mut String) {
        out.push_str(&self.tag.open);
        if needs_preserve(&self.text) && !self.tag.open.contains("xml:space") {
            out.push_str(r#" xml:space="preserve""#);
        }
        out.push('>');
        out.push_str(&escape_text(&self.text));
        self.tag.write_close(out);
    }
}

impl WriteXml for Table {
    fn write_xml(&self, out: &mut String) {
        self.tag.write_open(out);
        for child in &self.children {
            match child {
                TableChild::Row(row) => row.write_xml(out),
                TableChild::Raw(raw) => out.push_str(raw),
            }
        }
        self.tag.write_close(out);
    }
}

impl WriteXml for Row {
    fn write_xml(&self, out: &mut String) {
        self.tag.write_open(out);
        for child in &self.children {
            match child {
                RowChild::Cell(cell) => cell.write_xml(out),
                RowChild::Raw(raw) => out.push_str(raw),
            }
        }
        self.tag.write_close(out);
    }
}

impl WriteXml for Cell {
    fn write_xml(&self, out: &mut String) {
        self.tag.write_open(out);
        for block in &self.content {
            block.write_xml(out);
        }
        self.tag.write_close(out);
    }
}

/// A parsed main document part: the body tree plus the untouched markup
/// around it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    part: String,
    prefix: String,
    body_tag: Tag,
    pub blocks: Vec<Block>,
    suffix: String,
}

impl Document {
    /// Parse the XML of the part named `part`.
    pub fn parse(part: &str, xml: &str) -> Result<Self> {
        xml::parse_document(part, xml)
    }

    pub fn part_name(&self) -> &str {
        &self.part
    }

    /// The `<w:body>` element as markup.
    pub fn serialize_body(&self) -> String {
        let mut out = String::new();
        self.body_tag.write_open(&mut out);
        for block in &self.blocks {
            block.write_xml(&mut out);
        }
        self.body_tag.write_close(&mut out);
        out
    }

    /// Replace the body with `body` markup, parsed inside the original
    /// document envelope. On error the document is left unchanged.
    pub fn replace_body(&mut self, body: &str) -> Result<()> {
        let xml = format!("{}{}{}", self.prefix, body, self.suffix);
        *self = xml::parse_document(&self.part, &xml)?;
        Ok(())
    }

    /// The whole part as XML.
    pub fn to_xml(&self) -> String {
        format!("{}{}{}", self.prefix, self.serialize_body(), self.suffix)
    }
}
