//! Part relationships (`_rels/*.rels`).

use crate::error::{Error, Result};
use crate::escape::escape_xml;

const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

pub const OFFICE_DOCUMENT_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const IMAGE_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub kind: String,
    pub target: String,
    pub target_mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    items: Vec<Relationship>,
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`.
pub fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

impl Relationships {
    pub fn parse(part: &str, xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml).map_err(|source| Error::Xml {
            part: part.to_string(),
            source,
        })?;

        let items = doc
            .descendants()
            .filter(|n| n.tag_name().name() == "Relationship")
            .filter_map(|n| {
                Some(Relationship {
                    id: n.attribute("Id")?.to_string(),
                    kind: n.attribute("Type")?.to_string(),
                    target: n.attribute("Target")?.to_string(),
                    target_mode: n.attribute("TargetMode").map(str::to_string),
                })
            })
            .collect();
        Ok(Self { items })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.items.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn find_by_kind(&self, kind: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.kind == kind)
    }

    /// First `rIdN` not in use.
    pub fn next_id(&self) -> String {
        let max = self
            .items
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("rId{}", max + 1)
    }

    /// Add an internal relationship and return its id.
    pub fn add(&mut self, kind: &str, target: &str) -> String {
        let id = self.next_id();
        self.items.push(Relationship {
            id: id.clone(),
            kind: kind.to_string(),
            target: target.to_string(),
            target_mode: None,
        });
        id
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push('\n');
        out.push_str(&format!(r#"<Relationships xmlns="{RELATIONSHIPS_NS}">"#));
        for rel in &self.items {
            out.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}""#,
                escape_xml(&rel.id),
                escape_xml(&rel.kind),
                escape_xml(&rel.target)
            ));
            if let Some(mode) = &rel.target_mode {
                out.push_str(&format!(r#" TargetMode="{}""#, escape_xml(mode)));
            }
            out.push_str("/>");
        }
        out.push_str("</Relationships>");
        out
    }
}
