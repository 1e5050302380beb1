//! The package content-type registry, `[Content_Types].xml`.

use tracing::debug;

use crate::error::{Error, Result};
use crate::escape::escape_xml;

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    /// Extension to MIME type.
    defaults: Vec<(String, String)>,
    /// Part name to MIME type.
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml).map_err(|source| Error::Xml {
            part: CONTENT_TYPES_PART.to_string(),
            source,
        })?;

        let mut types = Self::default();
        for node in doc.root_element().children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "Default" => {
                    if let (Some(ext), Some(mime)) =
                        (node.attribute("Extension"), node.attribute("ContentType"))
                    {
                        types.defaults.push((ext.to_string(), mime.to_string()));
                    }
                }
                "Override" => {
                    if let (Some(part), Some(mime)) =
                        (node.attribute("PartName"), node.attribute("ContentType"))
                    {
                        types.overrides.push((part.to_string(), mime.to_string()));
                    }
                }
                _ => {}
            }
        }
        Ok(types)
    }

    /// MIME type registered for an extension, compared case-insensitively.
    pub fn default_for(&self, ext: &str) -> Option<&str> {
        self.defaults
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, mime)| mime.as_str())
    }

    pub fn override_for(&self, part_name: &str) -> Option<&str> {
        self.overrides
            .iter()
            .find(|(p, _)| p == part_name)
            .map(|(_, mime)| mime.as_str())
    }

    /// Register `ext → mime` unless the extension is already declared.
    /// Returns whether an entry was added.
    pub fn add_default(&mut self, ext: &str, mime: &str) -> bool {
        if self.default_for(ext).is_some() {
            return false;
        }
        debug!("Registering content type {} for .{}", mime, ext);
        self.defaults.push((ext.to_string(), mime.to_string()));
        true
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push('\n');
        out.push_str(&format!(r#"<Types xmlns="{CONTENT_TYPES_NS}">"#));
        for (ext, mime) in &self.defaults {
            out.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                escape_xml(ext),
                escape_xml(mime)
            ));
        }
        for (part, mime) in &self.overrides {
            out.push_str(&format!(
                r#"<Override PartName="{}" ContentType="{}"/>"#,
                escape_xml(part),
                escape_xml(mime)
            ));
        }
        out.push_str("</Types>");
        out
    }
}
