//! A word-processing package opened as a template.

use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::fs::File;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::RenderOptions;
use crate::content_types::{ContentTypes, CONTENT_TYPES_PART};
use crate::document::Document;
use crate::error::Result;
use crate::escape::repair_drawings;
use crate::functions::{Functions, TemplateFunction};
use crate::images::{drawing_markup, InlineImage};
use crate::merge::merge_tags;
use crate::package::Package;
use crate::projection::{project, resolve_tag_values};
use crate::range::normalize_range_rows;
use crate::relationships::{rels_part_for, Relationships, IMAGE_REL};
use crate::template::Template;
use crate::value::{Markup, Value};

static DOC_PR_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<wp:docPr\s[^>]*?\bid="(\d+)""#).unwrap());

/// A docx template: the package, its parsed main part and the registries a
/// render may extend.
///
/// ```no_run
/// use docx_template::DocxTemplate;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Letter {
///     #[serde(rename = "Name")]
///     name: String,
/// }
///
/// let mut doc = DocxTemplate::open("letter.docx")?;
/// doc.render(&Letter { name: "Tom Watkins".into() })?;
/// doc.save("out.docx")?;
/// # Ok::<(), docx_template::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DocxTemplate {
    package: Package,
    document: Document,
    content_types: ContentTypes,
    relationships: Relationships,
    rels_part: String,
    rels_changed: bool,
    functions: Functions,
    options: RenderOptions,
    next_doc_pr_id: u32,
}

impl DocxTemplate {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening template {}", path.display());
        Self::from_package(Package::open(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        Self::from_package(Package::from_reader(reader)?)
    }

    fn from_package(package: Package) -> Result<Self> {
        let main_part = package.main_document_part()?;
        let xml = package.get_str(&main_part)?;
        let next_doc_pr_id = DOC_PR_ID
            .captures_iter(xml)
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let document = Document::parse(&main_part, xml)?;
        let content_types = ContentTypes::parse(package.get_str(CONTENT_TYPES_PART)?)?;

        let rels_part = rels_part_for(&main_part);
        let relationships = if package.contains(&rels_part) {
            Relationships::parse(&rels_part, package.get_str(&rels_part)?)?
        } else {
            Relationships::default()
        };

        debug!(
            "Loaded {} with {} top-level blocks",
            main_part,
            document.blocks.len()
        );
        Ok(Self {
            package,
            document,
            content_types,
            relationships,
            rels_part,
            rels_changed: false,
            functions: Functions::builtin(),
            options: RenderOptions::default(),
            next_doc_pr_id,
        })
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: RenderOptions) {
        self.options = options;
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn content_types(&self) -> &ContentTypes {
        &self.content_types
    }

    pub fn relationships(&self) -> &Relationships {
        &self.relationships
    }

    /// Add a function to this document's registry. Other documents are not
    /// affected.
    pub fn register_function(&mut self, name: &str, function: TemplateFunction) -> Result<()> {
        self.functions.register(name, function)
    }

    /// A copy of the functions this document renders with.
    pub fn registered_functions(&self) -> Functions {
        self.functions.clone()
    }

    /// Embed `image` in the package and return the drawing markup that shows
    /// it inline.
    pub fn inject_image(&mut self, image: &InlineImage) -> Result<Markup> {
        let (cx, cy) = image.emu_size()?;
        let content_types = image.content_types()?;

        let main_part = self.document.part_name();
        let base = main_part.rsplit_once('/').map_or("", |(dir, _)| dir);
        let (part, file_name) = (1..)
            .map(|n| {
                let file_name = format!("image{n}.{}", image.extension());
                let part = if base.is_empty() {
                    format!("media/{file_name}")
                } else {
                    format!("{base}/media/{file_name}")
                };
                (part, file_name)
            })
            .find(|(part, _)| !self.package.contains(part))
            .unwrap_or_default();

        self.package.set(&part, image.data().to_vec());
        let rel_id = self
            .relationships
            .add(IMAGE_REL, &format!("media/{file_name}"));
        self.rels_changed = true;
        for (ext, mime) in content_types {
            self.content_types.add_default(ext, mime);
        }

        let id = self.next_doc_pr_id;
        self.next_doc_pr_id += 1;
        info!("Injected image {} as {}", part, rel_id);
        Ok(Markup::raw(drawing_markup(&rel_id, id, &file_name, cx, cy)))
    }

    /// Render `data` into the document body.
    ///
    /// `data` must serialize to a struct or map. On error the body may hold
    /// merged tags, but no substituted output.
    pub fn render<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<()> {
        let mut data = project(data)?;

        merge_tags(&mut self.document.blocks)?;
        resolve_tag_values(&mut data, &mut |image: &InlineImage| self.inject_image(image))?;

        let body = self.document.serialize_body();
        let body = normalize_range_rows(&body, self.options.range_timeout)?;
        let template = Template::parse(&body, &self.functions)?;
        let rendered = template.execute(
            &Value::Dict(data),
            &self.functions,
            self.options.missing_key,
        )?;
        self.document.replace_body(&repair_drawings(&rendered))?;

        info!("Rendered {}", self.document.part_name());
        Ok(())
    }

    /// Write the package. Every part is copied unchanged except the main
    /// document, its relationships, the content types and added media.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let document = self.document.to_xml();
        let content_types = self.content_types.to_xml();
        let rels = self.relationships.to_xml();

        let mut replaced: Vec<(&str, &[u8])> = vec![
            (CONTENT_TYPES_PART, content_types.as_bytes()),
            (self.document.part_name(), document.as_bytes()),
        ];
        if self.rels_changed {
            replaced.push((self.rels_part.as_str(), rels.as_bytes()));
        }
        self.package.write_with(writer, &replaced)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.write_to(&mut buf)?;
        Ok(buf.into_inner())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        info!("Saved {}", path.display());
        Ok(())
    }
}
