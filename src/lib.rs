//! Render `.docx` documents as templates.
//!
//! A render runs in stages over the main document body:
//! - tag merging: `{{…}}` expressions split across runs are reassembled
//! - data projection: the caller's `Serialize` data becomes a [`Dict`], and
//!   image-valued fields are embedded in the package
//! - table row normalization: rows carrying block markers (`{{range}}`,
//!   `{{if}}`, `{{else}}`, `{{end}}`) collapse into the bare markers so the
//!   rows between them repeat or show conditionally
//! - substitution: the body is executed as a [`Template`]
//! - drawing repair and re-parse of the body
//!
//! Everything outside the body is written back unchanged, apart from the
//! content types and relationships that injected images need.

mod config;
mod content_types;
mod document;
mod docx;
mod error;
mod escape;
mod functions;
mod images;
mod merge;
mod package;
mod projection;
mod range;
mod relationships;
mod template;
mod value;

pub use config::{MissingKey, RenderOptions};
pub use content_types::{ContentTypes, CONTENT_TYPES_PART};
pub use document::{
    Block, Cell, Document, Paragraph, ParagraphChild, Row, RowChild, Run, RunChild, Table,
    TableChild, Text,
};
pub use docx::DocxTemplate;
pub use error::{Error, ExecError, ImageError, ParseError, Result};
pub use escape::{escape_xml, repair_drawings};
pub use functions::{is_valid_name, FunctionError, Functions, TemplateFunction};
pub use images::{is_image_path, ExifTags, InlineImage, DEFAULT_DPI, EMUS_PER_INCH, SUPPORTED_EXTENSIONS};
pub use merge::merge_tags;
pub use package::Package;
pub use projection::{project, resolve_tag_values, to_value};
pub use range::normalize_range_rows;
pub use relationships::{Relationship, Relationships, IMAGE_REL, OFFICE_DOCUMENT_REL};
pub use template::Template;
pub use value::{Dict, Markup, Value};
