//! Inline images: loading, lazily derived metadata, resizing and drawing markup.

mod drawing;
mod metadata;

use std::fmt;
use std::fs;
use std::io::{self, Cursor};
use std::path::Path;
use std::sync::OnceLock;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use serde::ser::{Serialize, Serializer};

use crate::error::{ImageError, Result};

pub(crate) use drawing::drawing_markup;
pub use metadata::ExifTags;

/// Newtype-struct name that marks [`InlineImage`] when it travels through serde.
pub(crate) const IMAGE_TOKEN: &str = "$docx_template::private::InlineImage";

/// English Metric Units per inch.
pub const EMUS_PER_INCH: u64 = 914_400;

/// Resolution assumed when the image carries none.
pub const DEFAULT_DPI: u32 = 72;

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Whether `path` has a supported image extension and names an existing file.
pub fn is_image_path(path: &Path) -> Result<bool> {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Ok(false);
    };
    if !SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
        return Ok(false);
    }

    match fs::metadata(path) {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::InvalidInput) => {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Metadata {
    width: u32,
    height: u32,
    dpi: (u32, u32),
}

/// An image to place inline in the document body.
#[derive(Clone)]
pub struct InlineImage {
    data: Vec<u8>,
    ext: String,
    metadata: OnceLock<Metadata>,
    exif: OnceLock<ExifTags>,
}

impl InlineImage {
    /// Load a `.png`, `.jpg` or `.jpeg` file.
    ///
    /// ```no_run
    /// let logo = docx_template::InlineImage::from_path("logo.png")?;
    /// # Ok::<(), docx_template::Error>(())
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !is_image_path(path)? {
            return Err(ImageError::NotAnImage(path.display().to_string()).into());
        }

        let data = fs::read(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Ok(Self::from_bytes(data, ext))
    }

    /// Wrap image bytes the caller already holds. `ext` may carry a leading dot.
    pub fn from_bytes(data: Vec<u8>, ext: &str) -> Self {
        Self {
            data,
            ext: ext.trim_start_matches('.').to_ascii_lowercase(),
            metadata: OnceLock::new(),
            exif: OnceLock::new(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Lowercase extension without the dot.
    pub fn extension(&self) -> &str {
        &self.ext
    }

    pub fn format(&self) -> std::result::Result<ImageFormat, ImageError> {
        match self.ext.as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            other => Err(ImageError::UnknownFormat(other.to_string())),
        }
    }

    fn metadata(&self) -> std::result::Result<&Metadata, ImageError> {
        if let Some(meta) = self.metadata.get() {
            return Ok(meta);
        }

        let format = self.format()?;
        let (width, height) = ImageReader::with_format(Cursor::new(&self.data), format)
            .into_dimensions()?;
        let (dpi_x, dpi_y) = metadata::resolution(&self.data, format, self.exif()?);
        Ok(self.metadata.get_or_init(|| Metadata {
            width,
            height,
            dpi: (
                dpi_x.unwrap_or(DEFAULT_DPI),
                dpi_y.unwrap_or(DEFAULT_DPI),
            ),
        }))
    }

    /// EXIF tags of the image, empty when it carries none.
    pub fn exif(&self) -> std::result::Result<&ExifTags, ImageError> {
        if let Some(tags) = self.exif.get() {
            return Ok(tags);
        }
        let format = self.format()?;
        Ok(self
            .exif
            .get_or_init(|| metadata::exif_tags(&self.data, format)))
    }

    /// Pixel width and height.
    pub fn dimensions(&self) -> std::result::Result<(u32, u32), ImageError> {
        let meta = self.metadata()?;
        Ok((meta.width, meta.height))
    }

    /// Horizontal and vertical resolution in DPI, from EXIF, `pHYs` or JFIF
    /// density, defaulting to [`DEFAULT_DPI`].
    pub fn resolution(&self) -> std::result::Result<(u32, u32), ImageError> {
        Ok(self.metadata()?.dpi)
    }

    /// Width and height in EMUs.
    pub fn emu_size(&self) -> std::result::Result<(u64, u64), ImageError> {
        let meta = self.metadata()?;
        let to_emu = |px: u32, dpi: u32| u64::from(px) * EMUS_PER_INCH / u64::from(dpi.max(1));
        Ok((to_emu(meta.width, meta.dpi.0), to_emu(meta.height, meta.dpi.1)))
    }

    /// Resize to `width` x `height` pixels, re-encoding in the same format.
    pub fn resize(&mut self, width: u32, height: u32) -> std::result::Result<(), ImageError> {
        let format = self.format()?;
        let source = image::load_from_memory_with_format(&self.data, format)?;
        let resized = source.resize_exact(width, height, FilterType::Nearest);

        let mut out = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, 100))?;
            }
            _ => resized.write_to(&mut Cursor::new(&mut out), format)?,
        }

        self.data = out;
        self.metadata = OnceLock::new();
        self.exif = OnceLock::new();
        Ok(())
    }

    /// Content-type defaults a package needs to carry this image.
    pub fn content_types(&self) -> std::result::Result<&'static [(&'static str, &'static str)], ImageError> {
        match self.format()? {
            ImageFormat::Png => Ok(&[("png", "image/png")]),
            _ => Ok(&[("jpg", "image/jpeg"), ("jpeg", "image/jpeg")]),
        }
    }
}

impl PartialEq for InlineImage {
    fn eq(&self, other: &Self) -> bool {
        self.ext == other.ext && self.data == other.data
    }
}

impl fmt::Debug for InlineImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineImage")
            .field("ext", &self.ext)
            .field("len", &self.data.len())
            .finish()
    }
}

struct RawBytes<'a>(&'a [u8]);

impl Serialize for RawBytes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

impl Serialize for InlineImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(IMAGE_TOKEN, &(self.ext.as_str(), RawBytes(&self.data)))
    }
}
