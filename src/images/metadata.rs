//! Image metadata read straight from the PNG and JPEG containers: the EXIF
//! block and the container's own density fields (`pHYs` for PNG, the JFIF
//! APP0 header for JPEG).

use std::collections::BTreeMap;

use exif::{In, Tag};
use image::ImageFormat;
use tracing::debug;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const EXIF_HEADER: &[u8] = b"Exif\0\0";
const JFIF_HEADER: &[u8] = b"JFIF\0";

/// EXIF fields keyed by tag name (`"XResolution"`, `"Make"`, …). A tag present
/// in several IFDs keeps its primary-image value.
pub type ExifTags = BTreeMap<String, exif::Value>;

pub(crate) type Dpi = (Option<u32>, Option<u32>);

/// Parse the EXIF block, if the image has a readable one.
pub(crate) fn exif_tags(data: &[u8], format: ImageFormat) -> ExifTags {
    let mut tags = ExifTags::new();
    let Some(block) = exif_block(data, format) else {
        return tags;
    };
    let exif = match exif::Reader::new().read_raw(block) {
        Ok(exif) => exif,
        Err(e) => {
            debug!("Ignoring unreadable EXIF block: {}", e);
            return tags;
        }
    };
    for field in exif.fields() {
        let name = field.tag.to_string();
        if field.ifd_num == In::PRIMARY || !tags.contains_key(&name) {
            tags.insert(name, field.value.clone());
        }
    }
    tags
}

/// Resolution from EXIF tags, falling back to the container density fields.
pub(crate) fn resolution(data: &[u8], format: ImageFormat, tags: &ExifTags) -> Dpi {
    let exif = exif_resolution(tags);
    let native = match format {
        ImageFormat::Png => png_density(data),
        ImageFormat::Jpeg => jfif_density(data),
        _ => (None, None),
    };
    (exif.0.or(native.0), exif.1.or(native.1))
}

fn exif_resolution(tags: &ExifTags) -> Dpi {
    // 2 = inch, 3 = centimetre
    let scale = match tags
        .get(&Tag::ResolutionUnit.to_string())
        .and_then(|v| v.get_uint(0))
    {
        Some(3) => 2.54,
        _ => 1.0,
    };
    let rational = |tag: Tag| match tags.get(&tag.to_string()) {
        Some(exif::Value::Rational(values)) => values.first().map(|r| r.to_f64()),
        _ => None,
    };
    (
        rational(Tag::XResolution).and_then(|v| to_dpi(v * scale)),
        rational(Tag::YResolution).and_then(|v| to_dpi(v * scale)),
    )
}

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn to_dpi(value: f64) -> Option<u32> {
    let dpi = value.round();
    (dpi >= 1.0 && dpi <= f64::from(u32::MAX)).then_some(dpi as u32)
}

/// PNG chunks as `(kind, body)`, stopping at `IEND` or truncated data.
fn png_chunks(data: &[u8]) -> impl Iterator<Item = (&[u8], &[u8])> {
    let mut pos = if data.starts_with(PNG_SIGNATURE) {
        PNG_SIGNATURE.len()
    } else {
        data.len()
    };
    std::iter::from_fn(move || {
        let len = be_u32(data, pos)? as usize;
        let kind = data.get(pos + 4..pos + 8)?;
        let body = data.get(pos + 8..pos + 8 + len)?;
        pos += len + 12;
        (kind != b"IEND").then_some((kind, body))
    })
}

/// JPEG segments before the start of scan as `(marker, payload)`.
fn jpeg_segments(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut pos = if data.starts_with(&[0xFF, 0xD8]) { 2 } else { data.len() };
    std::iter::from_fn(move || {
        if data.get(pos) != Some(&0xFF) {
            return None;
        }
        let marker = *data.get(pos + 1)?;
        if marker == 0xDA {
            return None;
        }
        let len = be_u16(data, pos + 2)? as usize;
        let payload = data.get(pos + 4..pos + 2 + len)?;
        pos += 2 + len;
        Some((marker, payload))
    })
}

/// The raw TIFF-structured EXIF data.
fn exif_block(data: &[u8], format: ImageFormat) -> Option<Vec<u8>> {
    let block = match format {
        ImageFormat::Png => png_chunks(data)
            .find(|(kind, _)| *kind == b"eXIf")
            .map(|(_, body)| body),
        ImageFormat::Jpeg => jpeg_segments(data)
            .find(|(marker, payload)| *marker == 0xE1 && payload.starts_with(EXIF_HEADER))
            .map(|(_, payload)| &payload[EXIF_HEADER.len()..]),
        _ => None,
    };
    block.map(<[u8]>::to_vec)
}

fn png_density(data: &[u8]) -> Dpi {
    png_chunks(data)
        .find(|(kind, body)| *kind == b"pHYs" && body.len() >= 9 && body[8] == 1)
        .map(|(_, body)| {
            // pixels per metre
            let per_metre = |at| be_u32(body, at).and_then(|v| to_dpi(f64::from(v) * 0.0254));
            (per_metre(0), per_metre(4))
        })
        .unwrap_or((None, None))
}

fn jfif_density(data: &[u8]) -> Dpi {
    let Some((_, segment)) = jpeg_segments(data)
        .find(|(marker, payload)| *marker == 0xE0 && payload.starts_with(JFIF_HEADER) && payload.len() >= 12)
    else {
        return (None, None);
    };
    let scale = match segment[7] {
        1 => 1.0,
        2 => 2.54,
        _ => return (None, None),
    };
    let density = |at| be_u16(segment, at).and_then(|d| to_dpi(f64::from(d) * scale));
    (density(8), density(10))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tests::{jpeg_bytes, png_bytes, tiff};
    use pretty_assertions::assert_eq;

    fn chunk(kind: &[u8], body: &[u8]) -> Vec<u8> {
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    fn dpi_of(data: &[u8], format: ImageFormat) -> Dpi {
        resolution(data, format, &exif_tags(data, format))
    }

    #[test]
    fn test_png_phys_chunk() {
        let mut png = PNG_SIGNATURE.to_vec();
        let mut phys = 5906u32.to_be_bytes().to_vec(); // ~150 dpi
        phys.extend_from_slice(&3780u32.to_be_bytes()); // ~96 dpi
        phys.push(1);
        png.extend(chunk(b"pHYs", &phys));
        png.extend(chunk(b"IEND", &[]));
        assert_eq!(dpi_of(&png, ImageFormat::Png), (Some(150), Some(96)));
    }

    #[test]
    fn test_png_exif_beats_phys() {
        let mut png = PNG_SIGNATURE.to_vec();
        let mut phys = 3780u32.to_be_bytes().to_vec();
        phys.extend_from_slice(&3780u32.to_be_bytes());
        phys.push(1);
        png.extend(chunk(b"pHYs", &phys));
        png.extend(chunk(b"eXIf", &tiff((300, 1), (300, 1), 2)));
        png.extend(chunk(b"IEND", &[]));

        let tags = exif_tags(&png, ImageFormat::Png);
        assert!(tags.contains_key("XResolution"));
        assert_eq!(resolution(&png, ImageFormat::Png, &tags), (Some(300), Some(300)));
    }

    #[test]
    fn test_jpeg_exif_in_centimetres() {
        let exif = tiff((118, 1), (59, 1), 3);
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        jpeg.extend_from_slice(&((exif.len() + EXIF_HEADER.len() + 2) as u16).to_be_bytes());
        jpeg.extend_from_slice(EXIF_HEADER);
        jpeg.extend_from_slice(&exif);
        jpeg.extend_from_slice(&[0xFF, 0xDA, 0, 2]);

        let tags = exif_tags(&jpeg, ImageFormat::Jpeg);
        assert_eq!(tags.get("ResolutionUnit").and_then(|v| v.get_uint(0)), Some(3));
        assert_eq!(resolution(&jpeg, ImageFormat::Jpeg, &tags), (Some(300), Some(150)));
    }

    #[test]
    fn test_jfif_density() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 16];
        jpeg.extend_from_slice(JFIF_HEADER);
        jpeg.extend_from_slice(&[1, 1, 1]); // version 1.1, units = dpi
        jpeg.extend_from_slice(&200u16.to_be_bytes());
        jpeg.extend_from_slice(&100u16.to_be_bytes());
        jpeg.extend_from_slice(&[0, 0]);
        jpeg.extend_from_slice(&[0xFF, 0xDA, 0, 2]);
        assert_eq!(dpi_of(&jpeg, ImageFormat::Jpeg), (Some(200), Some(100)));
    }

    #[test]
    fn test_encoder_output_has_no_metadata() {
        assert!(exif_tags(&png_bytes(2, 2), ImageFormat::Png).is_empty());
        assert_eq!(dpi_of(&png_bytes(2, 2), ImageFormat::Png), (None, None));
        assert_eq!(dpi_of(&jpeg_bytes(2, 2), ImageFormat::Jpeg), (None, None));
    }

    #[test]
    fn test_garbage_is_ignored() {
        assert_eq!(dpi_of(b"not an image", ImageFormat::Png), (None, None));
        assert_eq!(dpi_of(&[0xFF, 0xD8, 0xFF], ImageFormat::Jpeg), (None, None));

        let mut png = PNG_SIGNATURE.to_vec();
        png.extend(chunk(b"eXIf", b"II*\0garbage"));
        png.extend(chunk(b"IEND", &[]));
        assert!(exif_tags(&png, ImageFormat::Png).is_empty());
    }
}
