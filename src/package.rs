//! The OOXML zip container: every part in archive order, read fully into memory.

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::relationships::{Relationships, OFFICE_DOCUMENT_REL};

const PACKAGE_RELS: &str = "_rels/.rels";
const DEFAULT_MAIN_PART: &str = "word/document.xml";

/// Media parts are already compressed.
fn is_media(name: &str) -> bool {
    name.split('/').any(|segment| segment == "media")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    entries: Vec<Entry>,
}

impl Package {
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.push(Entry {
                name: file.name().to_string(),
                data,
                is_dir: file.is_dir(),
            });
        }
        debug!("Read package with {} entries", entries.len());
        Ok(Self { entries })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.data.as_slice())
    }

    /// A part decoded as UTF-8 text.
    pub fn get_str(&self, name: &str) -> Result<&str> {
        let data = self
            .get(name)
            .ok_or_else(|| Error::MissingPart(name.to_string()))?;
        std::str::from_utf8(data).map_err(|e| Error::MalformedPart {
            part: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Replace a part in place, or append it when new.
    pub fn set(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.data = data,
            None => self.entries.push(Entry {
                name: name.to_string(),
                data,
                is_dir: false,
            }),
        }
    }

    /// Name of the main document part, from the package relationships.
    pub fn main_document_part(&self) -> Result<String> {
        if !self.contains(PACKAGE_RELS) {
            return Ok(DEFAULT_MAIN_PART.to_string());
        }
        let rels = Relationships::parse(PACKAGE_RELS, self.get_str(PACKAGE_RELS)?)?;
        Ok(rels
            .find_by_kind(OFFICE_DOCUMENT_REL)
            .map(|rel| rel.target.trim_start_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string()))
    }

    /// Write every entry in order. Media is stored, everything else deflated.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        self.write_with(writer, &[])
    }

    /// Write the package with some parts substituted. Replacements for parts
    /// the package does not have are appended after the existing entries.
    pub fn write_with<W: Write + Seek>(&self, writer: W, replaced: &[(&str, &[u8])]) -> Result<()> {
        let replacement = |name: &str| {
            replaced
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, data)| *data)
        };
        let appended = replaced
            .iter()
            .filter(|(name, _)| !self.contains(name))
            .map(|(name, data)| (*name, *data, false));
        let entries = self
            .entries
            .iter()
            .map(|e| {
                let data = replacement(&e.name).unwrap_or(&e.data);
                (e.name.as_str(), data, e.is_dir)
            })
            .chain(appended);

        let mut zip = ZipWriter::new(writer);
        for (name, data, is_dir) in entries {
            let method = if is_media(name) {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            };
            let options = SimpleFileOptions::default().compression_method(method);
            if is_dir {
                zip.add_directory(name, options)?;
                continue;
            }
            zip.start_file(name, options)?;
            zip.write_all(data)?;
        }
        zip.finish()?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.write_to(&mut buf)?;
        Ok(buf.into_inner())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Package {
        let mut package = Package::default();
        package.set("[Content_Types].xml", b"<Types/>".to_vec());
        package.set(
            "_rels/.rels",
            format!(
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{OFFICE_DOCUMENT_REL}" Target="/word/main.xml"/></Relationships>"#
            )
            .into_bytes(),
        );
        package.set("word/main.xml", b"<w:document/>".to_vec());
        package.set("word/media/image1.png", vec![0, 1, 2, 3]);
        package
    }

    #[test]
    fn test_round_trip_keeps_order_and_bytes() {
        let package = sample();
        let reread = Package::from_bytes(&package.to_bytes().unwrap()).unwrap();
        assert_eq!(reread, package);
        assert_eq!(
            reread.names().collect::<Vec<_>>(),
            vec![
                "[Content_Types].xml",
                "_rels/.rels",
                "word/main.xml",
                "word/media/image1.png"
            ]
        );
    }

    #[test]
    fn test_main_document_part_from_rels() {
        assert_eq!(sample().main_document_part().unwrap(), "word/main.xml");
        assert_eq!(
            Package::default().main_document_part().unwrap(),
            "word/document.xml"
        );
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut package = sample();
        package.set("word/main.xml", b"<new/>".to_vec());
        assert_eq!(package.get("word/main.xml"), Some(&b"<new/>"[..]));
        assert_eq!(package.names().count(), 4);
    }

    #[test]
    fn test_write_with_replacements() {
        let package = sample();
        let replaced: &[(&str, &[u8])] = &[("word/main.xml", b"<changed/>"), ("word/extra.xml", b"<x/>")];
        let mut buf = Cursor::new(Vec::new());
        package.write_with(&mut buf, replaced).unwrap();
        let reread = Package::from_bytes(buf.get_ref()).unwrap();
        assert_eq!(reread.get("word/main.xml"), Some(&b"<changed/>"[..]));
        assert_eq!(reread.names().last(), Some("word/extra.xml"));
        assert_eq!(package.get("word/main.xml"), Some(&b"<w:document/>"[..]));
    }

    #[test]
    fn test_missing_part() {
        let err = Package::default().get_str("word/document.xml").unwrap_err();
        assert!(matches!(err, Error::MissingPart(_)));
    }

    #[test]
    fn test_save_and_open_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.docx");
        sample().save(&path).unwrap();
        assert_eq!(Package::open(&path).unwrap(), sample());
    }
}
