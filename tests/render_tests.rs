use std::io::{Cursor, Write};

use docx_template::{
    Block, DocxTemplate, Error, ExecError, MissingKey, Package, RenderOptions, TemplateFunction,
};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
use pretty_assertions::assert_eq;
use rstest::*;
use serde::Serialize;
use serde_json::json;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES: &str = r#"<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"/>"#;

/// A minimal docx with `body` as the content of `<w:body>`.
fn docx(body: &str) -> Vec<u8> {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    );

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", PACKAGE_RELS),
        ("word/document.xml", document.as_str()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS),
        ("word/styles.xml", STYLES),
    ] {
        zip.start_file(name, options).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn paragraph(runs: &[&str]) -> String {
    let runs: String = runs
        .iter()
        .map(|t| format!(r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">{t}</w:t></w:r>"#))
        .collect();
    format!("<w:p>{runs}</w:p>")
}

fn row(text: &str) -> String {
    format!("<w:tr><w:tc><w:tcPr/>{}</w:tc></w:tr>", paragraph(&[text]))
}

fn table(rows: &[&str]) -> String {
    let rows: String = rows.iter().map(|t| row(t)).collect();
    format!("<w:tbl><w:tblPr/>{rows}</w:tbl>")
}

/// Paragraph texts in reading order, descending into tables.
fn texts(blocks: &[Block]) -> Vec<String> {
    let mut out = Vec::new();
    for block in blocks {
        match block {
            Block::Paragraph(p) => out.push(p.text()),
            Block::Table(t) => {
                for row in t.rows() {
                    for cell in row.cells() {
                        out.extend(texts(&cell.content));
                    }
                }
            }
            Block::Raw(_) => {}
        }
    }
    out
}

fn render(body: &str, data: serde_json::Value) -> DocxTemplate {
    let mut doc = DocxTemplate::from_bytes(&docx(body)).unwrap();
    doc.render(&data).unwrap();
    doc
}

fn png_file(dir: &TempDir, name: &str, width: u32, height: u32) -> String {
    let path = dir.path().join(name);
    DynamicImage::ImageRgba8(ImageBuffer::from_pixel(width, height, Rgba([0u8, 0, 255, 255])))
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();
    path.display().to_string()
}

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

#[test]
fn test_basic_substitution() {
    let doc = render(
        &paragraph(&["Author: {{.Name}}"]),
        json!({ "Name": "Tom Watkins" }),
    );
    assert_eq!(texts(&doc.document().blocks), vec!["Author: Tom Watkins"]);
}

#[test]
fn test_struct_data() {
    #[derive(Serialize)]
    struct Letter {
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Age")]
        age: u32,
    }

    let mut doc = DocxTemplate::from_bytes(&docx(&paragraph(&["{{.Name}} ({{.Age}})"]))).unwrap();
    doc.render(&Letter {
        name: "Tom".to_string(),
        age: 29,
    })
    .unwrap();
    assert_eq!(texts(&doc.document().blocks), vec!["Tom (29)"]);
}

#[rstest]
#[case("{{upper .Name}}", "tom", "TOM")]
#[case("{{title .Name}}", "tom watkins", "Tom Watkins")]
#[case("{{.Name | lower}}", "TOM", "tom")]
fn test_function_pipeline(#[case] template: &str, #[case] name: &str, #[case] expected: &str) {
    let doc = render(&paragraph(&[template]), json!({ "Name": name }));
    assert_eq!(texts(&doc.document().blocks), vec![expected]);
}

#[test]
fn test_tag_split_across_runs() {
    let body = paragraph(&["Dear {{", ".Na", "me}}, welcome"]);
    let doc = render(&body, json!({ "Name": "Ada" }));
    assert_eq!(texts(&doc.document().blocks), vec!["Dear Ada, welcome"]);
}

#[test]
fn test_table_loop_repeats_rows() {
    let body = table(&["Header", "{{range .People}}", "{{.Name}}", "{{end}}", "Footer"]);
    let doc = render(
        &body,
        json!({ "People": [{ "Name": "A" }, { "Name": "B" }] }),
    );

    let blocks = &doc.document().blocks;
    let Block::Table(table) = &blocks[0] else {
        panic!("expected a table");
    };
    assert_eq!(table.rows().count(), 4);
    assert_eq!(texts(blocks), vec!["Header", "A", "B", "Footer"]);
}

#[test]
fn test_table_loop_with_empty_list() {
    let body = table(&["{{range .People}}", "{{.Name}}", "{{end}}"]);
    let doc = render(&body, json!({ "People": [] }));

    let Block::Table(table) = &doc.document().blocks[0] else {
        panic!("expected a table");
    };
    assert_eq!(table.rows().count(), 0);
}

#[rstest]
#[case(json!({ "Show": false }), vec![])]
#[case(json!({ "Show": true }), vec!["shown"])]
fn test_table_conditional_rows(#[case] data: serde_json::Value, #[case] expected: Vec<&str>) {
    let body = table(&["Header", "{{if .Show}}", "shown", "{{end}}"]);
    let doc = render(&body, data);

    let blocks = &doc.document().blocks;
    let Block::Table(table) = &blocks[0] else {
        panic!("expected a table");
    };
    assert_eq!(table.rows().count(), 1 + expected.len());
    let mut all = vec!["Header"];
    all.extend(expected);
    assert_eq!(texts(blocks), all);
}

#[rstest]
#[case(json!({ "P": [] }), "none")]
#[case(json!({ "P": [{ "N": "a" }] }), "a")]
fn test_table_loop_else_rows(#[case] data: serde_json::Value, #[case] expected: &str) {
    let body = table(&["{{range .P}}", "{{.N}}", "{{else}}", "none", "{{end}}"]);
    let doc = render(&body, data);

    let blocks = &doc.document().blocks;
    let Block::Table(table) = &blocks[0] else {
        panic!("expected a table");
    };
    assert_eq!(table.rows().count(), 1);
    assert_eq!(texts(blocks), vec![expected]);
}

#[test]
fn test_xml_unsafe_data_is_escaped() {
    let doc = render(
        &paragraph(&["{{.Status}}"]),
        json!({ "Status": "<tag>New</tag> & \"quoted\" 'too'" }),
    );
    assert_eq!(
        texts(&doc.document().blocks),
        vec!["<tag>New</tag> & \"quoted\" 'too'"]
    );

    let xml = doc.document().to_xml();
    assert!(xml.contains("&lt;tag&gt;New&lt;/tag&gt;"));
    assert!(!xml.contains("<tag>"));
}

#[test]
fn test_unterminated_tag_is_parse_error() {
    let mut doc = DocxTemplate::from_bytes(&docx(&paragraph(&["Hello {{.Name"]))).unwrap();
    let err = doc.render(&json!({ "Name": "x" })).unwrap_err();
    assert!(matches!(err, Error::Parse(_)), "got {err:?}");
}

#[test]
fn test_unknown_function_is_parse_error() {
    let mut doc = DocxTemplate::from_bytes(&docx(&paragraph(&["{{shout .Name}}"]))).unwrap();
    let err = doc.render(&json!({ "Name": "x" })).unwrap_err();
    let Error::Parse(parse) = err else {
        panic!("expected a parse error");
    };
    assert!(parse.message.contains("shout"));
}

#[test]
fn test_custom_function() {
    let mut doc = DocxTemplate::from_bytes(&docx(&paragraph(&["{{shout .Name}}"]))).unwrap();
    doc.register_function("shout", TemplateFunction::unary(|s| format!("{s}!")))
        .unwrap();
    doc.render(&json!({ "Name": "hey" })).unwrap();
    assert_eq!(texts(&doc.document().blocks), vec!["hey!"]);
}

#[test]
fn test_custom_function_error_aborts_render() {
    let mut doc = DocxTemplate::from_bytes(&docx(&paragraph(&["{{check .Name}}"]))).unwrap();
    doc.register_function(
        "check",
        TemplateFunction::try_unary(|s| {
            if s.is_empty() {
                Err("name is empty")
            } else {
                Ok(s.to_string())
            }
        }),
    )
    .unwrap();

    let err = doc.render(&json!({ "Name": "" })).unwrap_err();
    let Error::Exec(ExecError::Function { name, source }) = err else {
        panic!("expected a function error");
    };
    assert_eq!(name, "check");
    assert_eq!(source.to_string(), "name is empty");
}

#[rstest]
#[case("")]
#[case("1abc")]
#[case("has space")]
#[case("dash-name")]
fn test_invalid_function_names(#[case] name: &str) {
    let mut doc = DocxTemplate::from_bytes(&docx(&paragraph(&["x"]))).unwrap();
    let err = doc
        .register_function(name, TemplateFunction::nullary(String::new))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidFunctionName(_)));
}

#[test]
fn test_missing_key_modes() {
    let body = paragraph(&["[{{.Nope}}]"]);
    let doc = render(&body, json!({ "Name": "x" }));
    assert_eq!(texts(&doc.document().blocks), vec!["[]"]);

    let mut strict = DocxTemplate::from_bytes(&docx(&body))
        .unwrap()
        .with_options(RenderOptions {
            missing_key: MissingKey::Error,
            ..RenderOptions::default()
        });
    let err = strict.render(&json!({ "Name": "x" })).unwrap_err();
    assert!(matches!(err, Error::Exec(ExecError::MissingKey(_))));
}

#[test]
fn test_non_record_data_is_rejected() {
    let mut doc = DocxTemplate::from_bytes(&docx(&paragraph(&["{{.Name}}"]))).unwrap();
    assert!(matches!(
        doc.render(&json!(null)).unwrap_err(),
        Error::NoData
    ));
    assert!(matches!(
        doc.render(&json!(["a"])).unwrap_err(),
        Error::NotARecord { .. }
    ));
}

#[rstest]
fn test_image_injection(temp_dir: TempDir) {
    let logo = png_file(&temp_dir, "logo.png", 96, 48);
    let body = paragraph(&["Logo: {{.Logo}}"]);
    let doc = render(&body, json!({ "Logo": logo, "Name": "not an image" }));

    let xml = doc.document().to_xml();
    assert!(xml.contains("<w:drawing>"));
    assert!(!xml.contains("<w:t><w:drawing>"));
    assert!(!xml.contains("</w:drawing></w:t>"));
    assert_eq!(texts(&doc.document().blocks), vec!["Logo: "]);

    let out = temp_dir.path().join("out.docx");
    doc.save(&out).unwrap();
    let saved = Package::open(&out).unwrap();

    assert!(saved.contains("word/media/image1.png"));
    let content_types = saved.get_str("[Content_Types].xml").unwrap();
    assert!(content_types.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));
    let rels = saved.get_str("word/_rels/document.xml.rels").unwrap();
    assert!(rels.contains(r#"Id="rId2""#));
    assert!(rels.contains(r#"Target="media/image1.png""#));
    assert!(rels.contains(r#"Target="styles.xml""#));
}

#[rstest]
fn test_untouched_parts_survive_save(temp_dir: TempDir) {
    let doc = render(&paragraph(&["{{.Name}}"]), json!({ "Name": "x" }));
    let out = temp_dir.path().join("out.docx");
    doc.save(&out).unwrap();

    let original = Package::from_bytes(&docx("")).unwrap();
    let saved = Package::open(&out).unwrap();
    assert_eq!(
        saved.names().collect::<Vec<_>>(),
        original.names().collect::<Vec<_>>()
    );
    assert_eq!(saved.get("word/styles.xml"), original.get("word/styles.xml"));
    assert_eq!(saved.get("_rels/.rels"), original.get("_rels/.rels"));

    let reopened = DocxTemplate::open(&out).unwrap();
    assert_eq!(texts(&reopened.document().blocks), vec!["x"]);
}

#[test]
fn test_range_timeout_is_reported() {
    let mut doc = DocxTemplate::from_bytes(&docx(&table(&["{{range .A}}", "{{end}}"])))
        .unwrap()
        .with_options(RenderOptions {
            range_timeout: std::time::Duration::ZERO,
            ..RenderOptions::default()
        });
    let err = doc.render(&json!({ "A": [] })).unwrap_err();
    assert!(matches!(err, Error::RangeTimeout { .. }));
}
