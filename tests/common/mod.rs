//! Hand-assembled template packages small enough to reason about byte by byte
#![allow(dead_code)]
use std::{fs::File, io::Write, path::PathBuf};
use tempfile::TempDir;
use zip::{write::SimpleFileOptions, ZipWriter};

/// Assemble a minimal but well-formed package: content type manifest, package
/// and workbook relationships, a workbook declaring one `<sheet>` per entry of
/// `sheets`, one worksheet part per entry wrapping the given `sheetData` body,
/// and optionally a shared string part.
pub fn package(
    dir: &TempDir,
    file_name: &str,
    sheets: &[(&str, &str)],
    shared: Option<&str>,
) -> PathBuf {
    let path = dir.path().join(file_name);
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    let options = SimpleFileOptions::default();

    let mut types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    for i in 1..=sheets.len() {
        types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }
    if shared.is_some() {
        types.push_str(
            r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#,
        );
    }
    types.push_str("</Types>");
    entry(&mut zip, "[Content_Types].xml", &types, options);

    entry(
        &mut zip,
        "_rels/.rels",
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
        options,
    );

    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        let no = i + 1;
        workbook.push_str(&format!(
            r#"<sheet name="{name}" sheetId="{no}" r:id="rId{no}"/>"#
        ));
    }
    workbook.push_str(r#"</sheets><calcPr calcId="191029"/></workbook>"#);
    entry(&mut zip, "xl/workbook.xml", &workbook, options);

    let mut rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for i in 1..=sheets.len() {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{i}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{i}.xml"/>"#
        ));
    }
    if shared.is_some() {
        let id = sheets.len() + 1;
        rels.push_str(&format!(
            r#"<Relationship Id="rId{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#
        ));
    }
    rels.push_str("</Relationships>");
    entry(&mut zip, "xl/_rels/workbook.xml.rels", &rels, options);

    for (i, (_, sheet_data)) in sheets.iter().enumerate() {
        let body = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{sheet_data}</sheetData></worksheet>"#
        );
        entry(
            &mut zip,
            &format!("xl/worksheets/sheet{}.xml", i + 1),
            &body,
            options,
        );
    }

    if let Some(shared) = shared {
        entry(&mut zip, "xl/sharedStrings.xml", shared, options);
    }

    zip.finish().unwrap();
    path
}

fn entry(zip: &mut ZipWriter<File>, name: &str, body: &str, options: SimpleFileOptions) {
    zip.start_file(name, options).unwrap();
    zip.write_all(body.as_bytes()).unwrap();
}

/// A plain shared string part with one `<si><t>` per entry
pub fn shared_strings(entries: &[&str]) -> String {
    let count = entries.len();
    let mut sst = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{count}" uniqueCount="{count}">"#
    );
    for text in entries {
        sst.push_str(&format!("<si><t>{text}</t></si>"));
    }
    sst.push_str("</sst>");
    sst
}

/// Read one entry of a generated package back as text
pub fn entry_text(bytes: &[u8], name: &str) -> String {
    use std::io::{Cursor, Read};
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut body = String::new();
    zip.by_name(name).unwrap().read_to_string(&mut body).unwrap();
    body
}
