//! Output package assembly and the two manifest patches that register a
//! shared string part the template never declared.
use crate::{
    errors::TemplateError,
    shared_strings::SHARED_STRINGS_PART,
    stream::utils::{xml_reader, zip_options},
};
use quick_xml::{
    events::{BytesStart, Event},
    name::QName,
    Writer,
};
use std::{
    collections::{HashMap, HashSet},
    io::{Cursor, Read, Seek, Write},
};
use zip::{ZipArchive, ZipWriter};

pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub(crate) const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";

const SHARED_STRINGS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
const SHARED_STRINGS_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";

/// Build the output package: every template entry is carried over in its stored
/// order, raw-copied unless a rewritten body is supplied for it, then the extra
/// entries the template never held are appended
pub(crate) fn assemble<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    rewritten: &HashMap<String, Vec<u8>>,
    extra: &[(String, Vec<u8>)],
) -> Result<Vec<u8>, TemplateError> {
    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..zip.len() {
        let entry = zip.by_index_raw(i)?;
        let name = entry.name().to_string();
        match rewritten.get(&name) {
            Some(bytes) => {
                // Raw copy keeps the template's compressed data; a rewritten
                // body has to be recompressed instead
                drop(entry);
                out.start_file(name.as_str(), zip_options())?;
                out.write_all(bytes)?;
            }
            None => out.raw_copy_file(entry)?,
        }
    }
    for (name, bytes) in extra {
        out.start_file(name.as_str(), zip_options())?;
        out.write_all(bytes)?;
    }
    Ok(out.finish()?.into_inner())
}

/// Append the shared string `Override` to the content type manifest
pub(crate) fn declare_shared_strings_content_type<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
) -> Result<Vec<u8>, TemplateError> {
    let mut xml = match xml_reader(zip, CONTENT_TYPES_PART) {
        None => return Err(TemplateError::PartMissing(CONTENT_TYPES_PART.into())),
        Some(x) => x?,
    };
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::with_capacity(1024);
    let part_name = format!("/{SHARED_STRINGS_PART}");
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf) {
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"Types" => {
                let mut over = BytesStart::new("Override");
                over.push_attribute(("PartName", part_name.as_str()));
                over.push_attribute(("ContentType", SHARED_STRINGS_CONTENT_TYPE));
                writer.write_event(Event::Empty(over))?;
                writer.write_event(Event::End(e.to_owned()))?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(TemplateError::Xml(e)),
            Ok(e) => writer.write_event(e.into_owned())?,
        }
    }
    Ok(writer.into_inner())
}

/// Append a shared string `Relationship` to the workbook relationship part,
/// under the lowest relationship id the template has not used yet
pub(crate) fn declare_shared_strings_relationship<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
) -> Result<Vec<u8>, TemplateError> {
    let mut xml = match xml_reader(zip, WORKBOOK_RELS_PART) {
        None => return Err(TemplateError::PartMissing(WORKBOOK_RELS_PART.into())),
        Some(x) => x?,
    };
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::with_capacity(1024);
    let mut used = HashSet::new();
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf) {
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"Relationships" => {
                let id = format!("rId{}", lowest_unused(&used));
                let mut rel = BytesStart::new("Relationship");
                rel.push_attribute(("Id", id.as_str()));
                rel.push_attribute(("Type", SHARED_STRINGS_REL_TYPE));
                rel.push_attribute(("Target", "sharedStrings.xml"));
                writer.write_event(Event::Empty(rel))?;
                writer.write_event(Event::End(e.to_owned()))?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(TemplateError::Xml(e)),
            Ok(e) => {
                if let Event::Start(ref el) | Event::Empty(ref el) = e {
                    if el.local_name().as_ref() == b"Relationship" {
                        for attr in el.attributes() {
                            let a = attr?;
                            if a.key == QName(b"Id") {
                                if let Some(n) = a
                                    .unescape_value()?
                                    .strip_prefix("rId")
                                    .and_then(|s| s.parse::<u32>().ok())
                                {
                                    used.insert(n);
                                }
                            }
                        }
                    }
                }
                writer.write_event(e.into_owned())?;
            }
        }
    }
    Ok(writer.into_inner())
}

fn lowest_unused(used: &HashSet<u32>) -> u32 {
    let mut next = 1;
    while used.contains(&next) {
        next += 1;
    }
    next
}
