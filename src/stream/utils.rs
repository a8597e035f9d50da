//! The module includes extra utility tooling to help glue logic together
use crate::errors::TemplateError;
use quick_xml::{events::Event, Reader};
use std::io::{BufRead, BufReader, Read, Seek};
use zip::{
    read::ZipFile, result::ZipError, write::SimpleFileOptions, CompressionMethod, DateTime,
    ZipArchive,
};

// ported from calamine https://github.com/tafia/calamine/tree/master
pub(crate) fn xml_reader<'a, RS: Read + Seek>(
    zip: &'a mut ZipArchive<RS>,
    path: &str,
) -> Option<Result<Reader<BufReader<ZipFile<'a>>>, TemplateError>> {
    let actual_path = zip
        .file_names()
        .find(|n| n.eq_ignore_ascii_case(path))?
        .to_owned();
    match zip.by_name(&actual_path) {
        Ok(f) => {
            let mut r = Reader::from_reader(BufReader::new(f));
            let config = r.config_mut();
            config.check_end_names = false;
            config.trim_text(false);
            config.check_comments = false;
            config.expand_empty_elements = false;
            Some(Ok(r))
        }
        Err(ZipError::FileNotFound) => None,
        Err(e) => Some(Err(TemplateError::Zip(e))),
    }
}

/// File options for every entry rewritten into the output package. The
/// timestamp is pinned so repeated commits of the same pending state produce
/// identical bytes.
pub(crate) fn zip_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

/// Collect the text content of the current element up to its closing tag
pub(crate) fn read_text<B: BufRead>(
    xml: &mut Reader<B>,
    closing: &[u8],
    buf: &mut Vec<u8>,
) -> Result<String, TemplateError> {
    let mut value = String::new();
    loop {
        buf.clear();
        match xml.read_event_into(buf) {
            Ok(Event::Text(t)) => value.push_str(&t.unescape()?),
            Ok(Event::End(ref e)) if e.local_name().as_ref() == closing => break,
            Ok(Event::Eof) => {
                return Err(TemplateError::XmlEof(
                    String::from_utf8_lossy(closing).to_string(),
                ))
            }
            Err(e) => return Err(TemplateError::Xml(e)),
            _ => (),
        }
    }
    Ok(value)
}
