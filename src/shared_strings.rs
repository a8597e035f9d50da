//! The module holds all logic to load, look up, and append to the shared string part.
//!
//! The table is strictly append-only: once a string is assigned an index it
//! keeps it for the lifetime of the document, so cells written before a commit
//! still resolve correctly after it. Write-back is a patch of the template
//! part rather than a regeneration, which lets rich text entries round-trip
//! byte-for-byte.
use crate::{
    errors::TemplateError,
    stream::utils::{read_text, xml_reader},
};
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    name::QName,
    Reader, Writer,
};
use std::{
    collections::HashMap,
    io::{BufRead, Read, Seek, Write},
};
use zip::ZipArchive;

pub(crate) const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// Ordered, deduplicated list of every text value referenced by index from
/// string-typed cells, with a reverse map for O(1) lookup-or-append
#[derive(Default)]
pub(crate) struct SharedStringTable {
    strings: Vec<String>,
    table: HashMap<String, usize>,
    /// How many entries at the tail of `strings` were appended after loading
    additions: usize,
    /// Whether the template package carried the part at all
    present: bool,
    loaded: bool,
}

impl SharedStringTable {
    pub(crate) fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub(crate) fn part_present(&self) -> bool {
        self.present
    }

    pub(crate) fn has_additions(&self) -> bool {
        self.additions > 0
    }

    /// Stream the shared string part once; an absent part leaves the table empty
    pub(crate) fn load<RS: Read + Seek>(
        &mut self,
        zip: &mut ZipArchive<RS>,
    ) -> Result<(), TemplateError> {
        self.loaded = true;
        let mut xml = match xml_reader(zip, SHARED_STRINGS_PART) {
            None => return Ok(()),
            Some(x) => x?,
        };
        self.present = true;
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"si" => {
                    let text = Self::read_string(&mut xml, e.name())?;
                    let idx = self.strings.len();
                    self.table.entry(text.clone()).or_insert(idx);
                    self.strings.push(text);
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"sst" => break,
                Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"sst" => break,
                Ok(Event::Eof) => return Err(TemplateError::XmlEof("sst".into())),
                Err(e) => return Err(TemplateError::Xml(e)),
                _ => (),
            }
        }
        Ok(())
    }

    /// Concatenate every `<t>` run of one `<si>`, plain and rich alike,
    /// skipping phonetic runs
    fn read_string<B: BufRead>(
        xml: &mut Reader<B>,
        QName(closing): QName,
    ) -> Result<String, TemplateError> {
        let mut buf = Vec::with_capacity(1024);
        let mut val_buf = Vec::with_capacity(1024);
        let mut value = String::new();
        let mut is_phonetic_text = false;
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"rPh" => {
                    is_phonetic_text = true;
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"rPh" => {
                    is_phonetic_text = false;
                }
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"t" && !is_phonetic_text => {
                    value.push_str(&read_text(xml, b"t", &mut val_buf)?);
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == closing => return Ok(value),
                Ok(Event::Eof) => return Err(TemplateError::XmlEof("si".into())),
                Err(e) => return Err(TemplateError::Xml(e)),
                _ => (),
            }
        }
    }

    /// Index lookup; strips the legacy `_x000D_` carriage return escape
    pub(crate) fn resolve(&self, index: usize) -> Option<String> {
        self.strings.get(index).map(|s| s.replace("_x000D_", ""))
    }

    /// Lookup-or-append; the index handed out for a string never changes afterwards
    pub(crate) fn intern(&mut self, text: &str) -> usize {
        if let Some(idx) = self.table.get(text) {
            return *idx;
        }
        let idx = self.strings.len();
        self.strings.push(text.to_string());
        self.table.insert(text.to_string(), idx);
        self.additions += 1;
        idx
    }

    fn added(&self) -> &[String] {
        &self.strings[self.strings.len() - self.additions..]
    }

    /// Stream-copy the template part, bumping `count`/`uniqueCount` by the number
    /// of appended entries and injecting them before `</sst>`; everything the
    /// template already held passes through untouched
    pub(crate) fn patch_part<RS: Read + Seek>(
        &self,
        zip: &mut ZipArchive<RS>,
    ) -> Result<Vec<u8>, TemplateError> {
        let mut xml = match xml_reader(zip, SHARED_STRINGS_PART) {
            None => return Err(TemplateError::PartMissing(SHARED_STRINGS_PART.into())),
            Some(x) => x?,
        };
        let mut writer = Writer::new(Vec::new());
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"sst" => {
                    writer.write_event(Event::Start(self.bumped_counts(e)?))?;
                }
                Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"sst" => {
                    writer.write_event(Event::Start(self.bumped_counts(e)?))?;
                    self.write_added(&mut writer)?;
                    writer.write_event(Event::End(BytesEnd::new("sst")))?;
                    break;
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"sst" => {
                    self.write_added(&mut writer)?;
                    writer.write_event(Event::End(e.to_owned()))?;
                    break;
                }
                Ok(Event::Eof) => return Err(TemplateError::XmlEof("sst".into())),
                Err(e) => return Err(TemplateError::Xml(e)),
                Ok(e) => writer.write_event(e.into_owned())?,
            }
        }
        Ok(writer.into_inner())
    }

    fn bumped_counts(&self, e: &BytesStart) -> Result<BytesStart<'static>, TemplateError> {
        let added = self.additions as u32;
        let mut attrs: Vec<(String, String)> = Vec::new();
        for attr in e.attributes() {
            let a = attr?;
            let key = String::from_utf8_lossy(a.key.as_ref()).to_string();
            let value = a.unescape_value()?.to_string();
            match key.as_str() {
                "count" | "uniqueCount" => {
                    let count: u32 = value.parse()?;
                    attrs.push((key, (count + added).to_string()));
                }
                _ => attrs.push((key, value)),
            }
        }
        let mut sst = BytesStart::new("sst");
        for (key, value) in &attrs {
            sst.push_attribute((key.as_str(), value.as_str()));
        }
        Ok(sst.into_owned())
    }

    /// Build a brand new part for a template that never had one
    pub(crate) fn new_part(&self) -> Result<Vec<u8>, TemplateError> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        let added = self.additions.to_string();
        let mut sst = BytesStart::new("sst");
        sst.push_attribute(("xmlns", SPREADSHEET_NS));
        sst.push_attribute(("count", added.as_str()));
        sst.push_attribute(("uniqueCount", added.as_str()));
        writer.write_event(Event::Start(sst))?;
        self.write_added(&mut writer)?;
        writer.write_event(Event::End(BytesEnd::new("sst")))?;
        Ok(writer.into_inner())
    }

    fn write_added<W: Write>(&self, writer: &mut Writer<W>) -> Result<(), TemplateError> {
        for text in self.added() {
            writer.write_event(Event::Start(BytesStart::new("si")))?;
            let mut t = BytesStart::new("t");
            if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
                t.push_attribute(("xml:space", "preserve"));
            }
            writer.write_event(Event::Start(t))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new("t")))?;
            writer.write_event(Event::End(BytesEnd::new("si")))?;
        }
        Ok(())
    }
}
