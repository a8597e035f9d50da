//! Sheet declarations and the workbook part rewrite applied at commit
use crate::{errors::TemplateError, stream::utils::xml_reader};
use quick_xml::{
    events::{BytesStart, Event},
    name::QName,
    Writer,
};
use std::{
    collections::BTreeMap,
    io::{Read, Seek},
};
use zip::ZipArchive;

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";

/// Declared sheet names in workbook order; position in this list plus one is
/// the sheet number used everywhere else
pub(crate) fn sheet_names<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
) -> Result<Vec<String>, TemplateError> {
    let mut xml = match xml_reader(zip, WORKBOOK_PART) {
        None => return Err(TemplateError::PartMissing(WORKBOOK_PART.into())),
        Some(x) => x?,
    };
    let mut names = Vec::new();
    let mut buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                for attr in e.attributes() {
                    let a = attr?;
                    if a.key == QName(b"name") {
                        names.push(a.unescape_value()?.to_string());
                    }
                }
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"sheets" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(TemplateError::Xml(e)),
            _ => (),
        }
    }
    Ok(names)
}

/// Rewrite the workbook part: apply pending renames to the positionally matching
/// `<sheet>` declarations and make sure the consuming application recalculates
/// every formula the next time the file is opened
pub(crate) fn rewrite<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    renames: &BTreeMap<usize, String>,
) -> Result<Vec<u8>, TemplateError> {
    let mut xml = match xml_reader(zip, WORKBOOK_PART) {
        None => return Err(TemplateError::PartMissing(WORKBOOK_PART.into())),
        Some(x) => x?,
    };
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::with_capacity(1024);
    let mut sheet_no = 0;
    let mut saw_calc_pr = false;
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"sheet" => {
                sheet_no += 1;
                writer.write_event(Event::Empty(renamed_sheet(e, renames.get(&sheet_no))?))?;
            }
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"sheet" => {
                sheet_no += 1;
                writer.write_event(Event::Start(renamed_sheet(e, renames.get(&sheet_no))?))?;
            }
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Empty(forced_calc_pr(e)?))?;
            }
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Start(forced_calc_pr(e)?))?;
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"workbook" => {
                if !saw_calc_pr {
                    // A template without calculation properties still needs the flag
                    let mut calc_pr = BytesStart::new("calcPr");
                    calc_pr.push_attribute(("forceFullCalc", "1"));
                    writer.write_event(Event::Empty(calc_pr))?;
                }
                writer.write_event(Event::End(e.to_owned()))?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(TemplateError::Xml(e)),
            Ok(e) => writer.write_event(e.into_owned())?,
        }
    }
    Ok(writer.into_inner())
}

fn renamed_sheet(
    e: &BytesStart<'_>,
    new_name: Option<&String>,
) -> Result<BytesStart<'static>, TemplateError> {
    let Some(name) = new_name else {
        return Ok(e.to_owned());
    };
    let mut sheet = BytesStart::new("sheet");
    for attr in e.attributes() {
        let a = attr?;
        if a.key.as_ref() == b"name" {
            sheet.push_attribute(("name", name.as_str()));
        } else {
            sheet.push_attribute((a.key.as_ref(), a.value.as_ref()));
        }
    }
    Ok(sheet.into_owned())
}

fn forced_calc_pr(e: &BytesStart<'_>) -> Result<BytesStart<'static>, TemplateError> {
    let mut calc_pr = BytesStart::new("calcPr");
    let mut forced = false;
    for attr in e.attributes() {
        let a = attr?;
        if a.key.as_ref() == b"forceFullCalc" {
            forced = true;
        }
        calc_pr.push_attribute((a.key.as_ref(), a.value.as_ref()));
    }
    if !forced {
        calc_pr.push_attribute(("forceFullCalc", "1"));
    }
    Ok(calc_pr.into_owned())
}
