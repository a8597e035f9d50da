//! Streaming rewrite of one worksheet part with the buffered edits applied.
//!
//! Untouched rows are copied through event by event. A row with pending edits
//! is captured whole, patched in memory and re-emitted with its cells in
//! ascending column order. Rows that exist only in the edit buffer are written
//! at their ascending position between the copied ones.
use crate::{
    coordinate::{column_name, split_reference, Col, Row},
    errors::TemplateError,
    shared_strings::SharedStringTable,
    stream::{
        rows::row_number,
        utils::{read_text, xml_reader},
    },
    value::CellValue,
};
use log::warn;
use quick_xml::{
    events::{BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};
use std::{
    collections::BTreeMap,
    io::{BufRead, Read, Seek},
};
use zip::ZipArchive;

/// Buffered edits for one worksheet, keyed by row number then column position
pub(crate) type SheetEdits = BTreeMap<Row, BTreeMap<Col, CellValue>>;

/// Rewrite one worksheet part, leaving everything outside `sheetData` untouched.
/// Text edits are interned into `strings` as they are written out.
pub(crate) fn rewrite_worksheet<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    part: &str,
    edits: &SheetEdits,
    strings: &mut SharedStringTable,
) -> Result<Vec<u8>, TemplateError> {
    let mut xml = match xml_reader(zip, part) {
        None => return Err(TemplateError::PartMissing(part.into())),
        Some(x) => x?,
    };
    let mut writer = Writer::new(Vec::new());
    let mut remaining = edits.clone();
    let mut buf = Vec::with_capacity(1024);
    let mut last_number = 0;
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"row" => {
                let number = row_number(e, last_number)?;
                last_number = number;
                flush_new_rows_below(&mut writer, &mut remaining, number, strings)?;
                let start = e.to_owned();
                match remaining.remove(&number) {
                    Some(row_edits) => {
                        let cells = capture_cells(&mut xml)?;
                        patch_row(&mut writer, start, number, cells, row_edits, strings)?;
                    }
                    None => {
                        writer.write_event(Event::Start(start))?;
                        copy_row_events(&mut xml, &mut writer)?;
                    }
                }
            }
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"row" => {
                let number = row_number(e, last_number)?;
                last_number = number;
                flush_new_rows_below(&mut writer, &mut remaining, number, strings)?;
                let start = e.to_owned();
                match remaining.remove(&number) {
                    Some(row_edits) => {
                        patch_row(&mut writer, start, number, Vec::new(), row_edits, strings)?;
                    }
                    None => writer.write_event(Event::Empty(start))?,
                }
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"sheetData" => {
                flush_new_rows_below(&mut writer, &mut remaining, Row::MAX, strings)?;
                writer.write_event(Event::End(e.to_owned()))?;
            }
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"sheetData" => {
                writer.write_event(Event::Start(e.to_owned()))?;
                flush_new_rows_below(&mut writer, &mut remaining, Row::MAX, strings)?;
                writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(TemplateError::Xml(e)),
            Ok(e) => writer.write_event(e.into_owned())?,
        }
    }
    Ok(writer.into_inner())
}

/// A `<f>` element carried through a patch verbatim, text unescaped
struct CapturedElement {
    start: BytesStart<'static>,
    text: String,
    empty: bool,
}

/// One captured `<c>` element, decomposed far enough to patch it
struct PatchCell {
    col: Col,
    reference: String,
    /// Attributes other than `r` and `t`, in document order
    extra: Vec<(String, String)>,
    ty: Option<String>,
    value: Option<String>,
    formula: Option<CapturedElement>,
    /// Child events other than `<v>` and `<f>`, replayed as captured
    children: Vec<Event<'static>>,
}

impl PatchCell {
    fn new(col: Col, reference: String) -> Self {
        PatchCell {
            col,
            reference,
            extra: Vec::new(),
            ty: None,
            value: None,
            formula: None,
            children: Vec::new(),
        }
    }
}

fn capture_cells<B: BufRead>(xml: &mut Reader<B>) -> Result<Vec<PatchCell>, TemplateError> {
    let mut buf = Vec::with_capacity(1024);
    let mut cells = Vec::new();
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"c" => {
                let mut cell = patch_cell_from_attributes(e)?;
                capture_cell_body(xml, &mut cell)?;
                cells.push(cell);
            }
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"c" => {
                cells.push(patch_cell_from_attributes(e)?);
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"row" => break,
            Ok(Event::Eof) => return Err(TemplateError::XmlEof("row".into())),
            Err(e) => return Err(TemplateError::Xml(e)),
            _ => (),
        }
    }
    Ok(cells)
}

fn patch_cell_from_attributes(e: &BytesStart) -> Result<PatchCell, TemplateError> {
    let mut cell = PatchCell::new(0, String::new());
    for attr in e.attributes() {
        let a = attr?;
        match a.key.as_ref() {
            b"r" => {
                let reference = a.unescape_value()?.to_string();
                let (col, _) = split_reference(&reference)?;
                cell.col = col;
                cell.reference = reference;
            }
            b"t" => cell.ty = Some(a.unescape_value()?.to_string()),
            key => {
                let key = String::from_utf8_lossy(key).to_string();
                cell.extra.push((key, a.unescape_value()?.to_string()));
            }
        }
    }
    if cell.reference.is_empty() {
        warn!("cell in a patched row has no reference attribute");
    }
    Ok(cell)
}

fn capture_cell_body<B: BufRead>(
    xml: &mut Reader<B>,
    cell: &mut PatchCell,
) -> Result<(), TemplateError> {
    let mut buf = Vec::with_capacity(1024);
    let mut text_buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"v" => {
                cell.value = Some(read_text(xml, b"v", &mut text_buf)?);
            }
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"f" => {
                cell.formula = Some(CapturedElement {
                    start: e.to_owned(),
                    text: read_text(xml, b"f", &mut text_buf)?,
                    empty: false,
                });
            }
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"f" => {
                cell.formula = Some(CapturedElement {
                    start: e.to_owned(),
                    text: String::new(),
                    empty: true,
                });
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"c" => break,
            Ok(Event::Eof) => return Err(TemplateError::XmlEof("c".into())),
            Err(e) => return Err(TemplateError::Xml(e)),
            Ok(e) => cell.children.push(e.into_owned()),
        }
    }
    Ok(())
}

/// An edit replaces the stored value and type tag; a formula already on the
/// cell stays in place so the recalculation pass can overwrite the cached value
fn apply_edit(cell: &mut PatchCell, value: &CellValue, strings: &mut SharedStringTable) {
    cell.children.clear();
    match value {
        CellValue::Number(raw) => {
            cell.ty = None;
            cell.value = Some(raw.clone());
        }
        CellValue::Text(text) => {
            cell.ty = Some("s".to_string());
            cell.value = Some(strings.intern(text).to_string());
        }
    }
}

fn patch_row(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'static>,
    number: Row,
    mut cells: Vec<PatchCell>,
    row_edits: BTreeMap<Col, CellValue>,
    strings: &mut SharedStringTable,
) -> Result<(), TemplateError> {
    for (col, value) in &row_edits {
        match cells.iter_mut().find(|c| c.col == *col) {
            Some(cell) => apply_edit(cell, value, strings),
            None => {
                let reference = format!("{}{}", column_name(*col), number);
                let mut cell = PatchCell::new(*col, reference);
                apply_edit(&mut cell, value, strings);
                cells.push(cell);
            }
        }
    }
    cells.sort_by_key(|c| c.col);
    writer.write_event(Event::Start(start))?;
    for cell in &cells {
        write_patch_cell(writer, cell)?;
    }
    writer.write_event(Event::End(BytesEnd::new("row")))?;
    Ok(())
}

fn write_patch_cell(writer: &mut Writer<Vec<u8>>, cell: &PatchCell) -> Result<(), TemplateError> {
    let mut start = BytesStart::new("c");
    if !cell.reference.is_empty() {
        start.push_attribute(("r", cell.reference.as_str()));
    }
    for (key, value) in &cell.extra {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if let Some(ty) = &cell.ty {
        start.push_attribute(("t", ty.as_str()));
    }
    if cell.value.is_none() && cell.formula.is_none() && cell.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    if let Some(f) = &cell.formula {
        if f.empty {
            writer.write_event(Event::Empty(f.start.clone()))?;
        } else {
            writer.write_event(Event::Start(f.start.clone()))?;
            writer.write_event(Event::Text(BytesText::new(&f.text)))?;
            writer.write_event(Event::End(BytesEnd::new("f")))?;
        }
    }
    if let Some(v) = &cell.value {
        writer.write_event(Event::Start(BytesStart::new("v")))?;
        writer.write_event(Event::Text(BytesText::new(v)))?;
        writer.write_event(Event::End(BytesEnd::new("v")))?;
    }
    for child in &cell.children {
        writer.write_event(child.clone())?;
    }
    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

fn copy_row_events<B: BufRead>(
    xml: &mut Reader<B>,
    writer: &mut Writer<Vec<u8>>,
) -> Result<(), TemplateError> {
    let mut buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf) {
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"row" => {
                writer.write_event(Event::End(e.to_owned()))?;
                return Ok(());
            }
            Ok(Event::Eof) => return Err(TemplateError::XmlEof("row".into())),
            Err(e) => return Err(TemplateError::Xml(e)),
            Ok(e) => writer.write_event(e.into_owned())?,
        }
    }
}

/// Write every buffered row numbered strictly below `bound`, ascending
fn flush_new_rows_below(
    writer: &mut Writer<Vec<u8>>,
    remaining: &mut SheetEdits,
    bound: Row,
    strings: &mut SharedStringTable,
) -> Result<(), TemplateError> {
    while let Some((&number, _)) = remaining.iter().next() {
        if number >= bound {
            break;
        }
        if let Some(cells) = remaining.remove(&number) {
            write_new_row(writer, number, &cells, strings)?;
        }
    }
    Ok(())
}

fn write_new_row(
    writer: &mut Writer<Vec<u8>>,
    number: Row,
    cells: &BTreeMap<Col, CellValue>,
    strings: &mut SharedStringTable,
) -> Result<(), TemplateError> {
    let mut row = BytesStart::new("row");
    let number_attr = number.to_string();
    row.push_attribute(("r", number_attr.as_str()));
    writer.write_event(Event::Start(row))?;
    for (col, value) in cells {
        let reference = format!("{}{}", column_name(*col), number);
        let mut c = BytesStart::new("c");
        c.push_attribute(("r", reference.as_str()));
        let raw = match value {
            CellValue::Number(v) => v.clone(),
            CellValue::Text(text) => {
                c.push_attribute(("t", "s"));
                strings.intern(text).to_string()
            }
        };
        writer.write_event(Event::Start(c))?;
        writer.write_event(Event::Start(BytesStart::new("v")))?;
        writer.write_event(Event::Text(BytesText::new(&raw)))?;
        writer.write_event(Event::End(BytesEnd::new("v")))?;
        writer.write_event(Event::End(BytesEnd::new("c")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("row")))?;
    Ok(())
}
