//! Forward-only row extraction over one worksheet part.
//!
//! The worksheet XML is sparse: rows and cells that were never written simply
//! do not appear. [`RawRows`] pulls the `<row>` elements exactly as stored,
//! [`DenseRows`] layers the consumer-facing shape on top by synthesizing the
//! blank rows and cells the XML skipped.
use crate::{
    coordinate::{split_reference, Col},
    errors::TemplateError,
    shared_strings::SharedStringTable,
    stream::utils::read_text,
};
use log::warn;
use quick_xml::{events::BytesStart, events::Event, name::QName, Reader};
use std::io::BufRead;

/// One cell as it appears in the worksheet XML, before shared string resolution
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct RawCell {
    /// Zero-based column position taken from the `r` attribute
    pub(crate) col: Col,
    /// Whether the cell carries `t="s"` and its value is a shared string index
    pub(crate) shared: bool,
    /// Text of the `<v>` element when present
    pub(crate) value: Option<String>,
    /// Text of the `<f>` element when present
    pub(crate) formula: Option<String>,
}

/// One `<row>` element with its 1-based number and cells in document order
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct RawRow {
    pub(crate) number: u32,
    pub(crate) cells: Vec<RawCell>,
}

/// Pull one `<row>` element at a time out of `sheetData`
pub(crate) struct RawRows<B> {
    xml: Reader<B>,
    last_number: u32,
    done: bool,
}

impl<B: BufRead> RawRows<B> {
    pub(crate) fn new(xml: Reader<B>) -> Self {
        RawRows {
            xml,
            last_number: 0,
            done: false,
        }
    }

    /// Advance to the next `<row>`, or `None` once `sheetData` is exhausted
    pub(crate) fn next_row(&mut self) -> Result<Option<RawRow>, TemplateError> {
        if self.done {
            return Ok(None);
        }
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match self.xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"row" => {
                    let number = row_number(e, self.last_number)?;
                    self.last_number = number;
                    let cells = self.read_cells()?;
                    return Ok(Some(RawRow { number, cells }));
                }
                Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"row" => {
                    let number = row_number(e, self.last_number)?;
                    self.last_number = number;
                    return Ok(Some(RawRow {
                        number,
                        cells: Vec::new(),
                    }));
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"sheetData" => {
                    self.done = true;
                    return Ok(None);
                }
                Ok(Event::Eof) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => return Err(TemplateError::Xml(e)),
                _ => (),
            }
        }
    }

    fn read_cells(&mut self) -> Result<Vec<RawCell>, TemplateError> {
        let mut buf = Vec::with_capacity(1024);
        let mut cells = Vec::new();
        loop {
            buf.clear();
            match self.xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"c" => {
                    let mut cell = cell_from_attributes(e, self.last_number)?;
                    self.read_cell_body(&mut cell)?;
                    cells.push(cell);
                }
                Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"c" => {
                    cells.push(cell_from_attributes(e, self.last_number)?);
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"row" => break,
                Ok(Event::Eof) => return Err(TemplateError::XmlEof("row".into())),
                Err(e) => return Err(TemplateError::Xml(e)),
                _ => (),
            }
        }
        Ok(cells)
    }

    fn read_cell_body(&mut self, cell: &mut RawCell) -> Result<(), TemplateError> {
        let mut buf = Vec::with_capacity(1024);
        let mut val_buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            match self.xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"v" => {
                    cell.value = Some(read_text(&mut self.xml, b"v", &mut val_buf)?);
                }
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"f" => {
                    cell.formula = Some(read_text(&mut self.xml, b"f", &mut val_buf)?);
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"c" => break,
                Ok(Event::Eof) => return Err(TemplateError::XmlEof("c".into())),
                Err(e) => return Err(TemplateError::Xml(e)),
                _ => (),
            }
        }
        Ok(())
    }
}

/// Row number from the `r` attribute; a missing attribute falls back to the next
/// position after the previously seen row
pub(crate) fn row_number(e: &BytesStart, last: u32) -> Result<u32, TemplateError> {
    for attr in e.attributes() {
        let a = attr?;
        if a.key == QName(b"r") {
            return Ok(a.unescape_value()?.parse()?);
        }
    }
    warn!("row after {last} has no number attribute");
    Ok(last + 1)
}

fn cell_from_attributes(e: &BytesStart, number: u32) -> Result<RawCell, TemplateError> {
    let mut cell = RawCell::default();
    let mut seen_reference = false;
    for attr in e.attributes() {
        let a = attr?;
        match a.key {
            QName(b"r") => {
                let (col, _) = split_reference(&a.unescape_value()?)?;
                cell.col = col;
                seen_reference = true;
            }
            QName(b"t") => cell.shared = a.unescape_value()?.as_ref() == "s",
            _ => (),
        }
    }
    if !seen_reference {
        warn!("cell in row {number} has no reference attribute");
    }
    Ok(cell)
}

/// Surface one cell's value, resolving string-typed cells through the table so
/// a raw index is never visible to the caller
pub(crate) fn resolve_cell(cell: &RawCell, table: &SharedStringTable) -> String {
    let value = match &cell.value {
        Some(v) => v,
        None => return String::new(),
    };
    if cell.shared {
        match value.parse().ok().and_then(|idx| table.resolve(idx)) {
            Some(text) => text,
            None => {
                warn!("shared string index ({value}) is out of range");
                String::new()
            }
        }
    } else {
        value.clone()
    }
}

/// Project one raw row into its dense shape: every column position from 0 up to
/// the last XML-present cell gets an entry, blank where the XML skipped it. A
/// non-empty `columns` filter emits only the selected positions, still ascending.
pub(crate) fn project_row(raw: &RawRow, columns: &[Col], table: &SharedStringTable) -> Vec<String> {
    let mut data = Vec::new();
    let mut next_col = 0;
    for cell in &raw.cells {
        while next_col < cell.col {
            if columns.is_empty() || columns.contains(&next_col) {
                data.push(String::new());
            }
            next_col += 1;
        }
        if columns.is_empty() || columns.contains(&cell.col) {
            data.push(resolve_cell(cell, table));
        }
        next_col = cell.col + 1;
    }
    data
}

/// Row-gap filling adapter: each pull yields exactly one row unit in ascending
/// order, either a projected content row or a synthesized empty row for a number
/// the XML skipped
pub(crate) struct DenseRows<B> {
    raw: RawRows<B>,
    columns: Vec<Col>,
    pending: Option<RawRow>,
    next_number: u32,
    done: bool,
}

impl<B: BufRead> DenseRows<B> {
    pub(crate) fn new(raw: RawRows<B>, columns: Vec<Col>) -> Self {
        DenseRows {
            raw,
            columns,
            pending: None,
            next_number: 1,
            done: false,
        }
    }

    pub(crate) fn next_row(
        &mut self,
        table: &SharedStringTable,
    ) -> Result<Option<Vec<String>>, TemplateError> {
        if self.done {
            return Ok(None);
        }
        if self.pending.is_none() {
            match self.raw.next_row()? {
                Some(row) => self.pending = Some(row),
                None => {
                    self.done = true;
                    return Ok(None);
                }
            }
        }
        let number = self.pending.as_ref().map(|r| r.number).unwrap_or_default();
        if self.next_number < number {
            // The XML skipped this row number entirely
            self.next_number += 1;
            return Ok(Some(Vec::new()));
        }
        self.next_number = number + 1;
        let row = self.pending.take().unwrap_or_default();
        Ok(Some(project_row(&row, &self.columns, table)))
    }
}

/// Scan ascending for one target cell, stopping at the first row past it
pub(crate) fn find_cell<B: BufRead>(
    raw: &mut RawRows<B>,
    col: Col,
    row: u32,
) -> Result<Option<RawCell>, TemplateError> {
    while let Some(r) = raw.next_row()? {
        if r.number > row {
            break;
        }
        if r.number < row {
            continue;
        }
        return Ok(r.cells.into_iter().find(|c| c.col == col));
    }
    Ok(None)
}

#[cfg(test)]
mod row_stream_api {
    use super::*;
    use crate::shared_strings::SharedStringTable;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1"><v>7</v></c></row>
<row r="2"><c r="B2"><f>A1+B1</f><v>3</v></c></row>
<row r="4"><c r="A4"><v>4.5</v></c></row>
</sheetData>
</worksheet>"#;

    fn raw_rows(xml: &str) -> RawRows<&[u8]> {
        RawRows::new(Reader::from_reader(xml.as_bytes()))
    }

    fn table_with(values: &[&str]) -> SharedStringTable {
        let mut table = SharedStringTable::default();
        for value in values {
            table.intern(value);
        }
        table
    }

    #[test]
    fn raw_rows_yield_in_document_order() {
        let mut rows = raw_rows(SHEET);

        let row = rows.next_row().unwrap().unwrap();
        assert_eq!(row.number, 1);
        assert_eq!(row.cells.len(), 2);
        assert_eq!(row.cells[0].col, 0);
        assert!(row.cells[0].shared);
        assert_eq!(row.cells[1].col, 2);
        assert_eq!(row.cells[1].value.as_deref(), Some("7"));

        let row = rows.next_row().unwrap().unwrap();
        assert_eq!(row.number, 2);
        assert_eq!(row.cells[0].formula.as_deref(), Some("A1+B1"));
        assert_eq!(row.cells[0].value.as_deref(), Some("3"));

        let row = rows.next_row().unwrap().unwrap();
        assert_eq!(row.number, 4);

        // Exhausted stream stays exhausted
        assert!(rows.next_row().unwrap().is_none());
        assert!(rows.next_row().unwrap().is_none());
    }

    #[test]
    fn project_row_fills_skipped_columns() {
        let table = table_with(&["hello"]);
        let mut rows = raw_rows(SHEET);
        let row = rows.next_row().unwrap().unwrap();

        // Column B never appears in the XML so a blank is synthesized
        let data = project_row(&row, &[], &table);
        assert_eq!(data, vec!["hello".to_string(), String::new(), "7".into()]);
    }

    #[test]
    fn project_row_honors_column_filter() {
        let table = table_with(&["hello"]);
        let mut rows = raw_rows(SHEET);
        let row = rows.next_row().unwrap().unwrap();

        let data = project_row(&row, &[1, 2], &table);
        assert_eq!(data, vec![String::new(), "7".to_string()]);
    }

    #[test]
    fn dense_rows_synthesize_row_gaps() {
        let table = table_with(&["hello"]);
        let mut dense = DenseRows::new(raw_rows(SHEET), Vec::new());

        let mut all = Vec::new();
        while let Some(row) = dense.next_row(&table).unwrap() {
            all.push(row);
        }
        assert_eq!(all.len(), 4);
        // Row 3 is absent from the XML and comes back as an empty unit
        assert!(all[2].is_empty());
        assert_eq!(all[3], vec!["4.5".to_string()]);
    }

    #[test]
    fn out_of_range_shared_index_degrades_to_blank() {
        let table = SharedStringTable::default();
        let mut rows = raw_rows(SHEET);
        let row = rows.next_row().unwrap().unwrap();

        let data = project_row(&row, &[], &table);
        assert_eq!(data[0], "");
    }

    #[test]
    fn find_cell_stops_past_the_target_row() {
        let mut rows = raw_rows(SHEET);
        let cell = find_cell(&mut rows, 1, 2).unwrap().unwrap();
        assert_eq!(cell.formula.as_deref(), Some("A1+B1"));

        // The scan above stopped inside row 2, a fresh scan misses nothing
        let mut rows = raw_rows(SHEET);
        assert!(find_cell(&mut rows, 0, 3).unwrap().is_none());
    }

    #[test]
    fn find_cell_misses_absent_cell_in_present_row() {
        let mut rows = raw_rows(SHEET);
        assert!(find_cell(&mut rows, 5, 1).unwrap().is_none());
    }
}
