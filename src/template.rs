//! The facade over one opened template package.
//!
//! An `XlsxTemplate` keeps the archive open for its whole lifetime and never
//! mutates it: reads stream straight out of the entry, writes buffer in memory
//! until `generate` replays them over a fresh copy of the package. Pending
//! state survives every commit, so one template instance can produce any
//! number of filled-out documents.
use crate::{
    coordinate::{Col, ColumnRef, RowRef, SheetRef, MAX_COLUMNS, MAX_ROWS, MAX_STRING_LEN},
    errors::TemplateError,
    package::{self, CONTENT_TYPES_PART, WORKBOOK_RELS_PART},
    shared_strings::{SharedStringTable, SHARED_STRINGS_PART},
    stream::{
        cursor::RowCursor,
        rows::{self, RawCell, RawRows},
        utils::xml_reader,
    },
    value::CellValue,
    workbook::{self, WORKBOOK_PART},
    worksheet::{self, SheetEdits},
};
use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    path::{Path, PathBuf},
};
use zip::ZipArchive;

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// One template package opened for reading and incremental rewriting
pub struct XlsxTemplate {
    path: PathBuf,
    zip: ZipArchive<File>,
    /// Declared sheet names, loaded on first use and cached for the lifetime
    names: Option<Vec<String>>,
    strings: SharedStringTable,
    /// Pending cell edits keyed by worksheet part path
    edits: BTreeMap<String, SheetEdits>,
    /// Pending renames keyed by 1-based sheet position
    renames: BTreeMap<usize, String>,
    cursor: Option<RowCursor>,
}

/// The generated package bytes together with the response header values a web
/// caller hands back unchanged
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub content_disposition: String,
    pub cache_control: &'static str,
}

impl XlsxTemplate {
    /// Open a template package from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TemplateError> {
        let path = path.as_ref().to_path_buf();
        let zip = ZipArchive::new(File::open(&path)?)?;
        Ok(XlsxTemplate {
            path,
            zip,
            names: None,
            strings: SharedStringTable::default(),
            edits: BTreeMap::new(),
            renames: BTreeMap::new(),
            cursor: None,
        })
    }

    /// Declared sheet names in workbook order
    pub fn sheet_names(&mut self) -> Result<Vec<String>, TemplateError> {
        Ok(self.names()?.to_vec())
    }

    /// One cell's displayed value; `None` when the cell is absent from the XML
    pub fn get(
        &mut self,
        sheet: impl Into<SheetRef>,
        column: impl Into<ColumnRef>,
        row: impl Into<RowRef>,
    ) -> Result<Option<String>, TemplateError> {
        let cell = self.locate(&sheet.into(), &column.into(), &row.into())?;
        Ok(cell.map(|c| rows::resolve_cell(&c, &self.strings)))
    }

    /// One cell's stored formula text; `Some("")` for a present cell that has
    /// no formula, `None` when the cell is absent
    pub fn get_formula(
        &mut self,
        sheet: impl Into<SheetRef>,
        column: impl Into<ColumnRef>,
        row: impl Into<RowRef>,
    ) -> Result<Option<String>, TemplateError> {
        let cell = self.locate(&sheet.into(), &column.into(), &row.into())?;
        Ok(cell.map(|c| c.formula.unwrap_or_default()))
    }

    /// Every row of one sheet in ascending order, gaps filled with empty row
    /// units and blank cells. A non-empty `columns` filter keeps only the
    /// selected zero-based positions.
    pub fn all(
        &mut self,
        sheet: impl Into<SheetRef>,
        columns: &[Col],
    ) -> Result<Vec<Vec<String>>, TemplateError> {
        let no = self.sheet_no(&sheet.into())?;
        self.ensure_strings()?;
        let part = sheet_part(no);
        let xml = match xml_reader(&mut self.zip, &part) {
            None => return Err(TemplateError::PartMissing(part)),
            Some(x) => x?,
        };
        let mut dense = rows::DenseRows::new(RawRows::new(xml), columns.to_vec());
        let mut data = Vec::new();
        while let Some(row) = dense.next_row(&self.strings)? {
            data.push(row);
        }
        Ok(data)
    }

    /// Open the lazy row cursor on one sheet, replacing any cursor already
    /// open. A sheet that does not resolve leaves the cursor closed without an
    /// error, so a caller can probe and fall through to `next_row`'s `None`.
    pub fn open_rows(
        &mut self,
        sheet: impl Into<SheetRef>,
        columns: &[Col],
    ) -> Result<(), TemplateError> {
        self.close_rows();
        let no = match self.sheet_no(&sheet.into()) {
            Ok(no) => no,
            Err(TemplateError::SheetNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        self.ensure_strings()?;
        let part = sheet_part(no);
        let actual = match self
            .zip
            .file_names()
            .find(|n| n.eq_ignore_ascii_case(&part))
            .map(str::to_owned)
        {
            None => return Err(TemplateError::PartMissing(part)),
            Some(name) => name,
        };
        let cursor = {
            let mut entry = self.zip.by_name(&actual)?;
            RowCursor::open(&mut entry, columns.to_vec())?
        };
        self.cursor = Some(cursor);
        Ok(())
    }

    /// Pull the next row unit from the open cursor; `None` when no cursor is
    /// open or the sheet is exhausted, at which point the cursor is dropped
    pub fn next_row(&mut self) -> Result<Option<Vec<String>>, TemplateError> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        match cursor.next_row(&self.strings)? {
            Some(row) => Ok(Some(row)),
            None => {
                self.cursor = None;
                Ok(None)
            }
        }
    }

    /// Drop the open cursor and its scratch file, callable any number of times
    pub fn close_rows(&mut self) {
        self.cursor = None;
    }

    /// Buffer one cell value; nothing reaches the package until `generate`.
    /// The last value set for a coordinate wins.
    pub fn set(
        &mut self,
        sheet: impl Into<SheetRef>,
        column: impl Into<ColumnRef>,
        row: impl Into<RowRef>,
        value: impl Into<CellValue>,
    ) -> Result<&mut Self, TemplateError> {
        let no = self.sheet_no(&sheet.into())?;
        let col = column.into().index();
        if col >= MAX_COLUMNS {
            return Err(TemplateError::MaxColumnExceeded);
        }
        let number = row.into().number()?;
        if number == 0 || number > MAX_ROWS {
            return Err(TemplateError::MaxRowExceeded);
        }
        let value = value.into();
        if let CellValue::Text(text) = &value {
            if text.chars().count() > MAX_STRING_LEN {
                return Err(TemplateError::MaxStringLengthExceeded);
            }
        }
        self.edits
            .entry(sheet_part(no))
            .or_default()
            .entry(number)
            .or_default()
            .insert(col, value);
        Ok(self)
    }

    /// Buffer a display name for the sheet at a 1-based position; a position
    /// the workbook never declares is dropped at commit
    pub fn rename_sheet(&mut self, sheet_no: usize, name: impl Into<String>) -> &mut Self {
        self.renames.insert(sheet_no, name.into());
        self
    }

    /// Produce the complete output package. Pending edits and renames stay
    /// buffered, so a repeat call replays them over the pristine template and
    /// returns identical bytes.
    pub fn generate(&mut self) -> Result<Vec<u8>, TemplateError> {
        if !self.edits.is_empty() {
            self.ensure_strings()?;
        }
        let mut rewritten = HashMap::new();
        for (part, sheet_edits) in &self.edits {
            let body =
                worksheet::rewrite_worksheet(&mut self.zip, part, sheet_edits, &mut self.strings)?;
            rewritten.insert(part.clone(), body);
        }
        rewritten.insert(
            WORKBOOK_PART.to_string(),
            workbook::rewrite(&mut self.zip, &self.renames)?,
        );
        let mut extra = Vec::new();
        if self.strings.has_additions() {
            if self.strings.part_present() {
                rewritten.insert(
                    SHARED_STRINGS_PART.to_string(),
                    self.strings.patch_part(&mut self.zip)?,
                );
            } else {
                // The template never carried the part, so the manifest and the
                // workbook relationships have to start declaring it
                extra.push((SHARED_STRINGS_PART.to_string(), self.strings.new_part()?));
                rewritten.insert(
                    CONTENT_TYPES_PART.to_string(),
                    package::declare_shared_strings_content_type(&mut self.zip)?,
                );
                rewritten.insert(
                    WORKBOOK_RELS_PART.to_string(),
                    package::declare_shared_strings_relationship(&mut self.zip)?,
                );
            }
        }
        package::assemble(&mut self.zip, &rewritten, &extra)
    }

    /// Generate and write the package to `path`, world read-writable on unix
    /// so a template-owning service account is not the only writer
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<(), TemplateError> {
        let bytes = self.generate()?;
        std::fs::write(&path, bytes)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666))?;
        }
        Ok(())
    }

    /// Generate and wrap the package for an HTTP response; the filename falls
    /// back to the template's own
    pub fn download(&mut self, filename: Option<&str>) -> Result<Download, TemplateError> {
        let bytes = self.generate()?;
        let name = match filename {
            Some(name) => name.to_string(),
            None => self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "template.xlsx".to_string()),
        };
        Ok(Download {
            bytes,
            content_type: XLSX_CONTENT_TYPE,
            content_disposition: format!(
                "attachment; filename*=UTF-8''{}",
                urlencoding::encode(&name)
            ),
            cache_control: "max-age=0",
        })
    }

    fn names(&mut self) -> Result<&[String], TemplateError> {
        if self.names.is_none() {
            self.names = Some(workbook::sheet_names(&mut self.zip)?);
        }
        Ok(self.names.as_deref().unwrap_or_default())
    }

    /// Resolve a sheet argument to its 1-based position
    fn sheet_no(&mut self, sheet: &SheetRef) -> Result<usize, TemplateError> {
        let names = self.names()?;
        match sheet {
            SheetRef::No(no) if (1..=names.len()).contains(no) => Ok(*no),
            SheetRef::No(no) => Err(TemplateError::SheetNotFound(no.to_string())),
            SheetRef::Name(name) => names
                .iter()
                .position(|n| n == name)
                .map(|i| i + 1)
                .ok_or_else(|| TemplateError::SheetNotFound(name.clone())),
        }
    }

    fn ensure_strings(&mut self) -> Result<(), TemplateError> {
        if !self.strings.is_loaded() {
            self.strings.load(&mut self.zip)?;
        }
        Ok(())
    }

    fn locate(
        &mut self,
        sheet: &SheetRef,
        column: &ColumnRef,
        row: &RowRef,
    ) -> Result<Option<RawCell>, TemplateError> {
        let no = self.sheet_no(sheet)?;
        self.ensure_strings()?;
        let part = sheet_part(no);
        let xml = match xml_reader(&mut self.zip, &part) {
            None => return Err(TemplateError::PartMissing(part)),
            Some(x) => x?,
        };
        let mut raw = RawRows::new(xml);
        rows::find_cell(&mut raw, column.index(), row.number()?)
    }
}

/// Worksheet parts are stored by 1-based sheet position
fn sheet_part(no: usize) -> String {
    format!("xl/worksheets/sheet{no}.xml")
}
