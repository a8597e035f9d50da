//! The lazy pull cursor over one worksheet part
use crate::{
    coordinate::Col,
    errors::TemplateError,
    shared_strings::SharedStringTable,
    stream::rows::{DenseRows, RawRows},
};
use log::debug;
use quick_xml::Reader;
use std::{
    fs::File,
    io::{self, BufReader, Read},
};
use tempfile::NamedTempFile;

/// Forward-only, non-restartable cursor that owns a spooled copy of its
/// worksheet part, so pulls stay independent of the template archive. The
/// scratch file is removed when the cursor is dropped, on every exit path.
pub(crate) struct RowCursor {
    rows: DenseRows<BufReader<File>>,
    // Held only to keep the scratch file alive while rows are pulled
    _spool: NamedTempFile,
}

impl RowCursor {
    /// Spool one worksheet part to a scratch file and open a cursor at its start
    pub(crate) fn open<R: Read>(part: &mut R, columns: Vec<Col>) -> Result<Self, TemplateError> {
        let mut spool = NamedTempFile::new()?;
        io::copy(part, spool.as_file_mut())?;
        debug!("worksheet part spooled to {:?}", spool.path());
        let mut xml = Reader::from_reader(BufReader::new(spool.reopen()?));
        let config = xml.config_mut();
        config.check_end_names = false;
        config.trim_text(false);
        Ok(RowCursor {
            rows: DenseRows::new(RawRows::new(xml), columns),
            _spool: spool,
        })
    }

    /// One row unit per call, in ascending row order
    pub(crate) fn next_row(
        &mut self,
        table: &SharedStringTable,
    ) -> Result<Option<Vec<String>>, TemplateError> {
        self.rows.next_row(table)
    }
}
