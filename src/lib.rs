//! An embeddable engine for reading and incrementally rewriting OOXML
//! spreadsheet templates.
//!
//! A template package is opened once and never modified in place. Reads
//! stream directly out of the archive entries; writes are buffered on the
//! [`XlsxTemplate`] facade and replayed over a fresh copy of the package by
//! [`XlsxTemplate::generate`], so everything the template carried that the
//! engine does not understand survives byte for byte.
//!
//! ```no_run
//! use xltemplate_rs::XlsxTemplate;
//!
//! # fn main() -> Result<(), xltemplate_rs::TemplateError> {
//! let mut template = XlsxTemplate::open("report.xlsx")?;
//! let heading = template.get("Summary", "A", 0)?.unwrap_or_default();
//! println!("filling out {heading}");
//! template
//!     .set(1, "C", 4, 3.14)?
//!     .set(1, "D", 4, "reviewed")?
//!     .rename_sheet(1, "Q3 Summary");
//! template.save("filled.xlsx")?;
//! # Ok(())
//! # }
//! ```
mod coordinate;
mod errors;
mod package;
mod shared_strings;
mod stream;
mod template;
mod value;
mod workbook;
mod worksheet;

pub use coordinate::{Col, ColumnRef, Row, RowRef, SheetRef};
pub use errors::TemplateError;
pub use template::{Download, XlsxTemplate};
pub use value::CellValue;
