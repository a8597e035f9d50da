use thiserror::Error;

/// Hierarchy of the entire crate's error types
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The identifier resolved to no declared sheet
    #[error("sheet ({0}) does not exist in the workbook")]
    SheetNotFound(String),
    /// A part the workbook depends on is not in the package
    #[error("required part ({0}) is missing from the package")]
    PartMissing(String),
    #[error("excel columns can not exceed 16,384")]
    MaxColumnExceeded,
    #[error("excel rows can not exceed 1,048,576")]
    MaxRowExceeded,
    #[error("excel cell text can not exceed 32,767 characters")]
    MaxStringLengthExceeded,
    /// Stream reading has reached the end so more than likely enclosed tags are incorrect or missing
    #[error("malformed stream for tag: {0}")]
    XmlEof(String),

    /// The `std::io` error wrapper
    #[error(transparent)]
    StdErr(#[from] std::io::Error),
    /// The `std::num` int error wrapper
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),
    /// The `quick_xml` crate error wrapper
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    /// The `quick_xml::events::attributes` crate error wrapper
    #[error(transparent)]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
    /// The `zip` crate error wrapper
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}
