//! Translation between zero-based coordinates and the `"C5"` style cell references
use crate::errors::TemplateError;
use std::borrow::Cow;

/// Zero-based column position inside a row
pub type Col = usize;
/// One-based row number as it appears in cell references
pub type Row = u32;

pub(crate) const MAX_COLUMNS: usize = 16_384;
pub(crate) const MAX_ROWS: u32 = 1_048_576;
pub(crate) const MAX_STRING_LEN: usize = 32_767;

/// Convert a zero-based column index to its bijective base-26 letter name,
/// `0 -> "A"`, `25 -> "Z"`, `26 -> "AA"`
pub(crate) fn column_name(index: Col) -> String {
    let mut name = String::new();
    let mut number = index + 1;
    while number > 0 {
        // Adjust for 0-based indexing
        number -= 1;
        name.insert(0, (b'A' + (number % 26) as u8) as char);
        number /= 26;
    }
    name
}

/// Parse the leading run of uppercase letters of a cell reference back into
/// a zero-based column index
pub(crate) fn column_index(name: &str) -> Col {
    let mut index = 0;
    for c in name.chars().take_while(char::is_ascii_uppercase) {
        index = index * 26 + (c as usize - 'A' as usize + 1);
    }
    index.saturating_sub(1)
}

/// Split a reference like `"C5"` into its zero-based column index and 1-based row number
pub(crate) fn split_reference(reference: &str) -> Result<(Col, Row), TemplateError> {
    let pos = reference
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(reference.len());
    let (letters, digits) = reference.split_at(pos);
    Ok((column_index(letters), digits.parse()?))
}

/// A sheet argument, either its 1-based position or its declared display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetRef {
    No(usize),
    Name(String),
}

/// A column argument, either a zero-based index or a letter name like `"C"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Index(Col),
    Name(String),
}

impl ColumnRef {
    pub(crate) fn index(&self) -> Col {
        match self {
            ColumnRef::Index(index) => *index,
            ColumnRef::Name(name) => column_index(name),
        }
    }
}

/// A row argument, either a zero-based index or a string that already carries
/// the 1-based row number
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRef {
    Index(usize),
    Name(String),
}

impl RowRef {
    pub(crate) fn number(&self) -> Result<Row, TemplateError> {
        match self {
            RowRef::Index(index) => Ok(*index as Row + 1),
            RowRef::Name(name) => Ok(name.trim().parse()?),
        }
    }
}

macro_rules! ref_from_int_impl {
    ($target:ident, $variant:ident, $($t:ty)*) => ($(
        impl From<$t> for $target {
            fn from(v: $t) -> Self {
                $target::$variant(v as usize)
            }
        }
    )*)
}
ref_from_int_impl!(SheetRef, No, usize u8 u16 u32 u64 i8 i16 i32 i64);
ref_from_int_impl!(ColumnRef, Index, usize u8 u16 u32 u64 i8 i16 i32 i64);
ref_from_int_impl!(RowRef, Index, usize u8 u16 u32 u64 i8 i16 i32 i64);

macro_rules! ref_from_str_impl {
    ($target:ident, $($t:ty)*) => ($(
        impl From<$t> for $target {
            fn from(v: $t) -> Self {
                $target::Name(v.into())
            }
        }
    )*)
}
ref_from_str_impl!(SheetRef, &str String Cow<'_, str>);
ref_from_str_impl!(ColumnRef, &str String Cow<'_, str>);
ref_from_str_impl!(RowRef, &str String Cow<'_, str>);
