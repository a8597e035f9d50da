//! The tagged value type fixed at the moment an edit is handed to `set`
use std::borrow::Cow;

/// A pending cell value, tagged once at the call site instead of sniffed on the
/// write path. `Number` keeps the caller's exact text form and is written with
/// no type attribute; `Text` goes through the shared string table and is written
/// as a string-typed cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Number(String),
    Text(String),
}

macro_rules! number_into_value_impl {
    ($($t:ty)*) => ($(
        impl From<$t> for CellValue {
            fn from(v: $t) -> Self {
                CellValue::Number(v.to_string())
            }
        }
    )*)
}
number_into_value_impl!(u8 u16 u32 u64 usize i8 i16 i32 i64 isize f32 f64);

macro_rules! text_into_value_impl {
    ($($t:ty)*) => ($(
        impl From<$t> for CellValue {
            fn from(v: $t) -> Self {
                CellValue::Text(v.into())
            }
        }
    )*)
}
text_into_value_impl!(&str String Cow<'_, str>);
