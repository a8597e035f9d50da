//! Read-side behavior over hand-assembled template packages
mod common;

use common::{package, shared_strings};
use tempfile::TempDir;
use xltemplate_rs::{TemplateError, XlsxTemplate};

const DATA_SHEET: &str = r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1"><v>7</v></c></row><row r="2"><c r="B2"><f>C1*2</f><v>14</v></c><c r="C2"><v>1.5</v></c></row><row r="4"><c r="A4" t="s"><v>1</v></c></row>"#;
const NOTES_SHEET: &str = r#"<row r="1"><c r="A1"><v>9</v></c></row>"#;

fn data_template(dir: &TempDir) -> XlsxTemplate {
    let path = package(
        dir,
        "data.xlsx",
        &[("Data", DATA_SHEET), ("Notes", NOTES_SHEET)],
        Some(&shared_strings(&["hello", "tail_x000D_end"])),
    );
    XlsxTemplate::open(path).unwrap()
}

#[test]
fn sheet_names_follow_declaration_order() {
    let dir = TempDir::new().unwrap();
    let mut template = data_template(&dir);
    assert_eq!(template.sheet_names().unwrap(), ["Data", "Notes"]);
}

#[test]
fn get_accepts_position_or_name_coordinates() {
    let dir = TempDir::new().unwrap();
    let mut template = data_template(&dir);

    // 1-based sheet number, letter column, zero-based row index
    assert_eq!(template.get(1, "A", 0).unwrap().as_deref(), Some("hello"));
    // Sheet by name, column by index, row by 1-based string
    assert_eq!(template.get("Data", 2, "1").unwrap().as_deref(), Some("7"));
    assert_eq!(template.get(2, 0, 0).unwrap().as_deref(), Some("9"));
}

#[test]
fn absent_cell_is_none_not_an_error() {
    let dir = TempDir::new().unwrap();
    let mut template = data_template(&dir);

    // Cell missing from a present row
    assert_eq!(template.get(1, "B", 0).unwrap(), None);
    // Row missing entirely
    assert_eq!(template.get(1, "A", 2).unwrap(), None);
    // Row past the data
    assert_eq!(template.get(1, "A", 100).unwrap(), None);
}

#[test]
fn carriage_return_escape_is_stripped_on_resolve() {
    let dir = TempDir::new().unwrap();
    let mut template = data_template(&dir);
    assert_eq!(template.get(1, "A", 3).unwrap().as_deref(), Some("tailend"));
}

#[test]
fn get_formula_distinguishes_plain_and_absent_cells() {
    let dir = TempDir::new().unwrap();
    let mut template = data_template(&dir);

    assert_eq!(
        template.get_formula(1, "B", 1).unwrap().as_deref(),
        Some("C1*2")
    );
    // The formula cell's cached value is still readable as a value
    assert_eq!(template.get(1, "B", 1).unwrap().as_deref(), Some("14"));
    // A present cell without a formula is Some(""), an absent one None
    assert_eq!(template.get_formula(1, "C", 1).unwrap().as_deref(), Some(""));
    assert_eq!(template.get_formula(1, "D", 1).unwrap(), None);
}

#[test]
fn unresolvable_sheet_is_a_typed_error() {
    let dir = TempDir::new().unwrap();
    let mut template = data_template(&dir);

    assert!(matches!(
        template.get("Ghost", 0, 0),
        Err(TemplateError::SheetNotFound(_))
    ));
    assert!(matches!(
        template.get(3, 0, 0),
        Err(TemplateError::SheetNotFound(_))
    ));
    assert!(matches!(
        template.all(0, &[]),
        Err(TemplateError::SheetNotFound(_))
    ));
    assert!(matches!(
        template.set("Ghost", 0, 0, 1),
        Err(TemplateError::SheetNotFound(_))
    ));
}

#[test]
fn all_reconstructs_the_dense_grid() {
    let dir = TempDir::new().unwrap();
    let mut template = data_template(&dir);

    let rows = template.all("Data", &[]).unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0], vec!["hello".to_string(), String::new(), "7".into()]);
    assert_eq!(rows[1], vec![String::new(), "14".to_string(), "1.5".into()]);
    // Row 3 never appears in the XML and comes back as an empty unit
    assert!(rows[2].is_empty());
    assert_eq!(rows[3], vec!["tailend".to_string()]);
}

#[test]
fn all_honors_the_column_filter() {
    let dir = TempDir::new().unwrap();
    let mut template = data_template(&dir);

    let rows = template.all("Data", &[1, 2]).unwrap();
    assert_eq!(rows[0], vec![String::new(), "7".to_string()]);
    assert_eq!(rows[1], vec!["14".to_string(), "1.5".into()]);
}

#[test]
fn cursor_yields_the_same_rows_as_bulk() {
    let dir = TempDir::new().unwrap();
    let mut template = data_template(&dir);
    let bulk = template.all("Data", &[]).unwrap();

    template.open_rows("Data", &[]).unwrap();
    let mut streamed = Vec::new();
    while let Some(row) = template.next_row().unwrap() {
        streamed.push(row);
    }
    assert_eq!(streamed, bulk);

    // Exhaustion drops the cursor, further pulls stay None
    assert_eq!(template.next_row().unwrap(), None);
}

#[test]
fn cursor_on_a_missing_sheet_is_a_silent_no_op() {
    let dir = TempDir::new().unwrap();
    let mut template = data_template(&dir);

    template.open_rows("Ghost", &[]).unwrap();
    assert_eq!(template.next_row().unwrap(), None);
    template.close_rows();
    template.close_rows();
}

#[test]
fn reopening_the_cursor_restarts_the_sequence() {
    let dir = TempDir::new().unwrap();
    let mut template = data_template(&dir);

    template.open_rows("Data", &[]).unwrap();
    let first = template.next_row().unwrap().unwrap();
    template.open_rows("Data", &[]).unwrap();
    assert_eq!(template.next_row().unwrap().unwrap(), first);
    template.close_rows();
    assert_eq!(template.next_row().unwrap(), None);
}
