//! Reading tables out of XLSX workbooks.
//!
//! Covers cell value types, formatting that reaches the layout engine (alignment, weight, wrap,
//! font size), column and row sizing, merges, defined names and used ranges.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]

mod common;
mod fixtures;

use common::{assert_close, read, text_at, used_range};
use fixtures::{CellValue, SheetBuilder, StyleBuilder, XlsxBuilder};
use tablelink::parser::COLUMN_CHAR_WIDTH_MM;
use tablelink::{
    CellDataType, HAlign, MergeInfo, SourceInspector, TableLinkError, TableReader, VAlign,
    XlsxSource,
};
use test_case::test_case;

const PT_TO_MM: f64 = 25.4 / 72.0;

// ============================================================================
// VALUES
// ============================================================================

#[test]
fn test_value_types() {
    let dir = tempfile::tempdir().unwrap();
    let path = XlsxBuilder::new()
        .sheet(
            SheetBuilder::new("Data")
                .cell("A1", "shared", None)
                .cell("B1", 12.5, None)
                .cell("C1", true, None)
                .raw_cell("D1", CellValue::Error("#DIV/0!".to_string()))
                .raw_cell("E1", CellValue::InlineString("inline".to_string()))
                .raw_cell(
                    "F1",
                    CellValue::FormulaString("CONCAT(A1,\"!\")".to_string(), "shared!".to_string()),
                ),
        )
        .write_to(dir.path(), "values.xlsx");

    let model = read(&path, "Data", "A1:F1");
    assert_eq!(model.column_count(), 6);
    assert_eq!(text_at(&model, 0, 0), "shared");
    assert_eq!(text_at(&model, 0, 1), "12.5");
    assert_eq!(text_at(&model, 0, 2), "TRUE");
    assert_eq!(text_at(&model, 0, 3), "#DIV/0!");
    assert_eq!(text_at(&model, 0, 4), "inline");
    assert_eq!(text_at(&model, 0, 5), "shared!");

    let row = &model.rows[0].cells;
    assert_eq!(row[0].data_type(), Some(CellDataType::Text));
    assert_eq!(row[1].data_type(), Some(CellDataType::Number));
    assert_eq!(row[2].data_type(), Some(CellDataType::Bool));
}

#[test]
fn test_missing_cells_are_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = XlsxBuilder::new()
        .sheet(SheetBuilder::new("Data").cell("B2", 1, None))
        .write_to(dir.path(), "sparse.xlsx");

    let model = read(&path, "Data", "A1:C3");
    assert_eq!(model.row_count(), 3);
    assert_eq!(model.column_count(), 3);
    assert_eq!(text_at(&model, 1, 1), "1");
    assert!(model.rows[0].cells.iter().all(|c| c.value.is_none()));
    assert!(model.rows.iter().all(|r| r.cells.len() == 3));
}

#[test_case("m/d/yy", 45292.0, "2024-01-01" ; "builtin date")]
#[test_case("yyyy-mm-dd", 45292.0, "2024-01-01" ; "custom date")]
#[test_case("m/d/yy h:mm", 45292.25, "2024-01-01T06:00:00" ; "date time")]
#[test_case("0.00", 45292.0, "45292" ; "plain number")]
fn test_date_formats(format: &str, serial: f64, expected: &str) {
    let dir = tempfile::tempdir().unwrap();
    let path = XlsxBuilder::new()
        .sheet(SheetBuilder::new("Data").cell(
            "A1",
            serial,
            Some(StyleBuilder::new().number_format(format)),
        ))
        .write_to(dir.path(), "dates.xlsx");

    assert_eq!(text_at(&read(&path, "Data", "A1"), 0, 0), expected);
}

#[test]
fn test_date1904_serials_are_shifted() {
    let dir = tempfile::tempdir().unwrap();
    let path = XlsxBuilder::new()
        .date1904()
        .sheet(SheetBuilder::new("Data").cell(
            "A1",
            43830.0,
            Some(StyleBuilder::new().number_format("yyyy-mm-dd")),
        ))
        .write_to(dir.path(), "mac.xlsx");

    let model = read(&path, "Data", "A1");
    assert_eq!(model.rows[0].cells[0].data_type(), Some(CellDataType::Date));
    assert_eq!(text_at(&model, 0, 0), "2024-01-01");
}

// ============================================================================
// FORMATTING
// ============================================================================

#[test]
fn test_alignment_and_font() {
    let dir = tempfile::tempdir().unwrap();
    let path = XlsxBuilder::new()
        .sheet(
            SheetBuilder::new("Data")
                .cell(
                    "A1",
                    "Header",
                    Some(
                        StyleBuilder::new()
                            .bold()
                            .align_horizontal("center")
                            .align_vertical("top")
                            .wrap_text(),
                    ),
                )
                .cell(
                    "B1",
                    "Big",
                    Some(StyleBuilder::new().italic().font_size(18.0).align_horizontal("right")),
                )
                .cell("C1", "Plain", None)
                .cell(
                    "D1",
                    "Filled",
                    Some(StyleBuilder::new().align_horizontal("fill").align_vertical("bottom")),
                ),
        )
        .write_to(dir.path(), "styled.xlsx");

    let model = read(&path, "Data", "A1:D1");
    assert_eq!(model.style.font_family, "Calibri");
    let cells = &model.rows[0].cells;

    assert!(cells[0].style.bold);
    assert!(cells[0].style.wrap_text);
    assert_eq!(cells[0].horizontal_alignment, HAlign::Center);
    assert_eq!(cells[0].vertical_alignment, VAlign::Top);
    assert_eq!(cells[0].style.font_size_points, None);

    assert!(cells[1].style.italic);
    assert_eq!(cells[1].horizontal_alignment, HAlign::Right);
    assert_eq!(cells[1].style.font_size_points, Some(18.0));

    assert_eq!(cells[2].horizontal_alignment, HAlign::Left);
    assert_eq!(cells[2].vertical_alignment, VAlign::Middle);
    assert!(!cells[2].style.bold);

    assert_eq!(cells[3].horizontal_alignment, HAlign::Left);
    assert_eq!(cells[3].vertical_alignment, VAlign::Bottom);
}

#[test]
fn test_column_widths_and_row_heights() {
    let dir = tempfile::tempdir().unwrap();
    let path = XlsxBuilder::new()
        .sheet(
            SheetBuilder::new("Data")
                .cell("A1", "a", None)
                .cell("C2", "c", None)
                .col_width(2, 3, 20.0)
                .row_height(2, 30.0),
        )
        .write_to(dir.path(), "sizes.xlsx");

    let model = read(&path, "Data", "A1:C2");
    assert_close(model.columns[0].width_mm, 8.43 * COLUMN_CHAR_WIDTH_MM);
    assert_close(model.columns[1].width_mm, 20.0 * COLUMN_CHAR_WIDTH_MM);
    assert_close(model.columns[2].width_mm, 20.0 * COLUMN_CHAR_WIDTH_MM);
    assert_close(model.rows[0].height_mm, 15.0 * PT_TO_MM);
    assert_close(model.rows[1].height_mm, 30.0 * PT_TO_MM);
}

#[test]
fn test_sheet_default_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let path = XlsxBuilder::new()
        .sheet(
            SheetBuilder::new("Data")
                .cell("A1", "a", None)
                .default_col_width(12.0)
                .default_row_height(18.0),
        )
        .write_to(dir.path(), "defaults.xlsx");

    let model = read(&path, "Data", "A1:B2");
    assert_close(model.columns[1].width_mm, 12.0 * COLUMN_CHAR_WIDTH_MM);
    assert_close(model.rows[1].height_mm, 18.0 * PT_TO_MM);
}

#[test]
fn test_merge_anchor_inside_window() {
    let dir = tempfile::tempdir().unwrap();
    let path = XlsxBuilder::new()
        .sheet(
            SheetBuilder::new("Data")
                .cell("A1", "Title", None)
                .cell("A3", "x", None)
                .merge("A1:C2")
                .merge("E5:F6"),
        )
        .write_to(dir.path(), "merged.xlsx");

    let model = read(&path, "Data", "A1:C3");
    assert_eq!(
        model.rows[0].cells[0].merge,
        Some(MergeInfo {
            row_span: 2,
            column_span: 3
        })
    );
    let merges = model
        .rows
        .iter()
        .flat_map(|r| r.cells.iter())
        .filter(|c| c.merge.is_some())
        .count();
    assert_eq!(merges, 1);
}

// ============================================================================
// RANGES AND NAMES
// ============================================================================

fn named_workbook(dir: &std::path::Path) -> std::path::PathBuf {
    XlsxBuilder::new()
        .sheet(
            SheetBuilder::new("Summary")
                .cell("A1", "s1", None)
                .cell("B2", "s2", None),
        )
        .sheet(
            SheetBuilder::new("Detail Data")
                .cell("A1", "d1", None)
                .cell("B1", "d2", None)
                .cell("A2", "d3", None),
        )
        .defined_name("Everything", "'Detail Data'!$A$1:$Z$100")
        .defined_name("Corner", "Summary!$B$2")
        .local_name("Local", "'Detail Data'!$A$1:$A$2", 1)
        .write_to(dir, "names.xlsx")
}

#[test]
fn test_sheet_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = named_workbook(dir.path());
    assert_eq!(
        XlsxSource::new().list_sheet_names(&path).unwrap(),
        vec!["Summary", "Detail Data"]
    );
}

#[test]
fn test_named_range_reads_target_sheet_and_narrows() {
    let dir = tempfile::tempdir().unwrap();
    let path = named_workbook(dir.path());

    // The name points at another sheet and is cut down to that sheet's used range.
    let model = read(&path, "Summary", "everything");
    assert_eq!(model.row_count(), 2);
    assert_eq!(model.column_count(), 2);
    assert_eq!(text_at(&model, 0, 1), "d2");
    assert_eq!(text_at(&model, 1, 0), "d3");

    let corner = read(&path, "Summary", "Corner");
    assert_eq!(corner.row_count(), 1);
    assert_eq!(text_at(&corner, 0, 0), "s2");
}

#[test]
fn test_sheet_scoped_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = named_workbook(dir.path());

    let model = read(&path, "detail data", "Local");
    assert_eq!(model.row_count(), 2);
    assert_eq!(model.column_count(), 1);

    let err = XlsxSource::new()
        .read_table(&path, "Summary", "Local")
        .unwrap_err();
    assert!(matches!(err, TableLinkError::RangeNotFound(name) if name == "Local"));
}

#[test]
fn test_literal_range_is_not_narrowed() {
    let dir = tempfile::tempdir().unwrap();
    let path = named_workbook(dir.path());
    let model = read(&path, "Summary", "A1:D4");
    assert_eq!(model.row_count(), 4);
    assert_eq!(model.column_count(), 4);
}

#[test]
fn test_used_range() {
    let dir = tempfile::tempdir().unwrap();
    let path = XlsxBuilder::new()
        .sheet(
            SheetBuilder::new("Data")
                .cell("B2", "x", None)
                .cell("D5", 3, None)
                .styled_cell("H9", StyleBuilder::new().bold()),
        )
        .sheet(SheetBuilder::new("Empty"))
        .write_to(dir.path(), "used.xlsx");

    assert_eq!(used_range(&path, "Data").as_deref(), Some("B2:D5"));
    assert_eq!(used_range(&path, "Empty"), None);
}

// ============================================================================
// ERRORS
// ============================================================================

#[test]
fn test_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = named_workbook(dir.path());
    let source = XlsxSource::new();

    assert!(matches!(
        source.read_table(&path, "Nope", "A1"),
        Err(TableLinkError::SheetNotFound(_))
    ));
    assert!(matches!(
        source.read_table(&path, "Summary", "NotAName"),
        Err(TableLinkError::RangeNotFound(_))
    ));
    assert!(matches!(
        source.read_table(&dir.path().join("missing.xlsx"), "Summary", "A1"),
        Err(TableLinkError::SourceUnavailable(_))
    ));

    let junk = dir.path().join("junk.xlsx");
    std::fs::write(&junk, b"not a zip").unwrap();
    assert!(matches!(
        source.read_table(&junk, "Summary", "A1"),
        Err(TableLinkError::Zip(_))
    ));
}
