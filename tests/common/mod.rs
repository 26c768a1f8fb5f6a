//! Common test utilities and assertion helpers.
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]

use std::path::Path;

use tablelink::{
    LayoutOutput, LineSegment, SourceInspector, TableModel, TableReader, TextRun, XlsxSource,
};

// Re-export fixtures for convenience
pub use super::fixtures::*;

pub const EPS: f64 = 1e-9;

/// Read a table, panicking with the error on failure.
#[must_use]
pub fn read(path: &Path, sheet: &str, range: &str) -> TableModel {
    XlsxSource::new()
        .read_table(path, sheet, range)
        .unwrap_or_else(|e| panic!("read {sheet}!{range} failed: {e}"))
}

#[must_use]
pub fn used_range(path: &Path, sheet: &str) -> Option<String> {
    XlsxSource::new().used_range_of(path, sheet).unwrap()
}

/// Display text of the cell at (row, col).
#[must_use]
pub fn text_at(model: &TableModel, row: usize, col: usize) -> String {
    model
        .cell(row, col)
        .map(tablelink::TableCell::display_text)
        .unwrap_or_default()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

/// Find the text run with exactly `content`.
#[must_use]
pub fn text_run<'a>(output: &'a LayoutOutput, content: &str) -> &'a TextRun {
    output
        .texts
        .iter()
        .find(|t| t.content == content)
        .unwrap_or_else(|| panic!("no text run '{content}' in {:?}", output.texts))
}

#[must_use]
pub fn is_horizontal(line: &LineSegment) -> bool {
    (line.start.y - line.end.y).abs() < EPS
}
