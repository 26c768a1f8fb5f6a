//! Utilities for parsing and formatting Excel-style cell references and ranges.

use std::fmt;

/// Largest column index Excel addresses (`XFD`), 0-indexed.
pub const MAX_COL: u32 = 16_383;

/// Largest row index Excel addresses, 0-indexed.
pub const MAX_ROW: u32 = 1_048_575;

/// Parse a cell reference like "A1" or "$B$7" into (col, row) where col and row are 0-indexed.
///
/// Letters must precede digits and the reference must lie inside the sheet grid, so defined
/// names such as `Sales2024` are not mistaken for cells.
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    parse_cell_ref_bytes(cell_ref.trim().as_bytes())
}

/// Parse a cell reference from raw bytes (ASCII) into (col, row) where col and row are 0-indexed.
///
/// This is the bytes equivalent of [`parse_cell_ref`] for use when working with
/// raw XML attribute values (e.g., `attr.value` from quick-xml).
pub fn parse_cell_ref_bytes(ref_bytes: &[u8]) -> Option<(u32, u32)> {
    let mut col: u32 = 0;
    let mut row: u32 = 0;
    let mut col_len = 0usize;
    let mut row_len = 0usize;

    for &b in ref_bytes {
        if b == b'$' {
            if row_len > 0 {
                return None;
            }
            continue;
        }
        if b.is_ascii_alphabetic() {
            if row_len > 0 || col_len >= 3 {
                return None;
            }
            let upper = b.to_ascii_uppercase();
            col = col * 26 + (u32::from(upper - b'A') + 1);
            col_len += 1;
        } else if b.is_ascii_digit() {
            if col_len == 0 || row_len >= 7 {
                return None;
            }
            row = row * 10 + u32::from(b - b'0');
            row_len += 1;
        } else {
            return None;
        }
    }

    if col_len == 0 || row_len == 0 || row == 0 {
        return None;
    }

    let (col, row) = (col - 1, row - 1);
    if col > MAX_COL || row > MAX_ROW {
        return None;
    }
    Some((col, row))
}

/// Convert a 0-indexed column to its letters ("A", "Z", "AA", ...).
pub fn column_name(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + u8::try_from(rem).unwrap_or(0)));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Format a 0-indexed (col, row) pair as a relative A1 reference.
pub fn format_cell_ref(col: u32, row: u32) -> String {
    format!("{}{}", column_name(col), row + 1)
}

/// An inclusive rectangular block of cells, 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl CellRange {
    /// Build a range from two corners in any order.
    pub fn new(row_a: u32, col_a: u32, row_b: u32, col_b: u32) -> Self {
        Self {
            start_row: row_a.min(row_b),
            start_col: col_a.min(col_b),
            end_row: row_a.max(row_b),
            end_col: col_a.max(col_b),
        }
    }

    /// Parse "A1:C3", "$A$1:$C$3" or a single cell "B2".
    pub fn parse(range: &str) -> Option<Self> {
        let range = range.trim();
        if let Some((start, end)) = range.split_once(':') {
            let (start_col, start_row) = parse_cell_ref(start)?;
            let (end_col, end_row) = parse_cell_ref(end)?;
            Some(Self::new(start_row, start_col, end_row, end_col))
        } else {
            let (col, row) = parse_cell_ref(range)?;
            Some(Self::new(row, col, row, col))
        }
    }

    pub fn row_count(&self) -> u32 {
        self.end_row - self.start_row + 1
    }

    pub fn col_count(&self) -> u32 {
        self.end_col - self.start_col + 1
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.start_row..=self.end_row).contains(&row)
            && (self.start_col..=self.end_col).contains(&col)
    }

    /// Overlapping part of two ranges, if any.
    pub fn intersect(&self, other: &CellRange) -> Option<CellRange> {
        let start_row = self.start_row.max(other.start_row);
        let start_col = self.start_col.max(other.start_col);
        let end_row = self.end_row.min(other.end_row);
        let end_col = self.end_col.min(other.end_col);
        if start_row > end_row || start_col > end_col {
            return None;
        }
        Some(CellRange {
            start_row,
            start_col,
            end_row,
            end_col,
        })
    }

    /// Grow the range so it also covers (row, col).
    pub fn include(&mut self, row: u32, col: u32) {
        self.start_row = self.start_row.min(row);
        self.start_col = self.start_col.min(col);
        self.end_row = self.end_row.max(row);
        self.end_col = self.end_col.max(col);
    }
}

impl fmt::Display for CellRange {
    /// Always written as `first:last`, even for a single cell.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            format_cell_ref(self.start_col, self.start_row),
            format_cell_ref(self.end_col, self.end_row)
        )
    }
}

/// Split a defined-name formula like `'My Sheet'!$A$1:$C$3` into (sheet, range).
pub fn split_sheet_qualified(formula: &str) -> (Option<String>, &str) {
    let formula = formula.trim().trim_start_matches('=');
    match formula.rfind('!') {
        Some(pos) => {
            let sheet = formula.get(..pos).unwrap_or("");
            let range = formula.get(pos + 1..).unwrap_or("");
            let sheet = sheet
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .map_or_else(|| sheet.to_string(), |s| s.replace("''", "'"));
            (Some(sheet), range)
        }
        None => (None, formula),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_ref() {
        assert_eq!(parse_cell_ref("A1"), Some((0, 0)));
        assert_eq!(parse_cell_ref("$C$12"), Some((2, 11)));
        assert_eq!(parse_cell_ref("aa3"), Some((26, 2)));
        assert_eq!(parse_cell_ref("XFD1048576"), Some((MAX_COL, MAX_ROW)));
    }

    #[test]
    fn test_parse_cell_ref_rejects_names() {
        assert_eq!(parse_cell_ref("Sales2024"), None);
        assert_eq!(parse_cell_ref("1A"), None);
        assert_eq!(parse_cell_ref("A0"), None);
        assert_eq!(parse_cell_ref("Totals"), None);
        assert_eq!(parse_cell_ref(""), None);
    }

    #[test]
    fn test_column_name() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
    }

    #[test]
    fn test_range_parse_and_display() {
        let range = CellRange::parse("$C$3:A1").unwrap();
        assert_eq!(range, CellRange::new(0, 0, 2, 2));
        assert_eq!(range.to_string(), "A1:C3");
        assert_eq!(CellRange::parse("B2").unwrap().to_string(), "B2:B2");
        assert!(CellRange::parse("A1:Nope").is_none());
    }

    #[test]
    fn test_range_intersect() {
        let a = CellRange::parse("A1:C3").unwrap();
        let b = CellRange::parse("B2:D9").unwrap();
        assert_eq!(a.intersect(&b).unwrap().to_string(), "B2:C3");
        let c = CellRange::parse("E5:F6").unwrap();
        assert!(a.intersect(&c).is_none());
    }

    #[test]
    fn test_split_sheet_qualified() {
        assert_eq!(
            split_sheet_qualified("Sheet1!$A$1:$B$2"),
            (Some("Sheet1".to_string()), "$A$1:$B$2")
        );
        assert_eq!(
            split_sheet_qualified("'Bob''s Data'!A1"),
            (Some("Bob's Data".to_string()), "A1")
        );
        assert_eq!(split_sheet_qualified("A1:B2"), (None, "A1:B2"));
    }
}
