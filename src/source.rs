//! Spreadsheet adapter seams.
//!
//! The updater only talks to these traits; [`XlsxSource`](crate::parser::XlsxSource) is the
//! bundled implementation.

use std::path::{Path, PathBuf};

use crate::error::{Result, TableLinkError};
use crate::types::TableModel;

/// Reads a rectangular table out of a workbook.
pub trait TableReader {
    /// Read `range_or_name` (an A1 range such as `B2:D9`, or a defined name) from `sheet`.
    ///
    /// # Errors
    /// `SourceUnavailable` when the file cannot be opened, `SheetNotFound` for an unknown sheet and
    /// `RangeNotFound` when neither a literal range nor a defined name resolves.
    fn read_table(&self, path: &Path, sheet: &str, range_or_name: &str) -> Result<TableModel>;
}

/// Workbook introspection used by the insert flow and the extend-range policy.
pub trait SourceInspector {
    fn list_sheet_names(&self, path: &Path) -> Result<Vec<String>>;

    /// Smallest range covering every non-empty cell, as `A1:C3`; `None` for an empty sheet.
    fn used_range_of(&self, path: &Path, sheet: &str) -> Result<Option<String>>;
}

/// A `path|sheet|range` link target, as typed into the relink command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub path: PathBuf,
    pub sheet: String,
    pub range: String,
}

/// Parse `path|sheet|range`.
///
/// Quotes around the path are dropped and any further `|` belongs to the range part.
///
/// # Errors
/// `InvalidLinkSpec` when a part is missing or blank.
pub fn parse_link_spec(input: &str) -> Result<LinkSpec> {
    let invalid = || TableLinkError::InvalidLinkSpec(input.to_string());
    let mut parts = input.splitn(3, '|');
    let path = parts.next().map(|p| p.trim().trim_matches('"').trim()).unwrap_or("");
    let sheet = parts.next().map(str::trim).unwrap_or("");
    let range = parts.next().map(str::trim).unwrap_or("");
    if path.is_empty() || sheet.is_empty() || range.is_empty() {
        return Err(invalid());
    }
    Ok(LinkSpec {
        path: PathBuf::from(path),
        sheet: sheet.to_string(),
        range: range.to_string(),
    })
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
    use test_case::test_case;

    #[test]
    fn test_parse_link_spec() {
        let spec = parse_link_spec(r#""C:\data\book.xlsx"|Sheet1|A1:C9"#).unwrap();
        assert_eq!(spec.path, PathBuf::from(r"C:\data\book.xlsx"));
        assert_eq!(spec.sheet, "Sheet1");
        assert_eq!(spec.range, "A1:C9");
    }

    #[test]
    fn test_extra_separators_stay_in_range() {
        let spec = parse_link_spec("/tmp/a.xlsx | Data | odd|name").unwrap();
        assert_eq!(spec.sheet, "Data");
        assert_eq!(spec.range, "odd|name");
    }

    #[test_case("" ; "empty")]
    #[test_case("/tmp/a.xlsx" ; "path only")]
    #[test_case("/tmp/a.xlsx|Data" ; "no range")]
    #[test_case("/tmp/a.xlsx||A1" ; "blank sheet")]
    #[test_case("\"\"|Data|A1" ; "quoted empty path")]
    fn test_invalid_link_spec(input: &str) {
        assert!(matches!(
            parse_link_spec(input),
            Err(TableLinkError::InvalidLinkSpec(_))
        ));
    }
}
