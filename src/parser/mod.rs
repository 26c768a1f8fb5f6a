//! XLSX spreadsheet adapter.
//!
//! Opens the ZIP package, reads the workbook-level parts once, then parses the requested worksheet
//! and cuts the requested window out of it as a [`TableModel`]. Formulas are never evaluated; the
//! cached value stored in the file is used.

mod relationships;
mod styles;
mod worksheet;

use log::debug;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::cell_ref::{split_sheet_qualified, CellRange};
use crate::error::{Result, TableLinkError};
use crate::layout::POINTS_TO_MM;
use crate::source::{SourceInspector, TableReader};
use crate::types::{CellStyle, ColumnSpec, MergeInfo, TableCell, TableModel, TableRow, TableStyle};

use relationships::{
    parse_shared_strings, parse_workbook_info, parse_workbook_relationships, WorkbookInfo,
};
use styles::{parse_styles, StyleTable};
use worksheet::{parse_sheet, SheetData};

/// Millimeters per character of Excel column width.
pub const COLUMN_CHAR_WIDTH_MM: f64 = 2.2;

/// Largest window read in one go.
pub const MAX_TABLE_CELLS: u64 = 1_000_000;

/// Reads tables from `.xlsx` files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxSource;

impl XlsxSource {
    pub fn new() -> Self {
        Self
    }
}

impl TableReader for XlsxSource {
    fn read_table(&self, path: &Path, sheet: &str, range_or_name: &str) -> Result<TableModel> {
        let mut workbook = Workbook::open(path)?;
        let (sheet_name, range) = workbook.resolve_range(sheet, range_or_name)?;
        let data = workbook.load_sheet(&sheet_name)?;
        let range = narrow_if_named(&data, range);
        let model = extract_table(&data, &workbook.styles, range.range)?;
        debug!(
            "read {}x{} table from {} [{}!{}]",
            model.row_count(),
            model.column_count(),
            path.display(),
            sheet_name,
            range.range
        );
        Ok(model)
    }
}

impl SourceInspector for XlsxSource {
    fn list_sheet_names(&self, path: &Path) -> Result<Vec<String>> {
        let workbook = Workbook::open(path)?;
        Ok(workbook
            .info
            .sheets
            .iter()
            .map(|s| s.name.clone())
            .collect())
    }

    fn used_range_of(&self, path: &Path, sheet: &str) -> Result<Option<String>> {
        let mut workbook = Workbook::open(path)?;
        let data = workbook.load_sheet(sheet)?;
        Ok(data.used_range().map(|r| r.to_string()))
    }
}

/// A resolved window and whether it came from a defined name.
#[derive(Debug, Clone, Copy)]
struct ResolvedRange {
    range: CellRange,
    from_name: bool,
}

/// Defined names shrink to the part of the sheet that actually holds data.
fn narrow_if_named(data: &SheetData, resolved: ResolvedRange) -> ResolvedRange {
    if !resolved.from_name {
        return resolved;
    }
    match data.used_range().and_then(|used| used.intersect(&resolved.range)) {
        Some(range) => ResolvedRange { range, ..resolved },
        None => resolved,
    }
}

/// The workbook-level parts of an open package.
struct Workbook<R: Read + Seek> {
    archive: ZipArchive<R>,
    info: WorkbookInfo,
    shared_strings: Vec<String>,
    styles: StyleTable,
}

impl Workbook<BufReader<File>> {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            debug!("cannot open {}: {e}", path.display());
            TableLinkError::SourceUnavailable(PathBuf::from(path))
        })?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> Workbook<R> {
    fn from_reader(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let rels = parse_workbook_relationships(&mut archive);
        let info = parse_workbook_info(&mut archive, &rels.worksheets)?;
        let shared_strings = parse_shared_strings(&mut archive, rels.shared_strings.as_deref());
        let styles = match archive.by_name(rels.styles.as_deref().unwrap_or("xl/styles.xml")) {
            Ok(file) => parse_styles(BufReader::new(file))?,
            Err(_) => StyleTable::default(),
        };
        Ok(Self {
            archive,
            info,
            shared_strings,
            styles,
        })
    }

    /// Position and canonical name of `sheet`, matched case-insensitively.
    fn find_sheet(&self, sheet: &str) -> Result<(usize, String)> {
        let wanted = sheet.trim();
        self.info
            .sheets
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(wanted))
            .and_then(|i| self.info.sheets.get(i).map(|s| (i, s.name.clone())))
            .ok_or_else(|| TableLinkError::SheetNotFound(wanted.to_string()))
    }

    fn load_sheet(&mut self, sheet: &str) -> Result<SheetData> {
        let (index, _) = self.find_sheet(sheet)?;
        let path = self
            .info
            .sheets
            .get(index)
            .map(|s| s.path.clone())
            .ok_or_else(|| TableLinkError::SheetNotFound(sheet.to_string()))?;
        let file = self.archive.by_name(&path)?;
        parse_sheet(
            BufReader::new(file),
            &self.shared_strings,
            &self.styles,
            self.info.date1904,
        )
    }

    /// Resolve a literal range or a defined name to (sheet, window).
    ///
    /// A literal range may be sheet-qualified (`Data!B2:C9`). Defined names are looked up
    /// workbook-wide first, then among names scoped to `sheet`; a name pointing at another sheet
    /// reads from that sheet.
    fn resolve_range(&self, sheet: &str, spec: &str) -> Result<(String, ResolvedRange)> {
        let (sheet_index, default_sheet) = self.find_sheet(sheet)?;

        let (qualifier, bare) = split_sheet_qualified(spec);
        if let Some(range) = CellRange::parse(bare) {
            let sheet_name = match qualifier {
                Some(q) => self.find_sheet(&q)?.1,
                None => default_sheet,
            };
            return Ok((
                sheet_name,
                ResolvedRange {
                    range,
                    from_name: false,
                },
            ));
        }

        let wanted = spec.trim();
        let defined = self
            .info
            .defined_names
            .iter()
            .find(|d| d.local_sheet.is_none() && d.name.eq_ignore_ascii_case(wanted))
            .or_else(|| {
                self.info.defined_names.iter().find(|d| {
                    d.local_sheet == Some(sheet_index) && d.name.eq_ignore_ascii_case(wanted)
                })
            })
            .ok_or_else(|| TableLinkError::RangeNotFound(wanted.to_string()))?;

        // Multi-area names use their first area.
        let first_area = defined.formula.split(',').next().unwrap_or("");
        let (target_sheet, area) = split_sheet_qualified(first_area);
        let range = CellRange::parse(area)
            .ok_or_else(|| TableLinkError::RangeNotFound(wanted.to_string()))?;
        let sheet_name = match target_sheet {
            Some(target) => self.find_sheet(&target)?.1,
            None => default_sheet,
        };
        Ok((
            sheet_name,
            ResolvedRange {
                range,
                from_name: true,
            },
        ))
    }
}

/// Cut `range` out of a parsed sheet.
fn extract_table(data: &SheetData, styles: &StyleTable, range: CellRange) -> Result<TableModel> {
    let cell_count = u64::from(range.row_count()) * u64::from(range.col_count());
    if cell_count > MAX_TABLE_CELLS {
        return Err(TableLinkError::CellRef(format!(
            "range {range} spans {cell_count} cells (limit {MAX_TABLE_CELLS})"
        )));
    }

    let anchors: HashMap<(u32, u32), MergeInfo> = data
        .merges
        .iter()
        .filter(|m| range.contains(m.start_row, m.start_col))
        .map(|m| {
            (
                (m.start_row, m.start_col),
                MergeInfo {
                    row_span: m.row_count(),
                    column_span: m.col_count(),
                },
            )
        })
        .collect();

    let columns = (range.start_col..=range.end_col)
        .map(|c| ColumnSpec {
            width_mm: data.column_width_chars(c) * COLUMN_CHAR_WIDTH_MM,
        })
        .collect();

    let rows = (range.start_row..=range.end_row)
        .map(|r| TableRow {
            height_mm: data.row_height_points(r) * POINTS_TO_MM,
            cells: (range.start_col..=range.end_col)
                .map(|c| {
                    let raw = data.cells.get(&(r, c));
                    let format = styles.format(raw.map_or(0, |cell| cell.style));
                    TableCell {
                        value: raw.and_then(|cell| cell.value.clone()),
                        horizontal_alignment: format.horizontal,
                        vertical_alignment: format.vertical,
                        merge: anchors.get(&(r, c)).copied(),
                        style: CellStyle {
                            bold: format.bold,
                            italic: format.italic,
                            wrap_text: format.wrap,
                            font_size_points: format.font_size_points,
                        },
                    }
                })
                .collect(),
        })
        .collect();

    Ok(TableModel {
        columns,
        rows,
        style: TableStyle {
            default_font_size_points: None,
            font_family: styles
                .default_font_name
                .clone()
                .unwrap_or_else(|| TableStyle::default().font_family),
        },
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn package(parts: &[(&str, &str)]) -> Cursor<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        Cursor::new(zip.finish().unwrap().into_inner())
    }

    const WORKBOOK: &str = r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Data" sheetId="1" r:id="rId1"/><sheet name="Other" sheetId="2" r:id="rId2"/></sheets>
<definedNames>
  <definedName name="Block">Data!$A$1:$D$9</definedName>
  <definedName name="Local" localSheetId="1">Other!$B$2</definedName>
  <definedName name="Far">'Other'!$A$1:$A$2</definedName>
</definedNames>
</workbook>"#;

    const RELS: &str = r#"<Relationships>
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/other.xml"/>
</Relationships>"#;

    const SHEET1: &str = r#"<worksheet><sheetData>
<row r="1"><c r="A1"><v>1</v></c><c r="B1"><v>2</v></c></row>
<row r="2"><c r="A2"><v>3</v></c><c r="B2"><v>4</v></c></row>
</sheetData><mergeCells><mergeCell ref="A1:B1"/></mergeCells></worksheet>"#;

    const SHEET2: &str = r#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>x</t></is></c></row></sheetData></worksheet>"#;

    fn workbook() -> Workbook<Cursor<Vec<u8>>> {
        Workbook::from_reader(package(&[
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", RELS),
            ("xl/worksheets/sheet1.xml", SHEET1),
            ("xl/worksheets/other.xml", SHEET2),
        ]))
        .unwrap()
    }

    #[test]
    fn test_literal_range() {
        let wb = workbook();
        let (sheet, resolved) = wb.resolve_range("data", "$A$1:B2").unwrap();
        assert_eq!(sheet, "Data");
        assert!(!resolved.from_name);
        assert_eq!(resolved.range.to_string(), "A1:B2");
    }

    #[test]
    fn test_qualified_literal_range() {
        let wb = workbook();
        let (sheet, _) = wb.resolve_range("Data", "Other!A1").unwrap();
        assert_eq!(sheet, "Other");
    }

    #[test]
    fn test_defined_names() {
        let wb = workbook();
        let (sheet, resolved) = wb.resolve_range("Data", "block").unwrap();
        assert_eq!(sheet, "Data");
        assert!(resolved.from_name);
        assert_eq!(resolved.range.to_string(), "A1:D9");

        let (sheet, _) = wb.resolve_range("Data", "Far").unwrap();
        assert_eq!(sheet, "Other");

        // Sheet-scoped names only resolve from their own sheet.
        assert!(matches!(
            wb.resolve_range("Data", "Local"),
            Err(TableLinkError::RangeNotFound(_))
        ));
        assert!(wb.resolve_range("Other", "Local").is_ok());
    }

    #[test]
    fn test_unknown_sheet_and_range() {
        let wb = workbook();
        assert!(matches!(
            wb.resolve_range("Missing", "A1"),
            Err(TableLinkError::SheetNotFound(_))
        ));
        assert!(matches!(
            wb.resolve_range("Data", "NoSuchName"),
            Err(TableLinkError::RangeNotFound(_))
        ));
    }

    #[test]
    fn test_named_range_narrowed_to_used() {
        let mut wb = workbook();
        let (sheet, resolved) = wb.resolve_range("Data", "Block").unwrap();
        let data = wb.load_sheet(&sheet).unwrap();
        let narrowed = narrow_if_named(&data, resolved);
        assert_eq!(narrowed.range.to_string(), "A1:B2");
    }

    #[test]
    fn test_extract_table() {
        let mut wb = workbook();
        let data = wb.load_sheet("Data").unwrap();
        let model = extract_table(&data, &wb.styles, CellRange::new(0, 0, 2, 1)).unwrap();
        assert_eq!(model.column_count(), 2);
        assert_eq!(model.row_count(), 3);
        assert!((model.columns[0].width_mm - 8.43 * 2.2).abs() < 1e-9);
        assert!((model.rows[0].height_mm - 15.0 * 25.4 / 72.0).abs() < 1e-9);
        assert_eq!(model.rows[1].cells[1].display_text(), "4");
        assert_eq!(model.rows[2].cells[0].value, None);
        assert_eq!(
            model.rows[0].cells[0].merge,
            Some(MergeInfo {
                row_span: 1,
                column_span: 2
            })
        );
    }

    #[test]
    fn test_oversized_range_rejected() {
        let mut wb = workbook();
        let data = wb.load_sheet("Data").unwrap();
        let huge = CellRange::parse("A1:Z1048576").unwrap();
        assert!(matches!(
            extract_table(&data, &wb.styles, huge),
            Err(TableLinkError::CellRef(_))
        ));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = XlsxSource::new()
            .read_table(Path::new("/nonexistent/book.xlsx"), "Data", "A1")
            .unwrap_err();
        assert!(matches!(err, TableLinkError::SourceUnavailable(_)));
    }
}
