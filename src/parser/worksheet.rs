//! Worksheet parsing: cell values, column widths, row heights and merged regions.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::BufRead;

use crate::cell_ref::{parse_cell_ref_bytes, CellRange};
use crate::error::Result;
use crate::types::CellValue;

use super::styles::StyleTable;

/// Column width, in characters, when neither `<col>` nor `sheetFormatPr` says otherwise.
pub(super) const DEFAULT_COLUMN_WIDTH_CHARS: f64 = 8.43;

/// Row height, in points, when neither `<row ht>` nor `sheetFormatPr` says otherwise.
pub(super) const DEFAULT_ROW_HEIGHT_POINTS: f64 = 15.0;

/// Days between the 1900 and 1904 date systems.
const DATE_1904_OFFSET: f64 = 1462.0;

#[derive(Debug, Clone, PartialEq)]
pub(super) struct RawCell {
    pub value: Option<CellValue>,
    pub style: u32,
}

/// A `<col min max width>` span, 0-indexed and inclusive.
#[derive(Debug, Clone, Copy)]
struct ColumnWidth {
    min: u32,
    max: u32,
    width: f64,
}

/// Everything read from one worksheet part.
#[derive(Debug, Default)]
pub(super) struct SheetData {
    /// Keyed by (row, col), 0-indexed.
    pub cells: HashMap<(u32, u32), RawCell>,
    pub merges: Vec<CellRange>,
    columns: Vec<ColumnWidth>,
    row_heights: HashMap<u32, f64>,
    default_col_width: Option<f64>,
    default_row_height: Option<f64>,
}

impl SheetData {
    pub fn column_width_chars(&self, col: u32) -> f64 {
        self.columns
            .iter()
            .find(|c| (c.min..=c.max).contains(&col))
            .map(|c| c.width)
            .or(self.default_col_width)
            .unwrap_or(DEFAULT_COLUMN_WIDTH_CHARS)
    }

    pub fn row_height_points(&self, row: u32) -> f64 {
        self.row_heights
            .get(&row)
            .copied()
            .or(self.default_row_height)
            .unwrap_or(DEFAULT_ROW_HEIGHT_POINTS)
    }

    /// Smallest range holding every cell with a non-empty value.
    pub fn used_range(&self) -> Option<CellRange> {
        let mut used: Option<CellRange> = None;
        for (&(row, col), cell) in &self.cells {
            let has_value = match &cell.value {
                None => false,
                Some(CellValue::Text(s)) => !s.is_empty(),
                Some(_) => true,
            };
            if !has_value {
                continue;
            }
            match used.as_mut() {
                Some(range) => range.include(row, col),
                None => used = Some(CellRange::new(row, col, row, col)),
            }
        }
        used
    }
}

fn attr_str(value: &[u8]) -> &str {
    std::str::from_utf8(value).unwrap_or("")
}

fn parse_u32_bytes(value: &[u8]) -> Option<u32> {
    attr_str(value).parse().ok()
}

/// A `<c>` whose children are still being read.
struct PendingCell {
    row: u32,
    col: u32,
    tag: CellTypeTag,
    style: u32,
    text: Option<String>,
}

#[derive(Clone, Copy)]
enum CellTypeTag {
    Shared,
    Inline,
    Str,
    Bool,
    Error,
    Default,
}

fn parse_cell_type_tag(value: &[u8]) -> CellTypeTag {
    match value {
        b"s" => CellTypeTag::Shared,
        b"b" => CellTypeTag::Bool,
        b"e" => CellTypeTag::Error,
        b"str" => CellTypeTag::Str,
        b"inlineStr" => CellTypeTag::Inline,
        _ => CellTypeTag::Default,
    }
}

fn start_cell(e: &BytesStart<'_>, current_row: u32, next_col: u32) -> PendingCell {
    let mut cell = PendingCell {
        row: current_row,
        col: next_col,
        tag: CellTypeTag::Default,
        style: 0,
        text: None,
    };
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"r" => {
                if let Some((col, row)) = parse_cell_ref_bytes(&attr.value) {
                    cell.col = col;
                    cell.row = row;
                }
            }
            b"t" => cell.tag = parse_cell_type_tag(&attr.value),
            b"s" => cell.style = parse_u32_bytes(&attr.value).unwrap_or(0),
            _ => {}
        }
    }
    cell
}

fn cell_value(
    pending: &PendingCell,
    shared_strings: &[String],
    styles: &StyleTable,
    date1904: bool,
) -> Option<CellValue> {
    let text = pending.text.as_deref()?;
    let value = match pending.tag {
        CellTypeTag::Shared => {
            let idx: usize = text.trim().parse().ok()?;
            CellValue::Text(shared_strings.get(idx)?.clone())
        }
        CellTypeTag::Inline | CellTypeTag::Str | CellTypeTag::Error => {
            CellValue::Text(text.to_string())
        }
        CellTypeTag::Bool => CellValue::Bool(text.trim() == "1" || text.trim() == "true"),
        CellTypeTag::Default => match text.trim().parse::<f64>() {
            Ok(n) if styles.format(pending.style).is_date => {
                CellValue::Date(if date1904 { n + DATE_1904_OFFSET } else { n })
            }
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::Text(text.to_string()),
        },
    };
    Some(value)
}

/// Parse one worksheet part.
#[allow(clippy::too_many_lines)]
pub(super) fn parse_sheet<R: BufRead>(
    reader: R,
    shared_strings: &[String],
    styles: &StyleTable,
    date1904: bool,
) -> Result<SheetData> {
    let mut xml = Reader::from_reader(reader);
    xml.trim_text(false);

    let mut sheet = SheetData::default();
    let mut buf = Vec::new();
    let mut current_row: u32 = 0;
    let mut next_col: u32 = 0;
    let mut pending: Option<PendingCell> = None;
    let mut in_value = false;
    let mut in_inline = false;
    let mut in_inline_text = false;
    let mut in_phonetic = false;

    loop {
        match xml.read_event_into(&mut buf)? {
            ref event @ (Event::Start(ref e) | Event::Empty(ref e)) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"sheetFormatPr" => {
                        for attr in e.attributes().flatten() {
                            let parsed = attr_str(&attr.value).parse::<f64>().ok();
                            match attr.key.as_ref() {
                                b"defaultColWidth" => sheet.default_col_width = parsed,
                                b"defaultRowHeight" => sheet.default_row_height = parsed,
                                _ => {}
                            }
                        }
                    }
                    b"col" => {
                        let mut min = None;
                        let mut max = None;
                        let mut width = None;
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"min" => min = parse_u32_bytes(&attr.value),
                                b"max" => max = parse_u32_bytes(&attr.value),
                                b"width" => width = attr_str(&attr.value).parse::<f64>().ok(),
                                _ => {}
                            }
                        }
                        if let (Some(min), Some(max), Some(width)) = (min, max, width) {
                            sheet.columns.push(ColumnWidth {
                                min: min.saturating_sub(1),
                                max: max.saturating_sub(1),
                                width,
                            });
                        }
                    }
                    b"row" => {
                        let mut height = None;
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"r" => {
                                    if let Some(r) = parse_u32_bytes(&attr.value) {
                                        current_row = r.saturating_sub(1);
                                    }
                                }
                                b"ht" => height = attr_str(&attr.value).parse::<f64>().ok(),
                                _ => {}
                            }
                        }
                        if let Some(ht) = height {
                            sheet.row_heights.insert(current_row, ht);
                        }
                        next_col = 0;
                    }
                    b"c" => {
                        let cell = start_cell(e, current_row, next_col);
                        next_col = cell.col.saturating_add(1);
                        if is_empty {
                            sheet.cells.insert(
                                (cell.row, cell.col),
                                RawCell {
                                    value: None,
                                    style: cell.style,
                                },
                            );
                        } else {
                            pending = Some(cell);
                        }
                    }
                    b"v" if pending.is_some() && !is_empty => in_value = true,
                    b"is" if pending.is_some() && !is_empty => in_inline = true,
                    b"rPh" if in_inline && !is_empty => in_phonetic = true,
                    b"t" if in_inline && !in_phonetic && !is_empty => in_inline_text = true,
                    b"mergeCell" => {
                        let range = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.as_ref() == b"ref")
                            .and_then(|a| CellRange::parse(attr_str(&a.value)));
                        if let Some(range) = range {
                            sheet.merges.push(range);
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(ref t) if in_value || in_inline_text => {
                if let Some(cell) = pending.as_mut() {
                    cell.text
                        .get_or_insert_with(String::new)
                        .push_str(&t.unescape()?);
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                b"rPh" => in_phonetic = false,
                b"is" => in_inline = false,
                b"c" => {
                    if let Some(cell) = pending.take() {
                        let value = cell_value(&cell, shared_strings, styles, date1904);
                        sheet.cells.insert(
                            (cell.row, cell.col),
                            RawCell {
                                value,
                                style: cell.style,
                            },
                        );
                    }
                }
                b"row" => current_row = current_row.saturating_add(1),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sheet)
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

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetFormatPr defaultRowHeight="12"/>
  <cols><col min="2" max="3" width="20" customWidth="1"/></cols>
  <sheetData>
    <row r="1" ht="30" customHeight="1">
      <c r="A1" t="s"><v>0</v></c>
      <c r="B1"><v>42</v></c>
      <c r="C1" t="b"><v>1</v></c>
    </row>
    <row r="3">
      <c r="A3" t="inlineStr"><is><t xml:space="preserve"> padded &amp; kept </t></is></c>
      <c r="B3" t="str"><f>A1&amp;"x"</f><v>hellox</v></c>
      <c r="D3" s="0"/>
      <c r="E3" t="e"><v>#DIV/0!</v></c>
    </row>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="A1:B2"/></mergeCells>
</worksheet>"#;

    fn parse() -> SheetData {
        let strings = vec!["Name".to_string()];
        parse_sheet(SHEET.as_bytes(), &strings, &StyleTable::default(), false).unwrap()
    }

    #[test]
    fn test_cell_values() {
        let sheet = parse();
        let value = |r, c| sheet.cells.get(&(r, c)).and_then(|cell| cell.value.clone());
        assert_eq!(value(0, 0), Some(CellValue::Text("Name".to_string())));
        assert_eq!(value(0, 1), Some(CellValue::Number(42.0)));
        assert_eq!(value(0, 2), Some(CellValue::Bool(true)));
        assert_eq!(
            value(2, 0),
            Some(CellValue::Text(" padded & kept ".to_string()))
        );
        assert_eq!(value(2, 1), Some(CellValue::Text("hellox".to_string())));
        assert_eq!(value(2, 3), None);
        assert_eq!(value(2, 4), Some(CellValue::Text("#DIV/0!".to_string())));
    }

    #[test]
    fn test_sizes() {
        let sheet = parse();
        assert_eq!(sheet.column_width_chars(0), DEFAULT_COLUMN_WIDTH_CHARS);
        assert_eq!(sheet.column_width_chars(1), 20.0);
        assert_eq!(sheet.column_width_chars(2), 20.0);
        assert_eq!(sheet.row_height_points(0), 30.0);
        assert_eq!(sheet.row_height_points(1), 12.0);
    }

    #[test]
    fn test_merges_and_used_range() {
        let sheet = parse();
        assert_eq!(sheet.merges, vec![CellRange::new(0, 0, 1, 1)]);
        assert_eq!(sheet.used_range().unwrap().to_string(), "A1:E3");
    }

    #[test]
    fn test_cells_without_reference() {
        let xml = r#"<worksheet><sheetData><row r="2"><c><v>1</v></c><c><v>2</v></c></row></sheetData></worksheet>"#;
        let sheet = parse_sheet(xml.as_bytes(), &[], &StyleTable::default(), false).unwrap();
        assert_eq!(
            sheet.cells[&(1, 1)].value,
            Some(CellValue::Number(2.0))
        );
    }

    #[test]
    fn test_empty_sheet_has_no_used_range() {
        let xml = r#"<worksheet><sheetData/></worksheet>"#;
        let sheet = parse_sheet(xml.as_bytes(), &[], &StyleTable::default(), false).unwrap();
        assert!(sheet.used_range().is_none());
    }
}
