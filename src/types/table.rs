use serde::{Deserialize, Serialize};

/// The rectangular dataset to render.
///
/// `columns` defines the column count; every row is expected to carry one cell per column, but
/// consumers must tolerate shorter rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableModel {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<TableRow>,
    #[serde(default)]
    pub style: TableStyle,
}

impl TableModel {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.rows.is_empty()
    }

    /// Cell at (row, col), if the row actually carries that many cells.
    pub fn cell(&self, row: usize, col: usize) -> Option<&TableCell> {
        self.rows.get(row).and_then(|r| r.cells.get(col))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    pub width_mm: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub height_mm: f64,
    pub cells: Vec<TableCell>,
}

/// Table-wide formatting defaults reported by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_font_size_points: Option<f64>,
    pub font_family: String,
}

impl Default for TableStyle {
    fn default() -> Self {
        Self {
            default_font_size_points: None,
            font_family: "Arial".to_string(),
        }
    }
}

/// One grid entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<CellValue>,
    pub horizontal_alignment: HAlign,
    pub vertical_alignment: VAlign,
    /// Present on the anchor (top-left) cell of a merged region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeInfo>,
    #[serde(default)]
    pub style: CellStyle,
}

impl TableCell {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: Some(CellValue::Text(value.into())),
            ..Self::default()
        }
    }

    pub fn number(value: f64) -> Self {
        Self {
            value: Some(CellValue::Number(value)),
            ..Self::default()
        }
    }

    pub fn data_type(&self) -> Option<CellDataType> {
        self.value.as_ref().map(CellValue::data_type)
    }

    /// The value as it is drawn; empty for absent values.
    pub fn display_text(&self) -> String {
        self.value
            .as_ref()
            .map(CellValue::to_display_string)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellDataType {
    Text,
    Number,
    Date,
    Bool,
}

/// A scalar cell value. Dates are kept as 1900-system serial numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Date(f64),
    Bool(bool),
}

impl CellValue {
    pub fn data_type(&self) -> CellDataType {
        match self {
            CellValue::Text(_) => CellDataType::Text,
            CellValue::Number(_) => CellDataType::Number,
            CellValue::Date(_) => CellDataType::Date,
            CellValue::Bool(_) => CellDataType::Bool,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Date(serial) => format_date_serial(*serial),
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

/// Format a 1900-system serial as `YYYY-MM-DD`, adding `THH:MM:SS` when there is a time part.
#[allow(clippy::cast_possible_truncation)]
fn format_date_serial(serial: f64) -> String {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return format_number(serial);
    }
    let total_seconds = (serial * 86_400.0).round() as i64;
    let days = total_seconds.div_euclid(86_400);
    let seconds = total_seconds.rem_euclid(86_400);
    // Serial 60 is the fictitious 1900-02-29; serials after it are shifted by one day.
    let days_since_epoch = if days > 60 { days - 1 } else { days };
    let (y, m, d) = civil_from_days(days_since_epoch - 25_568);
    if seconds == 0 {
        format!("{y:04}-{m:02}-{d:02}")
    } else {
        let (h, rem) = (seconds / 3600, seconds % 3600);
        format!("{y:04}-{m:02}-{d:02}T{h:02}:{:02}:{:02}", rem / 60, rem % 60)
    }
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VAlign {
    Top,
    #[default]
    Middle,
    Bottom,
}

/// Size of a merged region, stored on its anchor cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeInfo {
    pub row_span: u32,
    pub column_span: u32,
}

impl Default for MergeInfo {
    fn default() -> Self {
        Self {
            row_span: 1,
            column_span: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellStyle {
    pub bold: bool,
    pub italic: bool,
    pub wrap_text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size_points: Option<f64>,
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

    #[test]
    fn test_number_display() {
        assert_eq!(CellValue::Number(3.0).to_display_string(), "3");
        assert_eq!(CellValue::Number(-12.5).to_display_string(), "-12.5");
        assert_eq!(CellValue::Number(0.1).to_display_string(), "0.1");
    }

    #[test]
    fn test_date_display() {
        assert_eq!(CellValue::Date(1.0).to_display_string(), "1900-01-01");
        assert_eq!(CellValue::Date(59.0).to_display_string(), "1900-02-28");
        assert_eq!(CellValue::Date(61.0).to_display_string(), "1900-03-01");
        assert_eq!(CellValue::Date(45292.0).to_display_string(), "2024-01-01");
        assert_eq!(
            CellValue::Date(45292.5).to_display_string(),
            "2024-01-01T12:00:00"
        );
    }

    #[test]
    fn test_date_time_rounding_carries_into_next_day() {
        assert_eq!(CellValue::Date(45000.9999999).to_display_string(), "2023-03-16");
        assert_eq!(
            CellValue::Date(45000.99998).to_display_string(),
            "2023-03-15T23:59:58"
        );
    }

    #[test]
    fn test_bool_and_text_display() {
        assert_eq!(CellValue::Bool(true).to_display_string(), "TRUE");
        assert_eq!(TableCell::text("abc").display_text(), "abc");
        assert_eq!(TableCell::default().display_text(), "");
        assert_eq!(TableCell::number(2.0).data_type(), Some(CellDataType::Number));
    }
}
