//! Test fixtures for generating valid XLSX files in memory.
//!
//! # Example
//!
//! ```rust,ignore
//! use fixtures::{SheetBuilder, StyleBuilder, XlsxBuilder};
//!
//! let xlsx = XlsxBuilder::new()
//!     .sheet(
//!         SheetBuilder::new("Prices")
//!             .cell("A1", "Item", Some(StyleBuilder::new().bold().build()))
//!             .cell("B1", 42.0, None)
//!             .merge("A3:B3"),
//!     )
//!     .defined_name("Table", "Prices!$A$1:$B$3")
//!     .build();
//! ```
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic,
    clippy::cast_possible_truncation
)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::ZipWriter;

// ============================================================================
// Style Builder
// ============================================================================

/// Builder for cell formats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleBuilder {
    pub font_name: Option<String>,
    pub font_size: Option<f64>,
    pub bold: bool,
    pub italic: bool,
    pub align_horizontal: Option<String>,
    pub align_vertical: Option<String>,
    pub wrap_text: bool,
    pub number_format: Option<String>,
}

impl StyleBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn font_name(mut self, name: &str) -> Self {
        self.font_name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn font_size(mut self, size: f64) -> Self {
        self.font_size = Some(size);
        self
    }

    #[must_use]
    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    #[must_use]
    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    /// "left", "center", "right", ...
    #[must_use]
    pub fn align_horizontal(mut self, align: &str) -> Self {
        self.align_horizontal = Some(align.to_string());
        self
    }

    /// "top", "center", "bottom"
    #[must_use]
    pub fn align_vertical(mut self, align: &str) -> Self {
        self.align_vertical = Some(align.to_string());
        self
    }

    #[must_use]
    pub fn wrap_text(mut self) -> Self {
        self.wrap_text = true;
        self
    }

    #[must_use]
    pub fn number_format(mut self, format: &str) -> Self {
        self.number_format = Some(format.to_string());
        self
    }

    #[must_use]
    pub fn build(self) -> Self {
        self
    }
}

// ============================================================================
// Cell Values
// ============================================================================

/// A value as written into the sheet XML.
#[derive(Debug, Clone)]
pub enum CellValue {
    /// Shared string (`t="s"`).
    String(String),
    Number(f64),
    Boolean(bool),
    /// Error literal such as `#DIV/0!` (`t="e"`).
    Error(String),
    /// Inline string (`t="inlineStr"`).
    InlineString(String),
    /// Formula with its cached string result (`t="str"`).
    FormulaString(String, String),
    /// Style only.
    Empty,
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Number(f64::from(n))
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

// ============================================================================
// Sheet Builder
// ============================================================================

#[derive(Debug, Clone)]
pub struct CellEntry {
    pub cell_ref: String,
    pub value: CellValue,
    pub style: Option<StyleBuilder>,
}

/// Builder for a single worksheet.
#[derive(Debug, Clone, Default)]
pub struct SheetBuilder {
    pub name: String,
    pub cells: Vec<CellEntry>,
    pub merges: Vec<String>,
    pub col_widths: Vec<(u32, u32, f64)>,
    pub row_heights: Vec<(u32, f64)>,
    pub default_col_width: Option<f64>,
    pub default_row_height: Option<f64>,
}

impl SheetBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Add a cell with a value and optional style.
    #[must_use]
    pub fn cell<V: Into<CellValue>>(
        mut self,
        cell_ref: &str,
        value: V,
        style: Option<StyleBuilder>,
    ) -> Self {
        self.cells.push(CellEntry {
            cell_ref: cell_ref.to_string(),
            value: value.into(),
            style,
        });
        self
    }

    #[must_use]
    pub fn raw_cell(mut self, cell_ref: &str, value: CellValue) -> Self {
        self.cells.push(CellEntry {
            cell_ref: cell_ref.to_string(),
            value,
            style: None,
        });
        self
    }

    /// Add an empty cell carrying only a style.
    #[must_use]
    pub fn styled_cell(mut self, cell_ref: &str, style: StyleBuilder) -> Self {
        self.cells.push(CellEntry {
            cell_ref: cell_ref.to_string(),
            value: CellValue::Empty,
            style: Some(style),
        });
        self
    }

    /// Add a merge range (e.g., "A1:B2").
    #[must_use]
    pub fn merge(mut self, range: &str) -> Self {
        self.merges.push(range.to_string());
        self
    }

    /// Width in characters for 1-indexed columns `min..=max`.
    #[must_use]
    pub fn col_width(mut self, min: u32, max: u32, width: f64) -> Self {
        self.col_widths.push((min, max, width));
        self
    }

    /// Height in points for a 1-indexed row.
    #[must_use]
    pub fn row_height(mut self, row: u32, height: f64) -> Self {
        self.row_heights.push((row, height));
        self
    }

    #[must_use]
    pub fn default_col_width(mut self, width: f64) -> Self {
        self.default_col_width = Some(width);
        self
    }

    #[must_use]
    pub fn default_row_height(mut self, height: f64) -> Self {
        self.default_row_height = Some(height);
        self
    }
}

// ============================================================================
// XLSX Builder
// ============================================================================

#[derive(Debug, Clone)]
struct DefinedNameEntry {
    name: String,
    formula: String,
    local_sheet: Option<usize>,
}

/// Builder for complete XLSX packages.
#[derive(Debug, Default)]
pub struct XlsxBuilder {
    sheets: Vec<SheetBuilder>,
    defined_names: Vec<DefinedNameEntry>,
    date1904: bool,
}

impl XlsxBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sheet(mut self, sheet: SheetBuilder) -> Self {
        self.sheets.push(sheet);
        self
    }

    /// Workbook-scoped defined name.
    #[must_use]
    pub fn defined_name(mut self, name: &str, formula: &str) -> Self {
        self.defined_names.push(DefinedNameEntry {
            name: name.to_string(),
            formula: formula.to_string(),
            local_sheet: None,
        });
        self
    }

    /// Defined name scoped to the sheet at position `sheet`.
    #[must_use]
    pub fn local_name(mut self, name: &str, formula: &str, sheet: usize) -> Self {
        self.defined_names.push(DefinedNameEntry {
            name: name.to_string(),
            formula: formula.to_string(),
            local_sheet: Some(sheet),
        });
        self
    }

    #[must_use]
    pub fn date1904(mut self) -> Self {
        self.date1904 = true;
        self
    }

    /// Build the XLSX file as bytes.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let mut styles = StylesCollector::new();
        let mut shared_strings: Vec<String> = Vec::new();
        for sheet in &self.sheets {
            for cell in &sheet.cells {
                if let Some(ref style) = cell.style {
                    styles.add_style(style);
                }
                if let CellValue::String(ref s) = cell.value {
                    if !shared_strings.contains(s) {
                        shared_strings.push(s.clone());
                    }
                }
            }
        }

        let mut part = |name: &str, body: String| {
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        };

        part(
            "[Content_Types].xml",
            generate_content_types(self.sheets.len()),
        );
        part("_rels/.rels", generate_rels());
        part(
            "xl/_rels/workbook.xml.rels",
            generate_workbook_rels(self.sheets.len()),
        );
        part("xl/workbook.xml", self.generate_workbook());
        part("xl/styles.xml", styles.generate_styles_xml());
        if !shared_strings.is_empty() {
            part(
                "xl/sharedStrings.xml",
                generate_shared_strings(&shared_strings),
            );
        }
        for (i, sheet) in self.sheets.iter().enumerate() {
            part(
                &format!("xl/worksheets/sheet{}.xml", i + 1),
                generate_sheet_xml(sheet, &shared_strings, &styles),
            );
        }

        zip.finish().expect("Failed to finish ZIP").into_inner()
    }

    /// Build and write to `dir/name`, returning the full path.
    pub fn write_to(self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).expect("Failed to write workbook");
        path
    }

    fn generate_workbook(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str(r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#);
        if self.date1904 {
            xml.push_str(r#"<workbookPr date1904="1"/>"#);
        }
        xml.push_str("<sheets>");
        for (i, sheet) in self.sheets.iter().enumerate() {
            xml.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                escape_xml(&sheet.name),
                i + 1,
                i + 1
            ));
        }
        xml.push_str("</sheets>");
        if !self.defined_names.is_empty() {
            xml.push_str("<definedNames>");
            for defined in &self.defined_names {
                let scope = defined
                    .local_sheet
                    .map(|s| format!(r#" localSheetId="{s}""#))
                    .unwrap_or_default();
                xml.push_str(&format!(
                    r#"<definedName name="{}"{}>{}</definedName>"#,
                    escape_xml(&defined.name),
                    scope,
                    escape_xml(&defined.formula)
                ));
            }
            xml.push_str("</definedNames>");
        }
        xml.push_str("</workbook>");
        xml
    }
}

// ============================================================================
// Styles Collector
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct FontDef {
    name: String,
    size: f64,
    bold: bool,
    italic: bool,
}

#[derive(Debug, Clone)]
struct CellXfDef {
    font_id: usize,
    num_fmt_id: u32,
    style: StyleBuilder,
}

/// Deduplicates fonts, number formats and cell formats.
#[derive(Debug)]
struct StylesCollector {
    fonts: Vec<FontDef>,
    num_fmts: Vec<(u32, String)>,
    cell_xfs: Vec<CellXfDef>,
}

impl StylesCollector {
    fn new() -> Self {
        Self {
            fonts: vec![FontDef {
                name: "Calibri".to_string(),
                size: 11.0,
                bold: false,
                italic: false,
            }],
            num_fmts: Vec::new(),
            cell_xfs: vec![CellXfDef {
                font_id: 0,
                num_fmt_id: 0,
                style: StyleBuilder::default(),
            }],
        }
    }

    fn add_style(&mut self, style: &StyleBuilder) -> usize {
        if let Some(idx) = self.style_index(style) {
            return idx;
        }
        let font = FontDef {
            name: style
                .font_name
                .clone()
                .unwrap_or_else(|| "Calibri".to_string()),
            size: style.font_size.unwrap_or(11.0),
            bold: style.bold,
            italic: style.italic,
        };
        let font_id = match self.fonts.iter().position(|f| *f == font) {
            Some(i) => i,
            None => {
                self.fonts.push(font);
                self.fonts.len() - 1
            }
        };
        let num_fmt_id = style
            .number_format
            .as_deref()
            .map_or(0, |code| self.add_num_fmt(code));

        self.cell_xfs.push(CellXfDef {
            font_id,
            num_fmt_id,
            style: style.clone(),
        });
        self.cell_xfs.len() - 1
    }

    fn style_index(&self, style: &StyleBuilder) -> Option<usize> {
        self.cell_xfs
            .iter()
            .skip(1)
            .position(|xf| xf.style == *style)
            .map(|i| i + 1)
    }

    fn add_num_fmt(&mut self, code: &str) -> u32 {
        if let Some(id) = get_builtin_format_id(code) {
            return id;
        }
        if let Some((id, _)) = self.num_fmts.iter().find(|(_, c)| c == code) {
            return *id;
        }
        let id = 164 + self.num_fmts.len() as u32;
        self.num_fmts.push((id, code.to_string()));
        id
    }

    fn generate_styles_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str(
            r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        );

        if !self.num_fmts.is_empty() {
            xml.push_str(&format!(r#"<numFmts count="{}">"#, self.num_fmts.len()));
            for (id, code) in &self.num_fmts {
                xml.push_str(&format!(
                    r#"<numFmt numFmtId="{}" formatCode="{}"/>"#,
                    id,
                    escape_xml(code)
                ));
            }
            xml.push_str("</numFmts>");
        }

        xml.push_str(&format!(r#"<fonts count="{}">"#, self.fonts.len()));
        for font in &self.fonts {
            xml.push_str("<font>");
            if font.bold {
                xml.push_str("<b/>");
            }
            if font.italic {
                xml.push_str("<i/>");
            }
            xml.push_str(&format!(r#"<sz val="{}"/>"#, font.size));
            xml.push_str(&format!(r#"<name val="{}"/>"#, escape_xml(&font.name)));
            xml.push_str("</font>");
        }
        xml.push_str("</fonts>");

        xml.push_str(r#"<fills count="1"><fill><patternFill patternType="none"/></fill></fills>"#);
        xml.push_str(r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#);
        xml.push_str(r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#);

        xml.push_str(&format!(r#"<cellXfs count="{}">"#, self.cell_xfs.len()));
        for xf in &self.cell_xfs {
            let attrs = format!(
                r#"numFmtId="{}" fontId="{}" fillId="0" borderId="0""#,
                xf.num_fmt_id, xf.font_id
            );
            let style = &xf.style;
            if style.align_horizontal.is_none() && style.align_vertical.is_none() && !style.wrap_text
            {
                xml.push_str(&format!("<xf {attrs}/>"));
                continue;
            }
            let mut align = String::new();
            if let Some(ref h) = style.align_horizontal {
                align.push_str(&format!(r#" horizontal="{h}""#));
            }
            if let Some(ref v) = style.align_vertical {
                align.push_str(&format!(r#" vertical="{v}""#));
            }
            if style.wrap_text {
                align.push_str(r#" wrapText="1""#);
            }
            xml.push_str(&format!(
                r#"<xf {attrs} applyAlignment="1"><alignment{align}/></xf>"#
            ));
        }
        xml.push_str("</cellXfs>");
        xml.push_str(r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#);
        xml.push_str("</styleSheet>");
        xml
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn get_builtin_format_id(format: &str) -> Option<u32> {
    match format {
        "General" => Some(0),
        "0" => Some(1),
        "0.00" => Some(2),
        "#,##0" => Some(3),
        "#,##0.00" => Some(4),
        "0%" => Some(9),
        "mm-dd-yy" | "m/d/yy" => Some(14),
        "d-mmm-yy" => Some(15),
        "h:mm" => Some(20),
        "m/d/yy h:mm" => Some(22),
        "@" => Some(49),
        _ => None,
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn generate_content_types(sheet_count: usize) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    xml.push_str(r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#);
    xml.push_str(r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#);
    xml.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#);
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }
    xml.push_str("</Types>");
    xml
}

fn generate_rels() -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    xml.push_str(r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#);
    xml.push_str("</Relationships>");
    xml
}

fn generate_workbook_rels(sheet_count: usize) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{i}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{i}.xml"/>"#
        ));
    }
    let next = sheet_count + 1;
    xml.push_str(&format!(
        r#"<Relationship Id="rId{next}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#
    ));
    xml.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#,
        next + 1
    ));
    xml.push_str("</Relationships>");
    xml
}

fn generate_shared_strings(strings: &[String]) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(&format!(
        r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{}" uniqueCount="{}">"#,
        strings.len(),
        strings.len()
    ));
    for s in strings {
        xml.push_str(&format!(
            r#"<si><t xml:space="preserve">{}</t></si>"#,
            escape_xml(s)
        ));
    }
    xml.push_str("</sst>");
    xml
}

/// Row number (1-indexed) of an A1 reference.
fn row_of(cell_ref: &str) -> u32 {
    cell_ref
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .parse()
        .expect("cell reference without a row")
}

fn generate_cell(cell: &CellEntry, shared_strings: &[String], styles: &StylesCollector) -> String {
    let style = cell
        .style
        .as_ref()
        .and_then(|s| styles.style_index(s))
        .map(|i| format!(r#" s="{i}""#))
        .unwrap_or_default();
    let r = &cell.cell_ref;
    match &cell.value {
        CellValue::String(s) => {
            let idx = shared_strings.iter().position(|x| x == s).unwrap_or(0);
            format!(r#"<c r="{r}"{style} t="s"><v>{idx}</v></c>"#)
        }
        CellValue::Number(n) => format!(r#"<c r="{r}"{style}><v>{n}</v></c>"#),
        CellValue::Boolean(b) => {
            format!(r#"<c r="{r}"{style} t="b"><v>{}</v></c>"#, u8::from(*b))
        }
        CellValue::Error(e) => {
            format!(r#"<c r="{r}"{style} t="e"><v>{}</v></c>"#, escape_xml(e))
        }
        CellValue::InlineString(s) => format!(
            r#"<c r="{r}"{style} t="inlineStr"><is><t>{}</t></is></c>"#,
            escape_xml(s)
        ),
        CellValue::FormulaString(formula, cached) => format!(
            r#"<c r="{r}"{style} t="str"><f>{}</f><v>{}</v></c>"#,
            escape_xml(formula),
            escape_xml(cached)
        ),
        CellValue::Empty => format!(r#"<c r="{r}"{style}/>"#),
    }
}

fn generate_sheet_xml(
    sheet: &SheetBuilder,
    shared_strings: &[String],
    styles: &StylesCollector,
) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );

    let mut format_pr = String::new();
    if let Some(width) = sheet.default_col_width {
        format_pr.push_str(&format!(r#" defaultColWidth="{width}""#));
    }
    if let Some(height) = sheet.default_row_height {
        format_pr.push_str(&format!(r#" defaultRowHeight="{height}""#));
    }
    if !format_pr.is_empty() {
        xml.push_str(&format!("<sheetFormatPr{format_pr}/>"));
    }

    if !sheet.col_widths.is_empty() {
        xml.push_str("<cols>");
        for (min, max, width) in &sheet.col_widths {
            xml.push_str(&format!(
                r#"<col min="{min}" max="{max}" width="{width}" customWidth="1"/>"#
            ));
        }
        xml.push_str("</cols>");
    }

    let mut rows: Vec<u32> = sheet
        .cells
        .iter()
        .map(|c| row_of(&c.cell_ref))
        .chain(sheet.row_heights.iter().map(|(r, _)| *r))
        .collect();
    rows.sort_unstable();
    rows.dedup();

    xml.push_str("<sheetData>");
    for row in rows {
        let height = sheet
            .row_heights
            .iter()
            .find(|(r, _)| *r == row)
            .map(|(_, h)| format!(r#" ht="{h}" customHeight="1""#))
            .unwrap_or_default();
        xml.push_str(&format!(r#"<row r="{row}"{height}>"#));
        for cell in sheet.cells.iter().filter(|c| row_of(&c.cell_ref) == row) {
            xml.push_str(&generate_cell(cell, shared_strings, styles));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData>");

    if !sheet.merges.is_empty() {
        xml.push_str(&format!(r#"<mergeCells count="{}">"#, sheet.merges.len()));
        for range in &sheet.merges {
            xml.push_str(&format!(r#"<mergeCell ref="{range}"/>"#));
        }
        xml.push_str("</mergeCells>");
    }

    xml.push_str("</worksheet>");
    xml
}
