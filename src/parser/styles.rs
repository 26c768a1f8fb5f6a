//! The slice of xl/styles.xml that affects table rendering: fonts, number formats and the
//! alignment of each cell format (`cellXfs`).

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::BufRead;

use crate::error::Result;
use crate::types::{HAlign, VAlign};

#[derive(Debug, Clone, Default)]
struct RawFont {
    bold: bool,
    italic: bool,
    size: Option<f64>,
    name: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct RawXf {
    font_id: Option<usize>,
    num_fmt_id: u32,
    horizontal: Option<String>,
    vertical: Option<String>,
    wrap: bool,
}

/// Rendering-relevant properties of one `cellXfs` entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub(super) struct CellFormat {
    pub horizontal: HAlign,
    pub vertical: VAlign,
    pub bold: bool,
    pub italic: bool,
    pub wrap: bool,
    /// Set only when the font size differs from the workbook default.
    pub font_size_points: Option<f64>,
    pub is_date: bool,
}

/// Resolved cell formats indexed by the `s` attribute of a cell.
#[derive(Debug, Clone, Default)]
pub(super) struct StyleTable {
    formats: Vec<CellFormat>,
    pub default_font_name: Option<String>,
}

impl StyleTable {
    pub fn format(&self, index: u32) -> CellFormat {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.formats.get(i))
            .cloned()
            .unwrap_or_default()
    }
}

fn attr_val(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| std::str::from_utf8(&a.value).ok().map(str::to_string))
}

/// `<b/>` and `<i/>` are on unless `val` says otherwise.
fn flag_on(e: &BytesStart<'_>) -> bool {
    attr_val(e, b"val").map_or(true, |v| v != "0" && !v.eq_ignore_ascii_case("false"))
}

fn read_xf(e: &BytesStart<'_>) -> RawXf {
    let mut xf = RawXf::default();
    for attr in e.attributes().flatten() {
        let value = std::str::from_utf8(&attr.value).unwrap_or("");
        match attr.key.as_ref() {
            b"fontId" => xf.font_id = value.parse().ok(),
            b"numFmtId" => xf.num_fmt_id = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    xf
}

fn read_alignment(e: &BytesStart<'_>, xf: &mut RawXf) {
    xf.horizontal = attr_val(e, b"horizontal");
    xf.vertical = attr_val(e, b"vertical");
    xf.wrap = attr_val(e, b"wrapText").is_some_and(|v| v == "1" || v == "true");
}

/// Parse styles.xml into a [`StyleTable`].
#[allow(clippy::too_many_lines)]
pub(super) fn parse_styles<R: BufRead>(reader: R) -> Result<StyleTable> {
    let mut xml = Reader::from_reader(reader);
    xml.trim_text(true);

    let mut buf = Vec::new();
    let mut in_fonts = false;
    let mut in_cell_xfs = false;
    let mut in_num_fmts = false;

    let mut fonts: Vec<RawFont> = Vec::new();
    let mut xfs: Vec<RawXf> = Vec::new();
    let mut custom_formats: HashMap<u32, String> = HashMap::new();
    let mut current_font: Option<RawFont> = None;
    let mut current_xf: Option<RawXf> = None;

    loop {
        match xml.read_event_into(&mut buf)? {
            ref event @ (Event::Start(ref e) | Event::Empty(ref e)) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"numFmts" => in_num_fmts = !is_empty,
                    b"fonts" => in_fonts = !is_empty,
                    b"cellXfs" => in_cell_xfs = !is_empty,
                    b"numFmt" if in_num_fmts => {
                        let id = attr_val(e, b"numFmtId").and_then(|v| v.parse().ok());
                        if let (Some(id), Some(code)) = (id, attr_val(e, b"formatCode")) {
                            custom_formats.insert(id, code);
                        }
                    }
                    b"font" if in_fonts => {
                        if is_empty {
                            fonts.push(RawFont::default());
                        } else {
                            current_font = Some(RawFont::default());
                        }
                    }
                    b"b" => {
                        if let Some(font) = current_font.as_mut() {
                            font.bold = flag_on(e);
                        }
                    }
                    b"i" => {
                        if let Some(font) = current_font.as_mut() {
                            font.italic = flag_on(e);
                        }
                    }
                    b"sz" => {
                        if let Some(font) = current_font.as_mut() {
                            font.size = attr_val(e, b"val").and_then(|v| v.parse().ok());
                        }
                    }
                    b"name" => {
                        if let Some(font) = current_font.as_mut() {
                            font.name = attr_val(e, b"val");
                        }
                    }
                    b"xf" if in_cell_xfs => {
                        let xf = read_xf(e);
                        if is_empty {
                            xfs.push(xf);
                        } else {
                            current_xf = Some(xf);
                        }
                    }
                    b"alignment" => {
                        if let Some(xf) = current_xf.as_mut() {
                            read_alignment(e, xf);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"numFmts" => in_num_fmts = false,
                b"fonts" => in_fonts = false,
                b"cellXfs" => in_cell_xfs = false,
                b"font" => {
                    if let Some(font) = current_font.take() {
                        fonts.push(font);
                    }
                }
                b"xf" => {
                    if let Some(xf) = current_xf.take() {
                        xfs.push(xf);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let default_font = fonts.first().cloned().unwrap_or_default();
    let formats = xfs
        .iter()
        .map(|xf| {
            let font = xf
                .font_id
                .and_then(|id| fonts.get(id))
                .cloned()
                .unwrap_or_default();
            let code = custom_formats.get(&xf.num_fmt_id).map(String::as_str);
            CellFormat {
                horizontal: horizontal_from(xf.horizontal.as_deref()),
                vertical: vertical_from(xf.vertical.as_deref()),
                bold: font.bold,
                italic: font.italic,
                wrap: xf.wrap,
                font_size_points: font.size.filter(|sz| Some(*sz) != default_font.size),
                is_date: is_date_format(xf.num_fmt_id, code),
            }
        })
        .collect();

    Ok(StyleTable {
        formats,
        default_font_name: default_font.name,
    })
}

fn horizontal_from(value: Option<&str>) -> HAlign {
    match value {
        Some("center" | "centerContinuous") => HAlign::Center,
        Some("right") => HAlign::Right,
        _ => HAlign::Left,
    }
}

fn vertical_from(value: Option<&str>) -> VAlign {
    match value {
        Some("top") => VAlign::Top,
        Some("bottom") => VAlign::Bottom,
        _ => VAlign::Middle,
    }
}

/// Whether a number format shows dates or times.
///
/// Built-in ids 14-22 and 45-47 are date/time formats. Custom codes count when, after removing
/// quoted literals, escapes and bracketed sections, they still contain a date or time token.
pub(super) fn is_date_format(id: u32, custom_code: Option<&str>) -> bool {
    if matches!(id, 14..=22 | 45..=47) {
        return true;
    }
    let Some(code) = custom_code else {
        return false;
    };

    let mut stripped = String::with_capacity(code.len());
    let mut chars = code.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                }
            }
            '[' => {
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            _ => stripped.push(ch.to_ascii_lowercase()),
        }
    }

    // Only the positive section decides.
    let positive = stripped.split(';').next().unwrap_or("");
    positive
        .chars()
        .any(|c| matches!(c, 'y' | 'm' | 'd' | 'h' | 's'))
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
    use test_case::test_case;

    #[test_case(14, None, true ; "builtin short date")]
    #[test_case(22, None, true ; "builtin date time")]
    #[test_case(46, None, true ; "builtin elapsed time")]
    #[test_case(0, None, false ; "general")]
    #[test_case(4, None, false ; "builtin number")]
    #[test_case(164, Some("yyyy-mm-dd"), true ; "custom iso date")]
    #[test_case(165, Some("#,##0.00"), false ; "custom number")]
    #[test_case(166, Some("0.0\" days\""), false ; "quoted literal ignored")]
    #[test_case(167, Some("[Red]0.00"), false ; "color section ignored")]
    #[test_case(168, Some("hh:mm"), true ; "custom time")]
    #[test_case(169, Some("General"), false ; "custom general")]
    fn test_is_date_format(id: u32, code: Option<&str>, expected: bool) {
        assert_eq!(is_date_format(id, code), expected);
    }

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <numFmts count="1"><numFmt numFmtId="164" formatCode="dd/mm/yyyy"/></numFmts>
  <fonts count="3">
    <font><sz val="11"/><name val="Calibri"/></font>
    <font><b/><sz val="11"/><name val="Calibri"/></font>
    <font><i/><b val="0"/><sz val="16"/><name val="Calibri"/></font>
  </fonts>
  <cellXfs count="4">
    <xf numFmtId="0" fontId="0"/>
    <xf numFmtId="0" fontId="1" applyAlignment="1"><alignment horizontal="center" vertical="top" wrapText="1"/></xf>
    <xf numFmtId="164" fontId="2"><alignment horizontal="right" vertical="bottom"/></xf>
    <xf numFmtId="3" fontId="0"/>
  </cellXfs>
</styleSheet>"#;

    #[test]
    fn test_parse_styles() {
        let table = parse_styles(STYLES.as_bytes()).unwrap();
        assert_eq!(table.default_font_name.as_deref(), Some("Calibri"));

        let plain = table.format(0);
        assert_eq!(plain, CellFormat::default());

        let header = table.format(1);
        assert!(header.bold);
        assert!(header.wrap);
        assert_eq!(header.horizontal, HAlign::Center);
        assert_eq!(header.vertical, VAlign::Top);
        assert_eq!(header.font_size_points, None);

        let date = table.format(2);
        assert!(date.is_date);
        assert!(date.italic);
        assert!(!date.bold);
        assert_eq!(date.font_size_points, Some(16.0));
        assert_eq!(date.horizontal, HAlign::Right);
        assert_eq!(date.vertical, VAlign::Bottom);

        assert!(!table.format(3).is_date);
        assert_eq!(table.format(99), CellFormat::default());
    }
}
