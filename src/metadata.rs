//! Link metadata and its flat string encoding.
//!
//! Host documents only store string key/value attributes, so [`LinkMetadata`] is written under a
//! fixed key namespace. Encoding writes every key (an empty value means "cleared"); decoding never
//! fails and falls back to defaults for missing or malformed values.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::types::{HorizontalOverride, RenderOptions, VAlign};

/// Prefix shared by every link key.
pub const KEY_PREFIX: &str = "TableLink_";

pub const KEY_FILE: &str = "TableLink_File";
pub const KEY_SHEET: &str = "TableLink_Sheet";
pub const KEY_RANGE: &str = "TableLink_Range";
pub const KEY_SCALE: &str = "TableLink_Scale";
pub const KEY_ALIGN: &str = "TableLink_Align";
pub const KEY_VALIGN: &str = "TableLink_VAlign";
pub const KEY_SHOW_GRID: &str = "TableLink_ShowGrid";
pub const KEY_TEXT_MM: &str = "TableLink_TextMm";
pub const KEY_FONT: &str = "TableLink_Font";
pub const KEY_WRAP: &str = "TableLink_Wrap";
pub const KEY_TEXT_STYLE: &str = "TableLink_TextStyle";

/// Every key in the namespace, in encoding order.
pub fn link_keys() -> [&'static str; 11] {
    [
        KEY_FILE,
        KEY_SHEET,
        KEY_RANGE,
        KEY_SCALE,
        KEY_ALIGN,
        KEY_VALIGN,
        KEY_SHOW_GRID,
        KEY_TEXT_MM,
        KEY_FONT,
        KEY_WRAP,
        KEY_TEXT_STYLE,
    ]
}

/// Where a definition's table comes from and how it was rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkMetadata {
    pub source_path: PathBuf,
    pub sheet_name: String,
    /// A literal A1 range or a defined name.
    pub range_spec: String,
    pub scale: f64,
    pub horizontal_override: HorizontalOverride,
    pub vertical_align: VAlign,
    pub show_grid: bool,
    pub text_height_mm: Option<f64>,
    pub font_family: Option<String>,
    pub wrap: bool,
    pub style_name: Option<String>,
}

impl Default for LinkMetadata {
    fn default() -> Self {
        Self {
            source_path: PathBuf::new(),
            sheet_name: String::new(),
            range_spec: String::new(),
            scale: 1.0,
            horizontal_override: HorizontalOverride::UseSource,
            vertical_align: VAlign::Top,
            show_grid: false,
            text_height_mm: None,
            font_family: None,
            wrap: false,
            style_name: None,
        }
    }
}

impl LinkMetadata {
    /// Metadata for a table rendered from `source_path`/`sheet_name`/`range_spec` with `options`.
    pub fn from_render_options(
        source_path: impl Into<PathBuf>,
        sheet_name: impl Into<String>,
        range_spec: impl Into<String>,
        options: &RenderOptions,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            sheet_name: sheet_name.into(),
            range_spec: range_spec.into(),
            scale: options.scale_multiplier,
            horizontal_override: options.horizontal_override,
            vertical_align: options.vertical_align,
            show_grid: options.draw_grid,
            text_height_mm: options.override_text_height_mm,
            font_family: options.font_family_override.clone(),
            wrap: options.enable_wrap,
            style_name: options.style_name_override.clone(),
        }
    }

    /// Render options to regenerate this link with; row 0 is always drawn on top.
    pub fn to_render_options(&self) -> RenderOptions {
        RenderOptions {
            scale_multiplier: self.scale,
            top_row_at_top: true,
            horizontal_override: self.horizontal_override,
            vertical_align: self.vertical_align,
            draw_grid: self.show_grid,
            override_text_height_mm: self.text_height_mm,
            font_family_override: self.font_family.clone(),
            style_name_override: self.style_name.clone(),
            enable_wrap: self.wrap,
        }
    }

    /// A definition is linked when it names a source file.
    pub fn is_linked(&self) -> bool {
        !self.source_path.as_os_str().is_empty()
    }

    pub fn source_exists(&self) -> bool {
        self.is_linked() && self.source_path.is_file()
    }

    pub fn encode(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            map.insert(key.to_string(), value);
        };
        put(KEY_FILE, self.source_path.to_string_lossy().into_owned());
        put(KEY_SHEET, self.sheet_name.clone());
        put(KEY_RANGE, self.range_spec.clone());
        put(KEY_SCALE, self.scale.to_string());
        put(KEY_ALIGN, align_code(self.horizontal_override).to_string());
        put(KEY_VALIGN, valign_code(self.vertical_align).to_string());
        put(KEY_SHOW_GRID, encode_bool(self.show_grid));
        put(
            KEY_TEXT_MM,
            self.text_height_mm.map(|h| h.to_string()).unwrap_or_default(),
        );
        put(KEY_FONT, self.font_family.clone().unwrap_or_default());
        put(KEY_WRAP, encode_bool(self.wrap));
        put(KEY_TEXT_STYLE, self.style_name.clone().unwrap_or_default());
        map
    }

    pub fn decode(map: &BTreeMap<String, String>) -> Self {
        Self::decode_with(|key| map.get(key).map(String::as_str))
    }

    /// Decode with every key looked up on `placement` first, then on `definition`.
    ///
    /// Empty placement values count as absent.
    pub fn decode_layered(
        placement: &BTreeMap<String, String>,
        definition: &BTreeMap<String, String>,
    ) -> Self {
        Self::decode_with(|key| {
            placement
                .get(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| definition.get(key))
                .map(String::as_str)
        })
    }

    fn decode_with<'a>(lookup: impl Fn(&str) -> Option<&'a str>) -> Self {
        let text = |key: &str| {
            lookup(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let number = |key: &str| {
            text(key)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };
        let flag = |key: &str| text(key).is_some_and(|v| decode_bool(&v));
        let code = |key: &str| text(key).and_then(|v| v.parse::<u8>().ok()).unwrap_or(0);

        Self {
            source_path: text(KEY_FILE).map(PathBuf::from).unwrap_or_default(),
            sheet_name: text(KEY_SHEET).unwrap_or_default(),
            range_spec: text(KEY_RANGE).unwrap_or_default(),
            // Non-positive scales are kept; layout clamps them.
            scale: number(KEY_SCALE).unwrap_or(1.0),
            horizontal_override: align_from_code(code(KEY_ALIGN)),
            vertical_align: valign_from_code(code(KEY_VALIGN)),
            show_grid: flag(KEY_SHOW_GRID),
            text_height_mm: number(KEY_TEXT_MM).filter(|h| *h > 0.0),
            font_family: text(KEY_FONT),
            wrap: flag(KEY_WRAP),
            style_name: text(KEY_TEXT_STYLE),
        }
    }
}

fn align_code(align: HorizontalOverride) -> u8 {
    match align {
        HorizontalOverride::UseSource => 0,
        HorizontalOverride::Left => 1,
        HorizontalOverride::Center => 2,
        HorizontalOverride::Right => 3,
    }
}

fn align_from_code(code: u8) -> HorizontalOverride {
    match code {
        1 => HorizontalOverride::Left,
        2 => HorizontalOverride::Center,
        3 => HorizontalOverride::Right,
        _ => HorizontalOverride::UseSource,
    }
}

fn valign_code(align: VAlign) -> u8 {
    match align {
        VAlign::Top => 0,
        VAlign::Middle => 1,
        VAlign::Bottom => 2,
    }
}

fn valign_from_code(code: u8) -> VAlign {
    match code {
        1 => VAlign::Middle,
        2 => VAlign::Bottom,
        _ => VAlign::Top,
    }
}

fn encode_bool(v: bool) -> String {
    if v { "1" } else { "0" }.to_string()
}

fn decode_bool(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
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
    use crate::layout::layout;
    use crate::types::{ColumnSpec, TableCell, TableModel, TableRow, UnitSystem};

    fn full() -> LinkMetadata {
        LinkMetadata {
            source_path: PathBuf::from("/data/budget.xlsx"),
            sheet_name: "Q3".to_string(),
            range_spec: "A1:D20".to_string(),
            scale: 0.75,
            horizontal_override: HorizontalOverride::Right,
            vertical_align: VAlign::Bottom,
            show_grid: true,
            text_height_mm: Some(3.5),
            font_family: Some("Consolas".to_string()),
            wrap: true,
            style_name: Some("TableText".to_string()),
        }
    }

    #[test]
    fn test_round_trip_full() {
        let meta = full();
        assert_eq!(LinkMetadata::decode(&meta.encode()), meta);
    }

    #[test]
    fn test_round_trip_keeps_non_positive_scale() {
        for scale in [0.0, -2.0] {
            let meta = LinkMetadata { scale, ..full() };
            let decoded = LinkMetadata::decode(&meta.encode());
            assert_eq!(decoded.scale, scale);
            assert_eq!(decoded, meta);
        }
    }

    #[test]
    fn test_decoded_scale_lays_out_like_insert() {
        let model = TableModel {
            columns: vec![ColumnSpec { width_mm: 20.0 }],
            rows: vec![TableRow {
                height_mm: 5.0,
                cells: vec![TableCell::text("x")],
            }],
            ..TableModel::default()
        };
        let meta = LinkMetadata { scale: 0.0, ..full() };
        let decoded = LinkMetadata::decode(&meta.encode());
        let first = layout(&model, &meta.to_render_options(), UnitSystem::Millimeters).unwrap();
        let again =
            layout(&model, &decoded.to_render_options(), UnitSystem::Millimeters).unwrap();
        assert_eq!(first.width, again.width);
        assert!(again.width < 1e-3);
    }

    #[test]
    fn test_non_positive_text_height_is_absent() {
        let mut map = LinkMetadata::default().encode();
        map.insert(KEY_TEXT_MM.to_string(), "0".to_string());
        assert_eq!(LinkMetadata::decode(&map).text_height_mm, None);
        map.insert(KEY_TEXT_MM.to_string(), "-1.5".to_string());
        assert_eq!(LinkMetadata::decode(&map).text_height_mm, None);
    }

    #[test]
    fn test_round_trip_blank() {
        let meta = LinkMetadata::default();
        let encoded = meta.encode();
        assert_eq!(encoded.len(), link_keys().len());
        assert_eq!(encoded[KEY_FILE], "");
        assert_eq!(encoded[KEY_TEXT_MM], "");
        assert_eq!(LinkMetadata::decode(&encoded), meta);
    }

    #[test]
    fn test_decode_empty_map_defaults() {
        let meta = LinkMetadata::decode(&BTreeMap::new());
        assert!(!meta.is_linked());
        assert_eq!(meta.scale, 1.0);
        assert_eq!(meta.horizontal_override, HorizontalOverride::UseSource);
        assert_eq!(meta.vertical_align, VAlign::Top);
        assert!(!meta.show_grid);
        assert!(!meta.wrap);
        assert_eq!(meta.text_height_mm, None);
    }

    #[test]
    fn test_decode_tolerates_garbage() {
        let mut map = BTreeMap::new();
        map.insert(KEY_SCALE.to_string(), "abc".to_string());
        map.insert(KEY_ALIGN.to_string(), "9".to_string());
        map.insert(KEY_VALIGN.to_string(), "-1".to_string());
        map.insert(KEY_TEXT_MM.to_string(), "-2".to_string());
        map.insert(KEY_SHOW_GRID.to_string(), "TRUE".to_string());
        map.insert(KEY_WRAP.to_string(), "yes".to_string());
        let meta = LinkMetadata::decode(&map);
        assert_eq!(meta.scale, 1.0);
        assert_eq!(meta.horizontal_override, HorizontalOverride::UseSource);
        assert_eq!(meta.vertical_align, VAlign::Top);
        assert_eq!(meta.text_height_mm, None);
        assert!(meta.show_grid);
        assert!(!meta.wrap);
    }

    #[test]
    fn test_decode_layered_prefers_placement() {
        let definition = full().encode();
        let mut placement = BTreeMap::new();
        placement.insert(KEY_RANGE.to_string(), "B2:C3".to_string());
        placement.insert(KEY_SHEET.to_string(), "  ".to_string());
        let meta = LinkMetadata::decode_layered(&placement, &definition);
        assert_eq!(meta.range_spec, "B2:C3");
        assert_eq!(meta.sheet_name, "Q3");
        assert_eq!(meta.scale, 0.75);
    }

    #[test]
    fn test_render_options_round_trip() {
        let meta = full();
        let options = meta.to_render_options();
        assert!(options.top_row_at_top);
        assert_eq!(options.override_text_height_mm, Some(3.5));
        let back = LinkMetadata::from_render_options(
            meta.source_path.clone(),
            meta.sheet_name.clone(),
            meta.range_spec.clone(),
            &options,
        );
        assert_eq!(back, meta);
    }

    #[test]
    fn test_source_exists() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let linked = LinkMetadata {
            source_path: file.path().to_path_buf(),
            ..LinkMetadata::default()
        };
        assert!(linked.source_exists());
        assert!(!LinkMetadata::default().source_exists());
    }

    #[test]
    fn test_keys_share_prefix() {
        assert!(link_keys().iter().all(|k| k.starts_with(KEY_PREFIX)));
    }
}
