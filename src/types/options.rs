use serde::{Deserialize, Serialize};

use super::{HAlign, VAlign};

/// Horizontal alignment policy applied at render time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HorizontalOverride {
    /// Take each cell's own alignment.
    #[default]
    UseSource,
    Left,
    Center,
    Right,
}

impl HorizontalOverride {
    /// Effective alignment for a cell whose source alignment is `cell`.
    pub fn resolve(self, cell: HAlign) -> HAlign {
        match self {
            HorizontalOverride::UseSource => cell,
            HorizontalOverride::Left => HAlign::Left,
            HorizontalOverride::Center => HAlign::Center,
            HorizontalOverride::Right => HAlign::Right,
        }
    }
}

/// Everything the layout engine needs besides the table itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    pub scale_multiplier: f64,
    pub top_row_at_top: bool,
    pub horizontal_override: HorizontalOverride,
    pub vertical_align: VAlign,
    pub draw_grid: bool,
    pub override_text_height_mm: Option<f64>,
    pub font_family_override: Option<String>,
    /// Name of a host-managed text style.
    pub style_name_override: Option<String>,
    pub enable_wrap: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale_multiplier: 1.0,
            top_row_at_top: true,
            horizontal_override: HorizontalOverride::UseSource,
            vertical_align: VAlign::Middle,
            draw_grid: true,
            override_text_height_mm: None,
            font_family_override: None,
            style_name_override: None,
            enable_wrap: false,
        }
    }
}

/// Model unit system of the host document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Millimeters,
    Centimeters,
    Meters,
    Inches,
    Feet,
}

impl UnitSystem {
    /// How many model units one millimeter spans.
    pub fn units_per_millimeter(self) -> f64 {
        match self {
            UnitSystem::Millimeters => 1.0,
            UnitSystem::Centimeters => 0.1,
            UnitSystem::Meters => 0.001,
            UnitSystem::Inches => 1.0 / 25.4,
            UnitSystem::Feet => 1.0 / 304.8,
        }
    }
}
