//! Layout engine: converts a [`TableModel`](crate::types::TableModel) into grid lines and
//! positioned text.
//!
//! Layout is a pure function of the model, the render options and the host unit system. Sizes in
//! the model are millimeters; output coordinates are model units of the host document.

mod engine;
mod grid;
mod text;

pub use engine::layout;
pub use grid::{CellRect, TableGrid};
pub use text::{char_budget, resolve_text_height, wrap_words};

/// Narrowest column drawn, in millimeters.
pub const MIN_COLUMN_WIDTH_MM: f64 = 10.0;

/// Shortest row drawn, in millimeters.
pub const MIN_ROW_HEIGHT_MM: f64 = 5.0;

/// Inset between a cell's border and its text anchor.
pub const CELL_MARGIN_MM: f64 = 1.0;

/// Text height used when neither the options nor the source provide one.
pub const FALLBACK_TEXT_HEIGHT_MM: f64 = 2.5;

/// Average glyph width as a fraction of text height, used to estimate wrap budgets.
pub const GLYPH_ASPECT: f64 = 0.6;

/// Smallest scale multiplier honored.
pub const MIN_SCALE: f64 = 1e-6;

pub const POINTS_TO_MM: f64 = 25.4 / 72.0;
