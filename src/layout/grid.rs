//! Pre-computed boundaries of a table's grid.
//!
//! Column and row edges are accumulated once, in model units, so every cell rectangle is a pair
//! of lookups.

use crate::types::{MergeInfo, TableModel};

use super::{MIN_COLUMN_WIDTH_MM, MIN_ROW_HEIGHT_MM};

/// Cumulative grid boundaries in the table's local frame.
#[derive(Debug, Clone)]
pub struct TableGrid {
    /// `col_positions[i]` = x of column i's left edge; the last entry is the total width.
    pub col_positions: Vec<f64>,
    /// `row_positions[i]` = distance of row i's leading edge from the first row's edge.
    pub row_positions: Vec<f64>,
    /// When set, row 0 is the visually highest band.
    pub top_row_at_top: bool,
}

/// Rectangle of a cell, `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl CellRect {
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Shrink every side by `margin`, never inverting the rectangle.
    pub fn inset(&self, margin: f64) -> CellRect {
        let mx = margin.min(self.width() * 0.5).max(0.0);
        let my = margin.min(self.height() * 0.5).max(0.0);
        CellRect {
            x0: self.x0 + mx,
            y0: self.y0 + my,
            x1: self.x1 - mx,
            y1: self.y1 - my,
        }
    }
}

impl TableGrid {
    /// Build the grid for `model`, flooring every declared size before scaling.
    pub fn new(model: &TableModel, unit_scale: f64, top_row_at_top: bool) -> Self {
        let mut col_positions = Vec::with_capacity(model.columns.len() + 1);
        let mut x = 0.0;
        col_positions.push(x);
        for col in &model.columns {
            x += floored(col.width_mm, MIN_COLUMN_WIDTH_MM) * unit_scale;
            col_positions.push(x);
        }

        let mut row_positions = Vec::with_capacity(model.rows.len() + 1);
        let mut y = 0.0;
        row_positions.push(y);
        for row in &model.rows {
            y += floored(row.height_mm, MIN_ROW_HEIGHT_MM) * unit_scale;
            row_positions.push(y);
        }

        TableGrid {
            col_positions,
            row_positions,
            top_row_at_top,
        }
    }

    pub fn total_width(&self) -> f64 {
        self.col_positions.last().copied().unwrap_or(0.0)
    }

    pub fn total_height(&self) -> f64 {
        self.row_positions.last().copied().unwrap_or(0.0)
    }

    /// Output-frame y of row boundary `r` (0..=row count).
    pub fn boundary_y(&self, r: usize) -> f64 {
        let y = self.row_positions.get(r).copied().unwrap_or(0.0);
        if self.top_row_at_top {
            self.total_height() - y
        } else {
            y
        }
    }

    /// Output-frame x of column boundary `c` (0..=column count).
    pub fn boundary_x(&self, c: usize) -> f64 {
        self.col_positions.get(c).copied().unwrap_or(0.0)
    }

    /// Bounds of the cell at (row, col), spanning its merged region when `merge` is set.
    pub fn cell_rect(&self, row: usize, col: usize, merge: Option<MergeInfo>) -> CellRect {
        let (row_span, col_span) = merge.map_or((1, 1), |m| {
            (m.row_span.max(1) as usize, m.column_span.max(1) as usize)
        });
        let last_col = self.col_positions.len().saturating_sub(1);
        let last_row = self.row_positions.len().saturating_sub(1);
        let end_col = (col + col_span).min(last_col);
        let end_row = (row + row_span).min(last_row);

        let xa = self.boundary_x(col);
        let xb = self.boundary_x(end_col);
        let ya = self.boundary_y(row);
        let yb = self.boundary_y(end_row);

        CellRect {
            x0: xa.min(xb),
            y0: ya.min(yb),
            x1: xa.max(xb),
            y1: ya.max(yb),
        }
    }
}

/// Declared size with the anti-degenerate floor applied; NaN falls back to the floor.
fn floored(declared: f64, minimum: f64) -> f64 {
    if declared.is_nan() {
        minimum
    } else {
        declared.max(minimum)
    }
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
    use crate::types::{ColumnSpec, TableCell, TableRow};

    fn model(widths: &[f64], heights: &[f64]) -> TableModel {
        TableModel {
            columns: widths.iter().map(|&w| ColumnSpec { width_mm: w }).collect(),
            rows: heights
                .iter()
                .map(|&h| TableRow {
                    height_mm: h,
                    cells: vec![TableCell::default(); widths.len()],
                })
                .collect(),
            style: Default::default(),
        }
    }

    #[test]
    fn test_basic_grid() {
        let grid = TableGrid::new(&model(&[20.0, 30.0], &[8.0, 6.0]), 1.0, false);
        assert_eq!(grid.col_positions, vec![0.0, 20.0, 50.0]);
        assert_eq!(grid.row_positions, vec![0.0, 8.0, 14.0]);
        assert_eq!(grid.total_width(), 50.0);
        assert_eq!(grid.total_height(), 14.0);
    }

    #[test]
    fn test_floors_applied() {
        let grid = TableGrid::new(&model(&[0.0, -5.0, 4.0], &[1.0]), 1.0, false);
        assert_eq!(grid.col_positions, vec![0.0, 10.0, 20.0, 30.0]);
        assert_eq!(grid.total_height(), MIN_ROW_HEIGHT_MM);
    }

    #[test]
    fn test_unit_scale() {
        let grid = TableGrid::new(&model(&[20.0], &[10.0]), 0.1, false);
        assert!((grid.total_width() - 2.0).abs() < 1e-12);
        assert!((grid.total_height() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_top_row_at_top_flips_rows() {
        let grid = TableGrid::new(&model(&[20.0], &[10.0, 10.0]), 1.0, true);
        let first = grid.cell_rect(0, 0, None);
        let second = grid.cell_rect(1, 0, None);
        assert_eq!((first.y0, first.y1), (10.0, 20.0));
        assert_eq!((second.y0, second.y1), (0.0, 10.0));
    }

    #[test]
    fn test_merged_rect_spans() {
        let grid = TableGrid::new(&model(&[20.0, 30.0, 10.0], &[10.0, 10.0]), 1.0, false);
        let rect = grid.cell_rect(
            0,
            0,
            Some(MergeInfo {
                row_span: 2,
                column_span: 2,
            }),
        );
        assert_eq!(rect, CellRect { x0: 0.0, y0: 0.0, x1: 50.0, y1: 20.0 });
    }

    #[test]
    fn test_merge_past_edge_is_clipped() {
        let grid = TableGrid::new(&model(&[20.0], &[10.0]), 1.0, false);
        let rect = grid.cell_rect(
            0,
            0,
            Some(MergeInfo {
                row_span: 4,
                column_span: 4,
            }),
        );
        assert_eq!(rect.x1, 20.0);
        assert_eq!(rect.y1, 10.0);
    }

    #[test]
    fn test_inset() {
        let rect = CellRect { x0: 0.0, y0: 0.0, x1: 10.0, y1: 4.0 }.inset(1.0);
        assert_eq!(rect, CellRect { x0: 1.0, y0: 1.0, x1: 9.0, y1: 3.0 });
    }
}
