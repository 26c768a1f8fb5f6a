//! Table normalization applied between reading and layout.
//!
//! Normalizers are pure: they take ownership of a model and hand back the (possibly rewritten)
//! model. Running a normalizer twice must give the same result as running it once.

use crate::layout::{MIN_COLUMN_WIDTH_MM, MIN_ROW_HEIGHT_MM};
use crate::types::{MergeInfo, TableModel};

/// A pass that may reshape a raw table before layout.
pub trait TableNormalizer {
    fn normalize(&self, model: TableModel) -> TableModel;
}

/// Returns the model untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughNormalizer;

impl TableNormalizer for PassThroughNormalizer {
    fn normalize(&self, model: TableModel) -> TableModel {
        model
    }
}

/// Trims overlong rows, clamps degenerate sizes and resolves merged-cell coverage.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardNormalizer;

impl TableNormalizer for StandardNormalizer {
    fn normalize(&self, mut model: TableModel) -> TableModel {
        if model.is_empty() {
            return model;
        }

        let col_count = model.columns.len();
        for column in &mut model.columns {
            column.width_mm = clamp_size(column.width_mm, MIN_COLUMN_WIDTH_MM);
        }
        for row in &mut model.rows {
            row.height_mm = clamp_size(row.height_mm, MIN_ROW_HEIGHT_MM);
            row.cells.truncate(col_count);
        }

        resolve_merges(&mut model);
        model
    }
}

fn clamp_size(value: f64, minimum: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        minimum
    }
}

/// Clamp merge spans to the table and blank every cell an earlier anchor covers.
///
/// Anchors are visited in row-major order; a cell already covered cannot anchor its own merge.
fn resolve_merges(model: &mut TableModel) {
    let row_count = model.rows.len();
    let col_count = model.columns.len();
    let mut covered = vec![false; row_count * col_count];

    for r in 0..row_count {
        for c in 0..col_count {
            let is_covered = covered.get(r * col_count + c).copied().unwrap_or(false);
            let Some(cell) = model.rows.get_mut(r).and_then(|row| row.cells.get_mut(c)) else {
                continue;
            };

            if is_covered {
                cell.value = None;
                cell.merge = None;
                continue;
            }

            let Some(merge) = cell.merge else {
                continue;
            };
            let max_rows = u32::try_from(row_count - r).unwrap_or(u32::MAX);
            let max_cols = u32::try_from(col_count - c).unwrap_or(u32::MAX);
            let clamped = MergeInfo {
                row_span: merge.row_span.clamp(1, max_rows),
                column_span: merge.column_span.clamp(1, max_cols),
            };
            if clamped == MergeInfo::default() {
                cell.merge = None;
                continue;
            }
            cell.merge = Some(clamped);

            for dr in 0..clamped.row_span as usize {
                for dc in 0..clamped.column_span as usize {
                    if dr == 0 && dc == 0 {
                        continue;
                    }
                    if let Some(slot) = covered.get_mut((r + dr) * col_count + c + dc) {
                        *slot = true;
                    }
                }
            }
        }
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

    fn grid(rows: usize, cols: usize) -> TableModel {
        TableModel {
            columns: vec![ColumnSpec { width_mm: 20.0 }; cols],
            rows: (0..rows)
                .map(|r| TableRow {
                    height_mm: 8.0,
                    cells: (0..cols)
                        .map(|c| TableCell::text(format!("r{r}c{c}")))
                        .collect(),
                })
                .collect(),
            style: Default::default(),
        }
    }

    #[test]
    fn test_pass_through_keeps_model() {
        let model = grid(2, 2);
        assert_eq!(PassThroughNormalizer.normalize(model.clone()), model);
    }

    #[test]
    fn test_clean_model_is_unchanged() {
        let model = grid(3, 2);
        assert_eq!(StandardNormalizer.normalize(model.clone()), model);
    }

    #[test]
    fn test_empty_model_is_unchanged() {
        let model = TableModel::default();
        assert_eq!(StandardNormalizer.normalize(model.clone()), model);
    }

    #[test]
    fn test_clamps_sizes() {
        let mut model = grid(1, 2);
        model.columns[0].width_mm = -4.0;
        model.columns[1].width_mm = f64::NAN;
        model.rows[0].height_mm = 0.0;
        let out = StandardNormalizer.normalize(model);
        assert_eq!(out.columns[0].width_mm, MIN_COLUMN_WIDTH_MM);
        assert_eq!(out.columns[1].width_mm, MIN_COLUMN_WIDTH_MM);
        assert_eq!(out.rows[0].height_mm, MIN_ROW_HEIGHT_MM);
    }

    #[test]
    fn test_trims_long_rows() {
        let mut model = grid(1, 2);
        model.rows[0].cells.push(TableCell::text("extra"));
        let out = StandardNormalizer.normalize(model);
        assert_eq!(out.rows[0].cells.len(), 2);
    }

    #[test]
    fn test_merge_blanks_covered_cells() {
        let mut model = grid(3, 3);
        model.rows[0].cells[0].merge = Some(MergeInfo {
            row_span: 2,
            column_span: 2,
        });
        let out = StandardNormalizer.normalize(model);
        assert_eq!(out.rows[0].cells[0].display_text(), "r0c0");
        assert!(out.rows[0].cells[1].value.is_none());
        assert!(out.rows[1].cells[0].value.is_none());
        assert!(out.rows[1].cells[1].value.is_none());
        assert_eq!(out.rows[1].cells[2].display_text(), "r1c2");
        assert_eq!(out.rows[2].cells[0].display_text(), "r2c0");
    }

    #[test]
    fn test_merge_clamped_to_bounds() {
        let mut model = grid(2, 2);
        model.rows[1].cells[1].merge = Some(MergeInfo {
            row_span: 5,
            column_span: 5,
        });
        model.rows[0].cells[0].merge = Some(MergeInfo {
            row_span: 1,
            column_span: 9,
        });
        let out = StandardNormalizer.normalize(model);
        assert_eq!(
            out.rows[0].cells[0].merge,
            Some(MergeInfo {
                row_span: 1,
                column_span: 2
            })
        );
        assert!(out.rows[0].cells[1].value.is_none());
        assert_eq!(out.rows[1].cells[1].merge, None);
    }

    #[test]
    fn test_overlapping_merge_loses_to_earlier_anchor() {
        let mut model = grid(3, 3);
        model.rows[0].cells[0].merge = Some(MergeInfo {
            row_span: 2,
            column_span: 2,
        });
        model.rows[1].cells[1].merge = Some(MergeInfo {
            row_span: 2,
            column_span: 2,
        });
        let out = StandardNormalizer.normalize(model);
        assert!(out.rows[1].cells[1].merge.is_none());
        assert_eq!(out.rows[2].cells[2].display_text(), "r2c2");
    }

    #[test]
    fn test_idempotent() {
        let mut model = grid(4, 3);
        model.columns[2].width_mm = 0.0;
        model.rows[3].height_mm = -1.0;
        model.rows[0].cells[1].merge = Some(MergeInfo {
            row_span: 3,
            column_span: 4,
        });
        model.rows[2].cells.push(TableCell::text("overflow"));
        let once = StandardNormalizer.normalize(model);
        let twice = StandardNormalizer.normalize(once.clone());
        assert_eq!(once, twice);
    }
}
