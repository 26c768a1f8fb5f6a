use log::debug;

use crate::error::{Result, TableLinkError};
use crate::types::{
    HAlign, LayoutOutput, LineSegment, Point2D, RenderOptions, TableModel, TextJustification,
    TextRun, UnitSystem, VAlign,
};

use super::grid::{CellRect, TableGrid};
use super::text::{char_budget, resolve_text_height, wrap_words};
use super::{CELL_MARGIN_MM, FALLBACK_TEXT_HEIGHT_MM, MIN_SCALE};

/// Turn a table into grid lines and positioned text, in the table's local frame.
///
/// The origin is the table's lower-left corner. Horizontal grid lines are emitted first (one per
/// row boundary), then vertical ones, then one text run per cell with a non-empty value in
/// row-major order.
///
/// # Errors
/// [`TableLinkError::EmptyTable`] when the model has no columns or no rows.
pub fn layout(
    model: &TableModel,
    options: &RenderOptions,
    units: UnitSystem,
) -> Result<LayoutOutput> {
    if model.is_empty() {
        return Err(TableLinkError::EmptyTable);
    }

    let unit_scale = units.units_per_millimeter() * options.scale_multiplier.max(MIN_SCALE);
    let grid = TableGrid::new(model, unit_scale, options.top_row_at_top);
    let width = grid.total_width();
    let height = grid.total_height();

    let lines = if options.draw_grid {
        grid_lines(&grid)
    } else {
        Vec::new()
    };

    let margin = CELL_MARGIN_MM * unit_scale;
    let mut texts = Vec::new();
    for (r, row) in model.rows.iter().enumerate() {
        for (c, cell) in row.cells.iter().take(model.column_count()).enumerate() {
            let content = cell.display_text();
            if content.is_empty() {
                continue;
            }

            let rect = grid.cell_rect(r, c, cell.merge).inset(margin);
            let text_height = resolve_text_height(cell, &model.style, options, unit_scale);
            let content = if options.enable_wrap {
                let estimate = text_height.unwrap_or(FALLBACK_TEXT_HEIGHT_MM * unit_scale);
                wrap_words(&content, char_budget(rect.width(), estimate))
            } else {
                content
            };

            let justification = TextJustification {
                horizontal: options.horizontal_override.resolve(cell.horizontal_alignment),
                vertical: options.vertical_align,
            };
            texts.push(TextRun {
                origin: anchor(&rect, justification),
                content,
                height: text_height,
                justification,
                style_ref: options.style_name_override.clone(),
                font_family: options.font_family_override.clone(),
                bold: cell.style.bold,
                italic: cell.style.italic,
            });
        }
    }

    debug!(
        "laid out {}x{} table: {} lines, {} text runs, {:.3} x {:.3}",
        model.row_count(),
        model.column_count(),
        lines.len(),
        texts.len(),
        width,
        height
    );

    Ok(LayoutOutput {
        lines,
        texts,
        width,
        height,
    })
}

fn grid_lines(grid: &TableGrid) -> Vec<LineSegment> {
    let width = grid.total_width();
    let height = grid.total_height();
    let rows = grid.row_positions.len();
    let cols = grid.col_positions.len();

    let mut lines = Vec::with_capacity(rows + cols);
    for r in 0..rows {
        let y = grid.boundary_y(r);
        lines.push(LineSegment {
            start: Point2D::new(0.0, y),
            end: Point2D::new(width, y),
        });
    }
    for c in 0..cols {
        let x = grid.boundary_x(c);
        lines.push(LineSegment {
            start: Point2D::new(x, 0.0),
            end: Point2D::new(x, height),
        });
    }
    lines
}

fn anchor(rect: &CellRect, justification: TextJustification) -> Point2D {
    let x = match justification.horizontal {
        HAlign::Left => rect.x0,
        HAlign::Center => (rect.x0 + rect.x1) * 0.5,
        HAlign::Right => rect.x1,
    };
    let y = match justification.vertical {
        VAlign::Top => rect.y1,
        VAlign::Middle => (rect.y0 + rect.y1) * 0.5,
        VAlign::Bottom => rect.y0,
    };
    Point2D::new(x, y)
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
    use crate::types::{ColumnSpec, HorizontalOverride, MergeInfo, TableCell, TableRow};
    use test_case::test_case;

    fn table(widths: &[f64], heights: &[f64], text: impl Fn(usize, usize) -> String) -> TableModel {
        TableModel {
            columns: widths.iter().map(|&w| ColumnSpec { width_mm: w }).collect(),
            rows: heights
                .iter()
                .enumerate()
                .map(|(r, &h)| TableRow {
                    height_mm: h,
                    cells: (0..widths.len()).map(|c| TableCell::text(text(r, c))).collect(),
                })
                .collect(),
            style: Default::default(),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_three_by_two_scenario() {
        let model = table(&[20.0, 30.0], &[8.0, 8.0, 8.0], |r, c| format!("{r}{c}"));
        let out = layout(&model, &RenderOptions::default(), UnitSystem::Millimeters).unwrap();

        assert_eq!(out.lines.len(), 4 + 3);
        assert_eq!(out.texts.len(), 6);
        assert!(close(out.width, 50.0));
        assert!(close(out.height, 24.0));

        // Row 0 sits in the top band.
        let first = &out.texts[0];
        assert_eq!(first.content, "00");
        assert!(close(first.origin.x, 1.0));
        assert!(close(first.origin.y, 20.0));
        assert_eq!(first.height, Some(2.5));
        assert_eq!(first.justification.vertical, VAlign::Middle);

        let last = &out.texts[5];
        assert_eq!(last.content, "21");
        assert!(close(last.origin.x, 21.0));
        assert!(close(last.origin.y, 4.0));
    }

    #[test]
    fn test_horizontal_lines_before_vertical() {
        let model = table(&[20.0, 30.0], &[8.0, 8.0, 8.0], |_, _| "x".to_string());
        let out = layout(&model, &RenderOptions::default(), UnitSystem::Millimeters).unwrap();
        for line in &out.lines[..4] {
            assert_eq!(line.start.y, line.end.y);
            assert!(close(line.end.x - line.start.x, 50.0));
        }
        for line in &out.lines[4..] {
            assert_eq!(line.start.x, line.end.x);
            assert!(close(line.end.y - line.start.y, 24.0));
        }
        assert!(close(out.lines[0].start.y, 24.0));
    }

    #[test_case(1, 1, true, 4 ; "single cell")]
    #[test_case(3, 2, true, 7 ; "three by two")]
    #[test_case(5, 4, true, 11 ; "five by four")]
    #[test_case(3, 2, false, 0 ; "grid disabled")]
    fn test_grid_line_count(rows: usize, cols: usize, draw_grid: bool, expected: usize) {
        let model = table(&vec![15.0; cols], &vec![6.0; rows], |_, _| String::new());
        let options = RenderOptions {
            draw_grid,
            ..RenderOptions::default()
        };
        let out = layout(&model, &options, UnitSystem::Millimeters).unwrap();
        assert_eq!(out.lines.len(), expected);
        assert!(out.texts.is_empty());
    }

    #[test]
    fn test_empty_table_errors() {
        let err = layout(&TableModel::default(), &RenderOptions::default(), UnitSystem::Millimeters);
        assert!(matches!(err, Err(TableLinkError::EmptyTable)));

        let no_rows = table(&[10.0], &[], |_, _| String::new());
        assert!(layout(&no_rows, &RenderOptions::default(), UnitSystem::Millimeters).is_err());
    }

    #[test]
    fn test_wrap_scenario() {
        let model = table(&[17.5], &[20.0], |_, _| "alpha beta gamma".to_string());
        let options = RenderOptions {
            enable_wrap: true,
            ..RenderOptions::default()
        };
        let out = layout(&model, &options, UnitSystem::Millimeters).unwrap();
        assert_eq!(out.texts[0].content, "alpha\nbeta\ngamma");
    }

    #[test]
    fn test_floors_on_tiny_sizes() {
        let model = table(&[0.0, 2.0], &[0.5], |_, _| "x".to_string());
        let out = layout(&model, &RenderOptions::default(), UnitSystem::Millimeters).unwrap();
        assert!(close(out.width, 20.0));
        assert!(close(out.height, 5.0));
    }

    #[test]
    fn test_units_and_scale() {
        let model = table(&[20.0], &[10.0], |_, _| "x".to_string());
        let options = RenderOptions {
            scale_multiplier: 2.0,
            ..RenderOptions::default()
        };
        let out = layout(&model, &options, UnitSystem::Centimeters).unwrap();
        assert!(close(out.width, 4.0));
        assert!(close(out.height, 2.0));
        assert!(close(out.texts[0].height.unwrap(), 0.5));
    }

    #[test]
    fn test_nonpositive_scale_clamped() {
        let model = table(&[20.0], &[10.0], |_, _| "x".to_string());
        let options = RenderOptions {
            scale_multiplier: -3.0,
            ..RenderOptions::default()
        };
        let out = layout(&model, &options, UnitSystem::Millimeters).unwrap();
        assert!(out.width > 0.0);
        assert!(out.width < 1e-3);
    }

    #[test]
    fn test_override_and_source_alignment() {
        let mut model = table(&[20.0], &[10.0], |_, _| "x".to_string());
        model.rows[0].cells[0].horizontal_alignment = HAlign::Right;

        let source = layout(&model, &RenderOptions::default(), UnitSystem::Millimeters).unwrap();
        assert_eq!(source.texts[0].justification.horizontal, HAlign::Right);
        assert!(close(source.texts[0].origin.x, 19.0));

        let options = RenderOptions {
            horizontal_override: HorizontalOverride::Center,
            vertical_align: VAlign::Top,
            ..RenderOptions::default()
        };
        let centered = layout(&model, &options, UnitSystem::Millimeters).unwrap();
        assert_eq!(centered.texts[0].justification.horizontal, HAlign::Center);
        assert!(close(centered.texts[0].origin.x, 10.0));
        assert!(close(centered.texts[0].origin.y, 9.0));
    }

    #[test]
    fn test_bottom_row_first() {
        let model = table(&[20.0], &[10.0, 10.0], |r, _| format!("r{r}"));
        let options = RenderOptions {
            top_row_at_top: false,
            vertical_align: VAlign::Bottom,
            ..RenderOptions::default()
        };
        let out = layout(&model, &options, UnitSystem::Millimeters).unwrap();
        assert!(close(out.texts[0].origin.y, 1.0));
        assert!(close(out.texts[1].origin.y, 11.0));
    }

    #[test]
    fn test_style_override_leaves_height() {
        let model = table(&[20.0], &[10.0], |_, _| "x".to_string());
        let options = RenderOptions {
            style_name_override: Some("TableText".to_string()),
            font_family_override: Some("Consolas".to_string()),
            ..RenderOptions::default()
        };
        let out = layout(&model, &options, UnitSystem::Millimeters).unwrap();
        assert_eq!(out.texts[0].height, None);
        assert_eq!(out.texts[0].style_ref.as_deref(), Some("TableText"));
        assert_eq!(out.texts[0].font_family.as_deref(), Some("Consolas"));
    }

    #[test]
    fn test_merge_anchor_spans_region() {
        let mut model = table(&[20.0, 30.0], &[10.0, 10.0], |r, c| {
            if r == 0 && c == 0 {
                "merged".to_string()
            } else {
                String::new()
            }
        });
        model.rows[0].cells[0].merge = Some(MergeInfo {
            row_span: 2,
            column_span: 2,
        });
        model.rows[0].cells[0].horizontal_alignment = HAlign::Center;
        let out = layout(&model, &RenderOptions::default(), UnitSystem::Millimeters).unwrap();
        assert_eq!(out.lines.len(), 6);
        assert_eq!(out.texts.len(), 1);
        assert!(close(out.texts[0].origin.x, 25.0));
        assert!(close(out.texts[0].origin.y, 10.0));
    }

    #[test]
    fn test_short_rows_tolerated() {
        let mut model = table(&[20.0, 20.0], &[10.0, 10.0], |_, _| "x".to_string());
        model.rows[1].cells.truncate(1);
        let out = layout(&model, &RenderOptions::default(), UnitSystem::Millimeters).unwrap();
        assert_eq!(out.texts.len(), 3);
    }

    #[test]
    fn test_bold_italic_carried() {
        let mut model = table(&[20.0], &[10.0], |_, _| "x".to_string());
        model.rows[0].cells[0].style.bold = true;
        model.rows[0].cells[0].style.italic = true;
        let out = layout(&model, &RenderOptions::default(), UnitSystem::Millimeters).unwrap();
        assert!(out.texts[0].bold);
        assert!(out.texts[0].italic);
    }
}
