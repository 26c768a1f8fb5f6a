//! Text sizing and greedy word wrapping.

use crate::types::{RenderOptions, TableCell, TableStyle};

use super::{FALLBACK_TEXT_HEIGHT_MM, GLYPH_ASPECT, POINTS_TO_MM};

/// Height of a cell's text run in model units, or `None` when a host text style decides it.
pub fn resolve_text_height(
    cell: &TableCell,
    table_style: &TableStyle,
    options: &RenderOptions,
    unit_scale: f64,
) -> Option<f64> {
    if let Some(explicit) = options.override_text_height_mm.filter(|h| positive(*h)) {
        return Some(explicit * unit_scale);
    }
    if options.style_name_override.is_some() {
        return None;
    }
    let mm = cell
        .style
        .font_size_points
        .filter(|pt| positive(*pt))
        .or_else(|| table_style.default_font_size_points.filter(|pt| positive(*pt)))
        .map_or(FALLBACK_TEXT_HEIGHT_MM, |pt| pt * POINTS_TO_MM);
    Some(mm * unit_scale)
}

/// Character budget for a line of `inner_width` at `text_height` (both model units).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn char_budget(inner_width: f64, text_height: f64) -> usize {
    let glyph = text_height * GLYPH_ASPECT;
    if !positive(glyph) || !inner_width.is_finite() {
        return 1;
    }
    let budget = (inner_width / glyph).floor();
    budget.clamp(1.0, f64::from(u32::MAX)) as usize
}

/// Greedy word wrap on spaces.
///
/// A word joins the current line only while the joined length stays strictly below `budget`.
/// Words are never split. Existing line breaks are kept and each paragraph wraps on its own.
pub fn wrap_words(text: &str, budget: usize) -> String {
    let mut lines: Vec<String> = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            if current.is_empty() {
                current.push_str(word);
                current_len = word_len;
            } else if current_len + 1 + word_len >= budget {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
                current_len = word_len;
            } else {
                current.push(' ');
                current.push_str(word);
                current_len += 1 + word_len;
            }
        }

        lines.push(current);
    }

    lines.join("\n")
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
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

    #[test_case("alpha beta gamma", 10, "alpha\nbeta\ngamma" ; "exclusive bound splits")]
    #[test_case("alpha beta gamma", 11, "alpha beta\ngamma" ; "pair fits under eleven")]
    #[test_case("alpha beta gamma", 100, "alpha beta gamma" ; "everything fits")]
    #[test_case("extraordinarily long", 5, "extraordinarily\nlong" ; "long word not split")]
    #[test_case("a  b", 10, "a b" ; "runs of spaces collapse")]
    #[test_case("one two\nthree", 100, "one two\nthree" ; "existing breaks kept")]
    #[test_case("", 10, "" ; "empty")]
    fn test_wrap_words(input: &str, budget: usize, expected: &str) {
        assert_eq!(wrap_words(input, budget), expected);
    }

    #[test]
    fn test_char_budget() {
        // 15.5 / (2.5 * 0.6) = 10.33
        assert_eq!(char_budget(15.5, 2.5), 10);
        assert_eq!(char_budget(0.1, 2.5), 1);
        assert_eq!(char_budget(10.0, 0.0), 1);
    }

    #[test]
    fn test_height_explicit_override_wins() {
        let options = RenderOptions {
            override_text_height_mm: Some(4.0),
            style_name_override: Some("Notes".to_string()),
            ..RenderOptions::default()
        };
        let h = resolve_text_height(&TableCell::text("x"), &TableStyle::default(), &options, 0.5);
        assert_eq!(h, Some(2.0));
    }

    #[test]
    fn test_height_left_to_style() {
        let options = RenderOptions {
            style_name_override: Some("Notes".to_string()),
            ..RenderOptions::default()
        };
        let h = resolve_text_height(&TableCell::text("x"), &TableStyle::default(), &options, 1.0);
        assert_eq!(h, None);
    }

    #[test]
    fn test_height_from_source_fonts() {
        let mut cell = TableCell::text("x");
        let table_style = TableStyle {
            default_font_size_points: Some(72.0),
            ..TableStyle::default()
        };
        let options = RenderOptions::default();
        let from_table = resolve_text_height(&cell, &table_style, &options, 1.0).unwrap();
        assert!((from_table - 25.4).abs() < 1e-9);

        cell.style.font_size_points = Some(36.0);
        let from_cell = resolve_text_height(&cell, &table_style, &options, 1.0).unwrap();
        assert!((from_cell - 12.7).abs() < 1e-9);
    }

    #[test]
    fn test_height_fallback() {
        let h = resolve_text_height(
            &TableCell::text("x"),
            &TableStyle::default(),
            &RenderOptions::default(),
            2.0,
        );
        assert_eq!(h, Some(FALLBACK_TEXT_HEIGHT_MM * 2.0));
    }
}
