use serde::{Deserialize, Serialize};

use super::{HAlign, VAlign};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const ORIGIN: Point2D = Point2D { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Point2D,
    pub end: Point2D,
}

/// Which point of the text block sits on the run's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextJustification {
    pub horizontal: HAlign,
    pub vertical: VAlign,
}

/// A positioned, justified text block; `content` may contain `\n` after wrapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    pub origin: Point2D,
    pub content: String,
    /// Model-unit height; `None` leaves the height to the referenced text style.
    pub height: Option<f64>,
    pub justification: TextJustification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

/// One drawable element of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Primitive {
    Line(LineSegment),
    Text(TextRun),
}

/// Geometry produced by the layout engine, in the table's local frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutOutput {
    pub lines: Vec<LineSegment>,
    pub texts: Vec<TextRun>,
    pub width: f64,
    pub height: f64,
}

impl LayoutOutput {
    /// Lines first, then text, in emission order.
    pub fn primitives(&self) -> Vec<Primitive> {
        self.lines
            .iter()
            .copied()
            .map(Primitive::Line)
            .chain(self.texts.iter().cloned().map(Primitive::Text))
            .collect()
    }
}

/// A 2D affine transform: `x' = a·x + c·y + e`, `y' = b·x + d·y + f`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            e: dx,
            f: dy,
            ..Self::identity()
        }
    }

    /// Counter-clockwise rotation about the origin.
    pub fn rotation(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn scaling(factor: f64) -> Self {
        Self {
            a: factor,
            d: factor,
            ..Self::identity()
        }
    }

    /// Apply `self` first, then `next`.
    pub fn then(&self, next: &Transform) -> Transform {
        Transform {
            a: next.a * self.a + next.c * self.b,
            b: next.b * self.a + next.d * self.b,
            c: next.a * self.c + next.c * self.d,
            d: next.b * self.c + next.d * self.d,
            e: next.a * self.e + next.c * self.f + next.e,
            f: next.b * self.e + next.d * self.f + next.f,
        }
    }

    pub fn apply(&self, p: Point2D) -> Point2D {
        Point2D {
            x: self.a * p.x + self.c * p.y + self.e,
            y: self.b * p.x + self.d * p.y + self.f,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_compose() {
        let t = Transform::scaling(2.0).then(&Transform::translation(10.0, 5.0));
        let p = t.apply(Point2D::new(1.0, 1.0));
        assert_eq!(p, Point2D::new(12.0, 7.0));
    }

    #[test]
    fn test_rotation_quarter_turn() {
        let p = Transform::rotation(90.0).apply(Point2D::new(1.0, 0.0));
        assert!(p.x.abs() < 1e-12);
        assert!((p.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_primitives_order() {
        let out = LayoutOutput {
            lines: vec![LineSegment {
                start: Point2D::ORIGIN,
                end: Point2D::new(1.0, 0.0),
            }],
            texts: vec![TextRun {
                origin: Point2D::ORIGIN,
                content: "x".to_string(),
                height: Some(1.0),
                justification: TextJustification {
                    horizontal: HAlign::Left,
                    vertical: VAlign::Middle,
                },
                style_ref: None,
                font_family: None,
                bold: false,
                italic: false,
            }],
            width: 1.0,
            height: 1.0,
        };
        let prims = out.primitives();
        assert!(matches!(prims.first(), Some(Primitive::Line(_))));
        assert!(matches!(prims.get(1), Some(Primitive::Text(_))));
    }
}
