//! Drawable shapes kept in world coordinates.
//!
//! A [`Primitive`] never stores pixel positions; the surface renders it
//! through the current [`CoordinateTransform`] each time it is drawn, so zoom
//! and pan only need a re-render.

use crate::color::Color;
use crate::error::{GraphError, Result};
use crate::transform::CoordinateTransform;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

const UNSUPPORTED_METHOD: &str = "Object doesn't support operation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arrow {
    First,
    Last,
    Both,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontFace {
    Helvetica,
    Arial,
    Courier,
    TimesRoman,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontStyle {
    Normal,
    Bold,
    Italic,
    BoldItalic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Font {
    pub face: FontFace,
    pub size: u8,
    pub style: FontStyle,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            face: FontFace::Helvetica,
            size: 12,
            style: FontStyle::Normal,
        }
    }
}

/// Display configuration of a primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub outline: Color,
    pub fill: Option<Color>,
    pub width: f64,
    pub arrow: Arrow,
    pub font: Font,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            outline: Color::black(),
            fill: None,
            width: 1.0,
            arrow: Arrow::None,
            font: Font::default(),
        }
    }
}

/// World-space geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point(Point2<f64>),
    Line(Point2<f64>, Point2<f64>),
    Rectangle(Point2<f64>, Point2<f64>),
    Oval(Point2<f64>, Point2<f64>),
    Circle { center: Point2<f64>, radius: f64 },
    Polygon(Vec<Point2<f64>>),
    Text { anchor: Point2<f64>, text: String },
}

/// Pixel-space geometry handed to the host canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScreenShape {
    Point { x: i64, y: i64 },
    Line { x1: i64, y1: i64, x2: i64, y2: i64 },
    Rectangle { x1: i64, y1: i64, x2: i64, y2: i64 },
    Oval { x1: i64, y1: i64, x2: i64, y2: i64 },
    Polygon { points: Vec<(i64, i64)> },
    Text { x: i64, y: i64, text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    shape: Shape,
    style: Style,
}

impl Primitive {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            style: Style::default(),
        }
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::new(Shape::Point(Point2::new(x, y)))
    }

    pub fn line(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(Shape::Line(Point2::new(x1, y1), Point2::new(x2, y2)))
    }

    pub fn rectangle(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(Shape::Rectangle(Point2::new(x1, y1), Point2::new(x2, y2)))
    }

    pub fn oval(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(Shape::Oval(Point2::new(x1, y1), Point2::new(x2, y2)))
    }

    pub fn circle(x: f64, y: f64, radius: f64) -> Self {
        Self::new(Shape::Circle {
            center: Point2::new(x, y),
            radius,
        })
    }

    pub fn polygon(points: &[(f64, f64)]) -> Self {
        Self::new(Shape::Polygon(
            points.iter().map(|&(x, y)| Point2::new(x, y)).collect(),
        ))
    }

    pub fn text(x: f64, y: f64, text: impl Into<String>) -> Self {
        Self::new(Shape::Text {
            anchor: Point2::new(x, y),
            text: text.into(),
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    /// Builder form of [`Primitive::set_fill`] and [`Primitive::set_outline`]
    /// for shapes that accept both.
    pub fn with_color(mut self, color: Color) -> Self {
        if !matches!(self.shape, Shape::Text { .. } | Shape::Point(_) | Shape::Line(..)) {
            self.style.fill = Some(color.clone());
        }
        self.style.outline = color;
        self
    }

    pub fn with_outline(mut self, color: Color) -> Self {
        self.style.outline = color;
        self
    }

    /// Interior color. Lines, points and text have no interior, so this sets
    /// their stroke (text) color instead.
    pub fn set_fill(&mut self, color: Color) {
        match self.shape {
            Shape::Point(_) | Shape::Line(..) | Shape::Text { .. } => self.style.outline = color,
            _ => self.style.fill = Some(color),
        }
    }

    pub fn set_outline(&mut self, color: Color) -> Result<()> {
        if let Shape::Text { .. } = self.shape {
            return Err(GraphError::config(UNSUPPORTED_METHOD));
        }
        self.style.outline = color;
        Ok(())
    }

    pub fn set_width(&mut self, width: f64) -> Result<()> {
        if matches!(self.shape, Shape::Text { .. } | Shape::Point(_)) {
            return Err(GraphError::config(UNSUPPORTED_METHOD));
        }
        if !width.is_finite() || width < 0.0 {
            return Err(GraphError::config(format!("Illegal option value: width {width}")));
        }
        self.style.width = width;
        Ok(())
    }

    pub fn set_arrow(&mut self, arrow: Arrow) -> Result<()> {
        if !matches!(self.shape, Shape::Line(..)) {
            return Err(GraphError::config(UNSUPPORTED_METHOD));
        }
        self.style.arrow = arrow;
        Ok(())
    }

    pub fn set_text(&mut self, value: impl Into<String>) -> Result<()> {
        match &mut self.shape {
            Shape::Text { text, .. } => {
                *text = value.into();
                Ok(())
            }
            _ => Err(GraphError::config(UNSUPPORTED_METHOD)),
        }
    }

    pub fn set_text_color(&mut self, color: Color) -> Result<()> {
        self.text_only()?;
        self.style.outline = color;
        Ok(())
    }

    pub fn set_face(&mut self, face: FontFace) -> Result<()> {
        self.text_only()?;
        self.style.font.face = face;
        Ok(())
    }

    pub fn set_size(&mut self, size: u8) -> Result<()> {
        self.text_only()?;
        if !(5..=36).contains(&size) {
            return Err(GraphError::config(format!("Illegal option value: font size {size}")));
        }
        self.style.font.size = size;
        Ok(())
    }

    pub fn set_font_style(&mut self, style: FontStyle) -> Result<()> {
        self.text_only()?;
        self.style.font.style = style;
        Ok(())
    }

    fn text_only(&self) -> Result<()> {
        match self.shape {
            Shape::Text { .. } => Ok(()),
            _ => Err(GraphError::config(UNSUPPORTED_METHOD)),
        }
    }

    /// Translates the geometry by a world-space offset.
    pub fn move_by(&mut self, dx: f64, dy: f64) {
        let offset = Vector2::new(dx, dy);
        match &mut self.shape {
            Shape::Point(p) => *p += offset,
            Shape::Line(a, b) | Shape::Rectangle(a, b) | Shape::Oval(a, b) => {
                *a += offset;
                *b += offset;
            }
            Shape::Circle { center, .. } => *center += offset,
            Shape::Polygon(points) => points.iter_mut().for_each(|p| *p += offset),
            Shape::Text { anchor, .. } => *anchor += offset,
        }
    }

    /// Renders the geometry through `transform`. Circles become ovals whose
    /// bounding box is the circle's world-space box.
    pub fn render(&self, transform: &CoordinateTransform) -> ScreenShape {
        let screen = |p: &Point2<f64>| transform.to_screen(p.x, p.y);
        match &self.shape {
            Shape::Point(p) => {
                let (x, y) = screen(p);
                ScreenShape::Point { x, y }
            }
            Shape::Line(a, b) => {
                let ((x1, y1), (x2, y2)) = (screen(a), screen(b));
                ScreenShape::Line { x1, y1, x2, y2 }
            }
            Shape::Rectangle(a, b) => {
                let ((x1, y1), (x2, y2)) = (screen(a), screen(b));
                ScreenShape::Rectangle { x1, y1, x2, y2 }
            }
            Shape::Oval(a, b) => {
                let ((x1, y1), (x2, y2)) = (screen(a), screen(b));
                ScreenShape::Oval { x1, y1, x2, y2 }
            }
            Shape::Circle { center, radius } => {
                let (x1, y1) = transform.to_screen(center.x - radius, center.y - radius);
                let (x2, y2) = transform.to_screen(center.x + radius, center.y + radius);
                ScreenShape::Oval { x1, y1, x2, y2 }
            }
            Shape::Polygon(points) => ScreenShape::Polygon {
                points: points.iter().map(screen).collect(),
            },
            Shape::Text { anchor, text } => {
                let (x, y) = screen(anchor);
                ScreenShape::Text {
                    x,
                    y,
                    text: text.clone(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> CoordinateTransform {
        CoordinateTransform::new(200, 200, Point2::new(-10.0, -10.0), Point2::new(10.0, 10.0))
            .expect("transform")
    }

    #[test]
    fn renders_through_transform() {
        let line = Primitive::line(-10.0, 10.0, 10.0, -10.0);
        assert_eq!(
            line.render(&transform()),
            ScreenShape::Line {
                x1: 0,
                y1: 0,
                x2: 200,
                y2: 200
            }
        );
        let circle = Primitive::circle(0.0, 0.0, 1.0);
        assert_eq!(
            circle.render(&transform()),
            ScreenShape::Oval {
                x1: 90,
                y1: 110,
                x2: 110,
                y2: 90
            }
        );
    }

    #[test]
    fn rerender_after_bounds_change_keeps_world_geometry() {
        let point = Primitive::point(5.0, 5.0);
        let mut zoomed = transform();
        zoomed
            .set_bounds(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0))
            .unwrap();
        assert_eq!(point.render(&zoomed), ScreenShape::Point { x: 100, y: 100 });
        assert_eq!(point.shape(), &Shape::Point(Point2::new(5.0, 5.0)));
    }

    #[test]
    fn move_by_translates_every_vertex() {
        let mut polygon = Primitive::polygon(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
        polygon.move_by(1.0, 2.0);
        assert_eq!(
            polygon.shape(),
            &Shape::Polygon(vec![
                Point2::new(1.0, 2.0),
                Point2::new(2.0, 2.0),
                Point2::new(1.0, 3.0)
            ])
        );
    }

    #[test]
    fn unsupported_options_are_rejected() {
        let mut text = Primitive::text(0.0, 0.0, "label");
        assert!(text.set_width(2.0).is_err());
        assert!(text.set_outline(Color::red()).is_err());
        assert!(text.set_size(40).is_err());
        text.set_size(20).expect("size in range");
        text.set_text_color(Color::blue()).expect("text color");
        assert_eq!(text.style().outline, Color::blue());

        let mut line = Primitive::line(0.0, 0.0, 1.0, 1.0);
        assert!(line.set_width(-1.0).is_err());
        assert!(line.set_face(FontFace::Arial).is_err());
        line.set_arrow(Arrow::Last).expect("arrow on line");
        line.set_fill(Color::red());
        assert_eq!(line.style().outline, Color::red());
        assert!(Primitive::point(0.0, 0.0).set_arrow(Arrow::Both).is_err());
    }

    #[test]
    fn with_color_fills_closed_shapes_only() {
        let oval = Primitive::oval(0.0, 0.0, 1.0, 1.0).with_color(Color::red());
        assert_eq!(oval.style().fill, Some(Color::red()));
        let line = Primitive::line(0.0, 0.0, 1.0, 1.0).with_color(Color::red());
        assert_eq!(line.style().fill, None);
        assert_eq!(line.style().outline, Color::red());
    }
}
