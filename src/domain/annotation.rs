//! Annotation records produced by the overlay
//!
//! All shapes store coordinates in full-resolution image space.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::geometry::{Point, Rect};

/// Identifier assigned by the overlay when a shape is created
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub u64);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shape geometry of an annotation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Rectangle(Rect),
    Polygon { points: Vec<Point> },
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Rectangle(_) => "rectangle",
            Shape::Polygon { .. } => "polygon",
        }
    }

    /// Bounding box of the shape
    pub fn bounds(&self) -> Rect {
        match self {
            Shape::Rectangle(rect) => *rect,
            Shape::Polygon { points } => Rect::bounding(points).unwrap_or_default(),
        }
    }

    /// Move the whole shape by the given offset
    pub fn translate(&mut self, dx: f64, dy: f64) {
        match self {
            Shape::Rectangle(rect) => *rect = rect.translate(dx, dy),
            Shape::Polygon { points } => {
                for p in points.iter_mut() {
                    *p = p.translate(dx, dy);
                }
            }
        }
    }
}

/// A user-drawn annotation as reported by the overlay
///
/// Opaque to the session core beyond logging and forwarding to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub shape: Shape,
    pub created: DateTime<Utc>,
}

impl Annotation {
    pub fn new(id: AnnotationId, shape: Shape) -> Self {
        Self {
            id,
            shape,
            created: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_translate_moves_every_vertex() {
        let mut shape = Shape::Polygon {
            points: vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(5.0, 8.0),
            ],
        };
        shape.translate(2.0, -1.0);
        let bounds = shape.bounds();
        assert_eq!((bounds.x, bounds.y), (2.0, -1.0));
        assert_eq!((bounds.width, bounds.height), (10.0, 8.0));
    }

    #[test]
    fn annotation_serializes_with_shape_tag() {
        let a = Annotation::new(
            AnnotationId(7),
            Shape::Rectangle(Rect::from_corners(
                Point::new(1.0, 2.0),
                Point::new(3.0, 4.0),
            )),
        );
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["shape"]["type"], "rectangle");
        assert_eq!(json["shape"]["width"], 2.0);
        assert_eq!(a.shape.name(), "rectangle");
    }
}
