//! 2D collision shapes.
//!
//! Shapes are stored without a position; the position comes from the owning
//! entity each time the shape is placed, so a collider always follows its
//! entity.

use bevy::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Point,
    Circle { radius: f32 },
    /// Axis-aligned, centred on the position.
    Rectangle { width: f32, height: f32 },
}

impl Shape {
    pub fn circle(radius: f32) -> Self {
        Shape::Circle { radius }
    }

    pub fn rectangle(width: f32, height: f32) -> Self {
        Shape::Rectangle { width, height }
    }

    pub fn at(self, center: Vec2) -> PlacedShape {
        PlacedShape { shape: self, center }
    }

    pub fn size(&self) -> Vec2 {
        match *self {
            Shape::Point => Vec2::ONE,
            Shape::Circle { radius } => Vec2::splat(radius * 2.0),
            Shape::Rectangle { width, height } => Vec2::new(width, height),
        }
    }
}

/// A shape resolved at a world position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedShape {
    pub shape: Shape,
    pub center: Vec2,
}

impl PlacedShape {
    /// Axis-aligned bounds used for quad-tree placement.
    pub fn bounds(&self) -> Rect {
        match self.shape {
            Shape::Point => Rect::from_center_size(self.center, Vec2::ZERO),
            other => Rect::from_center_size(self.center, other.size()),
        }
    }

    pub fn intersects(&self, other: &PlacedShape) -> bool {
        use Shape::*;
        match (self.shape, other.shape) {
            (Point, Point) => self.center == other.center,
            (Point, Circle { radius }) => point_intersects_circle(self.center, other.center, radius),
            (Circle { radius }, Point) => point_intersects_circle(other.center, self.center, radius),
            (Point, Rectangle { .. }) => rect_contains_point(&other.bounds(), self.center),
            (Rectangle { .. }, Point) => rect_contains_point(&self.bounds(), other.center),
            (Circle { radius: a }, Circle { radius: b }) => {
                self.center.distance(other.center) < a + b
            }
            (Circle { radius }, Rectangle { width, height }) => {
                circle_intersects_rect(self.center, radius, other.center, Vec2::new(width, height) / 2.0)
            }
            (Rectangle { width, height }, Circle { radius }) => {
                circle_intersects_rect(other.center, radius, self.center, Vec2::new(width, height) / 2.0)
            }
            (Rectangle { .. }, Rectangle { .. }) => rect_intersects_rect(&self.bounds(), &other.bounds()),
        }
    }

    /// Whether `other` lies entirely inside this shape. Only rectangles and
    /// circles can contain anything; a circle only contains points.
    pub fn contains(&self, other: &PlacedShape) -> bool {
        match (self.shape, other.shape) {
            (Shape::Rectangle { .. }, Shape::Point) => rect_contains_point(&self.bounds(), other.center),
            (Shape::Rectangle { .. }, _) => rect_contains_rect(&self.bounds(), &other.bounds()),
            (Shape::Circle { radius }, Shape::Point) => {
                point_intersects_circle(other.center, self.center, radius)
            }
            _ => false,
        }
    }
}

pub fn point_intersects_circle(point: Vec2, center: Vec2, radius: f32) -> bool {
    point.distance(center) <= radius
}

pub fn rect_contains_point(rect: &Rect, point: Vec2) -> bool {
    point.x >= rect.min.x && point.x <= rect.max.x && point.y >= rect.min.y && point.y <= rect.max.y
}

pub fn rect_contains_rect(outer: &Rect, inner: &Rect) -> bool {
    rect_contains_point(outer, inner.min) && rect_contains_point(outer, inner.max)
}

/// Touching edges count as an intersection.
pub fn rect_intersects_rect(a: &Rect, b: &Rect) -> bool {
    !(b.min.x > a.max.x || b.max.x < a.min.x || b.max.y < a.min.y || b.min.y > a.max.y)
}

fn circle_intersects_rect(circle: Vec2, radius: f32, rect_center: Vec2, half: Vec2) -> bool {
    let distance = (circle - rect_center).abs();

    if distance.x > half.x + radius || distance.y > half.y + radius {
        return false;
    }

    if distance.x <= half.x || distance.y <= half.y {
        return true;
    }

    let corner = distance - half;
    corner.length_squared() <= radius * radius
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_circle_requires_overlap() {
        let a = Shape::circle(5.0).at(Vec2::ZERO);
        assert!(a.intersects(&Shape::circle(5.0).at(Vec2::new(9.0, 0.0))));
        // Tangent circles do not intersect.
        assert!(!a.intersects(&Shape::circle(5.0).at(Vec2::new(10.0, 0.0))));
    }

    #[test]
    fn test_circle_rect_corner() {
        let rect = Shape::rectangle(10.0, 10.0).at(Vec2::ZERO);
        // Diagonal from the (5, 5) corner at distance ~2.83.
        assert!(rect.intersects(&Shape::circle(3.0).at(Vec2::new(7.0, 7.0))));
        assert!(!rect.intersects(&Shape::circle(2.0).at(Vec2::new(7.0, 7.0))));
        // Along an edge the radius alone decides.
        assert!(Shape::circle(2.0).at(Vec2::new(6.5, 0.0)).intersects(&rect));
    }

    #[test]
    fn test_rect_rect_touching_counts() {
        let a = Shape::rectangle(10.0, 10.0).at(Vec2::ZERO);
        assert!(a.intersects(&Shape::rectangle(10.0, 10.0).at(Vec2::new(10.0, 0.0))));
        assert!(!a.intersects(&Shape::rectangle(10.0, 10.0).at(Vec2::new(10.1, 0.0))));
    }

    #[test]
    fn test_point_tests() {
        let p = Shape::Point.at(Vec2::new(3.0, 4.0));
        assert!(p.intersects(&Shape::circle(5.0).at(Vec2::ZERO)));
        assert!(Shape::rectangle(6.0, 8.0).at(Vec2::ZERO).intersects(&p));
        assert!(!p.intersects(&Shape::rectangle(4.0, 4.0).at(Vec2::ZERO)));
    }

    #[test]
    fn test_containment() {
        let outer = Shape::rectangle(100.0, 100.0).at(Vec2::ZERO);
        assert!(outer.contains(&Shape::circle(10.0).at(Vec2::new(40.0, 0.0))));
        assert!(!outer.contains(&Shape::circle(10.0).at(Vec2::new(45.0, 0.0))));
        assert!(outer.contains(&Shape::Point.at(Vec2::new(-50.0, 50.0))));
        let circle = Shape::circle(10.0).at(Vec2::ZERO);
        assert!(circle.contains(&Shape::Point.at(Vec2::new(0.0, 10.0))));
        assert!(!circle.contains(&Shape::rectangle(1.0, 1.0).at(Vec2::ZERO)));
    }
}
