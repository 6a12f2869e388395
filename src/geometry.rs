//! Integer rectangle primitives and matrix mapping.
//!
//! All dirty-region bookkeeping runs on integer rects in drawing space
//! (top-left origin, Y down). Canvas-facing APIs use float rects.

use euclid::Angle;
use euclid::default::{Point2D, Transform2D, Vector2D};

/// 2D transform used for canvas, sampling and mirror matrices.
pub type Matrix = Transform2D<f32>;

/// Axis-aligned integer rectangle. Degenerate (width or height <= 0) means empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const ZERO: Rect = Rect { left: 0, top: 0, width: 0, height: 0 };

    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self { left, top, width, height }
    }

    /// Builds from edges; empty input collapses to `ZERO`.
    pub fn from_ltrb(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        if right <= left || bottom <= top {
            return Rect::ZERO;
        }
        Rect { left, top, width: right - left, height: bottom - top }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        if self.is_empty() || other.is_empty() {
            return Rect::ZERO;
        }
        Rect::from_ltrb(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right().min(other.right()),
            self.bottom().min(other.bottom()),
        )
    }

    pub fn is_intersect(&self, other: &Rect) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Union bound. Empty rects are absorbing: they never inflate the result.
    pub fn join(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_ltrb(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn outset(&self, amount: i32) -> Rect {
        if self.is_empty() {
            return Rect::ZERO;
        }
        Rect::from_ltrb(
            self.left - amount,
            self.top - amount,
            self.right() + amount,
            self.bottom() + amount,
        )
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        if other.is_empty() {
            return true;
        }
        self.left <= other.left
            && self.top <= other.top
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }

    pub fn to_rect_f(&self) -> RectF {
        RectF::new(
            self.left as f32,
            self.top as f32,
            self.right() as f32,
            self.bottom() as f32,
        )
    }
}

/// Float rectangle (left, top, right, bottom) for canvas APIs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn from_wh(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_valid(&self) -> bool {
        self.right > self.left && self.bottom > self.top
    }

    pub fn round_out(&self) -> Rect {
        Rect::from_ltrb(
            self.left.floor() as i32,
            self.top.floor() as i32,
            self.right.ceil() as i32,
            self.bottom.ceil() as i32,
        )
    }
}

/// Maps a rect through a matrix and returns the rounded-out bounding box of
/// the transformed corners.
pub fn map_rect(rect: &Rect, matrix: &Matrix) -> Rect {
    if rect.is_empty() {
        return Rect::ZERO;
    }
    let corners = [
        Point2D::new(rect.left as f32, rect.top as f32),
        Point2D::new(rect.right() as f32, rect.top as f32),
        Point2D::new(rect.left as f32, rect.bottom() as f32),
        Point2D::new(rect.right() as f32, rect.bottom() as f32),
    ];
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for corner in corners {
        let p = matrix.transform_point(corner);
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Rect::from_ltrb(
        min_x.floor() as i32,
        min_y.floor() as i32,
        max_x.ceil() as i32,
        max_y.ceil() as i32,
    )
}

/// Canvas-order composition: the result applies `op` to geometry first,
/// then the previous `total`.
pub fn concat(total: &Matrix, op: &Matrix) -> Matrix {
    op.then(total)
}

pub fn translation(dx: f32, dy: f32) -> Matrix {
    Matrix::translation(dx, dy)
}

pub fn scaling(sx: f32, sy: f32) -> Matrix {
    Matrix::scale(sx, sy)
}

/// Rotation in degrees about a pivot point.
pub fn rotation_about(degrees: f32, px: f32, py: f32) -> Matrix {
    Matrix::translation(-px, -py)
        .then_rotate(Angle::degrees(degrees))
        .then_translate(Vector2D::new(px, py))
}

/// Scale-plus-translate matrix used for virtual screen sampling.
pub fn scale_translate(scale: f32, tx: f32, ty: f32) -> Matrix {
    Matrix::scale(scale, scale).then_translate(Vector2D::new(tx, ty))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rect_absorbing_for_join() {
        let a = Rect::new(10, 10, 100, 100);
        assert_eq!(a.join(&Rect::ZERO), a);
        assert_eq!(Rect::ZERO.join(&a), a);
        assert_eq!(Rect::new(5, 5, 0, 10).join(&a), a);
    }

    #[test]
    fn test_intersect_disjoint_is_empty() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 10, 10);
        assert!(a.intersect(&b).is_empty());
        assert!(!a.is_intersect(&b));
    }

    #[test]
    fn test_map_rect_through_scale_translate() {
        let m = scale_translate(0.5, 100.0, 50.0);
        let mapped = map_rect(&Rect::new(10, 20, 40, 60), &m);
        assert_eq!(mapped, Rect::new(105, 60, 20, 30));
    }

    #[test]
    fn test_rotation_about_pivot_keeps_pivot_fixed() {
        let m = rotation_about(90.0, 50.0, 50.0);
        let p = m.transform_point(euclid::default::Point2D::new(50.0, 50.0));
        assert!((p.x - 50.0).abs() < 1e-3);
        assert!((p.y - 50.0).abs() < 1e-3);
    }
}
