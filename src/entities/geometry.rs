//! Integer rectangles in host coordinates.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle, `right`/`bottom` exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Rect from origin and size.
    pub const fn from_size(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self::new(left, top, left + width, top + height)
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Area as i64 to avoid overflow on large hosts.
    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn center_x(&self) -> f32 {
        (self.left as f32 + self.right as f32) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.top as f32 + self.bottom as f32) / 2.0
    }

    /// Overlap of two rects, None when they do not intersect.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if r.is_empty() { None } else { Some(r) }
    }

    /// Smallest rect covering both. Empty rects are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect_partial() {
        let viewport = Rect::from_size(0, 0, 100, 100);
        let slot = Rect::from_size(0, 50, 100, 100);
        let visible = slot.intersect(&viewport).unwrap();
        assert_eq!(visible, Rect::new(0, 50, 100, 100));
        assert_eq!(visible.area() * 2, slot.area());
    }

    #[test]
    fn test_intersect_disjoint() {
        let a = Rect::from_size(0, 0, 10, 10);
        let b = Rect::from_size(20, 20, 10, 10);
        assert!(a.intersect(&b).is_none());
        // Touching edges do not overlap
        assert!(a.intersect(&Rect::from_size(10, 0, 10, 10)).is_none());
    }

    #[test]
    fn test_union_ignores_empty() {
        let a = Rect::from_size(5, 5, 10, 10);
        assert_eq!(Rect::default().union(&a), a);
        assert_eq!(a.union(&Rect::from_size(0, 0, 1, 1)), Rect::new(0, 0, 15, 15));
    }
}
