//! Planar geometry aliases for the room model.
//!
//! The room is a 2D plane in metres. Anchors and fused positions share the
//! same frame: origin and axes are whatever the installer measured.

use nalgebra::{Point2, Vector2};

// ===== Room Frame =====
pub type RoomPoint = Point2<f64>;
pub type RoomVec = Vector2<f64>;

/// Counter-clockwise perpendicular of `v`.
pub fn perp_ccw(v: &RoomVec) -> RoomVec {
    RoomVec::new(-v.y, v.x)
}

pub fn is_finite_point(p: &RoomPoint) -> bool {
    p.x.is_finite() && p.y.is_finite()
}

pub fn midpoint(a: &RoomPoint, b: &RoomPoint) -> RoomPoint {
    nalgebra::center(a, b)
}
