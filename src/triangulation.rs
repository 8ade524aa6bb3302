//! Two-anchor position estimation.
//!
//! Each radar reports a range to the person. With two anchors the person lies on
//! the intersection of two circles; the mirror solution on the far side of the
//! baseline is discarded using the configured room side.

use log::warn;

use crate::config::RoomSide;
use crate::types::{is_finite_point, midpoint, perp_ccw, RoomPoint};

/// Anchors closer than this are treated as coincident.
const MIN_BASELINE_M: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct Triangulator {
    anchor_a: RoomPoint,
    anchor_b: RoomPoint,
    side: RoomSide,
    last_valid: Option<RoomPoint>,
}

impl Triangulator {
    pub fn new(anchor_a: RoomPoint, anchor_b: RoomPoint, side: RoomSide) -> Self {
        Self {
            anchor_a,
            anchor_b,
            side,
            last_valid: None,
        }
    }

    pub fn last_valid(&self) -> Option<RoomPoint> {
        self.last_valid
    }

    /// Locate the target from its ranges to anchor A and anchor B.
    ///
    /// Never returns a non-finite point. Degenerate input yields the last valid
    /// position, or the anchor midpoint before any position has been computed.
    pub fn locate(&mut self, d_a: f64, d_b: f64) -> RoomPoint {
        match intersect(&self.anchor_a, &self.anchor_b, d_a, d_b, self.side) {
            Some(p) => {
                self.last_valid = Some(p);
                p
            }
            None => {
                let fallback = self
                    .last_valid
                    .unwrap_or_else(|| midpoint(&self.anchor_a, &self.anchor_b));
                warn!(
                    "Degenerate triangulation (d_a={}, d_b={}), using ({:.2}, {:.2})",
                    d_a, d_b, fallback.x, fallback.y
                );
                fallback
            }
        }
    }
}

/// Circle-circle intersection. `None` on degenerate geometry.
///
/// When the circles do not meet, the point where the radical line crosses the
/// baseline is returned (the perpendicular offset clamps to zero).
pub fn intersect(
    a: &RoomPoint,
    b: &RoomPoint,
    d_a: f64,
    d_b: f64,
    side: RoomSide,
) -> Option<RoomPoint> {
    if !d_a.is_finite() || !d_b.is_finite() || !is_finite_point(a) || !is_finite_point(b) {
        return None;
    }

    let baseline = b - a;
    let span = baseline.norm();
    if span < MIN_BASELINE_M {
        return None;
    }
    let u = baseline / span;

    let along = (d_a * d_a - d_b * d_b + span * span) / (2.0 * span);
    let h_sq = d_a * d_a - along * along;
    let h = if h_sq > 0.0 { h_sq.sqrt() } else { 0.0 };

    let offset = match side {
        RoomSide::Left => perp_ccw(&u) * h,
        RoomSide::Right => -perp_ccw(&u) * h,
    };
    let p = a + u * along + offset;

    is_finite_point(&p).then_some(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn anchors() -> (RoomPoint, RoomPoint) {
        (RoomPoint::new(0.0, 0.0), RoomPoint::new(4.0, 0.0))
    }

    #[test]
    fn test_symmetric_intersection() {
        let (a, b) = anchors();
        // 3-4-5 triangle on each side of the midpoint
        let p = intersect(&a, &b, 5.0_f64.sqrt(), 5.0_f64.sqrt(), RoomSide::Left).unwrap();
        assert_relative_eq!(p.x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-9);

        let p = intersect(&a, &b, 5.0_f64.sqrt(), 5.0_f64.sqrt(), RoomSide::Right).unwrap();
        assert_relative_eq!(p.y, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_recovers_known_point() {
        let a = RoomPoint::new(0.0, 0.5);
        let b = RoomPoint::new(3.0, 0.5);
        let target = RoomPoint::new(1.2, 2.1);
        let d_a = (target - a).norm();
        let d_b = (target - b).norm();
        let p = intersect(&a, &b, d_a, d_b, RoomSide::Left).unwrap();
        assert_relative_eq!(p.x, target.x, epsilon = 1e-9);
        assert_relative_eq!(p.y, target.y, epsilon = 1e-9);
    }

    #[test]
    fn test_disjoint_circles_clamp_to_baseline() {
        let (a, b) = anchors();
        let p = intersect(&a, &b, 1.0, 1.0, RoomSide::Left).unwrap();
        assert_relative_eq!(p.x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_coincident_anchors_rejected() {
        let a = RoomPoint::new(1.0, 1.0);
        assert!(intersect(&a, &a, 1.0, 1.0, RoomSide::Left).is_none());
    }

    #[test]
    fn test_non_finite_rejected() {
        let (a, b) = anchors();
        assert!(intersect(&a, &b, f64::NAN, 1.0, RoomSide::Left).is_none());
        assert!(intersect(&a, &b, 1.0, f64::INFINITY, RoomSide::Left).is_none());
    }

    #[test]
    fn test_fallback_midpoint_then_last_valid() {
        let (a, b) = anchors();
        let mut tri = Triangulator::new(a, b, RoomSide::Left);

        let p = tri.locate(f64::NAN, 1.0);
        assert_relative_eq!(p.x, 2.0);
        assert_relative_eq!(p.y, 0.0);
        assert!(tri.last_valid().is_none());

        let good = tri.locate(5.0_f64.sqrt(), 5.0_f64.sqrt());
        let p = tri.locate(f64::NAN, f64::NAN);
        assert_relative_eq!(p.x, good.x);
        assert_relative_eq!(p.y, good.y);
    }

    #[test]
    fn test_degenerate_triangulator_never_yields_nan() {
        let a = RoomPoint::new(1.0, 1.0);
        let mut tri = Triangulator::new(a, a, RoomSide::Left);
        let p = tri.locate(2.0, 3.0);
        assert!(p.x.is_finite() && p.y.is_finite());
    }
}
