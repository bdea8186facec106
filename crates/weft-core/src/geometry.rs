//! Minimal planar/spatial primitives for routing.

use std::fmt;
use std::ops::{Add, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Point2) -> f64 {
        (other - self).length()
    }

    pub fn dot(self, other: Point2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn normalize(self) -> Point2 {
        let len = self.length();
        if len == 0.0 {
            return self;
        }
        Point2::new(self.x / len, self.y / len)
    }

    /// Bearing of `other` as seen from `self`, degrees in `[0, 360)`.
    pub fn bearing_to(self, other: Point2) -> f64 {
        let d = other - self;
        norm_deg(d.y.atan2(d.x).to_degrees())
    }
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn xy(self) -> Point2 {
        Point2::new(self.x, self.y)
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Point3) -> f64 {
        (other - self).length()
    }
}

impl Sub for Point2 {
    type Output = Point2;
    fn sub(self, rhs: Point2) -> Point2 {
        Point2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Add for Point2 {
    type Output = Point2;
    fn add(self, rhs: Point2) -> Point2 {
        Point2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point3 {
    type Output = Point3;
    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Add for Point3 {
    type Output = Point3;
    fn add(self, rhs: Point3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl fmt::Display for Point2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// Normalize an angle to `[0, 360)` degrees.
pub fn norm_deg(a: f64) -> f64 {
    let r = a.rem_euclid(360.0);
    // rem_euclid can return 360.0 when `a` is a tiny negative number.
    if r >= 360.0 { r - 360.0 } else { r }
}

/// Signed shortest angular difference `to - from`, in `(-180, 180]`.
pub fn ang_diff_deg(from: f64, to: f64) -> f64 {
    let d = norm_deg(to - from);
    if d > 180.0 { d - 360.0 } else { d }
}

/// Unsigned angle between two planar directions, in `[0, 180]`.
pub fn angle_between_deg(a: Point2, b: Point2) -> f64 {
    let (a, b) = (a.normalize(), b.normalize());
    a.dot(b).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Distance from `p` to the segment `a..b`, all in the XY plane.
pub fn dist_point_segment(p: Point2, a: Point2, b: Point2) -> f64 {
    let ab = b - a;
    let len2 = ab.dot(ab);
    if len2 == 0.0 {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    let closest = Point2::new(a.x + ab.x * t, a.y + ab.y * t);
    p.distance(closest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearings() {
        let c = Point2::new(0.0, 0.0);
        let bearing = |x, y| c.bearing_to(Point2::new(x, y));
        assert!((bearing(10.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((bearing(0.0, 10.0) - 90.0).abs() < 1e-9);
        assert!((bearing(-10.0, 0.0) - 180.0).abs() < 1e-9);
        assert!((bearing(0.0, -10.0) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn angular_difference_takes_the_short_way() {
        assert_eq!(ang_diff_deg(350.0, 10.0), 20.0);
        assert_eq!(ang_diff_deg(10.0, 350.0), -20.0);
        assert_eq!(ang_diff_deg(0.0, 180.0), 180.0);
        assert_eq!(ang_diff_deg(90.0, 90.0), 0.0);
    }

    #[test]
    fn normalization() {
        assert_eq!(norm_deg(-90.0), 270.0);
        assert_eq!(norm_deg(720.5), 0.5);
        assert!(norm_deg(-1e-18) < 360.0);
    }

    #[test]
    fn direction_change() {
        let east = Point2::new(1.0, 0.0);
        let north = Point2::new(0.0, 1.0);
        assert!((angle_between_deg(east, north) - 90.0).abs() < 1e-9);
        assert!(angle_between_deg(east, east) < 1e-9);
    }

    #[test]
    fn point_segment_distance() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(10.0, 0.0);
        assert_eq!(dist_point_segment(Point2::new(5.0, 3.0), a, b), 3.0);
        assert_eq!(dist_point_segment(Point2::new(-4.0, 0.0), a, b), 4.0);
        assert_eq!(dist_point_segment(Point2::new(13.0, 4.0), a, b), 5.0);
        // Degenerate segment.
        assert_eq!(dist_point_segment(Point2::new(3.0, 4.0), a, a), 5.0);
    }

    #[test]
    fn display_rounds_to_machine_resolution() {
        assert_eq!(
            Point3::new(1.0, 2.5, 0.1234).to_string(),
            "(1.000, 2.500, 0.123)"
        );
    }
}
