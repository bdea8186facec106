//! The authored 3D fiber polyline.
//!
//! The fiber is laid progressively as layers print upward, so between
//! consecutive waypoints it may only move sideways or up, never down. The
//! first waypoint is the initial anchor on what will become an exterior
//! surface of the part.

use crate::geometry::Point3;
use thiserror::Error;

const Z_EPS: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct FiberPath {
    points: Vec<Point3>,
}

#[derive(Debug, Error)]
pub enum InvalidFiberPathError {
    #[error("fiber path needs at least two waypoints, got {0}")]
    TooShort(usize),

    #[error("fiber segment {index} from {from} to {to} descends by {drop:.3} mm")]
    Descending {
        index: usize,
        from: Point3,
        to: Point3,
        drop: f64,
    },

    #[error("fiber segment {index} at {at} has zero length")]
    Degenerate { index: usize, at: Point3 },
}

impl FiberPath {
    /// Validate an ordered waypoint list. Segments shorter than
    /// `min_segment` are merged into their successor first; the carrier
    /// cannot place features below that scale.
    pub fn parse(
        points: Vec<Point3>,
        min_segment: f64,
    ) -> Result<Self, InvalidFiberPathError> {
        if points.len() < 2 {
            return Err(InvalidFiberPathError::TooShort(points.len()));
        }

        let last = points.len() - 1;
        let mut merged: Vec<Point3> = Vec::with_capacity(points.len());
        for (i, p) in points.iter().copied().enumerate() {
            match merged.last() {
                Some(prev) if i != last && prev.distance(p) < min_segment => {}
                Some(prev) if i == last && prev.distance(p) < min_segment => {
                    // The endpoint always survives; drop its predecessor
                    // instead, unless that would erase the start anchor.
                    if merged.len() > 1 {
                        merged.pop();
                    }
                    merged.push(p);
                }
                _ => merged.push(p),
            }
        }

        if merged.len() < 2 {
            return Err(InvalidFiberPathError::TooShort(merged.len()));
        }

        for (index, pair) in merged.windows(2).enumerate() {
            let (from, to) = (pair[0], pair[1]);
            if from.distance(to) <= Z_EPS {
                return Err(InvalidFiberPathError::Degenerate { index, at: from });
            }
            if to.z < from.z - Z_EPS {
                return Err(InvalidFiberPathError::Descending {
                    index,
                    from,
                    to,
                    drop: from.z - to.z,
                });
            }
        }

        Ok(Self { points: merged })
    }

    pub fn waypoints(&self) -> &[Point3] {
        &self.points
    }

    pub fn segments(&self) -> impl Iterator<Item = (Point3, Point3)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }

    /// Total polyline length.
    pub fn length(&self) -> f64 {
        self.segments().map(|(a, b)| a.distance(b)).sum()
    }
}
