//! Ring-carrier kinematics.
//!
//! The carrier rides on a ring of fixed radius centered above the bed. Its
//! feed point in world space is a pure function of the ring angle. Angles
//! are unbounded degrees so winding direction and accumulated rotation stay
//! unambiguous across a whole routing run.

use crate::geometry::{Point2, ang_diff_deg, norm_deg};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct RingGeometry {
    pub center: Point2,
    pub radius: f64,
    /// Closest distance from the ring center the feed point can serve.
    pub min_reach: f64,
    /// Farthest distance from the ring center the feed point can serve.
    pub max_reach: f64,
    /// Angle the ring is homed to before a run, degrees.
    pub home_angle: f64,
    /// Bearings the carrier may neither park in nor sweep through (the
    /// region behind the print-head mount).
    pub keep_out: Option<KeepOut>,
    /// Gear train, used to derive steps-per-degree for the rotary axis.
    pub motor_gear_teeth: u32,
    pub ring_gear_teeth: u32,
    /// Motor steps per full motor rotation, microstepping included.
    pub steps_per_rotation: u32,
}

/// An angular interval `[from, to]` swept counterclockwise, degrees.
#[derive(Debug, Clone, Copy)]
pub struct KeepOut {
    pub from: f64,
    pub to: f64,
}

impl KeepOut {
    /// Arc width in degrees, in `(0, 360)`.
    pub fn width(&self) -> f64 {
        let w = norm_deg(self.to - self.from);
        if w == 0.0 { 360.0 } else { w }
    }

    pub fn contains(&self, bearing: f64) -> bool {
        norm_deg(bearing - self.from) <= self.width()
    }
}

#[derive(Debug, Error)]
pub enum UnreachableError {
    #[error(
        "point ({x:.3}, {y:.3}) is {distance:.3} mm from the ring center, \
         outside the carrier's reach [{min:.3}, {max:.3}]"
    )]
    OutsideReach {
        x: f64,
        y: f64,
        distance: f64,
        min: f64,
        max: f64,
    },

    #[error(
        "point ({x:.3}, {y:.3}) needs the carrier at {bearing:.3} deg, \
         inside the keep-out arc [{from:.3}, {to:.3}]"
    )]
    InKeepOut {
        x: f64,
        y: f64,
        bearing: f64,
        from: f64,
        to: f64,
    },
}

impl RingGeometry {
    /// World position of the carrier feed point at a ring angle.
    pub fn carrier_point(&self, angle_deg: f64) -> Point2 {
        let r = angle_deg.to_radians();
        Point2::new(
            self.center.x + r.cos() * self.radius,
            self.center.y + r.sin() * self.radius,
        )
    }

    /// Ring angle that places the carrier feed point closest to `world`,
    /// expressed as an unbounded continuation of `current`.
    ///
    /// The rotation from `current` is the shortest one that does not sweep
    /// through the keep-out arc; with an arc configured the reachable
    /// bearings form an open interval, so the result can never wind a full
    /// revolution past `current`.
    pub fn angle_for(&self, world: Point2, current: f64) -> Result<f64, UnreachableError> {
        let distance = self.center.distance(world);
        if distance < self.min_reach || distance > self.max_reach {
            return Err(UnreachableError::OutsideReach {
                x: world.x,
                y: world.y,
                distance,
                min: self.min_reach,
                max: self.max_reach,
            });
        }

        let bearing = self.center.bearing_to(world);
        if let Some(arc) = &self.keep_out {
            if arc.contains(bearing) {
                return Err(UnreachableError::InKeepOut {
                    x: world.x,
                    y: world.y,
                    bearing,
                    from: arc.from,
                    to: arc.to,
                });
            }
        }

        let short = ang_diff_deg(norm_deg(current), bearing);
        let delta = match &self.keep_out {
            Some(arc) if sweep_crosses(norm_deg(current), short, arc) => {
                // Go the long way around; the arc cannot lie in both
                // directions since neither endpoint is inside it.
                if short >= 0.0 { short - 360.0 } else { short + 360.0 }
            }
            _ => short,
        };

        Ok(current + delta)
    }

    /// Arc length of carrier travel between two ring angles: the amount of
    /// fiber dispensed by the move.
    pub fn feed_length(&self, a: f64, b: f64) -> f64 {
        (b - a).abs().to_radians() * self.radius
    }

    /// Rotary-axis calibration: motor steps per ring degree.
    pub fn steps_per_degree(&self) -> f64 {
        self.steps_per_rotation as f64 * self.ring_gear_teeth as f64
            / self.motor_gear_teeth as f64
            / 360.0
    }

    /// Smallest executable ring move: one motor microstep in ring degrees.
    /// Commanding less than this does nothing at the machine.
    pub fn min_move_deg(&self) -> f64 {
        1.0 / self.steps_per_degree()
    }

    /// Whether rotating from `start` by `delta` sweeps across `bearing`.
    pub fn sweep_crosses_bearing(&self, start: f64, delta: f64, bearing: f64) -> bool {
        if delta == 0.0 {
            return false;
        }
        let start = norm_deg(start);
        if delta > 0.0 {
            norm_deg(bearing - start) <= delta
        } else {
            norm_deg(start - bearing) <= -delta
        }
    }
}

/// Whether rotating from `start` (normalized) by `delta` enters the arc.
fn sweep_crosses(start: f64, delta: f64, arc: &KeepOut) -> bool {
    if delta > 0.0 {
        // Counterclockwise travel enters the arc at its `from` edge.
        norm_deg(arc.from - start) < delta
    } else if delta < 0.0 {
        // Clockwise travel enters at the `to` edge.
        norm_deg(start - arc.to) < -delta
    } else {
        false
    }
}
