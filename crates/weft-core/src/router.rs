//! The routing walk: merge the toolpath's statement stream with ring and
//! fiber-feed motion.
//!
//! The router owns one pass over one print. Source statements are emitted
//! in their original order; ring rotations, fiber feed, and anchor tension
//! brackets are inserted between them. The correctness-critical rule is
//! that the ring never moves while an anchor segment is extruding — the
//! deposited plastic must trap the fiber exactly where the carrier left it.

use crate::anchor::{self, AnchorConfig, AnchorEvent};
use crate::fiber::FiberPath;
use crate::geometry::{Point2, Point3, norm_deg};
use crate::kinematics::{RingGeometry, UnreachableError};
use crate::toolpath::Toolpath;
use std::collections::VecDeque;
use thiserror::Error;
use weft_gcode::Statement;

/// Z lift applied by the shutdown sequence.
const SHUTDOWN_RAISE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Homing,
    Following,
    Anchoring,
    Retracting,
    Done,
}

/// One line of the augmented program.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedOperation {
    /// A verbatim statement from the input toolpath.
    Source { raw: String },
    /// An inserted diagnostic comment.
    Comment { text: String },
    /// An LCD status message.
    Status { text: String },
    /// Declare the ring's homed position on the rotary axis.
    RingHome { angle_deg: f64 },
    /// Rotary-axis steps-per-degree calibration.
    RingCalibrate { steps_per_degree: f64 },
    /// Relative ring rotation.
    RingMove {
        delta_deg: f64,
        target_deg: f64,
        feedrate: f64,
    },
    /// An inserted head move (clearance, raise, park).
    HeadMove {
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        feedrate: f64,
    },
    /// Feed fiber out of the carrier.
    Extrude { length: f64, feedrate: f64 },
    /// Pull fiber back under tension.
    Retract { length: f64, feedrate: f64 },
    /// Dwell.
    Wait { ms: u64 },
    /// Release the ring and fiber-feed steppers.
    FiberOff,
}

#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub anchor_tolerance: f64,
    pub corner_threshold_deg: f64,
    /// Fiber segments below this length are merged at parse time.
    pub min_fiber_segment: f64,
    /// Fiber pulled back while an anchor segment deposits over it.
    pub tension_retract: f64,
    pub fiber_feedrate: f64,
    pub ring_feedrate: f64,
    pub travel_feedrate: f64,
    /// Head lift when a ring move sweeps the fiber across the head.
    /// Zero disables the guard.
    pub head_raise: f64,
    /// X the head parks at while the carrier moves during homing/shutdown.
    pub clearance_x: f64,
    pub post_anchor_pause_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            anchor_tolerance: 2.0,
            corner_threshold_deg: 30.0,
            min_fiber_segment: 1.0,
            tension_retract: 2.0,
            fiber_feedrate: 1200.0,
            ring_feedrate: 8000.0,
            travel_feedrate: 5000.0,
            head_raise: 5.0,
            clearance_x: 110.0,
            post_anchor_pause_ms: 0,
        }
    }
}

#[derive(Debug, Error)]
#[error(
    "toolpath ends at z {top_z:.3} before fiber waypoint {waypoint} at \
     {position} can be anchored"
)]
pub struct IncompleteRoutingError {
    pub waypoint: usize,
    pub position: Point3,
    pub top_z: f64,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Kinematics(#[from] UnreachableError),

    #[error(transparent)]
    Anchor(#[from] anchor::NoAnchorFoundError),

    #[error(transparent)]
    Incomplete(#[from] IncompleteRoutingError),
}

/// Route one fiber path through one toolpath.
pub fn route(
    toolpath: &Toolpath,
    fiber: &FiberPath,
    ring: &RingGeometry,
    cfg: &RoutingConfig,
) -> Result<Vec<RoutedOperation>, RouteError> {
    Router {
        toolpath,
        fiber,
        ring,
        cfg,
        phase: Phase::Idle,
        ops: Vec::new(),
        angle: ring.home_angle,
        head: Point3::default(),
    }
    .run()
}

/// A fiber waypoint scheduled against the statement stream.
struct ScheduledWaypoint {
    waypoint: usize,
    position: Point3,
    /// Statement index this waypoint's motion is inserted before.
    trigger: usize,
    anchor: Option<AnchorEvent>,
}

struct Router<'a> {
    toolpath: &'a Toolpath,
    fiber: &'a FiberPath,
    ring: &'a RingGeometry,
    cfg: &'a RoutingConfig,
    phase: Phase,
    ops: Vec<RoutedOperation>,
    /// Unbounded ring angle.
    angle: f64,
    /// Head position replayed from emitted source statements.
    head: Point3,
}

impl Router<'_> {
    fn run(mut self) -> Result<Vec<RoutedOperation>, RouteError> {
        // Fail fast, before emitting anything: every waypoint must lie
        // within the printed stack and within the carrier's reach.
        let top_z = self.toolpath.top_z();
        for (i, &wp) in self.fiber.waypoints().iter().enumerate() {
            if self.toolpath.layer_for_z(wp.z).is_none() {
                return Err(IncompleteRoutingError {
                    waypoint: i,
                    position: wp,
                    top_z,
                }
                .into());
            }
            self.ring.angle_for(wp.xy(), self.ring.home_angle)?;
        }

        let events = anchor::resolve(
            self.fiber,
            self.toolpath,
            &AnchorConfig {
                tolerance: self.cfg.anchor_tolerance,
                corner_threshold_deg: self.cfg.corner_threshold_deg,
            },
        )?;

        let mut queue = self.schedule(events);
        self.home()?;

        self.set_phase(Phase::Following);
        for index in 0..self.toolpath.statements().len() {
            let bracket = self.insert_fiber_ops(&mut queue, index)?;

            let stmt = &self.toolpath.statements()[index];
            self.track_head(stmt);
            self.ops.push(RoutedOperation::Source {
                raw: stmt.raw.clone(),
            });

            if bracket {
                self.close_bracket();
            }
        }
        debug_assert!(queue.is_empty(), "unscheduled fiber waypoints left over");

        self.shutdown();
        Ok(self.ops)
    }

    /// Map each fiber waypoint to the statement index its motion precedes.
    ///
    /// Anchored waypoints trigger at their anchor segment's statement.
    /// Free waypoints trigger at the start of their layer, pulled earlier
    /// when a following anchor fires before that — the carrier must pass
    /// through every waypoint in fiber order.
    fn schedule(&self, events: Vec<AnchorEvent>) -> VecDeque<ScheduledWaypoint> {
        let mut by_waypoint: Vec<Option<AnchorEvent>> =
            vec![None; self.fiber.waypoints().len()];
        for event in events {
            let waypoint = event.waypoint;
            by_waypoint[waypoint] = Some(event);
        }

        let mut items: Vec<ScheduledWaypoint> = self
            .fiber
            .waypoints()
            .iter()
            .enumerate()
            .map(|(waypoint, &position)| {
                let anchor = by_waypoint[waypoint].take();
                let trigger = match &anchor {
                    Some(event) => self.toolpath.segments()[event.segment].statement,
                    None => {
                        // Reachability was checked up front, so the layer
                        // lookup cannot miss.
                        let layer = self.toolpath.layer_for_z(position.z).unwrap();
                        self.toolpath.layers()[layer].statements.start
                    }
                };
                ScheduledWaypoint {
                    waypoint,
                    position,
                    trigger,
                    anchor,
                }
            })
            .collect();

        let mut next_hard = usize::MAX;
        for item in items.iter_mut().rev() {
            if item.anchor.is_some() {
                next_hard = item.trigger;
            } else {
                item.trigger = item.trigger.min(next_hard);
            }
        }

        items.into()
    }

    fn home(&mut self) -> Result<(), RouteError> {
        self.set_phase(Phase::Homing);
        self.comment(format!(
            "thread routing: {} waypoints, {:.1} mm fiber",
            self.fiber.waypoints().len(),
            self.fiber.length()
        ));
        self.comment(format!(
            "ring center {} radius {:.1} mm, carrier reach [{:.1}, {:.1}]",
            self.ring.center, self.ring.radius, self.ring.min_reach, self.ring.max_reach
        ));
        self.ops.push(RoutedOperation::RingHome {
            angle_deg: self.ring.home_angle,
        });
        self.ops.push(RoutedOperation::RingCalibrate {
            steps_per_degree: self.ring.steps_per_degree(),
        });
        self.ops.push(RoutedOperation::HeadMove {
            x: Some(self.cfg.clearance_x),
            y: None,
            z: None,
            feedrate: self.cfg.travel_feedrate,
        });

        // Point the carrier at the initial anchor before any printing.
        let start = self.fiber.waypoints()[0];
        self.rotate_to(start.xy(), "initial thread bearing")?;
        Ok(())
    }

    /// Pop every waypoint due at `index`. Returns true when an anchor
    /// bracket was opened and must be closed after the statement at
    /// `index` is emitted.
    fn insert_fiber_ops(
        &mut self,
        queue: &mut VecDeque<ScheduledWaypoint>,
        index: usize,
    ) -> Result<bool, RouteError> {
        loop {
            let Some(front) = queue.front() else {
                return Ok(false);
            };

            if front.anchor.is_some() {
                if front.trigger != index {
                    return Ok(false);
                }
                let first = queue.pop_front().unwrap();
                let segment = first.anchor.as_ref().unwrap().segment;
                let mut group = vec![first];
                // Corners close enough to share one anchor segment share
                // one tension bracket.
                while queue
                    .front()
                    .and_then(|n| n.anchor.as_ref())
                    .is_some_and(|e| e.segment == segment)
                {
                    group.push(queue.pop_front().unwrap());
                }
                self.open_bracket(&group)?;
                return Ok(true);
            }

            if front.trigger > index {
                return Ok(false);
            }
            let item = queue.pop_front().unwrap();
            tracing::debug!(waypoint = item.waypoint, "carrying fiber to waypoint");
            self.rotate_to(
                item.position.xy(),
                &format!("waypoint {}", item.waypoint),
            )?;
        }
    }

    fn open_bracket(&mut self, group: &[ScheduledWaypoint]) -> Result<(), RouteError> {
        self.set_phase(Phase::Anchoring);
        for item in group {
            let event = item.anchor.as_ref().unwrap();
            tracing::debug!(
                waypoint = item.waypoint,
                kind = ?event.kind,
                layer = event.layer,
                "anchoring fiber waypoint"
            );
            self.rotate_to(
                item.position.xy(),
                &format!("{:?} anchor at waypoint {}", event.kind, item.waypoint),
            )?;
        }
        self.comment(format!(
            "hold: anchor segment fixes {} waypoint(s) under tension",
            group.len()
        ));
        self.ops.push(RoutedOperation::Retract {
            length: self.cfg.tension_retract,
            feedrate: self.cfg.fiber_feedrate,
        });
        Ok(())
    }

    fn close_bracket(&mut self) {
        self.ops.push(RoutedOperation::Extrude {
            length: self.cfg.tension_retract,
            feedrate: self.cfg.fiber_feedrate,
        });
        if self.cfg.post_anchor_pause_ms > 0 {
            self.ops.push(RoutedOperation::Wait {
                ms: self.cfg.post_anchor_pause_ms,
            });
        }
        self.comment(format!(
            "anchor set, ring held at {:.3} deg",
            norm_deg(self.angle)
        ));
        self.set_phase(Phase::Following);
    }

    /// Rotate the carrier to the bearing of a world point, feeding fiber
    /// for the arc traveled. Moves below one microstep are suppressed.
    fn rotate_to(&mut self, target: Point2, note: &str) -> Result<(), UnreachableError> {
        let target_angle = self.ring.angle_for(target, self.angle)?;
        let delta = target_angle - self.angle;
        if delta.abs() < self.ring.min_move_deg() {
            tracing::trace!(note, "ring move below one microstep, holding");
            return Ok(());
        }

        let restore_z = if self.cfg.head_raise > 0.0
            && self.ring.sweep_crosses_bearing(
                self.angle,
                delta,
                self.ring.center.bearing_to(self.head.xy()),
            ) {
            // The fiber would drag across the head; lift, rotate, drop.
            self.ops.push(RoutedOperation::HeadMove {
                x: None,
                y: None,
                z: Some(self.head.z + self.cfg.head_raise),
                feedrate: self.cfg.travel_feedrate,
            });
            Some(self.head.z)
        } else {
            None
        };

        let carrier = self.ring.carrier_point(target_angle);
        self.comment(format!(
            "{note}: thread bearing {:.3} deg, carrier {carrier}",
            norm_deg(target_angle)
        ));
        self.ops.push(RoutedOperation::Status {
            text: format!("Ring {:.1}", norm_deg(target_angle)),
        });
        self.ops.push(RoutedOperation::RingMove {
            delta_deg: delta,
            target_deg: target_angle,
            feedrate: self.cfg.ring_feedrate,
        });
        self.ops.push(RoutedOperation::Extrude {
            length: self.ring.feed_length(self.angle, target_angle),
            feedrate: self.cfg.fiber_feedrate,
        });
        self.angle = target_angle;

        if let Some(z) = restore_z {
            self.ops.push(RoutedOperation::HeadMove {
                x: None,
                y: None,
                z: Some(z),
                feedrate: self.cfg.travel_feedrate,
            });
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.set_phase(Phase::Retracting);
        self.comment("fiber routing complete, shutting down".to_string());
        self.ops.push(RoutedOperation::HeadMove {
            x: None,
            y: None,
            z: Some(self.head.z + SHUTDOWN_RAISE),
            feedrate: self.cfg.travel_feedrate,
        });
        self.ops.push(RoutedOperation::HeadMove {
            x: Some(self.cfg.clearance_x),
            y: None,
            z: None,
            feedrate: self.cfg.travel_feedrate,
        });
        self.ops.push(RoutedOperation::FiberOff);
        self.set_phase(Phase::Done);
    }

    fn track_head(&mut self, stmt: &Statement) {
        match stmt.code() {
            Some(('G', 0 | 1)) => {
                self.head = Point3::new(
                    stmt.number('X').unwrap_or(self.head.x),
                    stmt.number('Y').unwrap_or(self.head.y),
                    stmt.number('Z').unwrap_or(self.head.z),
                );
            }
            Some(('G', 28)) => {
                self.head = Point3::default();
            }
            _ => {}
        }
    }

    fn comment(&mut self, text: String) {
        self.ops.push(RoutedOperation::Comment { text });
    }

    fn set_phase(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::KeepOut;

    fn ring() -> RingGeometry {
        RingGeometry {
            center: Point2::new(0.0, 0.0),
            radius: 100.0,
            min_reach: 0.0,
            max_reach: 100.0,
            home_angle: 0.0,
            keep_out: None,
            motor_gear_teeth: 30,
            ring_gear_teeth: 125,
            steps_per_rotation: 3200,
        }
    }

    fn cfg() -> RoutingConfig {
        RoutingConfig {
            head_raise: 0.0,
            ..RoutingConfig::default()
        }
    }

    fn fiber(points: &[(f64, f64, f64)]) -> FiberPath {
        FiberPath::parse(
            points.iter().map(|&(x, y, z)| Point3::new(x, y, z)).collect(),
            0.0,
        )
        .unwrap()
    }

    const TWO_LAYERS: &str = "\
M83
G28 ; home
;LAYER_CHANGE
;Z:0.2
;TYPE:External perimeter
G1 X20 Y0 E1.0
G1 X20 Y20 E1.0
G1 X0 Y20 E1.0
;LAYER_CHANGE
;Z:0.4
G1 Z0.4
;TYPE:External perimeter
G1 X20 Y0 E1.0
G1 X20 Y20 E1.0
";

    fn source_count(ops: &[RoutedOperation]) -> usize {
        ops.iter()
            .filter(|op| matches!(op, RoutedOperation::Source { .. }))
            .count()
    }

    #[test]
    fn passthrough_is_complete_and_ordered() {
        let tp = Toolpath::parse(TWO_LAYERS).unwrap();
        let f = fiber(&[(5.0, 0.0, 0.2), (20.0, 10.0, 0.4)]);
        let ops = route(&tp, &f, &ring(), &cfg()).unwrap();

        assert_eq!(source_count(&ops), tp.statements().len());
        let emitted: Vec<&str> = ops
            .iter()
            .filter_map(|op| match op {
                RoutedOperation::Source { raw } => Some(raw.as_str()),
                _ => None,
            })
            .collect();
        let original: Vec<&str> = TWO_LAYERS.lines().collect();
        assert_eq!(emitted, original);
    }

    #[test]
    fn vertical_fiber_never_moves_the_ring_mid_print() {
        let tp = Toolpath::parse(TWO_LAYERS).unwrap();
        // Straight up at (5, 0): bearing 0, identical to home.
        let f = fiber(&[(5.0, 0.0, 0.2), (5.0, 0.0, 0.4)]);
        let ops = route(&tp, &f, &ring(), &cfg()).unwrap();

        let ring_moves: Vec<_> = ops
            .iter()
            .filter(|op| matches!(op, RoutedOperation::RingMove { .. }))
            .collect();
        assert!(
            ring_moves.is_empty(),
            "vertical fiber produced ring motion: {ring_moves:?}"
        );
        // Both anchors share one wall segment, so exactly one tension
        // bracket is emitted.
        let retracts = ops
            .iter()
            .filter(|op| matches!(op, RoutedOperation::Retract { .. }))
            .count();
        assert_eq!(retracts, 1);
    }

    #[test]
    fn anchor_bracket_wraps_the_matched_statement() {
        let tp = Toolpath::parse(TWO_LAYERS).unwrap();
        let f = fiber(&[(5.0, 0.0, 0.2), (20.0, 10.0, 0.4)]);
        let ops = route(&tp, &f, &ring(), &cfg()).unwrap();

        // Find the tension retract; the next source statement must be the
        // anchor segment, followed by the release extrude.
        let retract_at = ops
            .iter()
            .position(|op| matches!(op, RoutedOperation::Retract { .. }))
            .unwrap();
        let next_source = ops[retract_at..]
            .iter()
            .find_map(|op| match op {
                RoutedOperation::Source { raw } => Some(raw.as_str()),
                _ => None,
            })
            .unwrap();
        assert_eq!(next_source, "G1 X20 Y0 E1.0");
        let after_source = ops[retract_at..]
            .iter()
            .position(|op| matches!(op, RoutedOperation::Source { .. }))
            .unwrap();
        assert!(matches!(
            ops[retract_at + after_source + 1],
            RoutedOperation::Extrude { .. }
        ));
        // No ring motion inside the bracket.
        assert!(!ops[retract_at..retract_at + after_source]
            .iter()
            .any(|op| matches!(op, RoutedOperation::RingMove { .. })));
    }

    #[test]
    fn free_waypoints_ride_at_layer_boundaries() {
        let tp = Toolpath::parse(TWO_LAYERS).unwrap();
        // The middle waypoint turns by well under the corner threshold, so
        // it needs no anchor, only carrier motion when its layer starts.
        let f = fiber(&[(5.0, 0.0, 0.2), (5.0, 0.2, 0.3), (10.0, 10.0, 0.4)]);
        let ops = route(&tp, &f, &ring(), &cfg()).unwrap();

        let ring_moves = ops
            .iter()
            .filter(|op| matches!(op, RoutedOperation::RingMove { .. }))
            .count();
        assert_eq!(ring_moves, 2);

        // The free waypoint's rotation lands at the start of layer 1,
        // right before its Z marker.
        let z_marker = ops
            .iter()
            .position(
                |op| matches!(op, RoutedOperation::Source { raw } if raw == ";Z:0.4"),
            )
            .unwrap();
        assert!(matches!(ops[z_marker - 2], RoutedOperation::RingMove { .. }));

        // Only the two anchored waypoints get tension brackets.
        let retracts = ops
            .iter()
            .filter(|op| matches!(op, RoutedOperation::Retract { .. }))
            .count();
        assert_eq!(retracts, 2);
    }

    #[test]
    fn routing_is_idempotent() {
        let tp = Toolpath::parse(TWO_LAYERS).unwrap();
        let f = fiber(&[(5.0, 0.0, 0.2), (20.0, 10.0, 0.4)]);
        let a = crate::synth::render(&route(&tp, &f, &ring(), &cfg()).unwrap());
        let b = crate::synth::render(&route(&tp, &f, &ring(), &cfg()).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn fiber_above_the_toolpath_is_incomplete() {
        let tp = Toolpath::parse(TWO_LAYERS).unwrap();
        let f = fiber(&[(5.0, 0.0, 0.2), (5.0, 0.0, 0.8)]);
        let err = route(&tp, &f, &ring(), &cfg()).unwrap_err();
        match err {
            RouteError::Incomplete(inner) => {
                assert_eq!(inner.waypoint, 1);
                assert_eq!(inner.top_z, 0.4);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unreachable_waypoint_is_reported_before_any_output() {
        let tp = Toolpath::parse(TWO_LAYERS).unwrap();
        let f = fiber(&[(500.0, 0.0, 0.2), (5.0, 0.0, 0.4)]);
        let err = route(&tp, &f, &ring(), &cfg()).unwrap_err();
        assert!(matches!(
            err,
            RouteError::Kinematics(UnreachableError::OutsideReach { x, .. }) if x == 500.0
        ));
    }

    #[test]
    fn missing_anchor_geometry_is_reported() {
        let tp = Toolpath::parse(TWO_LAYERS).unwrap();
        // A sharp corner far from any wall or fill line.
        let f = fiber(&[
            (5.0, 0.0, 0.2),
            (60.0, 60.0, 0.4),
            (20.0, 10.0, 0.4),
        ]);
        let err = route(&tp, &f, &ring(), &cfg()).unwrap_err();
        assert!(matches!(err, RouteError::Anchor(e) if e.waypoint == 1));
    }

    #[test]
    fn keep_out_rotation_takes_the_legal_direction() {
        let mut r = ring();
        r.keep_out = Some(KeepOut { from: 40.0, to: 60.0 });
        let tp = Toolpath::parse(TWO_LAYERS).unwrap();
        // End waypoint bearing is 90 deg; the direct counterclockwise
        // sweep from 0 crosses the keep-out arc, so the ring must go
        // clockwise, -270.
        let f = fiber(&[(5.0, 0.0, 0.2), (0.0, 20.0, 0.4)]);
        let ops = route(&tp, &f, &r, &cfg()).unwrap();
        let target = ops
            .iter()
            .find_map(|op| match op {
                RoutedOperation::RingMove { target_deg, .. } => Some(*target_deg),
                _ => None,
            })
            .unwrap();
        assert!((target - -270.0).abs() < 1e-9, "target was {target}");
    }

    #[test]
    fn head_raise_guard_brackets_the_sweep() {
        let mut config = cfg();
        config.head_raise = 5.0;
        let tp = Toolpath::parse(TWO_LAYERS).unwrap();
        let f = fiber(&[(5.0, 0.0, 0.2), (0.0, 20.0, 0.4)]);
        let ops = route(&tp, &f, &ring(), &config).unwrap();

        // The final rotation sweeps 0 -> 90 while the head sits at
        // (20, 20), bearing 45: the guard must lift before and restore
        // after.
        let move_at = ops
            .iter()
            .rposition(|op| matches!(op, RoutedOperation::RingMove { .. }))
            .unwrap();
        assert!(matches!(
            ops[move_at - 3],
            RoutedOperation::HeadMove { z: Some(_), .. }
        ));
        assert!(matches!(
            ops[move_at + 2],
            RoutedOperation::HeadMove { z: Some(_), .. }
        ));
    }
}
