//! Matching fiber waypoints to toolpath geometry that can trap the fiber.
//!
//! An anchor is required at the first waypoint, the last waypoint, and at
//! every corner — a horizontal direction change above the configured
//! threshold. Each anchored waypoint is matched to the nearest wall or fill
//! segment in its own layer or the one immediately below; a corner with no
//! eligible geometry in tolerance is an error, because an unanchored corner
//! will not hold its shape in the finished part.

use crate::fiber::FiberPath;
use crate::geometry::{Point3, angle_between_deg, dist_point_segment};
use crate::toolpath::{SegmentKind, Toolpath, ToolpathSegment};
use thiserror::Error;

const XY_EPS: f64 = 1e-6;
const DIST_TIE_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorKind {
    Start,
    Corner,
    End,
}

#[derive(Debug, Clone)]
pub struct AnchorEvent {
    /// Index of the waypoint along the fiber path.
    pub waypoint: usize,
    pub position: Point3,
    /// Index of the matched toolpath segment.
    pub segment: usize,
    /// Layer the matched segment prints in.
    pub layer: usize,
    pub kind: AnchorKind,
}

#[derive(Debug, Clone)]
pub struct AnchorConfig {
    /// Maximum distance between a waypoint and its anchor segment.
    pub tolerance: f64,
    /// Horizontal direction change that makes a waypoint a corner.
    pub corner_threshold_deg: f64,
}

#[derive(Debug, Error)]
#[error(
    "no wall or fill segment within {tolerance:.3} mm of fiber waypoint \
     {waypoint} at {position}"
)]
pub struct NoAnchorFoundError {
    pub waypoint: usize,
    pub position: Point3,
    pub tolerance: f64,
}

/// Resolve the ordered anchor-event list for a fiber path.
///
/// Events come out monotone in both layer and toolpath execution order: a
/// segment that has already printed when the carrier arrives cannot trap
/// the fiber, so such candidates are skipped even when they are closer.
pub fn resolve(
    fiber: &FiberPath,
    toolpath: &Toolpath,
    cfg: &AnchorConfig,
) -> Result<Vec<AnchorEvent>, NoAnchorFoundError> {
    let waypoints = fiber.waypoints();
    let last = waypoints.len() - 1;

    let mut events = Vec::new();
    let mut min_layer = 0usize;
    let mut min_statement = 0usize;

    for (i, &wp) in waypoints.iter().enumerate() {
        let kind = if i == 0 {
            AnchorKind::Start
        } else if i == last {
            AnchorKind::End
        } else if is_corner(waypoints, i, cfg.corner_threshold_deg) {
            AnchorKind::Corner
        } else {
            continue;
        };

        let not_found = || NoAnchorFoundError {
            waypoint: i,
            position: wp,
            tolerance: cfg.tolerance,
        };

        let layer = toolpath.layer_for_z(wp.z).ok_or_else(not_found)?;

        let mut candidate_layers = Vec::with_capacity(2);
        if layer > 0 && layer - 1 >= min_layer {
            candidate_layers.push(layer - 1);
        }
        candidate_layers.push(layer.max(min_layer));

        let mut best: Option<(usize, f64)> = None;
        for &l in &candidate_layers {
            for idx in toolpath.segments_near(wp, l, cfg.tolerance) {
                let seg = &toolpath.segments()[idx];
                if seg.statement < min_statement {
                    continue;
                }
                let d = dist_point_segment(wp.xy(), seg.start.xy(), seg.end.xy());
                let replace = match best {
                    None => true,
                    Some((best_idx, best_d)) => {
                        beats(seg, d, &toolpath.segments()[best_idx], best_d)
                    }
                };
                if replace {
                    best = Some((idx, d));
                }
            }
        }

        let (segment, _) = best.ok_or_else(not_found)?;
        let seg = &toolpath.segments()[segment];
        let layer = toolpath
            .layers()
            .iter()
            .position(|l| l.segments.contains(&segment))
            .unwrap_or(layer);

        tracing::debug!(
            waypoint = i,
            ?kind,
            segment,
            layer,
            "anchored fiber waypoint at {wp}"
        );

        min_layer = layer;
        min_statement = seg.statement;
        events.push(AnchorEvent {
            waypoint: i,
            position: wp,
            segment,
            layer,
            kind,
        });
    }

    Ok(events)
}

/// Ranking: nearest first; on a distance tie, wall beats fill, then the
/// segment reached earliest in execution order.
fn beats(a: &ToolpathSegment, da: f64, b: &ToolpathSegment, db: f64) -> bool {
    if da + DIST_TIE_EPS < db {
        return true;
    }
    if db + DIST_TIE_EPS < da {
        return false;
    }
    let rank = |s: &ToolpathSegment| match s.kind {
        SegmentKind::Wall => 0,
        _ => 1,
    };
    (rank(a), a.statement) < (rank(b), b.statement)
}

fn is_corner(waypoints: &[Point3], i: usize, threshold_deg: f64) -> bool {
    let incoming = (waypoints[i] - waypoints[i - 1]).xy();
    let outgoing = (waypoints[i + 1] - waypoints[i]).xy();
    if incoming.length() < XY_EPS || outgoing.length() < XY_EPS {
        // A vertical run changes no horizontal direction.
        return false;
    }
    angle_between_deg(incoming, outgoing) > threshold_deg
}
