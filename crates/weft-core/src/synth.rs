//! Render the routed operation stream as motion-program text.
//!
//! One line per operation. Source operations reproduce their input line
//! byte-for-byte; everything the router inserted carries a `; weft:`
//! comment so an operator can audit exactly what was added. Ring motion
//! rides the rotary `A` axis as relative deltas against a `G92 A` homing
//! declaration; fiber feed rides the `B` axis.

use crate::router::RoutedOperation;
use weft_gcode::render::{angle, axis, extrusion, feed, steps};

/// Render the full augmented program. Pure and infallible: every
/// operation formats to exactly one line.
pub fn render(ops: &[RoutedOperation]) -> String {
    let mut out = String::new();
    for op in ops {
        out.push_str(&line(op));
        out.push('\n');
    }
    out
}

fn line(op: &RoutedOperation) -> String {
    match op {
        RoutedOperation::Source { raw } => raw.clone(),
        RoutedOperation::Comment { text } => format!("; weft: {text}"),
        RoutedOperation::Status { text } => format!("M117 {text}"),
        RoutedOperation::RingHome { angle_deg } => format!(
            "G92 A{} ; weft: ring assumed homed",
            angle(*angle_deg)
        ),
        RoutedOperation::RingCalibrate { steps_per_degree } => format!(
            "M92 A{} ; weft: ring steps per degree",
            steps(*steps_per_degree)
        ),
        RoutedOperation::RingMove {
            delta_deg,
            target_deg,
            feedrate,
        } => format!(
            "G0 A{} F{} ; weft: ring to {} deg",
            angle(*delta_deg),
            feed(*feedrate),
            angle(*target_deg)
        ),
        RoutedOperation::HeadMove { x, y, z, feedrate } => {
            let mut words = String::from("G0");
            if let Some(x) = x {
                words.push_str(&format!(" X{}", axis(*x)));
            }
            if let Some(y) = y {
                words.push_str(&format!(" Y{}", axis(*y)));
            }
            if let Some(z) = z {
                words.push_str(&format!(" Z{}", axis(*z)));
            }
            format!("{words} F{} ; weft: head move", feed(*feedrate))
        }
        RoutedOperation::Extrude { length, feedrate } => format!(
            "G1 B{} F{} ; weft: feed fiber",
            extrusion(*length),
            feed(*feedrate)
        ),
        RoutedOperation::Retract { length, feedrate } => format!(
            "G1 B{} F{} ; weft: tension fiber",
            extrusion(-length),
            feed(*feedrate)
        ),
        RoutedOperation::Wait { ms } => format!("G4 P{ms}"),
        RoutedOperation::FiberOff => {
            "M18 A B ; weft: release ring and fiber feed".to_string()
        }
    }
}
