//! Thread-routing engine for a ring-carrier FFF printer.
//!
//! The engine ingests a sliced toolpath and an authored 3D fiber polyline,
//! computes ring-carrier kinematics for every fiber waypoint, matches fiber
//! corners to anchorable extrusions in the toolpath, and synthesizes an
//! augmented motion program that interleaves head motion, extrusion, and
//! ring rotation.
//!
//! Everything here is a pure function of its inputs; parsing happens up
//! front, rendering at the end, and no state survives a routing run.

pub mod anchor;
pub mod fiber;
pub mod geometry;
pub mod kinematics;
pub mod router;
pub mod synth;
pub mod toolpath;

pub use anchor::{AnchorConfig, AnchorEvent, AnchorKind, NoAnchorFoundError};
pub use fiber::{FiberPath, InvalidFiberPathError};
pub use geometry::{Point2, Point3};
pub use kinematics::{RingGeometry, UnreachableError};
pub use router::{
    IncompleteRoutingError, Phase, RouteError, RoutedOperation, RoutingConfig, route,
};
pub use synth::render;
pub use toolpath::{MalformedToolpathError, SegmentKind, Toolpath, ToolpathSegment};

/// Run the full pipeline: parse the toolpath, route the fiber, render the
/// augmented program.
pub fn route_program(
    toolpath_text: &str,
    fiber: &FiberPath,
    ring: &RingGeometry,
    cfg: &RoutingConfig,
) -> Result<String, ProgramError> {
    let toolpath = Toolpath::parse(toolpath_text)?;
    let ops = route(&toolpath, fiber, ring, cfg)?;
    Ok(render(&ops))
}

#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error(transparent)]
    Toolpath(#[from] MalformedToolpathError),
    #[error(transparent)]
    Route(#[from] RouteError),
}
