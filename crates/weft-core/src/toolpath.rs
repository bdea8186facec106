//! Read-only model of an already-sliced motion program.
//!
//! Statements are kept verbatim for passthrough; alongside them the parser
//! builds typed segments (travel, wall, fill, retraction) partitioned into
//! layers by the slicer's `LAYER_CHANGE`/`Z:` comment markers, with
//! extrusion normalized to relative deltas so downstream code never
//! branches on the machine's extrusion mode.

use crate::geometry::{Point3, dist_point_segment};
use std::ops::Range;
use thiserror::Error;
use weft_gcode::{LexError, Statement};

const EXTRUDE_EPS: f64 = 1e-9;
const Z_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Travel,
    Wall,
    Fill,
    Retraction,
}

impl SegmentKind {
    /// Wall and fill extrusions are the only geometry a fiber can anchor
    /// into; travel and retraction never hold anything.
    pub fn anchorable(self) -> bool {
        matches!(self, SegmentKind::Wall | SegmentKind::Fill)
    }
}

#[derive(Debug, Clone)]
pub struct ToolpathSegment {
    pub kind: SegmentKind,
    pub start: Point3,
    pub end: Point3,
    /// Filament fed over this segment, always relative.
    pub extrusion: f64,
    /// Index of the statement that executes this segment.
    pub statement: usize,
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub index: usize,
    pub z: f64,
    pub statements: Range<usize>,
    pub segments: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct Toolpath {
    statements: Vec<Statement>,
    segments: Vec<ToolpathSegment>,
    layers: Vec<Layer>,
}

#[derive(Debug, Error)]
pub enum MalformedToolpathError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("no layer markers found in toolpath")]
    NoLayers,

    #[error("layer marker at line {line} is not followed by a Z height")]
    MissingLayerZ { line: usize },

    #[error("extrusion mode changed after printing began, at line {line}")]
    MixedExtrusionMode { line: usize },

    #[error("relative positioning (G91) at line {line} is not supported")]
    RelativePositioning { line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtrusionMode {
    Absolute,
    Relative,
}

impl Toolpath {
    pub fn parse(text: &str) -> Result<Self, MalformedToolpathError> {
        let statements = weft_gcode::parse(text)?;

        let mut segments: Vec<ToolpathSegment> = Vec::new();
        let mut layers: Vec<Layer> = Vec::new();

        // Machine state while replaying the program.
        let mut pos = Point3::default();
        let mut mode: Option<ExtrusionMode> = None;
        let mut last_e = 0.0f64;
        let mut deposited = false;
        let mut current_type = SegmentKind::Fill;

        // Layer currently being collected: (z, first statement, first segment).
        let mut open_layer: Option<(f64, usize, usize)> = None;
        // A LAYER_CHANGE marker waiting for its Z: line.
        let mut pending_marker: Option<usize> = None;

        for (index, stmt) in statements.iter().enumerate() {
            if let Some(comment) = stmt.comment.as_deref()
                && stmt.comment_only()
            {
                if comment == "LAYER_CHANGE" {
                    if let Some(line) = pending_marker {
                        return Err(MalformedToolpathError::MissingLayerZ { line });
                    }
                    pending_marker = Some(stmt.line);
                    continue;
                }
                if let Some(rest) = comment.strip_prefix("Z:") {
                    if let (Some(_), Ok(z)) = (pending_marker, rest.trim().parse::<f64>()) {
                        pending_marker = None;
                        if let Some((z, stmt_start, seg_start)) = open_layer.take() {
                            layers.push(Layer {
                                index: layers.len(),
                                z,
                                statements: stmt_start..index,
                                segments: seg_start..segments.len(),
                            });
                        }
                        open_layer = Some((z, index, segments.len()));
                    }
                    continue;
                }
                if let Some(rest) = comment.strip_prefix("TYPE:") {
                    current_type = classify_type(rest);
                }
                continue;
            }

            match stmt.code() {
                Some(('G', 91)) => {
                    return Err(MalformedToolpathError::RelativePositioning { line: stmt.line });
                }
                Some(('M', m @ (82 | 83))) => {
                    let new = if m == 82 {
                        ExtrusionMode::Absolute
                    } else {
                        ExtrusionMode::Relative
                    };
                    if deposited && mode.is_some_and(|old| old != new) {
                        return Err(MalformedToolpathError::MixedExtrusionMode {
                            line: stmt.line,
                        });
                    }
                    mode = Some(new);
                }
                Some(('G', 92)) => {
                    if let Some(e) = stmt.number('E') {
                        last_e = e;
                    }
                }
                Some(('G', 0 | 1)) => {
                    if let Some(line) = pending_marker {
                        return Err(MalformedToolpathError::MissingLayerZ { line });
                    }

                    let next = Point3::new(
                        stmt.number('X').unwrap_or(pos.x),
                        stmt.number('Y').unwrap_or(pos.y),
                        stmt.number('Z').unwrap_or(pos.z),
                    );
                    let delta_e = match stmt.number('E') {
                        Some(e) => match mode.unwrap_or(ExtrusionMode::Absolute) {
                            ExtrusionMode::Absolute => {
                                let d = e - last_e;
                                last_e = e;
                                d
                            }
                            ExtrusionMode::Relative => e,
                        },
                        None => 0.0,
                    };

                    let moved_xy = stmt.has_word('X') || stmt.has_word('Y');
                    let kind = if moved_xy && delta_e > EXTRUDE_EPS {
                        deposited = true;
                        current_type
                    } else if !moved_xy && stmt.has_word('E') {
                        SegmentKind::Retraction
                    } else {
                        SegmentKind::Travel
                    };

                    segments.push(ToolpathSegment {
                        kind,
                        start: pos,
                        end: next,
                        extrusion: delta_e,
                        statement: index,
                    });
                    pos = next;
                }
                _ => {}
            }
        }

        if let Some(line) = pending_marker {
            return Err(MalformedToolpathError::MissingLayerZ { line });
        }
        if let Some((z, stmt_start, seg_start)) = open_layer {
            layers.push(Layer {
                index: layers.len(),
                z,
                statements: stmt_start..statements.len(),
                segments: seg_start..segments.len(),
            });
        }
        if layers.is_empty() {
            return Err(MalformedToolpathError::NoLayers);
        }

        Ok(Self {
            statements,
            segments,
            layers,
        })
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn segments(&self) -> &[ToolpathSegment] {
        &self.segments
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_z(&self, layer: usize) -> Option<f64> {
        self.layers.get(layer).map(|l| l.z)
    }

    /// Z of the topmost layer.
    pub fn top_z(&self) -> f64 {
        self.layers.last().map(|l| l.z).unwrap_or_default()
    }

    /// The layer being printed when the running height first reaches `z`.
    pub fn layer_for_z(&self, z: f64) -> Option<usize> {
        self.layers
            .iter()
            .position(|l| l.z + Z_EPS >= z)
    }

    /// Indices of anchorable segments in one layer within `radius` of the
    /// point's horizontal projection.
    pub fn segments_near(&self, point: Point3, layer: usize, radius: f64) -> Vec<usize> {
        let Some(layer) = self.layers.get(layer) else {
            return Vec::new();
        };
        let p = point.xy();
        layer
            .segments
            .clone()
            .filter(|&i| {
                let seg = &self.segments[i];
                seg.kind.anchorable()
                    && dist_point_segment(p, seg.start.xy(), seg.end.xy()) <= radius
            })
            .collect()
    }
}

fn classify_type(name: &str) -> SegmentKind {
    let lower = name.to_ascii_lowercase();
    if lower.contains("perimeter") || lower.contains("wall") {
        SegmentKind::Wall
    } else {
        SegmentKind::Fill
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
; generated test program
M83
G28 ; home
G1 Z0.2 F300
;LAYER_CHANGE
;Z:0.2
;TYPE:External perimeter
G1 X10 Y0 E0.5
G1 X10 Y10 E0.5
;TYPE:Internal infill
G1 X5 Y5 E0.3
G1 E-1.0 F2400
G0 X0 Y0
;LAYER_CHANGE
;Z:0.4
G1 Z0.4
;TYPE:External perimeter
G1 X10 Y0 E0.5
";

    #[test]
    fn parses_layers_and_kinds() {
        let tp = Toolpath::parse(SAMPLE).unwrap();
        assert_eq!(tp.layers().len(), 2);
        assert_eq!(tp.layer_z(0), Some(0.2));
        assert_eq!(tp.layer_z(1), Some(0.4));
        assert_eq!(tp.top_z(), 0.4);

        let kinds: Vec<SegmentKind> = tp.segments().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SegmentKind::Travel, // preamble Z move
                SegmentKind::Wall,
                SegmentKind::Wall,
                SegmentKind::Fill,
                SegmentKind::Retraction,
                SegmentKind::Travel,
                SegmentKind::Travel, // Z hop into layer 1
                SegmentKind::Wall,
            ]
        );
    }

    #[test]
    fn relative_extrusion_deltas() {
        let tp = Toolpath::parse(SAMPLE).unwrap();
        let wall = &tp.segments()[1];
        assert_eq!(wall.extrusion, 0.5);
        let retract = &tp.segments()[4];
        assert_eq!(retract.extrusion, -1.0);
    }

    #[test]
    fn absolute_extrusion_is_normalized() {
        let text = "\
M82
;LAYER_CHANGE
;Z:0.2
;TYPE:External perimeter
G1 X10 Y0 E1.0
G1 X10 Y10 E1.75
G92 E0
G1 X0 Y10 E0.25
";
        let tp = Toolpath::parse(text).unwrap();
        let ex: Vec<f64> = tp.segments().iter().map(|s| s.extrusion).collect();
        assert_eq!(ex, vec![1.0, 0.75, 0.25]);
    }

    #[test]
    fn segments_near_filters_kind_and_distance() {
        let tp = Toolpath::parse(SAMPLE).unwrap();
        // The wall along x=10 in layer 0.
        let near = tp.segments_near(Point3::new(10.0, 5.0, 0.2), 0, 1.0);
        assert_eq!(near.len(), 1);
        assert_eq!(tp.segments()[near[0]].kind, SegmentKind::Wall);
        // Nothing anchorable within a tight radius of a far point.
        assert!(tp.segments_near(Point3::new(50.0, 50.0, 0.2), 0, 1.0).is_empty());
    }

    #[test]
    fn layer_lookup_by_z() {
        let tp = Toolpath::parse(SAMPLE).unwrap();
        assert_eq!(tp.layer_for_z(0.0), Some(0));
        assert_eq!(tp.layer_for_z(0.2), Some(0));
        assert_eq!(tp.layer_for_z(0.3), Some(1));
        assert_eq!(tp.layer_for_z(0.4), Some(1));
        assert_eq!(tp.layer_for_z(0.6), None);
    }

    #[test]
    fn missing_layer_markers() {
        let err = Toolpath::parse("G1 X1 Y1 E0.1\n").unwrap_err();
        assert!(matches!(err, MalformedToolpathError::NoLayers));
    }

    #[test]
    fn layer_marker_without_z() {
        let text = ";LAYER_CHANGE\nG1 X1 Y1 E0.1\n";
        let err = Toolpath::parse(text).unwrap_err();
        assert!(matches!(err, MalformedToolpathError::MissingLayerZ { line: 1 }));
    }

    #[test]
    fn mixed_extrusion_mode() {
        let text = "\
M83
;LAYER_CHANGE
;Z:0.2
;TYPE:Internal infill
G1 X1 Y1 E0.1
M82
";
        let err = Toolpath::parse(text).unwrap_err();
        assert!(matches!(err, MalformedToolpathError::MixedExtrusionMode { line: 6 }));
    }

    #[test]
    fn relative_positioning_rejected() {
        let err = Toolpath::parse("G91\n").unwrap_err();
        assert!(matches!(
            err,
            MalformedToolpathError::RelativePositioning { line: 1 }
        ));
    }

    #[test]
    fn unknown_statements_are_retained() {
        let tp = Toolpath::parse(SAMPLE).unwrap();
        // Every input line survives for passthrough.
        assert_eq!(tp.statements().len(), SAMPLE.lines().count());
    }
}
