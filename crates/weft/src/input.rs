use anyhow::{Context, Result, bail};
use weft_core::Point3;

/// Parse fiber waypoints from either supported shape: a JSON array of
/// `[x, y, z]` triples, or plain text with one `x y z` triple per line
/// (`#` starts a comment) as exported from the sketch tool.
pub fn parse_fiber_points(text: &str) -> Result<Vec<Point3>> {
    if text.trim_start().starts_with('[') {
        let triples: Vec<[f64; 3]> =
            serde_json::from_str(text).context("failed to parse fiber path as JSON")?;
        return Ok(triples
            .into_iter()
            .map(|[x, y, z]| Point3::new(x, y, z))
            .collect());
    }

    let mut points = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<f64> = line
            .split_whitespace()
            .map(|f| f.parse())
            .collect::<Result<_, _>>()
            .with_context(|| format!("bad fiber waypoint on line {}", lineno + 1))?;
        if fields.len() != 3 {
            bail!(
                "fiber waypoint on line {} has {} fields, expected 3",
                lineno + 1,
                fields.len()
            );
        }
        points.push(Point3::new(fields[0], fields[1], fields[2]));
    }
    Ok(points)
}
