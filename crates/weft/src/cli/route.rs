use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use std::{fs, path::PathBuf};
use weft_core::FiberPath;

#[derive(Args)]
pub struct RouteArgs {
    /// Path to the sliced toolpath (G-code).
    pub toolpath: PathBuf,

    /// Path to the fiber path (JSON triples or `x y z` lines).
    pub fiber: PathBuf,

    /// Machine configuration file (TOML or JSON). The reference rig is
    /// used when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output path, or `-` for stdout.
    ///
    /// Defaults to the toolpath name with a `weft.gcode` extension.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl RouteArgs {
    pub fn run(&self) -> Result<()> {
        let config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.validate()?;

        let toolpath_text = fs::read_to_string(&self.toolpath)
            .with_context(|| format!("failed to read toolpath {}", self.toolpath.display()))?;
        let fiber_text = fs::read_to_string(&self.fiber)
            .with_context(|| format!("failed to read fiber path {}", self.fiber.display()))?;

        let routing = config.routing();
        let points = crate::input::parse_fiber_points(&fiber_text)?;
        let fiber = FiberPath::parse(points, routing.min_fiber_segment)?;

        tracing::info!(
            toolpath = %self.toolpath.display(),
            waypoints = fiber.waypoints().len(),
            "routing fiber path"
        );

        let program =
            weft_core::route_program(&toolpath_text, &fiber, &config.ring_geometry(), &routing)?;

        let output = self.output.clone().unwrap_or_else(|| {
            let mut path = self.toolpath.clone();
            path.set_extension("weft.gcode");
            path
        });

        if output.as_os_str() == "-" {
            print!("{program}");
            return Ok(());
        }

        fs::write(&output, &program)
            .with_context(|| format!("failed to write {}", output.display()))?;
        println!("Wrote routed program to {}", output.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOOLPATH: &str = "\
M83
;LAYER_CHANGE
;Z:0.2
;TYPE:External perimeter
G0 X100 Y100
G1 X120 Y100 E1.0
G1 X120 Y120 E1.0
G1 X100 Y120 E1.0
G1 X100 Y100 E1.0
";

    #[test]
    fn routes_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let toolpath = dir.path().join("square.gcode");
        let fiber = dir.path().join("fiber.json");
        fs::write(&toolpath, TOOLPATH).unwrap();
        fs::write(&fiber, "[[120, 110, 0.2], [100, 110, 0.2]]").unwrap();

        let args = RouteArgs {
            toolpath: toolpath.clone(),
            fiber,
            config: None,
            output: None,
        };
        args.run().unwrap();

        let out = dir.path().join("square.weft.gcode");
        let program = fs::read_to_string(out).unwrap();
        // Every input line passes through, in order.
        let sources: Vec<&str> = program
            .lines()
            .filter(|l| !l.contains("; weft:") && !l.starts_with("M117") && !l.starts_with("G4 "))
            .collect();
        assert_eq!(sources, TOOLPATH.lines().collect::<Vec<_>>());
        // And the routing inserted ring setup plus a tension bracket.
        assert!(program.contains("G92 A"));
        assert!(program.contains("; weft: tension fiber"));
        assert!(program.contains("M18 A B"));
    }

    #[test]
    fn bad_fiber_path_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let toolpath = dir.path().join("square.gcode");
        let fiber = dir.path().join("fiber.json");
        fs::write(&toolpath, TOOLPATH).unwrap();
        // Descends in z.
        fs::write(&fiber, "[[120, 110, 0.4], [100, 110, 0.2]]").unwrap();

        let args = RouteArgs {
            toolpath,
            fiber,
            config: None,
            output: None,
        };
        assert!(args.run().is_err());
        assert!(!dir.path().join("square.weft.gcode").exists());
    }
}
