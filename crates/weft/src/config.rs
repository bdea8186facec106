use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use weft_core::geometry::Point2;
use weft_core::kinematics::{KeepOut, RingGeometry};
use weft_core::router::RoutingConfig;

/// Machine and routing configuration for one rig.
///
/// Every field has a default taken from the reference rig, so a missing or
/// empty config file routes against that machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ring geometry and gear train.
    #[serde(default)]
    pub ring: RingSection,

    /// Routing tunables.
    #[serde(default)]
    pub routing: RoutingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingSection {
    /// Ring center in bed coordinates, mm.
    #[serde(default = "default_center")]
    pub center: [f64; 2],

    /// Carrier radius, mm.
    #[serde(default = "default_radius")]
    pub radius: f64,

    /// Reachable annulus around the ring center, mm. `max_reach` defaults
    /// to the radius.
    #[serde(default)]
    pub min_reach: f64,
    #[serde(default)]
    pub max_reach: Option<f64>,

    /// Homed carrier angle, degrees.
    #[serde(default)]
    pub home_angle: f64,

    /// Keep-out arc `[from, to]` behind the head mount, degrees.
    #[serde(default = "default_keep_out")]
    pub keep_out: Option<[f64; 2]>,

    /// Ring A-axis feed rate.
    #[serde(default = "default_ring_feedrate")]
    pub feedrate: f64,

    /// Gear train for steps-per-degree calibration.
    #[serde(default = "default_motor_gear_teeth")]
    pub motor_gear_teeth: u32,
    #[serde(default = "default_ring_gear_teeth")]
    pub ring_gear_teeth: u32,
    #[serde(default = "default_steps_per_rotation")]
    pub steps_per_rotation: u32,
}

impl Default for RingSection {
    fn default() -> Self {
        Self {
            center: default_center(),
            radius: default_radius(),
            min_reach: 0.0,
            max_reach: None,
            home_angle: 0.0,
            keep_out: default_keep_out(),
            feedrate: default_ring_feedrate(),
            motor_gear_teeth: default_motor_gear_teeth(),
            ring_gear_teeth: default_ring_gear_teeth(),
            steps_per_rotation: default_steps_per_rotation(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSection {
    /// Maximum waypoint-to-segment distance for anchoring, mm.
    #[serde(default = "default_anchor_tolerance")]
    pub anchor_tolerance: f64,

    /// Horizontal direction change that requires an anchor, degrees.
    #[serde(default = "default_corner_threshold")]
    pub corner_threshold_deg: f64,

    /// Fiber segments below this length are merged, mm.
    #[serde(default = "default_min_fiber_segment")]
    pub min_fiber_segment: f64,

    /// Fiber pulled back while an anchor segment prints, mm.
    #[serde(default = "default_tension_retract")]
    pub tension_retract: f64,

    #[serde(default = "default_fiber_feedrate")]
    pub fiber_feedrate: f64,
    #[serde(default = "default_travel_feedrate")]
    pub travel_feedrate: f64,

    /// Head lift when a ring move sweeps the fiber across the head, mm.
    /// Zero disables the guard.
    #[serde(default = "default_head_raise")]
    pub head_raise: f64,

    /// X the head parks at while the carrier moves freely, mm.
    #[serde(default = "default_clearance_x")]
    pub clearance_x: f64,

    /// Dwell after each anchor bracket, ms.
    #[serde(default)]
    pub post_anchor_pause_ms: u64,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            anchor_tolerance: default_anchor_tolerance(),
            corner_threshold_deg: default_corner_threshold(),
            min_fiber_segment: default_min_fiber_segment(),
            tension_retract: default_tension_retract(),
            fiber_feedrate: default_fiber_feedrate(),
            travel_feedrate: default_travel_feedrate(),
            head_raise: default_head_raise(),
            clearance_x: default_clearance_x(),
            post_anchor_pause_ms: 0,
        }
    }
}

fn default_center() -> [f64; 2] {
    [110.0, 110.0]
}

fn default_radius() -> f64 {
    130.0
}

fn default_keep_out() -> Option<[f64; 2]> {
    // Behind the gantry on the reference rig.
    Some([255.0, 285.0])
}

fn default_ring_feedrate() -> f64 {
    8000.0
}

fn default_motor_gear_teeth() -> u32 {
    30
}

fn default_ring_gear_teeth() -> u32 {
    125
}

fn default_steps_per_rotation() -> u32 {
    // 200 full steps at 16 microsteps.
    3200
}

fn default_anchor_tolerance() -> f64 {
    2.0
}

fn default_corner_threshold() -> f64 {
    30.0
}

fn default_min_fiber_segment() -> f64 {
    1.0
}

fn default_tension_retract() -> f64 {
    2.0
}

fn default_fiber_feedrate() -> f64 {
    1200.0
}

fn default_travel_feedrate() -> f64 {
    5000.0
}

fn default_head_raise() -> f64 {
    5.0
}

fn default_clearance_x() -> f64 {
    110.0
}

impl Config {
    /// Load configuration from a file, auto-detecting TOML or JSON format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content).or_else(|_| Self::from_json(&content)),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse config as TOML")
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("failed to parse config as JSON")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let ring = &self.ring;
        if ring.radius <= 0.0 {
            anyhow::bail!("ring.radius must be positive");
        }
        let max_reach = ring.max_reach.unwrap_or(ring.radius);
        if ring.min_reach < 0.0 || max_reach < ring.min_reach {
            anyhow::bail!(
                "ring reach [{}, {}] is not a valid annulus",
                ring.min_reach,
                max_reach
            );
        }
        if let Some([from, to]) = ring.keep_out
            && from == to
        {
            anyhow::bail!("ring.keep_out must span a non-degenerate arc");
        }
        if ring.motor_gear_teeth == 0 || ring.ring_gear_teeth == 0 || ring.steps_per_rotation == 0
        {
            anyhow::bail!("ring gear train values must be nonzero");
        }

        let routing = &self.routing;
        if routing.anchor_tolerance <= 0.0 {
            anyhow::bail!("routing.anchor_tolerance must be positive");
        }
        if routing.corner_threshold_deg <= 0.0 || routing.corner_threshold_deg >= 180.0 {
            anyhow::bail!("routing.corner_threshold_deg must be in (0, 180)");
        }

        Ok(())
    }

    pub fn ring_geometry(&self) -> RingGeometry {
        let ring = &self.ring;
        RingGeometry {
            center: Point2::new(ring.center[0], ring.center[1]),
            radius: ring.radius,
            min_reach: ring.min_reach,
            max_reach: ring.max_reach.unwrap_or(ring.radius),
            home_angle: ring.home_angle,
            keep_out: ring.keep_out.map(|[from, to]| KeepOut { from, to }),
            motor_gear_teeth: ring.motor_gear_teeth,
            ring_gear_teeth: ring.ring_gear_teeth,
            steps_per_rotation: ring.steps_per_rotation,
        }
    }

    pub fn routing(&self) -> RoutingConfig {
        let routing = &self.routing;
        RoutingConfig {
            anchor_tolerance: routing.anchor_tolerance,
            corner_threshold_deg: routing.corner_threshold_deg,
            min_fiber_segment: routing.min_fiber_segment,
            tension_retract: routing.tension_retract,
            fiber_feedrate: routing.fiber_feedrate,
            ring_feedrate: self.ring.feedrate,
            travel_feedrate: routing.travel_feedrate,
            head_raise: routing.head_raise,
            clearance_x: routing.clearance_x,
            post_anchor_pause_ms: routing.post_anchor_pause_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[ring]
center = [100.0, 0.0]
radius = 100.0
home_angle = 90.0
keep_out = [80.0, 100.0]

[routing]
anchor_tolerance = 1.5
corner_threshold_deg = 45.0
"#;

        let config = Config::from_toml(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.ring.center, [100.0, 0.0]);
        assert_eq!(config.ring.home_angle, 90.0);
        assert_eq!(config.routing.anchor_tolerance, 1.5);
        // Unset fields keep their defaults.
        assert_eq!(config.ring.motor_gear_teeth, 30);
        assert_eq!(config.routing.tension_retract, 2.0);
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "ring": { "radius": 120.0 },
            "routing": { "corner_threshold_deg": 20.0 }
        }"#;

        let config = Config::from_json(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.ring.radius, 120.0);
        assert_eq!(config.routing.corner_threshold_deg, 20.0);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.ring.center, [110.0, 110.0]);
        assert_eq!(config.ring.radius, 130.0);
        assert_eq!(config.routing.anchor_tolerance, 2.0);
        // max_reach follows the radius unless set.
        assert_eq!(config.ring_geometry().max_reach, 130.0);
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let mut config = Config::default();
        config.ring.radius = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ring.min_reach = 50.0;
        config.ring.max_reach = Some(10.0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.routing.corner_threshold_deg = 180.0;
        assert!(config.validate().is_err());
    }
}
