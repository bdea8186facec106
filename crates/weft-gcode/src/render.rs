//! Fixed-precision number formatting for emitted commands.
//!
//! Precision per word class is fixed so that output is byte-stable across
//! runs: axes at the machine's 3-decimal step resolution, extrusion at 5,
//! ring angles at 3, steps-per-degree at 4, feed rates integral.

fn fixed(v: f64, decimals: u32) -> String {
    let scale = 10f64.powi(decimals as i32);
    let mut r = (v * scale).round() / scale;
    if r == 0.0 {
        // Avoid the "-0.000" artifact.
        r = 0.0;
    }
    format!("{r:.prec$}", prec = decimals as usize)
}

/// An X/Y/Z coordinate.
pub fn axis(v: f64) -> String {
    fixed(v, 3)
}

/// An extrusion or fiber-feed length.
pub fn extrusion(v: f64) -> String {
    fixed(v, 5)
}

/// A ring angle in degrees.
pub fn angle(v: f64) -> String {
    fixed(v, 3)
}

/// A steps-per-degree calibration value.
pub fn steps(v: f64) -> String {
    fixed(v, 4)
}

/// A feed rate in mm/min.
pub fn feed(v: f64) -> String {
    format!("{}", v.round() as i64)
}
