//! Helpers for keeping log lines and span fields free of operator locations.
//!
//! Flight logs are shared with support; full card paths and precise launch
//! coordinates stay out of them.

use std::path::Path;

use crate::models::GpsFix;

/// Decimal places kept by [`coarse_fix`]; two places is roughly one kilometre.
const COARSE_PLACES: i32 = 2;

/// File name of a flight video, for use in span fields.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Latitude and longitude rounded to about a kilometre.
pub fn coarse_fix(fix: &GpsFix) -> String {
    let scale = 10f64.powi(COARSE_PLACES);
    let round = |v: f64| (v * scale).round() / scale;
    format!(
        "{:.*}, {:.*}",
        COARSE_PLACES as usize,
        round(fix.latitude),
        COARSE_PLACES as usize,
        round(fix.longitude)
    )
}
