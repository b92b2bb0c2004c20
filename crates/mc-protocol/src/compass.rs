//! Degree-to-16-point-compass conversion used when formatting weather
//! reports.

const POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Convert a bearing string (degrees) to its nearest 16-point compass
/// label. Non-numeric input is returned unchanged.
#[must_use]
pub fn bearing_to_compass(bearing: &str) -> String {
    match bearing.trim().parse::<f64>() {
        Ok(deg) => {
            let normalized = deg.rem_euclid(360.0);
            let idx = ((normalized / 22.5).round() as i64).rem_euclid(16) as usize;
            POINTS[idx].to_owned()
        }
        Err(_) => bearing.to_owned(),
    }
}
