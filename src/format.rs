//! Display strings for the numeric readouts.
//!
//! Rounding is half away from zero at the shown precision, so `98.765`
//! reads `98.8°` and `-15.55` reads `-15.6°`.

fn round_half_up(value: f64, decimals: usize) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

fn fixed(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, round_half_up(value, decimals))
}

pub fn format_degrees(azimuth: f32) -> String {
    format_degrees_with(azimuth, 1)
}

pub fn format_degrees_with(azimuth: f32, decimals: usize) -> String {
    format!("{}°", fixed(azimuth as f64, decimals))
}

pub fn format_speed(meters_per_second: f32) -> String {
    format!("{} m/s", fixed(meters_per_second as f64, 1))
}

pub fn format_magnetic_field(micro_tesla: f32) -> String {
    format!("{} μT", fixed(micro_tesla as f64, 1))
}

/// Latitude or longitude, two decimals
pub fn format_coordinate(degrees: f64) -> String {
    format!("{}°", fixed(degrees, 2))
}

pub fn format_altitude(meters: f64) -> String {
    format!("{} m", fixed(meters, 2))
}
