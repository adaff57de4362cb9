#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    pub key: &'static str,
    pub min: f64,
    pub default_value: f64,
    pub max: f64,
    pub description: &'static str,
}

const fn spec(
    key: &'static str,
    min: f64,
    default_value: f64,
    max: f64,
    description: &'static str,
) -> ParameterSpec {
    ParameterSpec {
        key,
        min,
        default_value,
        max,
        description,
    }
}

pub const GRAVITY: &str = "gravity";
pub const DART_SPEED: &str = "dart_speed";
pub const DART_FREQUENCY: &str = "dart_frequency";
pub const DART_WALL_HEIGHT: &str = "dart_wall_height";
pub const PLATFORM_HEIGHT: &str = "platform_height";
pub const PLATFORM_WIDTH: &str = "platform_width";
pub const SPIKE_HEIGHT: &str = "spike_height";
pub const SPIKE_WIDTH: &str = "spike_width";
pub const OSCILLATOR_HEIGHT: &str = "oscillator_height";
pub const OSCILLATOR_WIDTH: &str = "oscillator_width";
pub const SHIELD_HEIGHT: &str = "shield_height";
pub const SHIELD_WIDTH: &str = "shield_width";
pub const GAP_WIDTH: &str = "gap_width";
pub const TILT: &str = "tilt";

/// Every tunable the Simulation reads. Order is the order notifications fire
/// in during `reset_all`.
pub const CATALOG: [ParameterSpec; 14] = [
    spec(GRAVITY, 400.0, 800.0, 1600.0, "Controls how quickly objects fall"),
    spec(DART_SPEED, 100.0, 200.0, 400.0, "Controls how fast darts move"),
    // Interval between dart volleys in milliseconds.
    spec(DART_FREQUENCY, 1500.0, 3000.0, 6000.0, "Controls how often darts are fired"),
    spec(DART_WALL_HEIGHT, 75.0, 150.0, 300.0, "Controls the height of dart walls"),
    spec(PLATFORM_HEIGHT, 10.0, 20.0, 40.0, "Controls the height of platforms"),
    spec(PLATFORM_WIDTH, 75.0, 150.0, 300.0, "Controls the width of platforms"),
    spec(SPIKE_HEIGHT, 10.0, 20.0, 40.0, "Controls the height of spike platforms"),
    spec(SPIKE_WIDTH, 50.0, 100.0, 200.0, "Controls the width of spike platforms"),
    spec(OSCILLATOR_HEIGHT, 10.0, 20.0, 40.0, "Controls the height of oscillating platforms"),
    spec(OSCILLATOR_WIDTH, 75.0, 150.0, 300.0, "Controls the width of oscillating platforms"),
    spec(SHIELD_HEIGHT, 30.0, 60.0, 120.0, "Controls the height of shield blocks"),
    spec(SHIELD_WIDTH, 10.0, 20.0, 40.0, "Controls the width of shield blocks"),
    spec(GAP_WIDTH, 50.0, 100.0, 200.0, "Controls the width of gaps between ground segments"),
    spec(TILT, -45.0, 0.0, 45.0, "Controls the angle (tilt) of platforms in degrees"),
];
