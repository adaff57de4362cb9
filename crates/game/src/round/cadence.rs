use std::time::Duration;

use crate::params::ParameterStore;
use crate::params::catalog::{DART_FREQUENCY, DART_SPEED};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleCadence {
    pub round: u32,
    pub dart_interval: Duration,
    pub dart_speed: f64,
}

impl ObstacleCadence {
    pub fn from_params(round: u32, params: &ParameterStore) -> Self {
        Self {
            round,
            dart_interval: Duration::from_millis(read(params, DART_FREQUENCY).max(0.0) as u64),
            dart_speed: read(params, DART_SPEED),
        }
    }
}

fn read(params: &ParameterStore, key: &str) -> f64 {
    params.value(key).unwrap_or_default()
}
