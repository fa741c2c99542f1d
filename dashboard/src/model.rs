use chrono::{DateTime, Utc};
use serde::Serialize;

/// The seven measurement channels tracked by the garden sensors.
pub const CHANNELS: [&str; 7] = [
    "temperature",
    "humidity",
    "pressure",
    "luminance",
    "moisture_a",
    "moisture_b",
    "moisture_c",
];

/// A single time-series data point for one measurement channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub time: DateTime<Utc>,
    pub measurement: String,
    pub value: f64,
    pub device: String,
}

/// REST API response wrapper
#[derive(Debug, Serialize)]
pub struct ReadingResponse {
    pub data: Vec<Reading>,
    pub total: usize,
}
