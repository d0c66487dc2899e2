use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connected => "CONNECTED",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AirQuality {
    ForceSignal,
    HighPollution,
    LowPollution,
    FreshAir,
    #[default]
    Unknown,
}

impl AirQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ForceSignal => "FORCE_SIGNAL",
            Self::HighPollution => "HIGH_POLLUTION",
            Self::LowPollution => "LOW_POLLUTION",
            Self::FreshAir => "FRESH_AIR",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ForceSignal => "High pollution! Force signal active.",
            Self::HighPollution => "High pollution!",
            Self::LowPollution => "Low pollution!",
            Self::FreshAir => "Fresh air.",
            Self::Unknown => "Air quality unknown.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    pub temperature_c: f32,
    pub pressure_pa: f32,
    pub humidity_pct: f32,
}

const PASCALS_PER_INCH_HG: f32 = 3386.389;

impl EnvironmentReading {
    pub fn temperature_f(&self) -> i32 {
        (self.temperature_c * 1.8 + 32.0) as i32
    }

    pub fn pressure_in_hg(&self) -> i32 {
        (self.pressure_pa / PASCALS_PER_INCH_HG) as i32
    }

    pub fn humidity(&self) -> i32 {
        self.humidity_pct as i32
    }
}
