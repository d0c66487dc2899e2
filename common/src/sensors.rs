use crate::types::EnvironmentReading;

pub trait DustSensor {
    /// Duration of the next low pulse in microseconds, 0 on timeout.
    fn low_pulse_us(&mut self) -> u32;
}

pub trait AirQualitySensor {
    /// `None` when the converter read failed.
    fn raw_value(&mut self) -> Option<i32>;
}

pub trait EnvironmentSensor {
    fn read(&mut self) -> Option<EnvironmentReading>;
}

pub struct Board<DS, AQ, ES, SS> {
    pub dust: DS,
    pub air: AQ,
    pub environment: ES,
    pub display: SS,
}

/// Edge detector for a sensor that may keep failing, so a failure run and
/// its recovery are each logged once.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailureLatch {
    failing: bool,
}

impl FailureLatch {
    pub fn fail(&mut self) -> bool {
        !std::mem::replace(&mut self.failing, true)
    }

    pub fn recover(&mut self) -> bool {
        std::mem::replace(&mut self.failing, false)
    }

    pub fn is_failing(&self) -> bool {
        self.failing
    }
}
