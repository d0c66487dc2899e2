use crate::clock::{Interval, Millis};

/// Dust concentration (pcs/0.01cf) from the low-pulse ratio in percent.
pub fn dust_concentration(ratio: f32) -> f32 {
    1.1 * ratio.powi(3) - 3.8 * ratio.powi(2) + 520.0 * ratio + 0.62
}

/// Low-pulse occupancy as a percentage of the window.
pub fn occupancy_ratio(low_pulse_occupancy_us: u64, window_ms: Millis, normalization: f32) -> f32 {
    low_pulse_occupancy_us as f32 / (window_ms as f32 * normalization)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DustReading {
    pub low_pulse_occupancy_us: u64,
    pub ratio: f32,
    pub concentration: f32,
}

impl DustReading {
    pub fn derive(low_pulse_occupancy_us: u64, window_ms: Millis, normalization: f32) -> Self {
        let ratio = occupancy_ratio(low_pulse_occupancy_us, window_ms, normalization);
        Self {
            low_pulse_occupancy_us,
            ratio,
            concentration: dust_concentration(ratio),
        }
    }
}

/// Accumulates raw samples every tick and reduces them once per window.
/// Closing restarts the window at the time the close was observed.
#[derive(Debug, Clone)]
pub struct SamplingWindow {
    accumulator: u64,
    window: Interval,
    normalization: f32,
}

impl SamplingWindow {
    pub fn new(window_ms: Millis, normalization: f32, now: Millis) -> Self {
        Self {
            accumulator: 0,
            window: Interval::new(window_ms, now),
            normalization,
        }
    }

    pub fn accumulate(&mut self, raw_sample: u32) {
        self.accumulator = self.accumulator.saturating_add(u64::from(raw_sample));
    }

    pub fn accumulator(&self) -> u64 {
        self.accumulator
    }

    pub fn window_start(&self) -> Millis {
        self.window.start_ms()
    }

    pub fn window_ms(&self) -> Millis {
        self.window.length_ms()
    }

    pub fn try_close(&mut self, now: Millis) -> Option<DustReading> {
        if !self.window.is_due(now) {
            return None;
        }

        let reading = DustReading::derive(
            self.accumulator,
            self.window.length_ms(),
            self.normalization,
        );
        self.accumulator = 0;
        self.window.restart(now);
        Some(reading)
    }

    pub fn reset(&mut self, now: Millis) {
        self.accumulator = 0;
        self.window.restart(now);
    }
}
