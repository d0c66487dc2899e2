use crate::{
    clock::{elapsed_ms, Millis},
    types::AirQuality,
};

const INIT_MIN_RAW: i32 = 10;
const INIT_MAX_RAW: i32 = 798;
const ADC_MAX_RAW: i32 = 1023;
const FORCE_JUMP: i32 = 400;
const FORCE_LEVEL: i32 = 700;
const HIGH_ABOVE_BASELINE: i32 = 150;
const LOW_JUMP: i32 = 200;
const LOW_ABOVE_BASELINE: i32 = 50;

pub trait AirQualityClassifier {
    fn classify(&mut self, raw_value: i32, now: Millis) -> AirQuality;
}

/// Slope classifier for a resistive air-quality sensor on an ADC pin.
///
/// Compares each reading with the previous one and with a baseline that is
/// re-averaged from all readings every `baseline_interval_ms`.
#[derive(Debug, Clone)]
pub struct SlopeClassifier {
    baseline_interval_ms: Millis,
    last_raw: i32,
    current_raw: i32,
    baseline: i32,
    raw_sum: i64,
    raw_count: u32,
    last_baseline_update: Millis,
}

impl SlopeClassifier {
    pub fn new(baseline_interval_ms: Millis) -> Self {
        Self {
            baseline_interval_ms,
            last_raw: 0,
            current_raw: 0,
            baseline: 0,
            raw_sum: 0,
            raw_count: 0,
            last_baseline_update: 0,
        }
    }

    /// Seeds the baseline with the first reading. Returns false if the
    /// reading is outside the range a working sensor produces.
    pub fn init(&mut self, initial_raw: i32, now: Millis) -> bool {
        self.current_raw = initial_raw;
        self.last_raw = initial_raw;
        self.baseline = initial_raw;
        self.raw_sum = 0;
        self.raw_count = 0;
        self.last_baseline_update = now;

        initial_raw > INIT_MIN_RAW && initial_raw < INIT_MAX_RAW
    }

    pub fn baseline(&self) -> i32 {
        self.baseline
    }

    fn update_baseline(&mut self, now: Millis) {
        if elapsed_ms(now, self.last_baseline_update) <= self.baseline_interval_ms {
            return;
        }

        if self.raw_count > 0 {
            self.baseline = (self.raw_sum / i64::from(self.raw_count)) as i32;
        }
        self.raw_sum = 0;
        self.raw_count = 0;
        self.last_baseline_update = now;
    }
}

impl AirQualityClassifier for SlopeClassifier {
    fn classify(&mut self, raw_value: i32, now: Millis) -> AirQuality {
        // Out of converter range; keep history untouched.
        if !(0..=ADC_MAX_RAW).contains(&raw_value) {
            return AirQuality::Unknown;
        }

        self.last_raw = self.current_raw;
        self.current_raw = raw_value;
        self.raw_sum += i64::from(raw_value);
        self.raw_count = self.raw_count.saturating_add(1);
        self.update_baseline(now);

        let jump = self.current_raw - self.last_raw;
        let above_baseline = self.current_raw - self.baseline;

        if jump > FORCE_JUMP || self.current_raw > FORCE_LEVEL {
            AirQuality::ForceSignal
        } else if above_baseline > HIGH_ABOVE_BASELINE {
            AirQuality::HighPollution
        } else if (jump > LOW_JUMP && self.current_raw < FORCE_LEVEL)
            || above_baseline > LOW_ABOVE_BASELINE
        {
            AirQuality::LowPollution
        } else {
            AirQuality::FreshAir
        }
    }
}
