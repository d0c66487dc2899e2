use crate::{
    clock::Delay,
    types::{AirQuality, ConnectionState, EnvironmentReading},
};

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub connection: ConnectionState,
    pub air_quality: AirQuality,
    pub air_raw: Option<i32>,
    pub concentration: Option<f32>,
    pub environment: Option<EnvironmentReading>,
}

impl StatusReport {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(5);

        match self.environment {
            Some(env) => {
                lines.push(format!("Temp: {}F", env.temperature_f()));
                lines.push(format!("Pressure: {}inHg", env.pressure_in_hg()));
                lines.push(format!("Humidity: {}%", env.humidity()));
            }
            None => lines.push("BME280 unavailable".to_string()),
        }

        match self.air_raw {
            Some(raw) => lines.push(format!("Air: {} ({raw})", self.air_quality.description())),
            None => lines.push(format!("Air: {}", self.air_quality.description())),
        }

        if let Some(concentration) = self.concentration {
            lines.push(format!("Dust: {concentration:.2} pcs/0.01cf"));
        }

        lines.push(format!("MQTT: {}", self.connection.as_str()));
        lines
    }
}

pub trait StatusSink {
    fn show(&mut self, report: &StatusReport);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Self = Self::new(0, 0, 0);
    pub const GREEN: Self = Self::new(0x00, 0xFF, 0x00);
    pub const YELLOW: Self = Self::new(0xFF, 0xFF, 0x00);
    pub const ORANGE: Self = Self::new(0xFF, 0x80, 0x00);
    pub const RED: Self = Self::new(0xFF, 0x00, 0x00);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn scaled(self, brightness: u8) -> Self {
        let scale = |channel: u8| ((u16::from(channel) * u16::from(brightness)) / 255) as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }
}

pub fn air_quality_color(quality: AirQuality) -> Rgb {
    match quality {
        AirQuality::FreshAir => Rgb::GREEN,
        AirQuality::LowPollution => Rgb::YELLOW,
        AirQuality::HighPollution => Rgb::ORANGE,
        AirQuality::ForceSignal => Rgb::RED,
        AirQuality::Unknown => Rgb::OFF,
    }
}

pub trait PixelStrip {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn set_pixel(&mut self, index: usize, color: Rgb);
    fn show(&mut self);
}

pub struct LedPainter<P> {
    strip: P,
    brightness: u8,
    step_ms: u32,
}

impl<P: PixelStrip> LedPainter<P> {
    pub fn new(strip: P, brightness: u8, step_ms: u32) -> Self {
        Self {
            strip,
            brightness,
            step_ms,
        }
    }

    pub fn strip(&self) -> &P {
        &self.strip
    }

    /// Fills `start..end` one pixel at a time, bottom to top.
    pub fn fill<D: Delay>(&mut self, start: usize, end: usize, color: Rgb, delay: &mut D) {
        let color = color.scaled(self.brightness);
        for index in start..end.min(self.strip.len()) {
            self.strip.set_pixel(index, color);
            self.strip.show();
            delay.delay_ms(self.step_ms);
        }
    }

    pub fn fill_instant(&mut self, start: usize, end: usize, color: Rgb) {
        let color = color.scaled(self.brightness);
        for index in start..end.min(self.strip.len()) {
            self.strip.set_pixel(index, color);
        }
        self.strip.show();
    }

    pub fn paint_air_quality(&mut self, quality: AirQuality) {
        let len = self.strip.len();
        self.fill_instant(0, len, air_quality_color(quality));
    }

    pub fn animate_air_quality<D: Delay>(&mut self, quality: AirQuality, delay: &mut D) {
        let len = self.strip.len();
        self.fill(0, len, air_quality_color(quality), delay);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::session::testing::RecordingDelay;

    struct MemoryStrip {
        pixels: Vec<Rgb>,
        shows: u32,
    }

    impl MemoryStrip {
        fn new(len: usize) -> Self {
            Self {
                pixels: vec![Rgb::OFF; len],
                shows: 0,
            }
        }
    }

    impl PixelStrip for MemoryStrip {
        fn len(&self) -> usize {
            self.pixels.len()
        }

        fn set_pixel(&mut self, index: usize, color: Rgb) {
            self.pixels[index] = color;
        }

        fn show(&mut self) {
            self.shows += 1;
        }
    }

    #[test]
    fn animated_fill_clamps_to_strip_and_waits_per_pixel() {
        let mut painter = LedPainter::new(MemoryStrip::new(4), 255, 25);
        let mut delay = RecordingDelay::default();

        painter.fill(2, 10, Rgb::RED, &mut delay);

        assert_eq!(
            painter.strip().pixels,
            vec![Rgb::OFF, Rgb::OFF, Rgb::RED, Rgb::RED]
        );
        assert_eq!(delay.sleeps, vec![25, 25]);
        assert_eq!(painter.strip().shows, 2);
    }

    #[test]
    fn instant_fill_shows_once_with_brightness() {
        let mut painter = LedPainter::new(MemoryStrip::new(3), 25, 25);

        painter.paint_air_quality(AirQuality::FreshAir);

        assert_eq!(painter.strip().pixels, vec![Rgb::new(0, 25, 0); 3]);
        assert_eq!(painter.strip().shows, 1);
    }

    #[test]
    fn status_lines_use_display_units() {
        let report = StatusReport {
            connection: ConnectionState::Connected,
            air_quality: AirQuality::LowPollution,
            air_raw: Some(180),
            concentration: Some(517.92),
            environment: Some(EnvironmentReading {
                temperature_c: 20.5,
                pressure_pa: 101_325.0,
                humidity_pct: 40.0,
            }),
        };

        assert_eq!(
            report.lines(),
            vec![
                "Temp: 68F".to_string(),
                "Pressure: 29inHg".to_string(),
                "Humidity: 40%".to_string(),
                "Air: Low pollution! (180)".to_string(),
                "Dust: 517.92 pcs/0.01cf".to_string(),
                "MQTT: CONNECTED".to_string(),
            ]
        );
    }
}
