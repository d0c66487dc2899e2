use log::{info, warn};

use crate::{
    air_quality::AirQualityClassifier,
    clock::{Clock, Delay, Interval, Millis},
    config::{LedConfig, MonitorConfig},
    publisher::{FeedValue, PublishOutcome, Publisher},
    sensors::{AirQualitySensor, Board, DustSensor, EnvironmentSensor},
    session::{BrokerSession, ConnectionManager, Heartbeat},
    status::{LedPainter, PixelStrip, StatusReport, StatusSink},
    topics::FeedTopics,
    types::{AirQuality, EnvironmentReading},
    window::{DustReading, SamplingWindow},
};

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub reconnect_failures: u32,
    pub heartbeat: Heartbeat,
    pub dust: Option<DustReading>,
    pub dust_publish: Option<PublishOutcome>,
    pub air: Option<(AirQuality, i32)>,
    pub air_publish: Option<PublishOutcome>,
}

pub struct Monitor<S, D, C, P> {
    config: MonitorConfig,
    connection: ConnectionManager<S, D>,
    publisher: Publisher,
    dust: SamplingWindow,
    air_report: Interval,
    classifier: C,
    leds: LedPainter<P>,
    air_quality: AirQuality,
    air_raw: Option<i32>,
    concentration: Option<f32>,
    environment: Option<EnvironmentReading>,
}

impl<S, D, C, P> Monitor<S, D, C, P>
where
    S: BrokerSession,
    D: Delay,
    C: AirQualityClassifier,
    P: PixelStrip,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mut config: MonitorConfig,
        led: &LedConfig,
        topics: FeedTopics,
        session: S,
        delay: D,
        classifier: C,
        strip: P,
        now: Millis,
    ) -> Self {
        config.sanitize();
        let mut connection = ConnectionManager::new(
            session,
            delay,
            config.keepalive_interval_ms,
            config.reconnect_backoff_ms,
        );
        connection.reset(now);

        Self {
            dust: SamplingWindow::new(config.dust_window_ms, config.dust_normalization, now),
            air_report: Interval::new(config.air_report_interval_ms, now),
            connection,
            publisher: Publisher::new(topics),
            classifier,
            leds: LedPainter::new(strip, led.brightness, led.fill_step_ms),
            air_quality: AirQuality::Unknown,
            air_raw: None,
            concentration: None,
            environment: None,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn connection(&self) -> &ConnectionManager<S, D> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager<S, D> {
        &mut self.connection
    }

    pub fn leds(&self) -> &LedPainter<P> {
        &self.leds
    }

    pub fn dust_window(&self) -> &SamplingWindow {
        &self.dust
    }

    pub fn reset(&mut self, now: Millis) {
        self.dust.reset(now);
        self.air_report.restart(now);
        self.connection.reset(now);
        self.air_quality = AirQuality::Unknown;
        self.air_raw = None;
        self.concentration = None;
        self.environment = None;
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            connection: self.connection.state(),
            air_quality: self.air_quality,
            air_raw: self.air_raw,
            concentration: self.concentration,
            environment: self.environment,
        }
    }

    pub fn tick<K, DS, AQ, ES, SS>(
        &mut self,
        clock: &K,
        board: &mut Board<DS, AQ, ES, SS>,
    ) -> TickReport
    where
        K: Clock,
        DS: DustSensor,
        AQ: AirQualitySensor,
        ES: EnvironmentSensor,
        SS: StatusSink,
    {
        let reconnect_failures = self.connection.ensure_connected();
        let heartbeat = self.connection.heartbeat(clock.now_ms());

        let (dust, dust_publish) = self.sample_dust(clock, &mut board.dust);
        let (air, air_publish) = self.sample_air(clock.now_ms(), &mut board.air);

        self.environment = board.environment.read();
        board.display.show(&self.status());

        TickReport {
            reconnect_failures,
            heartbeat,
            dust,
            dust_publish,
            air,
            air_publish,
        }
    }

    fn sample_dust<K: Clock, DS: DustSensor>(
        &mut self,
        clock: &K,
        sensor: &mut DS,
    ) -> (Option<DustReading>, Option<PublishOutcome>) {
        self.dust.accumulate(sensor.low_pulse_us());

        let Some(reading) = self.dust.try_close(clock.now_ms()) else {
            return (None, None);
        };

        info!(
            "low pulse occupancy: {}us, ratio: {:.2}, concentration: {:.2}",
            reading.low_pulse_occupancy_us, reading.ratio, reading.concentration
        );
        self.concentration = Some(reading.concentration);
        let outcome = self.publisher.publish_if_ready(
            &mut self.connection,
            FeedValue::Concentration(reading.concentration),
        );
        (Some(reading), Some(outcome))
    }

    fn sample_air<AQ: AirQualitySensor>(
        &mut self,
        now: Millis,
        sensor: &mut AQ,
    ) -> (Option<(AirQuality, i32)>, Option<PublishOutcome>) {
        if !self.air_report.poll(now) {
            return (None, None);
        }

        let Some(raw) = sensor.raw_value() else {
            warn!("air quality sensor read failed");
            self.air_quality = AirQuality::Unknown;
            self.air_raw = None;
            self.leds.paint_air_quality(AirQuality::Unknown);
            return (None, None);
        };
        let quality = self.classifier.classify(raw, now);
        info!("air quality: {} (raw {raw}); {}", quality.as_str(), quality.description());

        if quality == self.air_quality {
            self.leds.paint_air_quality(quality);
        } else {
            self.leds.animate_air_quality(quality, self.connection.delay_mut());
        }
        self.air_quality = quality;
        self.air_raw = Some(raw);

        let outcome = self
            .publisher
            .publish_if_ready(&mut self.connection, FeedValue::AirQuality(raw));
        (Some((quality, raw)), Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        air_quality::SlopeClassifier,
        session::testing::{RecordingDelay, ScriptedSession},
        status::Rgb,
        types::ConnectionState,
    };

    struct FakeClock(Cell<Millis>);

    impl Clock for FakeClock {
        fn now_ms(&self) -> Millis {
            self.0.get()
        }
    }

    struct FixedPulse(u32);

    impl DustSensor for FixedPulse {
        fn low_pulse_us(&mut self) -> u32 {
            self.0
        }
    }

    struct FixedAir(Option<i32>);

    impl AirQualitySensor for FixedAir {
        fn raw_value(&mut self) -> Option<i32> {
            self.0
        }
    }

    struct NoEnvironment;

    impl EnvironmentSensor for NoEnvironment {
        fn read(&mut self) -> Option<EnvironmentReading> {
            None
        }
    }

    #[derive(Default)]
    struct CapturedDisplay(Vec<StatusReport>);

    impl StatusSink for CapturedDisplay {
        fn show(&mut self, report: &StatusReport) {
            self.0.push(report.clone());
        }
    }

    struct NullStrip(Vec<Rgb>);

    impl PixelStrip for NullStrip {
        fn len(&self) -> usize {
            self.0.len()
        }

        fn set_pixel(&mut self, index: usize, color: Rgb) {
            self.0[index] = color;
        }

        fn show(&mut self) {}
    }

    type TestMonitor = Monitor<ScriptedSession, RecordingDelay, SlopeClassifier, NullStrip>;
    type TestBoard = Board<FixedPulse, FixedAir, NoEnvironment, CapturedDisplay>;

    fn setup(session: ScriptedSession) -> (TestMonitor, TestBoard, FakeClock) {
        let mut classifier = SlopeClassifier::new(500_000);
        classifier.init(100, 0);
        let monitor = Monitor::new(
            MonitorConfig::default(),
            &LedConfig::default(),
            FeedTopics::for_user("plants"),
            session,
            RecordingDelay::default(),
            classifier,
            NullStrip(vec![Rgb::OFF; 4]),
            0,
        );
        let board = Board {
            dust: FixedPulse(10_000),
            air: FixedAir(Some(105)),
            environment: NoEnvironment,
            display: CapturedDisplay::default(),
        };
        (monitor, board, FakeClock(Cell::new(0)))
    }

    #[test]
    fn first_tick_connects_and_only_accumulates() {
        let (mut monitor, mut board, clock) = setup(ScriptedSession::default());
        clock.0.set(10);

        let report = monitor.tick(&clock, &mut board);

        assert_eq!(report.reconnect_failures, 0);
        assert_eq!(report.heartbeat, Heartbeat::NotDue);
        assert_eq!(report.dust, None);
        assert_eq!(report.air, None);
        assert_eq!(monitor.dust_window().accumulator(), 10_000);
        assert_eq!(monitor.connection().state(), ConnectionState::Connected);
        assert_eq!(board.display.0.len(), 1);
    }

    #[test]
    fn publishes_concentration_once_per_window() {
        let (mut monitor, mut board, clock) = setup(ScriptedSession::default());

        for step in 1..=30 {
            clock.0.set(step * 1_000);
            monitor.tick(&clock, &mut board);
        }

        let concentration_msgs: Vec<_> = monitor
            .connection()
            .session()
            .published
            .iter()
            .filter(|(topic, _)| topic == "plants/feeds/concentration")
            .map(|(_, payload)| payload.clone())
            .collect();
        assert_eq!(concentration_msgs, vec!["517.92".to_string()]);
        assert_eq!(monitor.dust_window().accumulator(), 0);
    }

    #[test]
    fn air_quality_reports_on_its_interval_and_paints_strip() {
        let (mut monitor, mut board, clock) = setup(ScriptedSession::default());
        clock.0.set(1_000);

        let report = monitor.tick(&clock, &mut board);

        assert_eq!(report.air, Some((AirQuality::FreshAir, 105)));
        assert_eq!(report.air_publish, Some(PublishOutcome::Sent));
        assert_eq!(monitor.leds().strip().0, vec![Rgb::new(0, 25, 0); 4]);

        clock.0.set(1_500);
        assert_eq!(monitor.tick(&clock, &mut board).air, None);
    }

    #[test]
    fn strip_animates_only_when_category_changes() {
        let (mut monitor, mut board, clock) = setup(ScriptedSession::default());

        clock.0.set(1_000);
        monitor.tick(&clock, &mut board);
        assert_eq!(monitor.connection_mut().delay_mut().sleeps, vec![25; 4]);

        clock.0.set(2_000);
        monitor.tick(&clock, &mut board);
        assert_eq!(monitor.connection_mut().delay_mut().sleeps, vec![25; 4]);

        board.air = FixedAir(Some(180));
        clock.0.set(3_000);
        assert_eq!(
            monitor.tick(&clock, &mut board).air,
            Some((AirQuality::LowPollution, 180))
        );
        assert_eq!(monitor.connection_mut().delay_mut().sleeps, vec![25; 8]);
        assert_eq!(monitor.leds().strip().0, vec![Rgb::new(25, 25, 0); 4]);
    }

    #[test]
    fn failed_air_read_is_unknown_and_not_published() {
        let (mut monitor, mut board, clock) = setup(ScriptedSession::default());
        clock.0.set(1_000);
        monitor.tick(&clock, &mut board);

        board.air = FixedAir(None);
        clock.0.set(2_000);
        let report = monitor.tick(&clock, &mut board);

        assert_eq!(report.air, None);
        assert_eq!(report.air_publish, None);
        assert_eq!(monitor.status().air_quality, AirQuality::Unknown);
        assert_eq!(monitor.status().air_raw, None);
        assert_eq!(monitor.leds().strip().0, vec![Rgb::OFF; 4]);
        assert_eq!(
            monitor.connection().session().published,
            vec![("plants/feeds/airQuality".to_string(), "105".to_string())]
        );
    }

    #[test]
    fn failed_ping_drops_connection_until_next_tick() {
        let mut session = ScriptedSession::default();
        session.ping_results.push_back(false);
        let (mut monitor, mut board, clock) = setup(session);
        clock.0.set(120_000);

        let report = monitor.tick(&clock, &mut board);

        assert_eq!(report.heartbeat, Heartbeat::Lost);
        assert_eq!(report.dust_publish, Some(PublishOutcome::Disconnected));
        assert_eq!(report.air_publish, Some(PublishOutcome::Disconnected));
        assert!(monitor.connection().session().published.is_empty());

        clock.0.set(121_000);
        monitor.tick(&clock, &mut board);
        assert_eq!(monitor.connection().session().connect_calls, 2);
        assert_eq!(monitor.connection().state(), ConnectionState::Connected);
    }

    #[test]
    fn reset_clears_accumulated_state() {
        let (mut monitor, mut board, clock) = setup(ScriptedSession::default());
        clock.0.set(1_000);
        monitor.tick(&clock, &mut board);

        monitor.reset(5_000);

        assert_eq!(monitor.dust_window().accumulator(), 0);
        assert_eq!(monitor.dust_window().window_start(), 5_000);
        assert_eq!(monitor.connection().state(), ConnectionState::Disconnected);
        assert_eq!(monitor.status().air_raw, None);
    }
}
