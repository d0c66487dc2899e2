use std::{
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

use rumqttc::{
    Client, Connection, ConnectionError, ConnectReturnCode, Event, MqttOptions, Packet, QoS,
};
use tracing::{debug, info, warn};

use watering_common::{
    AirQualitySensor, Board, BrokerSession, Clock, Delay, DustSensor, EnvironmentReading,
    EnvironmentSensor, FeedTopics, Millis, Monitor, NetworkConfig, PixelStrip, Rgb,
    RuntimeConfig, SlopeClassifier, StatusReport, StatusSink,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PUMP_WINDOW: Duration = Duration::from_millis(50);
const PING_TIMEOUT: Duration = Duration::from_secs(10);
const TICK_PERIOD: Duration = Duration::from_millis(100);
const REQUEST_CAPACITY: usize = 16;

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = RuntimeConfig::default();
    apply_env_overrides(&mut runtime.network);

    let clock = HostClock;
    let now = clock.now_ms();

    let mut classifier = SlopeClassifier::new(runtime.monitor.air_baseline_interval_ms);
    let mut air = SimulatedAir::default();
    match air.raw_value() {
        Some(raw) if classifier.init(raw, now) => info!("air quality sensor ready"),
        _ => warn!("air quality sensor init failed; classifying anyway"),
    }

    let topics = FeedTopics::for_user(&runtime.network.broker_username);
    let keep_alive = Duration::from_millis(u64::from(runtime.monitor.keepalive_interval_ms));
    let session = MqttSession::new(&runtime.network, keep_alive);
    let strip = LogStrip::new(usize::from(runtime.led.pixel_count));

    let mut monitor = Monitor::new(
        runtime.monitor.clone(),
        &runtime.led,
        topics,
        session,
        ThreadDelay,
        classifier,
        strip,
        now,
    );

    let mut board = Board {
        dust: SimulatedDust::default(),
        air,
        environment: SimulatedEnvironment::default(),
        display: LogDisplay::default(),
    };

    info!(
        "watering monitor started; broker {}:{}",
        runtime.network.broker_host, runtime.network.broker_port
    );

    loop {
        monitor.tick(&clock, &mut board);
        thread::sleep(TICK_PERIOD);
    }
}

fn apply_env_overrides(network: &mut NetworkConfig) {
    if let Ok(host) = std::env::var("AIO_SERVER") {
        network.broker_host = host;
    }
    if let Some(port) = std::env::var("AIO_SERVERPORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        network.broker_port = port;
    }
    if let Ok(user) = std::env::var("AIO_USERNAME") {
        network.broker_username = user;
    }
    if let Ok(key) = std::env::var("AIO_KEY") {
        network.broker_key = key;
    }
}

struct MqttSession {
    options: MqttOptions,
    client: Option<Client>,
    connection: Option<Connection>,
    connected: bool,
    last_ping_response: Option<Instant>,
}

impl MqttSession {
    /// `keep_alive` matches the heartbeat interval so every heartbeat has a
    /// library PINGREQ/PINGRESP exchange to check.
    fn new(network: &NetworkConfig, keep_alive: Duration) -> Self {
        let mut options = MqttOptions::new(
            network.client_id.clone(),
            network.broker_host.clone(),
            network.broker_port,
        );
        options.set_keep_alive(keep_alive.max(Duration::from_secs(5)));
        if !network.broker_username.is_empty() {
            options.set_credentials(network.broker_username.clone(), network.broker_key.clone());
        }

        Self {
            options,
            client: None,
            connection: None,
            connected: false,
            last_ping_response: None,
        }
    }

    /// Drives the event loop for a short window so queued requests are sent.
    /// Returns false if the transport reported an error.
    fn pump(&mut self) -> bool {
        let Some(connection) = self.connection.as_mut() else {
            return false;
        };

        let deadline = Instant::now() + PUMP_WINDOW;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }

            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::PingResp))) => {
                    debug!("mqtt ping response");
                    self.last_ping_response = Some(Instant::now());
                }
                Ok(Ok(event)) => debug!("mqtt event: {event:?}"),
                Ok(Err(err)) => {
                    warn!("mqtt transport error: {err}");
                    self.connected = false;
                    return false;
                }
                Err(_) => return true,
            }
        }
    }
}

fn refused_code(code: ConnectReturnCode) -> i8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
        #[allow(unreachable_patterns)]
        _ => -1,
    }
}

impl BrokerSession for MqttSession {
    fn connect(&mut self) -> i8 {
        let (client, mut connection) = Client::new(self.options.clone(), REQUEST_CAPACITY);

        let deadline = Instant::now() + CONNECT_TIMEOUT;
        let code = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break -1;
            }

            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => break refused_code(ack.code),
                Ok(Ok(_)) => continue,
                Ok(Err(ConnectionError::ConnectionRefused(code))) => break refused_code(code),
                Ok(Err(err)) => {
                    debug!("mqtt connect error: {err}");
                    break -1;
                }
                Err(_) => break -1,
            }
        };

        if code == 0 {
            self.client = Some(client);
            self.connection = Some(connection);
            self.connected = true;
            // CONNACK counts as the first broker response.
            self.last_ping_response = Some(Instant::now());
        }
        code
    }

    fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(err) = client.try_disconnect() {
                debug!("mqtt disconnect request failed: {err}");
            }
        }
        self.connection = None;
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    /// Alive if a PINGRESP arrived within the last keep-alive period, or
    /// arrives before `PING_TIMEOUT`. The event loop itself errors out when a
    /// PINGREQ goes unanswered.
    fn ping(&mut self) -> bool {
        let keep_alive = self.options.keep_alive();
        let deadline = Instant::now() + PING_TIMEOUT;
        while self.connected {
            if !self.pump() {
                return false;
            }
            if answered_within(self.last_ping_response, Instant::now(), keep_alive) {
                return true;
            }
            if Instant::now() >= deadline {
                warn!("no ping response from broker within {PING_TIMEOUT:?}");
                return false;
            }
        }
        false
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        let Some(client) = self.client.as_ref() else {
            return false;
        };

        if let Err(err) = client.try_publish(topic, QoS::AtMostOnce, false, payload.to_vec()) {
            warn!("mqtt publish to {topic} failed: {err}");
            return false;
        }
        self.pump()
    }
}

fn answered_within(last_response: Option<Instant>, now: Instant, window: Duration) -> bool {
    last_response.is_some_and(|at| now.saturating_duration_since(at) <= window)
}

struct HostClock;

impl Clock for HostClock {
    fn now_ms(&self) -> Millis {
        static START: OnceLock<Instant> = OnceLock::new();
        // Truncation reproduces the device's wrapping millisecond counter.
        START.get_or_init(Instant::now).elapsed().as_millis() as Millis
    }
}

struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

#[derive(Default)]
struct SimulatedDust {
    tick: u32,
}

impl DustSensor for SimulatedDust {
    fn low_pulse_us(&mut self) -> u32 {
        self.tick = self.tick.wrapping_add(1);
        // Mostly clean air with a dusty spell every few hundred reads.
        if self.tick % 400 < 40 {
            60_000 + (self.tick % 7) * 1_500
        } else {
            (self.tick % 5) * 400
        }
    }
}

#[derive(Default)]
struct SimulatedAir {
    tick: u32,
}

impl AirQualitySensor for SimulatedAir {
    fn raw_value(&mut self) -> Option<i32> {
        self.tick = self.tick.wrapping_add(1);
        let phase = (self.tick % 60) as i32;
        let drift = if phase < 30 { phase } else { 60 - phase };
        Some(120 + drift * 3)
    }
}

#[derive(Default)]
struct SimulatedEnvironment {
    tick: u32,
}

impl EnvironmentSensor for SimulatedEnvironment {
    fn read(&mut self) -> Option<EnvironmentReading> {
        self.tick = self.tick.wrapping_add(1);
        let step = (self.tick % 100) as f32;
        Some(EnvironmentReading {
            temperature_c: 21.0 + step * 0.01,
            pressure_pa: 101_325.0 - step,
            humidity_pct: 45.0 + step * 0.05,
        })
    }
}

#[derive(Default)]
struct LogDisplay {
    last: Vec<String>,
}

impl StatusSink for LogDisplay {
    fn show(&mut self, report: &StatusReport) {
        let lines = report.lines();
        if lines != self.last {
            info!("display: {}", lines.join(" | "));
            self.last = lines;
        }
    }
}

struct LogStrip {
    pixels: Vec<Rgb>,
}

impl LogStrip {
    fn new(len: usize) -> Self {
        Self {
            pixels: vec![Rgb::OFF; len],
        }
    }
}

impl PixelStrip for LogStrip {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = color;
        }
    }

    fn show(&mut self) {
        if let Some(first) = self.pixels.first() {
            debug!(
                "strip: {} pixels, first #{:02x}{:02x}{:02x}",
                self.pixels.len(),
                first.r,
                first.g,
                first.b
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_needs_a_response_inside_the_keep_alive_window() {
        let keep_alive = Duration::from_secs(120);
        let at = Instant::now();

        assert!(!answered_within(None, at, keep_alive));
        assert!(answered_within(Some(at), at + keep_alive, keep_alive));
        assert!(!answered_within(
            Some(at),
            at + keep_alive + Duration::from_millis(1),
            keep_alive
        ));
    }
}
