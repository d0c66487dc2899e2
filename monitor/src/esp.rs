use core::convert::TryInto;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use bme280::i2c::BME280;
use embedded_svc::{
    mqtt::client::QoS,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::{Ets, FreeRtos},
    gpio::{AnyInputPin, Gpio34, Input, InputPin, PinDriver},
    i2c::{I2cConfig, I2cDriver},
    units::FromValueType,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    log::EspLogger,
    mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration},
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use watering_common::{
    AirQualitySensor, Board, BrokerSession, Clock, Delay, DustSensor, EnvironmentReading,
    EnvironmentSensor, FailureLatch, FeedTopics, Millis, Monitor, NetworkConfig, RuntimeConfig,
    SlopeClassifier, StatusReport, StatusSink,
};

use crate::led::Ws2812Strip;

const BME280_I2C_BAUD_KHZ: u32 = 100;
const AIR_SENSOR_WARMUP_MS: u32 = 20_000;
const PULSE_TIMEOUT: Duration = Duration::from_secs(1);
const MQTT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const WIFI_RETRY_DELAY_MS: u32 = 3_000;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut runtime = RuntimeConfig::default();
    apply_build_credentials(&mut runtime.network);

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    let _wifi = connect_wifi(peripherals.modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;

    let dust =
        DustPin::new(pins.gpio27.downgrade_input()).context("failed to init dust sensor pin")?;

    let adc = AdcDriver::new(peripherals.adc1).context("failed to init ADC1")?;
    let adc_config = AdcChannelConfig {
        attenuation: DB_11,
        ..Default::default()
    };
    let mut air = AirPin {
        channel: AdcChannelDriver::new(adc, pins.gpio34, &adc_config)
            .context("failed to init air quality ADC channel")?,
        reads: FailureLatch::default(),
    };

    let i2c = I2cDriver::new(
        peripherals.i2c0,
        pins.gpio21,
        pins.gpio22,
        &I2cConfig::new().baudrate(BME280_I2C_BAUD_KHZ.kHz().into()),
    )
    .context("failed to init I2C bus")?;
    let environment = Bme280Sensor::new(i2c);

    let strip = Ws2812Strip::new(
        peripherals.rmt.channel0,
        pins.gpio13,
        usize::from(runtime.led.pixel_count),
    )?;

    info!("waiting for air quality sensor to warm up...");
    FreeRtos::delay_ms(AIR_SENSOR_WARMUP_MS);

    let clock = DeviceClock;
    let now = clock.now_ms();
    let mut classifier = SlopeClassifier::new(runtime.monitor.air_baseline_interval_ms);
    match air.raw_value() {
        Some(raw) if classifier.init(raw, now) => info!("air quality sensor ready"),
        _ => warn!("air quality sensor ERROR"),
    }

    let keep_alive = Duration::from_millis(u64::from(runtime.monitor.keepalive_interval_ms));
    let session = EspBrokerSession::new(&runtime.network, keep_alive);
    let topics = FeedTopics::for_user(&runtime.network.broker_username);
    let mut monitor = Monitor::new(
        runtime.monitor.clone(),
        &runtime.led,
        topics,
        session,
        FreeRtosDelay,
        classifier,
        strip,
        now,
    );

    let mut board = Board {
        dust,
        air,
        environment,
        display: LogDisplay::default(),
    };

    loop {
        monitor.tick(&clock, &mut board);
    }
}

fn apply_build_credentials(network: &mut NetworkConfig) {
    network.wifi_ssid = option_env!("WIFI_SSID").unwrap_or("CHANGE_ME").to_string();
    network.wifi_pass = option_env!("WIFI_PASS").unwrap_or_default().to_string();
    if let Some(host) = option_env!("AIO_SERVER") {
        network.broker_host = host.to_string();
    }
    network.broker_username = option_env!("AIO_USERNAME").unwrap_or_default().to_string();
    network.broker_key = option_env!("AIO_KEY").unwrap_or_default().to_string();
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut attempt = 0_u32;
    loop {
        attempt = attempt.saturating_add(1);
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                break;
            }
            Err(err) => {
                warn!("wifi connect attempt {attempt} failed: {err:#}");
                let _ = wifi.disconnect();
                FreeRtos::delay_ms(WIFI_RETRY_DELAY_MS);
            }
        }
    }

    drop(wifi);
    Ok(esp_wifi)
}

/// ESP-IDF MQTT client. The client runs its own network task; connection
/// state reaches the loop through `connected`.
struct EspBrokerSession {
    url: String,
    client_id: String,
    username: String,
    key: String,
    keep_alive: Duration,
    client: Option<EspMqttClient<'static>>,
    connected: Arc<AtomicBool>,
}

impl EspBrokerSession {
    fn new(network: &NetworkConfig, keep_alive: Duration) -> Self {
        Self {
            url: format!("mqtt://{}:{}", network.broker_host, network.broker_port),
            client_id: network.client_id.clone(),
            username: network.broker_username.clone(),
            key: network.broker_key.clone(),
            keep_alive,
            client: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn wait_for_connack(&self) -> bool {
        let deadline = Instant::now() + MQTT_CONNECT_TIMEOUT;
        while Instant::now() < deadline {
            if self.connected.load(Ordering::Relaxed) {
                return true;
            }
            FreeRtos::delay_ms(50);
        }
        false
    }
}

impl BrokerSession for EspBrokerSession {
    fn connect(&mut self) -> i8 {
        // Dropping the client stops its network task before a new one starts.
        self.client = None;

        let conf = MqttClientConfiguration {
            client_id: Some(self.client_id.as_str()),
            username: (!self.username.is_empty()).then_some(self.username.as_str()),
            password: (!self.key.is_empty()).then_some(self.key.as_str()),
            keep_alive_interval: Some(self.keep_alive),
            ..Default::default()
        };

        let (client, mut conn) = match EspMqttClient::new(&self.url, &conf) {
            Ok(pair) => pair,
            Err(err) => {
                warn!("failed to create mqtt client: {err:?}");
                return -1;
            }
        };

        // Fresh flag per client so a poll thread of a dropped client cannot clear it.
        self.connected = Arc::new(AtomicBool::new(false));
        let connected = self.connected.clone();
        let spawned = thread::Builder::new()
            .name("mqtt-poll".to_string())
            .stack_size(6 * 1024)
            .spawn(move || {
                // Ends once the client is dropped.
                while let Ok(event) = conn.next() {
                    match event.payload() {
                        EventPayload::Connected(_) => connected.store(true, Ordering::Relaxed),
                        EventPayload::Disconnected => connected.store(false, Ordering::Relaxed),
                        _ => {}
                    }
                }
                connected.store(false, Ordering::Relaxed);
            });
        if let Err(err) = spawned {
            warn!("failed to spawn mqtt poll thread: {err}");
            return -1;
        }

        if self.wait_for_connack() {
            self.client = Some(client);
            0
        } else {
            -1
        }
    }

    fn disconnect(&mut self) {
        self.client = None;
        self.connected.store(false, Ordering::Relaxed);
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && self.connected.load(Ordering::Relaxed)
    }

    // The ESP-IDF client has no manual PINGREQ. Its keep-alive runs on the
    // heartbeat interval and a missed PINGRESP arrives as a Disconnected
    // event, which clears `connected`.
    fn ping(&mut self) -> bool {
        self.is_connected()
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        let Some(client) = self.client.as_mut() else {
            return false;
        };

        match client.publish(topic, QoS::AtMostOnce, false, payload) {
            Ok(_) => true,
            Err(err) => {
                warn!("mqtt publish to {topic} failed: {err:?}");
                false
            }
        }
    }
}

struct DeviceClock;

impl Clock for DeviceClock {
    fn now_ms(&self) -> Millis {
        static START: OnceLock<Instant> = OnceLock::new();
        START.get_or_init(Instant::now).elapsed().as_millis() as Millis
    }
}

struct FreeRtosDelay;

impl Delay for FreeRtosDelay {
    fn delay_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}

struct DustPin {
    pin: PinDriver<'static, AnyInputPin, Input>,
}

impl DustPin {
    fn new(pin: AnyInputPin) -> anyhow::Result<Self> {
        Ok(Self {
            pin: PinDriver::input(pin)?,
        })
    }
}

impl DustSensor for DustPin {
    fn low_pulse_us(&mut self) -> u32 {
        let start = Instant::now();
        let timed_out = || start.elapsed() >= PULSE_TIMEOUT;

        while self.pin.is_low() {
            if timed_out() {
                return 0;
            }
        }
        while self.pin.is_high() {
            if timed_out() {
                return 0;
            }
        }

        let pulse_start = Instant::now();
        while self.pin.is_low() {
            if timed_out() {
                return 0;
            }
        }
        pulse_start.elapsed().as_micros().try_into().unwrap_or(u32::MAX)
    }
}

struct AirPin {
    channel: AdcChannelDriver<'static, Gpio34, AdcDriver<'static, ADC1>>,
    reads: FailureLatch,
}

impl AirQualitySensor for AirPin {
    fn raw_value(&mut self) -> Option<i32> {
        match self.channel.read_raw() {
            // Classifier thresholds are calibrated for a 10-bit converter.
            Ok(raw) => {
                if self.reads.recover() {
                    info!("air quality ADC reads recovered");
                }
                Some(i32::from(raw >> 2))
            }
            Err(err) => {
                if self.reads.fail() {
                    warn!("air quality ADC read failed: {err:?}");
                }
                None
            }
        }
    }
}

struct Bme280Sensor {
    device: Option<BME280<I2cDriver<'static>>>,
    delay: Ets,
    reads: FailureLatch,
}

impl Bme280Sensor {
    fn new(i2c: I2cDriver<'static>) -> Self {
        let mut delay = Ets;
        let mut device = BME280::new_primary(i2c);
        let device = match device.init(&mut delay) {
            Ok(()) => Some(device),
            Err(err) => {
                warn!("failed to connect bme device: {err:?}");
                None
            }
        };
        Self {
            device,
            delay,
            reads: FailureLatch::default(),
        }
    }
}

impl EnvironmentSensor for Bme280Sensor {
    fn read(&mut self) -> Option<EnvironmentReading> {
        let device = self.device.as_mut()?;
        match device.measure(&mut self.delay) {
            Ok(m) => {
                if self.reads.recover() {
                    info!("BME280 reads recovered");
                }
                Some(EnvironmentReading {
                    temperature_c: m.temperature,
                    pressure_pa: m.pressure,
                    humidity_pct: m.humidity,
                })
            }
            Err(err) => {
                if self.reads.fail() {
                    warn!("BME280 read error: {err:?}");
                }
                None
            }
        }
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
            for line in &lines {
                info!("[display] {line}");
            }
            self.last = lines;
        }
    }
}
