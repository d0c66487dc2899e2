use serde::{Deserialize, Serialize};

/// Sampling and session timing. All durations are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    pub dust_window_ms: u32,
    /// Divisor applied per window millisecond when turning low-pulse occupancy (µs) into a ratio.
    pub dust_normalization: f32,
    pub air_report_interval_ms: u32,
    pub keepalive_interval_ms: u32,
    pub reconnect_backoff_ms: u32,
    pub air_baseline_interval_ms: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            dust_window_ms: 30_000,
            dust_normalization: 10.0,
            air_report_interval_ms: 1_000,
            keepalive_interval_ms: 120_000,
            reconnect_backoff_ms: 5_000,
            air_baseline_interval_ms: 500_000,
        }
    }
}

impl MonitorConfig {
    pub fn sanitize(&mut self) {
        self.dust_window_ms = self.dust_window_ms.max(1_000);
        if !self.dust_normalization.is_finite() || self.dust_normalization <= 0.0 {
            self.dust_normalization = 10.0;
        }
        self.air_report_interval_ms = self.air_report_interval_ms.max(100);
        self.keepalive_interval_ms = self.keepalive_interval_ms.max(1_000);
        self.reconnect_backoff_ms = self.reconnect_backoff_ms.clamp(100, 600_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub broker_host: String,
    pub broker_port: u16,
    pub broker_username: String,
    pub broker_key: String,
    pub client_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            broker_host: "io.adafruit.com".to_string(),
            broker_port: 1883,
            broker_username: String::new(),
            broker_key: String::new(),
            client_id: "watering-monitor".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedConfig {
    pub pixel_count: u16,
    pub brightness: u8,
    pub fill_step_ms: u32,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            pixel_count: 46,
            brightness: 25,
            fill_step_ms: 25,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    pub monitor: MonitorConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub led: LedConfig,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sanitize_restores_invalid_normalization() {
        let mut config = MonitorConfig {
            dust_normalization: 0.0,
            reconnect_backoff_ms: 0,
            ..MonitorConfig::default()
        };
        config.sanitize();

        assert_eq!(config.dust_normalization, 10.0);
        assert_eq!(config.reconnect_backoff_ms, 100);
    }

    #[test]
    fn runtime_config_without_led_section_uses_defaults() {
        let json = serde_json::json!({
            "monitor": MonitorConfig::default(),
            "network": NetworkConfig::default(),
        });

        let runtime: RuntimeConfig = serde_json::from_value(json).unwrap();

        assert_eq!(runtime.led, LedConfig::default());
        assert_eq!(runtime.monitor.keepalive_interval_ms, 120_000);
    }
}
