use serde::{Deserialize, Serialize};

use crate::types::FanLevel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanConfig {
    pub default_level: FanLevel,
    pub blink_times: u8,
    pub blink_interval_ms: u64,
    pub blink_queue_capacity: usize,
    pub timer_poll_interval_ms: u64,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            default_level: FanLevel::High,
            blink_times: 2,
            blink_interval_ms: 50,
            blink_queue_capacity: 4,
            timer_poll_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinConfig {
    pub led: i32,
    pub high: i32,
    pub medium: i32,
    pub low: i32,
    pub button: i32,
    pub factory_reset_hold_ms: u64,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            led: 23,
            high: 16,
            medium: 33,
            low: 32,
            button: 0,
            factory_reset_hold_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub hostname: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            hostname: "fan".to_string(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessoryConfig {
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub serial_number: String,
    pub firmware_revision: String,
    pub setup_code: String,
    pub setup_id: String,
}

impl Default for AccessoryConfig {
    fn default() -> Self {
        Self {
            name: "Fan Controller".to_string(),
            model: "ESP32FAN".to_string(),
            manufacturer: "Fan Works".to_string(),
            serial_number: "20240524".to_string(),
            firmware_revision: "1.0".to_string(),
            setup_code: "111-11-111".to_string(),
            setup_id: "7G9X".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub fan: FanConfig,
    #[serde(default)]
    pub pins: PinConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub accessory: AccessoryConfig,
}

impl FanConfig {
    pub fn sanitize(&mut self) {
        self.blink_times = self.blink_times.clamp(1, 10);
        self.blink_interval_ms = self.blink_interval_ms.clamp(10, 1_000);
        self.blink_queue_capacity = self.blink_queue_capacity.clamp(1, 16);
        self.timer_poll_interval_ms = self.timer_poll_interval_ms.clamp(50, 1_000);
    }
}

impl PinConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if self.led < 0 {
            self.led = defaults.led;
        }
        if self.high < 0 {
            self.high = defaults.high;
        }
        if self.medium < 0 {
            self.medium = defaults.medium;
        }
        if self.low < 0 {
            self.low = defaults.low;
        }
        if self.button < 0 {
            self.button = defaults.button;
        }

        // Relay lines must be distinct or two speeds would share one output.
        if self.high == self.medium || self.medium == self.low || self.high == self.low {
            self.high = defaults.high;
            self.medium = defaults.medium;
            self.low = defaults.low;
        }

        self.factory_reset_hold_ms = self.factory_reset_hold_ms.clamp(1_000, 10_000);
    }

    pub fn relay_pin(&self, level: FanLevel) -> i32 {
        match level {
            FanLevel::Low => self.low,
            FanLevel::Medium => self.medium,
            FanLevel::High => self.high,
        }
    }
}

impl NetworkConfig {
    pub fn sanitize(&mut self) {
        if self.http_port == 0 {
            self.http_port = 8080;
        }
        if self.hostname.trim().is_empty() {
            self.hostname = "fan".to_string();
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.fan.sanitize();
        self.pins.sanitize();
        self.network.sanitize();
    }
}
