//! Driver configuration
//!
//! Defaults match a stock module on a 57600 baud UART. A TOML file may
//! override any subset of fields; `FPSENSE_PORT` and `FPSENSE_LOG` override
//! the serial port and log level after loading.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fpsense_core::constants::{
    CHAR_BUFFERS, DEFAULT_BAUD_RATE, DEFAULT_PASSWORD, DEFAULT_TIMEOUT_MS, MAX_RETRIES,
};
use fpsense_core::DEFAULT_ADDRESS;

use crate::error::{Error, Result};
use crate::retry::{Backoff, RetryPolicy};

/// Environment variable overriding `serial.port`
pub const ENV_PORT: &str = "FPSENSE_PORT";

/// Environment variable overriding `log_level`
pub const ENV_LOG: &str = "FPSENSE_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Module address
    pub address: u32,

    /// Handshake password
    pub password: u32,

    pub poll_interval_ms: u64,
    pub command_timeout_ms: u64,

    /// Sleep between reads while waiting for a reply
    pub read_poll_interval_ms: u64,

    /// Placements per enrollment, 1..=6
    pub enroll_samples: u8,

    pub retry: RetryConfig,

    /// Consecutive polling failures before "Sensor unresponsive"
    pub unresponsive_threshold: u32,

    pub match_hold_off_ms: u64,
    pub ring_hold_off_ms: u64,

    /// Wait before the second handshake attempt during setup
    pub setup_retry_delay_ms: u64,

    /// Drive the Aura LED
    pub led_feedback: bool,

    /// Check the notepad pairing code during setup and block matches on mismatch
    pub pairing_enabled: bool,

    pub serial: SerialConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub exponential: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            password: DEFAULT_PASSWORD,
            poll_interval_ms: 200,
            command_timeout_ms: DEFAULT_TIMEOUT_MS,
            read_poll_interval_ms: 5,
            enroll_samples: 5,
            retry: RetryConfig::default(),
            unresponsive_threshold: 3,
            match_hold_off_ms: 3_000,
            ring_hold_off_ms: 1_000,
            setup_retry_delay_ms: 5_000,
            led_feedback: true,
            pairing_enabled: false,
            serial: SerialConfig::default(),
            log_level: "info".into(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES as u32,
            base_delay_ms: 100,
            exponential: true,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl DriverConfig {
    /// Parse TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;

        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse TOML {}: {e}", path.display())))
    }

    /// Apply `FPSENSE_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup(ENV_PORT) {
            self.serial.port = port;
        }
        if let Some(level) = lookup(ENV_LOG) {
            self.log_level = level;
        }
    }

    /// Reject settings the driver cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".into()));
        }
        if self.command_timeout_ms == 0 {
            return Err(Error::Config("command_timeout_ms must be positive".into()));
        }
        if self.read_poll_interval_ms == 0 {
            return Err(Error::Config("read_poll_interval_ms must be positive".into()));
        }
        if !(1..=CHAR_BUFFERS).contains(&self.enroll_samples) {
            return Err(Error::Config(format!(
                "enroll_samples must be within 1..={}, got {}",
                CHAR_BUFFERS, self.enroll_samples
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.unresponsive_threshold == 0 {
            return Err(Error::Config("unresponsive_threshold must be at least 1".into()));
        }
        Ok(())
    }

    pub fn with_address(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    pub fn with_password(mut self, password: u32) -> Self {
        self.password = password;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_enroll_samples(mut self, samples: u8) -> Self {
        self.enroll_samples = samples;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_led_feedback(mut self, enabled: bool) -> Self {
        self.led_feedback = enabled;
        self
    }

    pub fn with_pairing(mut self, enabled: bool) -> Self {
        self.pairing_enabled = enabled;
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.serial.port = port.into();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn read_poll_interval(&self) -> Duration {
        Duration::from_millis(self.read_poll_interval_ms)
    }

    pub fn match_hold_off(&self) -> Duration {
        Duration::from_millis(self.match_hold_off_ms)
    }

    pub fn ring_hold_off(&self) -> Duration {
        Duration::from_millis(self.ring_hold_off_ms)
    }

    pub fn setup_retry_delay(&self) -> Duration {
        Duration::from_millis(self.setup_retry_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            backoff: if self.retry.exponential {
                Backoff::Exponential
            } else {
                Backoff::Fixed
            },
        }
    }
}
