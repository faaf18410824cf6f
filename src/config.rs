//! System configuration and hardware constants
//!
//! This module defines the compile-time constants for the B.R.A.V.O. node:
//! LoRa modem parameters, scheduler intervals, bus settings and buffer sizes.
//! Values the operator may retune at runtime live in [`LinkSettings`] and
//! arrive through a [`ConfigChannel`].

use heapless::String;

use crate::types::DeviceRole;

/// Device identifier carried in every telemetry record
pub const DEVICE_ID: &str = "BRAVO_001";

/// Maximum length of a device identifier or name
pub const DEVICE_NAME_LEN: usize = 32;

/// Default name advertised on the configuration channel
pub const DEFAULT_DEVICE_NAME: &str = "BRAVO_COLLAR";

/// LoRa carrier frequency (US 915 MHz ISM band)
pub const LORA_FREQUENCY_HZ: u32 = 915_000_000;

/// LoRa spreading factor
pub const LORA_SPREADING_FACTOR: u8 = 7;

/// LoRa signal bandwidth in Hz
pub const LORA_BANDWIDTH_HZ: u32 = 125_000;

/// LoRa coding rate denominator (4/5)
pub const LORA_CODING_RATE: u8 = 5;

/// LoRa sync word (private network)
pub const LORA_SYNC_WORD: u8 = 0x12;

/// Default transmit power in dBm
pub const LORA_TX_POWER_DBM: i8 = 20;

/// Largest payload the SX127x FIFO accepts
pub const MAX_PACKET_LEN: usize = 255;

/// Blocking transmit gives up after this long without TxDone
pub const TX_TIMEOUT_MS: u32 = 2_000;

/// Encoded telemetry scratch buffer size
pub const TELEMETRY_BUFFER_LEN: usize = 512;

/// Characters kept from the last received payload for display
pub const PAYLOAD_PREVIEW_LEN: usize = 32;

/// GPS sampling interval default in milliseconds
pub const GPS_INTERVAL_MS: u32 = 1_000;

/// IMU sampling interval in milliseconds
pub const IMU_INTERVAL_MS: u32 = 100;

/// Telemetry transmit interval default in milliseconds
pub const TELEMETRY_INTERVAL_MS: u32 = 10_000;

/// Status report interval in milliseconds
pub const STATUS_INTERVAL_MS: u32 = 5_000;

/// Display refresh interval in milliseconds
pub const DISPLAY_INTERVAL_MS: u32 = 1_000;

/// Idle delay at the end of each main loop iteration
pub const LOOP_IDLE_MS: u64 = 10;

/// A GPS fix older than this many GPS intervals is shown as stale
pub const GPS_STALE_FACTOR: u32 = 3;

/// Button debounce time in milliseconds
pub const BUTTON_DEBOUNCE_MS: u32 = 250;

/// Standard gravity used for activity scoring, m/s²
pub const GRAVITY_MS2: f32 = 9.8;

/// Deviation from gravity (m/s²) above which the node counts as moving
pub const MOTION_THRESHOLD_MS2: f32 = 1.0;

/// I2C bus frequency for the OLED and MPU6050
pub const I2C_FREQUENCY_HZ: u32 = 400_000;

/// SPI clock for the SX127x
pub const SPI_FREQUENCY_HZ: u32 = 8_000_000;

/// GPS UART baud rate
pub const GPS_BAUD_RATE: u32 = 9_600;

/// SSD1306 OLED I2C address
pub const DISPLAY_I2C_ADDR: u8 = 0x3C;

/// MPU6050 I2C address (AD0 low)
pub const MPU6050_I2C_ADDR: u8 = 0x68;

/// Battery sense divider ratio (two equal resistors)
pub const BATTERY_DIVIDER_RATIO: f32 = 2.0;

/// ADC reference voltage
pub const ADC_VREF: f32 = 3.3;

/// Serial console line buffer size
pub const CONSOLE_BUFFER_SIZE: usize = 64;

/// USB CDC ACM packet size
pub const USB_CDC_PACKET_SIZE: u16 = 64;

/// USB VID (use test VID for development)
pub const USB_VID: u16 = 0x1209;

/// USB PID (get from pid.codes for production)
pub const USB_PID: u16 = 0x0001;

/// Role this build runs as
#[cfg(feature = "role-beacon")]
pub const DEVICE_ROLE: DeviceRole = DeviceRole::Beacon;

/// Role this build runs as
#[cfg(all(feature = "role-relay", not(feature = "role-beacon")))]
pub const DEVICE_ROLE: DeviceRole = DeviceRole::Relay;

/// Role this build runs as
#[cfg(not(any(feature = "role-beacon", feature = "role-relay")))]
pub const DEVICE_ROLE: DeviceRole = DeviceRole::Both;

/// Runtime-tunable link settings
///
/// Only the two intervals feed the scheduler; frequency and power are kept
/// for the configuration channel to report and are applied at next boot.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkSettings {
    /// Radio carrier frequency in MHz
    pub frequency_mhz: f32,
    /// Radio output power in dBm
    pub power_dbm: i8,
    /// GPS sampling interval in milliseconds
    pub gps_interval_ms: u32,
    /// Telemetry transmit interval in milliseconds
    pub telemetry_interval_ms: u32,
    /// Advertised device name
    pub device_name: String<DEVICE_NAME_LEN>,
}

impl LinkSettings {
    /// Lowest accepted carrier frequency (SX1276 band floor)
    pub const MIN_FREQUENCY_MHZ: f32 = 137.0;

    /// Highest accepted carrier frequency (SX1276 band ceiling)
    pub const MAX_FREQUENCY_MHZ: f32 = 1020.0;

    /// Lowest accepted output power
    pub const MIN_POWER_DBM: i8 = 2;

    /// Highest accepted output power (PA_BOOST with PA_DAC)
    pub const MAX_POWER_DBM: i8 = 20;

    /// Shortest accepted sampling or transmit interval
    pub const MIN_INTERVAL_MS: u32 = 100;
}

impl Default for LinkSettings {
    fn default() -> Self {
        let mut device_name = String::new();
        // DEFAULT_DEVICE_NAME is shorter than DEVICE_NAME_LEN
        let _ = device_name.push_str(DEFAULT_DEVICE_NAME);
        Self {
            frequency_mhz: LORA_FREQUENCY_HZ as f32 / 1_000_000.0,
            power_dbm: LORA_TX_POWER_DBM,
            gps_interval_ms: GPS_INTERVAL_MS,
            telemetry_interval_ms: TELEMETRY_INTERVAL_MS,
            device_name,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for LinkSettings {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Settings({}MHz, {}dBm, gps={}ms, tx={}ms, {})",
            self.frequency_mhz,
            self.power_dbm,
            self.gps_interval_ms,
            self.telemetry_interval_ms,
            self.device_name
        );
    }
}

/// Source of runtime settings and sink for outbound status text
///
/// The scheduler reads settings every iteration and pushes the encoded
/// telemetry outward when a client is attached.
pub trait ConfigChannel {
    /// Current settings
    fn settings(&self) -> LinkSettings;

    /// Whether a client is attached
    fn is_connected(&self) -> bool;

    /// Send status text to the attached client
    fn push_status(&mut self, text: &str);
}

/// Configuration channel that never connects and always reports defaults
#[derive(Clone, Debug, Default)]
pub struct FixedConfig {
    settings: LinkSettings,
}

impl FixedConfig {
    /// Create a channel serving the given settings
    #[must_use]
    pub const fn new(settings: LinkSettings) -> Self {
        Self { settings }
    }
}

impl ConfigChannel for FixedConfig {
    fn settings(&self) -> LinkSettings {
        self.settings.clone()
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn push_status(&mut self, _text: &str) {}
}
