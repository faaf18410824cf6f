//! Configuration Console
//!
//! Line-oriented text protocol for reading and changing [`LinkSettings`]
//! over a serial link. Lines end with `\n`, `\r` or `;`; the command word is
//! case-insensitive.
//!
//! ```text
//! GET                      -> CFG freq=915.0 power=20 gps=1000 tx=10000 name=BRAVO_COLLAR
//! SET tx=5000 name=COLLAR2 -> OK
//! SET power=30             -> ERR power out of range
//! STATUS                   -> last pushed status line
//! PING                     -> PONG
//! ```

use core::fmt::Write;

use heapless::{String, Vec};
use thiserror::Error;

use crate::config::{
    ConfigChannel, LinkSettings, CONSOLE_BUFFER_SIZE, DEVICE_NAME_LEN, TELEMETRY_BUFFER_LEN,
};

/// Maximum `key=value` pairs in one `SET`
pub const MAX_UPDATES: usize = 5;

/// Longest response line, sized for a pushed telemetry record
pub const MAX_RESPONSE_LEN: usize = TELEMETRY_BUFFER_LEN + 8;

/// Rejected console input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Command word not recognized
    #[error("unknown command")]
    UnknownCommand,
    /// `SET` key not recognized
    #[error("unknown key")]
    UnknownKey,
    /// `SET` without any `key=value` pair, or a pair without `=`
    #[error("expected key=value")]
    MissingValue,
    /// Value is not a number
    #[error("invalid number")]
    InvalidNumber,
    /// Frequency outside the chip's band
    #[error("freq out of range")]
    FrequencyOutOfRange,
    /// Power outside the PA's range
    #[error("power out of range")]
    PowerOutOfRange,
    /// Interval below the minimum
    #[error("interval too short")]
    IntervalTooShort,
    /// Name empty or too long
    #[error("invalid name")]
    InvalidName,
    /// More pairs than one `SET` takes
    #[error("too many settings")]
    TooManyUpdates,
    /// Line longer than the input buffer
    #[error("line too long")]
    LineTooLong,
}

impl ConfigError {
    /// Get reason text
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownCommand => "unknown command",
            Self::UnknownKey => "unknown key",
            Self::MissingValue => "expected key=value",
            Self::InvalidNumber => "invalid number",
            Self::FrequencyOutOfRange => "freq out of range",
            Self::PowerOutOfRange => "power out of range",
            Self::IntervalTooShort => "interval too short",
            Self::InvalidName => "invalid name",
            Self::TooManyUpdates => "too many settings",
            Self::LineTooLong => "line too long",
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ConfigError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.as_str());
    }
}

/// One validated setting change
#[derive(Clone, Debug, PartialEq)]
pub enum SettingUpdate {
    /// Carrier frequency in MHz
    Frequency(f32),
    /// Output power in dBm
    Power(i8),
    /// GPS sampling interval in ms
    GpsInterval(u32),
    /// Telemetry interval in ms
    TelemetryInterval(u32),
    /// Device name
    Name(String<DEVICE_NAME_LEN>),
}

impl SettingUpdate {
    /// Parse and validate one `key=value` pair
    ///
    /// # Errors
    /// The [`ConfigError`] naming what is wrong with the pair.
    pub fn parse(pair: &str) -> Result<Self, ConfigError> {
        let (key, value) = pair.split_once('=').ok_or(ConfigError::MissingValue)?;
        if key.eq_ignore_ascii_case("freq") {
            let mhz: f32 = value.parse().map_err(|_| ConfigError::InvalidNumber)?;
            if !(LinkSettings::MIN_FREQUENCY_MHZ..=LinkSettings::MAX_FREQUENCY_MHZ).contains(&mhz) {
                return Err(ConfigError::FrequencyOutOfRange);
            }
            Ok(Self::Frequency(mhz))
        } else if key.eq_ignore_ascii_case("power") {
            let dbm: i8 = value.parse().map_err(|_| ConfigError::InvalidNumber)?;
            if !(LinkSettings::MIN_POWER_DBM..=LinkSettings::MAX_POWER_DBM).contains(&dbm) {
                return Err(ConfigError::PowerOutOfRange);
            }
            Ok(Self::Power(dbm))
        } else if key.eq_ignore_ascii_case("gps") {
            parse_interval(value).map(Self::GpsInterval)
        } else if key.eq_ignore_ascii_case("tx") {
            parse_interval(value).map(Self::TelemetryInterval)
        } else if key.eq_ignore_ascii_case("name") {
            if value.is_empty() || value.len() >= DEVICE_NAME_LEN {
                return Err(ConfigError::InvalidName);
            }
            let mut name = String::new();
            name.push_str(value).map_err(|()| ConfigError::InvalidName)?;
            Ok(Self::Name(name))
        } else {
            Err(ConfigError::UnknownKey)
        }
    }

    /// Write the change into `settings`
    pub fn apply(&self, settings: &mut LinkSettings) {
        match self {
            Self::Frequency(mhz) => settings.frequency_mhz = *mhz,
            Self::Power(dbm) => settings.power_dbm = *dbm,
            Self::GpsInterval(ms) => settings.gps_interval_ms = *ms,
            Self::TelemetryInterval(ms) => settings.telemetry_interval_ms = *ms,
            Self::Name(name) => settings.device_name.clone_from(name),
        }
    }
}

fn parse_interval(value: &str) -> Result<u32, ConfigError> {
    let ms: u32 = value.parse().map_err(|_| ConfigError::InvalidNumber)?;
    if ms < LinkSettings::MIN_INTERVAL_MS {
        return Err(ConfigError::IntervalTooShort);
    }
    Ok(ms)
}

/// Console command parsed from serial input
#[derive(Clone, Debug, PartialEq)]
pub enum ConsoleCommand {
    /// Report current settings
    Get,
    /// Change settings; all pairs already validated
    Set(Vec<SettingUpdate, MAX_UPDATES>),
    /// Report the last pushed status line
    Status,
    /// Liveness check
    Ping,
}

impl ConsoleCommand {
    /// Parse one complete line
    ///
    /// # Errors
    /// [`ConfigError::UnknownCommand`] for an unrecognized command word, or
    /// the first error among the `SET` pairs.
    pub fn parse(line: &str) -> Result<Self, ConfigError> {
        let mut words = line.split_ascii_whitespace();
        let verb = words.next().ok_or(ConfigError::UnknownCommand)?;

        if verb.eq_ignore_ascii_case("GET") {
            Ok(Self::Get)
        } else if verb.eq_ignore_ascii_case("STATUS") {
            Ok(Self::Status)
        } else if verb.eq_ignore_ascii_case("PING") {
            Ok(Self::Ping)
        } else if verb.eq_ignore_ascii_case("SET") {
            let mut updates = Vec::new();
            for pair in words {
                let update = SettingUpdate::parse(pair)?;
                updates
                    .push(update)
                    .map_err(|_| ConfigError::TooManyUpdates)?;
            }
            if updates.is_empty() {
                return Err(ConfigError::MissingValue);
            }
            Ok(Self::Set(updates))
        } else {
            Err(ConfigError::UnknownCommand)
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ConsoleCommand {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Get => defmt::write!(f, "GET"),
            Self::Set(updates) => defmt::write!(f, "SET({})", updates.len()),
            Self::Status => defmt::write!(f, "STATUS"),
            Self::Ping => defmt::write!(f, "PING"),
        }
    }
}

/// Byte-at-a-time line splitter for console input
pub struct ConsoleParser {
    buffer: Vec<u8, CONSOLE_BUFFER_SIZE>,
    overflowed: bool,
}

impl ConsoleParser {
    /// Create an empty parser
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
        }
    }

    /// Feed a byte
    ///
    /// Returns a parse result once a non-empty line is complete. A line that
    /// overflows the buffer is discarded up to its terminator and reported
    /// as [`ConfigError::LineTooLong`].
    pub fn feed(&mut self, byte: u8) -> Option<Result<ConsoleCommand, ConfigError>> {
        if matches!(byte, b'\n' | b'\r' | b';') {
            let result = if self.overflowed {
                Some(Err(ConfigError::LineTooLong))
            } else {
                self.parse_buffer()
            };
            self.clear();
            result
        } else {
            if !self.overflowed && self.buffer.push(byte).is_err() {
                self.overflowed = true;
            }
            None
        }
    }

    fn parse_buffer(&self) -> Option<Result<ConsoleCommand, ConfigError>> {
        let Ok(line) = core::str::from_utf8(&self.buffer) else {
            return Some(Err(ConfigError::UnknownCommand));
        };
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(ConsoleCommand::parse(line))
    }

    /// Drop any partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }
}

impl Default for ConsoleParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Console response formatter
pub struct ConsoleResponse {
    buffer: String<MAX_RESPONSE_LEN>,
}

impl ConsoleResponse {
    /// Create an empty response
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// `OK`
    pub fn ok(&mut self) {
        self.set("OK");
    }

    /// `PONG`
    pub fn pong(&mut self) {
        self.set("PONG");
    }

    /// `ERR <reason>`
    pub fn error(&mut self, err: ConfigError) {
        self.buffer.clear();
        let _ = write!(self.buffer, "ERR {}", err.as_str());
    }

    /// `CFG freq=... power=... gps=... tx=... name=...`
    pub fn settings(&mut self, settings: &LinkSettings) {
        self.buffer.clear();
        let _ = write!(
            self.buffer,
            "CFG freq={:.1} power={} gps={} tx={} name={}",
            settings.frequency_mhz,
            settings.power_dbm,
            settings.gps_interval_ms,
            settings.telemetry_interval_ms,
            settings.device_name
        );
    }

    /// The last pushed status line, `NONE` before the first push
    pub fn status(&mut self, text: &str) {
        if text.is_empty() {
            self.set("NONE");
        } else {
            self.set(text);
        }
    }

    fn set(&mut self, text: &str) {
        self.buffer.clear();
        for c in text.chars() {
            if self.buffer.push(c).is_err() {
                break;
            }
        }
    }

    /// Get the response string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Get the response bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }
}

impl Default for ConsoleResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration channel backed by the serial console
///
/// The transport feeds received bytes through [`handle_byte`] and writes
/// back whatever response comes out; the scheduler sees it through
/// [`ConfigChannel`].
///
/// [`handle_byte`]: ConsoleConfig::handle_byte
pub struct ConsoleConfig {
    settings: LinkSettings,
    parser: ConsoleParser,
    connected: bool,
    status: String<TELEMETRY_BUFFER_LEN>,
    status_unsent: bool,
}

impl ConsoleConfig {
    /// Create a console serving `settings`, disconnected
    #[must_use]
    pub fn new(settings: LinkSettings) -> Self {
        Self {
            settings,
            parser: ConsoleParser::new(),
            connected: false,
            status: String::new(),
            status_unsent: false,
        }
    }

    /// Record whether a host is attached; a new session starts clean
    pub fn set_connected(&mut self, connected: bool) {
        if connected != self.connected {
            crate::info!("config console {}", if connected { "attached" } else { "detached" });
            self.parser.clear();
        }
        self.connected = connected;
    }

    /// Feed one received byte, returning the response when a line completes
    pub fn handle_byte(&mut self, byte: u8) -> Option<ConsoleResponse> {
        let parsed = self.parser.feed(byte)?;
        let mut response = ConsoleResponse::new();
        match parsed {
            Ok(command) => self.execute(&command, &mut response),
            Err(e) => {
                crate::warn!("console: {}", e.as_str());
                response.error(e);
            }
        }
        Some(response)
    }

    /// Run a parsed command
    pub fn execute(&mut self, command: &ConsoleCommand, response: &mut ConsoleResponse) {
        match command {
            ConsoleCommand::Get => response.settings(&self.settings),
            ConsoleCommand::Set(updates) => {
                for update in updates {
                    update.apply(&mut self.settings);
                }
                crate::info!("console: {} setting(s) changed", updates.len());
                response.ok();
            }
            ConsoleCommand::Status => response.status(&self.status),
            ConsoleCommand::Ping => response.pong(),
        }
    }

    /// Last pushed status line
    #[must_use]
    pub fn last_status(&self) -> &str {
        &self.status
    }

    /// Take the status line pushed since the last call, for notification
    pub fn take_unsent_status(&mut self) -> Option<&str> {
        if self.status_unsent {
            self.status_unsent = false;
            Some(self.status.as_str())
        } else {
            None
        }
    }
}

impl ConfigChannel for ConsoleConfig {
    fn settings(&self) -> LinkSettings {
        self.settings.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn push_status(&mut self, text: &str) {
        self.status.clear();
        for c in text.chars() {
            if self.status.push(c).is_err() {
                break;
            }
        }
        self.status_unsent = true;
    }
}
