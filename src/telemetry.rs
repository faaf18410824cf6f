//! Telemetry Records and Wire Codec
//!
//! A [`TelemetryRecord`] is one of five variants. On the air it is compact
//! JSON: `device_id`, `timestamp` and `type` first, then the variant fields.
//! `full` nests `gps` and `imu` objects, `gps` and `imu` flatten theirs.
//!
//! ```text
//! {"device_id":"BRAVO_001","timestamp":120000,"type":"status","battery":87,"uptime":120,"rssi":-63}
//! ```
//!
//! Decoding reads the `type` tag first and only then parses the variant, so
//! a record is never classified by which fields happen to be present.
//!
//! The field names alone take about 190 bytes of a `full` record, so one with
//! a real fix does not fit a 255-byte radio packet. [`packetize`] sends such a
//! record as `gps`, `imu` and `status` records carrying the same readings.

use core::fmt;

use heapless::{String, Vec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{DEVICE_NAME_LEN, MAX_PACKET_LEN, TELEMETRY_BUFFER_LEN};
use crate::types::{GpsFix, ImuSample, Vector3};

/// Device identifier storage
pub type DeviceId = String<DEVICE_NAME_LEN>;

/// Alert category storage
pub type AlertType = String<ALERT_TYPE_LEN>;

/// Alert message storage
pub type AlertMessage = String<ALERT_MESSAGE_LEN>;

/// Encoded record
pub type EncodedRecord = String<TELEMETRY_BUFFER_LEN>;

/// Radio packets carrying one record
pub type PacketTexts = Vec<EncodedRecord, MAX_PARTS>;

/// Most packets one record is sent as
pub const MAX_PARTS: usize = 3;

/// Maximum alert category length
pub const ALERT_TYPE_LEN: usize = 24;

/// Maximum alert message length
pub const ALERT_MESSAGE_LEN: usize = 128;

/// Variant tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TelemetryKind {
    /// Battery, GPS and IMU together
    Full,
    /// GPS only
    Gps,
    /// IMU only
    Imu,
    /// Battery, uptime and link RSSI
    Status,
    /// Free-text alert
    Alert,
}

impl TelemetryKind {
    /// Every kind, in tag order
    pub const ALL: [Self; 5] = [Self::Full, Self::Gps, Self::Imu, Self::Status, Self::Alert];

    /// Wire tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Gps => "gps",
            Self::Imu => "imu",
            Self::Status => "status",
            Self::Alert => "alert",
        }
    }

    /// Parse a wire tag, case-sensitive
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for TelemetryKind {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.as_str());
    }
}

/// One telemetry record
#[derive(Clone, Debug, PartialEq)]
pub enum TelemetryRecord {
    /// Periodic beacon payload
    Full {
        /// Sender
        device_id: DeviceId,
        /// Sender uptime in ms at creation
        timestamp_ms: u64,
        /// Battery charge 0-100
        battery: u8,
        /// Last GPS fix
        gps: GpsFix,
        /// Last IMU sample
        imu: ImuSample,
    },
    /// GPS fix alone
    Gps {
        /// Sender
        device_id: DeviceId,
        /// Sender uptime in ms at creation
        timestamp_ms: u64,
        /// The fix
        gps: GpsFix,
    },
    /// IMU sample alone
    Imu {
        /// Sender
        device_id: DeviceId,
        /// Sender uptime in ms at creation
        timestamp_ms: u64,
        /// The sample
        imu: ImuSample,
    },
    /// Health report
    Status {
        /// Sender
        device_id: DeviceId,
        /// Sender uptime in ms at creation
        timestamp_ms: u64,
        /// Battery charge 0-100
        battery: u8,
        /// Uptime in seconds
        uptime_s: u32,
        /// RSSI of the last packet the sender heard, dBm
        rssi: i16,
    },
    /// Operator-facing alert
    Alert {
        /// Sender
        device_id: DeviceId,
        /// Sender uptime in ms at creation
        timestamp_ms: u64,
        /// Category, e.g. `low_battery`
        alert_type: AlertType,
        /// Free text
        message: AlertMessage,
    },
}

impl TelemetryRecord {
    /// Build a `full` record
    ///
    /// # Errors
    /// [`EncodeError::FieldTooLong`] when `device_id` does not fit.
    pub fn full(
        device_id: &str,
        timestamp_ms: u64,
        battery: u8,
        gps: GpsFix,
        imu: ImuSample,
    ) -> Result<Self, EncodeError> {
        Ok(Self::Full {
            device_id: bounded(device_id)?,
            timestamp_ms,
            battery,
            gps,
            imu,
        })
    }

    /// Build a `gps` record
    ///
    /// # Errors
    /// [`EncodeError::FieldTooLong`] when `device_id` does not fit.
    pub fn gps(device_id: &str, timestamp_ms: u64, gps: GpsFix) -> Result<Self, EncodeError> {
        Ok(Self::Gps {
            device_id: bounded(device_id)?,
            timestamp_ms,
            gps,
        })
    }

    /// Build an `imu` record
    ///
    /// # Errors
    /// [`EncodeError::FieldTooLong`] when `device_id` does not fit.
    pub fn imu(device_id: &str, timestamp_ms: u64, imu: ImuSample) -> Result<Self, EncodeError> {
        Ok(Self::Imu {
            device_id: bounded(device_id)?,
            timestamp_ms,
            imu,
        })
    }

    /// Build a `status` record
    ///
    /// # Errors
    /// [`EncodeError::FieldTooLong`] when `device_id` does not fit.
    pub fn status(
        device_id: &str,
        timestamp_ms: u64,
        battery: u8,
        uptime_s: u32,
        rssi: i16,
    ) -> Result<Self, EncodeError> {
        Ok(Self::Status {
            device_id: bounded(device_id)?,
            timestamp_ms,
            battery,
            uptime_s,
            rssi,
        })
    }

    /// Build an `alert` record
    ///
    /// # Errors
    /// [`EncodeError::FieldTooLong`] when any string does not fit.
    pub fn alert(
        device_id: &str,
        timestamp_ms: u64,
        alert_type: &str,
        message: &str,
    ) -> Result<Self, EncodeError> {
        Ok(Self::Alert {
            device_id: bounded(device_id)?,
            timestamp_ms,
            alert_type: bounded(alert_type)?,
            message: bounded(message)?,
        })
    }

    /// Variant tag
    #[must_use]
    pub const fn kind(&self) -> TelemetryKind {
        match self {
            Self::Full { .. } => TelemetryKind::Full,
            Self::Gps { .. } => TelemetryKind::Gps,
            Self::Imu { .. } => TelemetryKind::Imu,
            Self::Status { .. } => TelemetryKind::Status,
            Self::Alert { .. } => TelemetryKind::Alert,
        }
    }

    /// Sender
    #[must_use]
    pub fn device_id(&self) -> &str {
        match self {
            Self::Full { device_id, .. }
            | Self::Gps { device_id, .. }
            | Self::Imu { device_id, .. }
            | Self::Status { device_id, .. }
            | Self::Alert { device_id, .. } => device_id,
        }
    }

    /// Creation time, sender ms since boot
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        match self {
            Self::Full { timestamp_ms, .. }
            | Self::Gps { timestamp_ms, .. }
            | Self::Imu { timestamp_ms, .. }
            | Self::Status { timestamp_ms, .. }
            | Self::Alert { timestamp_ms, .. } => *timestamp_ms,
        }
    }

    /// GPS fix carried by `full` and `gps` records
    #[must_use]
    pub const fn gps_fix(&self) -> Option<&GpsFix> {
        match self {
            Self::Full { gps, .. } | Self::Gps { gps, .. } => Some(gps),
            _ => None,
        }
    }

    /// Break a `full` record into `gps`, `imu` and `status` records
    ///
    /// Each part keeps the sender and timestamp. `uptime_s` and `rssi` fill
    /// the status fields a `full` record does not carry. `None` for every
    /// other variant.
    #[must_use]
    pub fn split_full(&self, uptime_s: u32, rssi: i16) -> Option<[Self; MAX_PARTS]> {
        let Self::Full {
            device_id,
            timestamp_ms,
            battery,
            gps,
            imu,
        } = self
        else {
            return None;
        };
        Some([
            Self::Gps {
                device_id: device_id.clone(),
                timestamp_ms: *timestamp_ms,
                gps: *gps,
            },
            Self::Imu {
                device_id: device_id.clone(),
                timestamp_ms: *timestamp_ms,
                imu: *imu,
            },
            Self::Status {
                device_id: device_id.clone(),
                timestamp_ms: *timestamp_ms,
                battery: *battery,
                uptime_s,
                rssi,
            },
        ])
    }
}

/// Encoding failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// Encoded text exceeds the scratch buffer
    #[error("encoded record exceeds buffer")]
    BufferFull,
    /// A string field exceeds its capacity
    #[error("field too long")]
    FieldTooLong,
}

#[cfg(feature = "embedded")]
impl defmt::Format for EncodeError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::BufferFull => defmt::write!(f, "BufferFull"),
            Self::FieldTooLong => defmt::write!(f, "FieldTooLong"),
        }
    }
}

/// Decoding failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Not JSON, or the variant's fields are missing or ill-typed
    #[error("malformed telemetry")]
    MalformedInput,
    /// `type` missing or not a known tag
    #[error("unknown telemetry type")]
    UnknownType,
}

#[cfg(feature = "embedded")]
impl defmt::Format for DecodeError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::MalformedInput => defmt::write!(f, "MalformedInput"),
            Self::UnknownType => defmt::write!(f, "UnknownType"),
        }
    }
}

fn bounded<const N: usize>(s: &str) -> Result<String<N>, EncodeError> {
    let mut out = String::new();
    out.push_str(s).map_err(|()| EncodeError::FieldTooLong)?;
    Ok(out)
}

// ============================================================================
// Wire layouts
// ============================================================================

#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "type", borrow)]
    kind: Option<&'a str>,
}

#[derive(Serialize, Deserialize)]
struct FullWire<S> {
    device_id: S,
    timestamp: u64,
    #[serde(rename = "type")]
    kind: S,
    battery: u8,
    gps: GpsFix,
    imu: ImuSample,
}

#[derive(Serialize, Deserialize)]
struct GpsWire<S> {
    device_id: S,
    timestamp: u64,
    #[serde(rename = "type")]
    kind: S,
    valid: bool,
    lat: f64,
    lon: f64,
    alt: f32,
    speed: f32,
    course: f32,
    satellites: u8,
}

#[derive(Serialize, Deserialize)]
struct ImuWire<S> {
    device_id: S,
    timestamp: u64,
    #[serde(rename = "type")]
    kind: S,
    accel: Vector3,
    gyro: Vector3,
    temp: f32,
}

#[derive(Serialize, Deserialize)]
struct StatusWire<S> {
    device_id: S,
    timestamp: u64,
    #[serde(rename = "type")]
    kind: S,
    battery: u8,
    uptime: u32,
    rssi: i16,
}

#[derive(Serialize, Deserialize)]
struct AlertWire<S, A, M> {
    device_id: S,
    timestamp: u64,
    #[serde(rename = "type")]
    kind: S,
    alert_type: A,
    message: M,
}

// ============================================================================
// Codec
// ============================================================================

fn to_text<T: Serialize>(wire: &T) -> Result<EncodedRecord, EncodeError> {
    serde_json_core::to_string(wire).map_err(|_| EncodeError::BufferFull)
}

fn from_text<T: DeserializeOwned>(text: &str) -> Result<T, DecodeError> {
    // unescaped strings land here before being copied into their fields
    let mut scratch = [0u8; ALERT_MESSAGE_LEN];
    serde_json_core::from_str_escaped(text, &mut scratch)
        .map(|(value, _)| value)
        .map_err(|_| DecodeError::MalformedInput)
}

/// Serialize a record
///
/// # Errors
/// [`EncodeError::BufferFull`] when the text exceeds
/// [`TELEMETRY_BUFFER_LEN`]. Text that fits here but not in one radio packet
/// is rejected later by the transceiver.
pub fn encode(record: &TelemetryRecord) -> Result<EncodedRecord, EncodeError> {
    let kind = record.kind().as_str();
    match record {
        TelemetryRecord::Full {
            device_id,
            timestamp_ms,
            battery,
            gps,
            imu,
        } => to_text(&FullWire {
            device_id: device_id.as_str(),
            timestamp: *timestamp_ms,
            kind,
            battery: *battery,
            gps: *gps,
            imu: *imu,
        }),
        TelemetryRecord::Gps {
            device_id,
            timestamp_ms,
            gps,
        } => to_text(&GpsWire {
            device_id: device_id.as_str(),
            timestamp: *timestamp_ms,
            kind,
            valid: gps.valid,
            lat: gps.latitude,
            lon: gps.longitude,
            alt: gps.altitude_m,
            speed: gps.speed_kmh,
            course: gps.course_deg,
            satellites: gps.satellites,
        }),
        TelemetryRecord::Imu {
            device_id,
            timestamp_ms,
            imu,
        } => to_text(&ImuWire {
            device_id: device_id.as_str(),
            timestamp: *timestamp_ms,
            kind,
            accel: imu.accel,
            gyro: imu.gyro,
            temp: imu.temperature_c,
        }),
        TelemetryRecord::Status {
            device_id,
            timestamp_ms,
            battery,
            uptime_s,
            rssi,
        } => to_text(&StatusWire {
            device_id: device_id.as_str(),
            timestamp: *timestamp_ms,
            kind,
            battery: *battery,
            uptime: *uptime_s,
            rssi: *rssi,
        }),
        TelemetryRecord::Alert {
            device_id,
            timestamp_ms,
            alert_type,
            message,
        } => to_text(&AlertWire {
            device_id: device_id.as_str(),
            timestamp: *timestamp_ms,
            kind,
            alert_type: alert_type.as_str(),
            message: message.as_str(),
        }),
    }
}

/// Radio packets for a record already encoded as `text`
///
/// A record that fits one packet goes as is. A `full` record that does not
/// is sent as its [`split_full`](TelemetryRecord::split_full) parts, each of
/// which fits with a full-length device id and readings at any precision.
/// Any other oversize record is returned whole and left for the transceiver
/// to reject.
///
/// # Errors
/// [`EncodeError::BufferFull`] if a part cannot be encoded.
pub fn packetize(
    record: &TelemetryRecord,
    text: &EncodedRecord,
    uptime_s: u32,
    rssi: i16,
) -> Result<PacketTexts, EncodeError> {
    let mut packets = PacketTexts::new();
    match record.split_full(uptime_s, rssi) {
        Some(parts) if text.len() > MAX_PACKET_LEN => {
            for part in &parts {
                packets
                    .push(encode(part)?)
                    .map_err(|_| EncodeError::BufferFull)?;
            }
        }
        _ => {
            packets
                .push(text.clone())
                .map_err(|_| EncodeError::BufferFull)?;
        }
    }
    Ok(packets)
}

/// Parse a record
///
/// # Errors
/// [`DecodeError::MalformedInput`] when the text is not a JSON object or the
/// variant's fields are missing or ill-typed, [`DecodeError::UnknownType`]
/// when `type` is absent or unrecognized.
pub fn decode(text: &str) -> Result<TelemetryRecord, DecodeError> {
    let (envelope, _): (Envelope<'_>, _) =
        serde_json_core::from_str(text).map_err(|_| DecodeError::MalformedInput)?;
    let kind = envelope
        .kind
        .and_then(TelemetryKind::parse)
        .ok_or(DecodeError::UnknownType)?;

    match kind {
        TelemetryKind::Full => {
            let wire: FullWire<DeviceId> = from_text(text)?;
            Ok(TelemetryRecord::Full {
                device_id: wire.device_id,
                timestamp_ms: wire.timestamp,
                battery: wire.battery,
                gps: wire.gps,
                imu: wire.imu,
            })
        }
        TelemetryKind::Gps => {
            let wire: GpsWire<DeviceId> = from_text(text)?;
            Ok(TelemetryRecord::Gps {
                device_id: wire.device_id,
                timestamp_ms: wire.timestamp,
                gps: GpsFix {
                    valid: wire.valid,
                    latitude: wire.lat,
                    longitude: wire.lon,
                    altitude_m: wire.alt,
                    speed_kmh: wire.speed,
                    course_deg: wire.course,
                    satellites: wire.satellites,
                },
            })
        }
        TelemetryKind::Imu => {
            let wire: ImuWire<DeviceId> = from_text(text)?;
            Ok(TelemetryRecord::Imu {
                device_id: wire.device_id,
                timestamp_ms: wire.timestamp,
                imu: ImuSample {
                    accel: wire.accel,
                    gyro: wire.gyro,
                    temperature_c: wire.temp,
                },
            })
        }
        TelemetryKind::Status => {
            let wire: StatusWire<DeviceId> = from_text(text)?;
            Ok(TelemetryRecord::Status {
                device_id: wire.device_id,
                timestamp_ms: wire.timestamp,
                battery: wire.battery,
                uptime_s: wire.uptime,
                rssi: wire.rssi,
            })
        }
        TelemetryKind::Alert => {
            let wire: AlertWire<DeviceId, AlertType, AlertMessage> = from_text(text)?;
            Ok(TelemetryRecord::Alert {
                device_id: wire.device_id,
                timestamp_ms: wire.timestamp,
                alert_type: wire.alert_type,
                message: wire.message,
            })
        }
    }
}
