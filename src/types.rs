//! Shared types used across the B.R.A.V.O. firmware
//!
//! This module defines the sensor value types the scheduler caches and the
//! telemetry codec carries, plus the build-time device role.

use core::fmt;
#[cfg(feature = "embedded")]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};

use crate::config::{GRAVITY_MS2, MOTION_THRESHOLD_MS2};

/// What a node does on the link
///
/// Fixed at build time through the `role-beacon` / `role-relay` features.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DeviceRole {
    /// Periodic telemetry transmit only
    Beacon,
    /// Receive and surface telemetry only
    Relay,
    /// Transmit and receive
    #[default]
    Both,
}

impl DeviceRole {
    /// Whether this role runs the telemetry tick
    #[must_use]
    pub const fn transmits(self) -> bool {
        matches!(self, Self::Beacon | Self::Both)
    }

    /// Whether this role drains received packets
    #[must_use]
    pub const fn receives(self) -> bool {
        matches!(self, Self::Relay | Self::Both)
    }

    /// Get short display name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beacon => "BEACON",
            Self::Relay => "RELAY",
            Self::Both => "BOTH",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for DeviceRole {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.as_str());
    }
}

/// Three-axis reading
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    /// X axis
    pub x: f32,
    /// Y axis
    pub y: f32,
    /// Z axis
    pub z: f32,
}

impl Vector3 {
    /// Create a vector from its components
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length
    #[must_use]
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for Vector3 {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "({}, {}, {})", self.x, self.y, self.z);
    }
}

/// One GPS fix as reported by the receiver
///
/// Field order and names are the telemetry wire layout.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsFix {
    /// Receiver reports a valid position
    pub valid: bool,
    /// Latitude in degrees, north positive
    #[serde(rename = "lat")]
    pub latitude: f64,
    /// Longitude in degrees, east positive
    #[serde(rename = "lon")]
    pub longitude: f64,
    /// Altitude above mean sea level in meters
    #[serde(rename = "alt")]
    pub altitude_m: f32,
    /// Ground speed in km/h
    #[serde(rename = "speed")]
    pub speed_kmh: f32,
    /// Course over ground in degrees
    #[serde(rename = "course")]
    pub course_deg: f32,
    /// Satellites used in the solution
    pub satellites: u8,
}

impl GpsFix {
    /// A fix with no position, only a satellite count
    #[must_use]
    pub const fn searching(satellites: u8) -> Self {
        Self {
            valid: false,
            latitude: 0.0,
            longitude: 0.0,
            altitude_m: 0.0,
            speed_kmh: 0.0,
            course_deg: 0.0,
            satellites,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for GpsFix {
    fn format(&self, f: defmt::Formatter) {
        if self.valid {
            defmt::write!(
                f,
                "Fix({}, {}, {}m, sats={})",
                self.latitude,
                self.longitude,
                self.altitude_m,
                self.satellites
            );
        } else {
            defmt::write!(f, "NoFix(sats={})", self.satellites);
        }
    }
}

/// One inertial sample
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Acceleration in m/s²
    pub accel: Vector3,
    /// Angular rate in rad/s
    pub gyro: Vector3,
    /// Die temperature in °C
    #[serde(rename = "temp")]
    pub temperature_c: f32,
}

impl ImuSample {
    /// Deviation of total acceleration from 1 g, in m/s²
    #[must_use]
    pub fn gravity_deviation(&self) -> f32 {
        (self.accel.magnitude() - GRAVITY_MS2).abs()
    }

    /// Activity score 0-100, ten points per m/s² away from rest
    #[must_use]
    pub fn activity_level(&self) -> f32 {
        (self.gravity_deviation() * 10.0).min(100.0)
    }

    /// Whether the deviation from rest exceeds `threshold`
    #[must_use]
    pub fn is_in_motion(&self, threshold: f32) -> bool {
        self.gravity_deviation() > threshold
    }

    /// Motion test with the default threshold
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.is_in_motion(MOTION_THRESHOLD_MS2)
    }
}

impl Default for ImuSample {
    /// A device lying still, Z axis up
    fn default() -> Self {
        Self {
            accel: Vector3::new(0.0, 0.0, GRAVITY_MS2),
            gyro: Vector3::default(),
            temperature_c: 0.0,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ImuSample {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Imu(a={}, g={}, {}C)",
            self.accel,
            self.gyro,
            self.temperature_c
        );
    }
}

/// Battery charge level (0-100%)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct BatteryLevel(u8);

impl BatteryLevel {
    /// Create from percentage, clamped to 100
    #[must_use]
    pub const fn from_percent(percent: u8) -> Self {
        if percent > 100 {
            Self(100)
        } else {
            Self(percent)
        }
    }

    /// Get as percentage
    #[must_use]
    pub const fn as_percent(self) -> u8 {
        self.0
    }

    /// Below 20%
    #[must_use]
    pub const fn is_low(self) -> bool {
        self.0 < 20
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for BatteryLevel {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}%", self.0);
    }
}

/// A sensor collaborator had no fresh data
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("sensor unavailable")]
pub struct SensorUnavailable;

#[cfg(feature = "embedded")]
impl defmt::Format for SensorUnavailable {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "SensorUnavailable");
    }
}
