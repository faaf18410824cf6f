//! Sensor Collaborators
//!
//! The scheduler only sees these traits. A source with nothing new returns
//! [`SensorUnavailable`] and the scheduler keeps its last good value.

pub mod mpu6050;
pub mod nmea;

pub use mpu6050::{Mpu6050, Mpu6050Error};
pub use nmea::{NmeaError, NmeaReceiver};

use crate::power::BatteryVoltage;
use crate::types::{BatteryLevel, GpsFix, ImuSample, SensorUnavailable};

/// Produces GPS fixes on demand
pub trait GpsSource {
    /// Latest fix, if the receiver reported anything since the last call
    ///
    /// # Errors
    /// [`SensorUnavailable`] when there is no fresh data.
    fn read_fix(&mut self) -> Result<GpsFix, SensorUnavailable>;
}

/// Produces inertial samples on demand
pub trait ImuSource {
    /// Take one sample
    ///
    /// # Errors
    /// [`SensorUnavailable`] when the sensor did not answer.
    fn read_sample(&mut self) -> Result<ImuSample, SensorUnavailable>;
}

/// Reports battery charge
pub trait BatterySource {
    /// Current charge level
    ///
    /// # Errors
    /// [`SensorUnavailable`] when the reading failed.
    fn battery_level(&mut self) -> Result<BatteryLevel, SensorUnavailable>;
}

/// Battery source backed by a raw ADC read
///
/// The closure returns the 12-bit conversion of the sense divider.
pub struct AdcBattery<F> {
    read_raw: F,
}

impl<F> AdcBattery<F>
where
    F: FnMut() -> Option<u16>,
{
    /// Wrap an ADC read
    pub const fn new(read_raw: F) -> Self {
        Self { read_raw }
    }
}

impl<F> BatterySource for AdcBattery<F>
where
    F: FnMut() -> Option<u16>,
{
    fn battery_level(&mut self) -> Result<BatteryLevel, SensorUnavailable> {
        let raw = (self.read_raw)().ok_or(SensorUnavailable)?;
        Ok(BatteryVoltage::from_board_adc(raw).level())
    }
}
