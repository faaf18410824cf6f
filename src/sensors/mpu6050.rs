//! MPU6050 inertial sensor
//!
//! Blocking I2C driver. Configured for ±8 g, ±500 °/s and the 21 Hz digital
//! low-pass filter, which suits activity scoring on a collar.

use embedded_hal::i2c::I2c;

use super::ImuSource;
use crate::types::{ImuSample, SensorUnavailable, Vector3};

/// Register addresses
mod regs {
    pub const CONFIG: u8 = 0x1A;
    pub const GYRO_CONFIG: u8 = 0x1B;
    pub const ACCEL_CONFIG: u8 = 0x1C;
    pub const ACCEL_XOUT_H: u8 = 0x3B;
    pub const PWR_MGMT_1: u8 = 0x6B;
    pub const WHO_AM_I: u8 = 0x75;
}

/// `WHO_AM_I` value
pub const MPU6050_ID: u8 = 0x68;

/// Standard gravity used to scale accelerometer counts
const STANDARD_GRAVITY: f32 = 9.806_65;

/// Counts per g at ±8 g
const ACCEL_LSB_PER_G: f32 = 4096.0;

/// Counts per °/s at ±500 °/s
const GYRO_LSB_PER_DPS: f32 = 65.5;

/// Degrees to radians
const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;

/// MPU6050 failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Mpu6050Error {
    /// I2C transaction failed
    #[error("I2C bus error")]
    Bus,
    /// `WHO_AM_I` did not match
    #[error("unexpected device id {0}")]
    WrongDevice(u8),
}

#[cfg(feature = "embedded")]
impl defmt::Format for Mpu6050Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Bus => defmt::write!(f, "Bus"),
            Self::WrongDevice(id) => defmt::write!(f, "WrongDevice({=u8:#x})", id),
        }
    }
}

/// Convert a 14-byte burst from `ACCEL_XOUT_H` into SI units
#[must_use]
pub fn decode_burst(raw: &[u8; 14]) -> ImuSample {
    let word = |i: usize| f32::from(i16::from_be_bytes([raw[i], raw[i + 1]]));
    let accel = |i: usize| word(i) / ACCEL_LSB_PER_G * STANDARD_GRAVITY;
    let gyro = |i: usize| word(i) / GYRO_LSB_PER_DPS * DEG_TO_RAD;

    ImuSample {
        accel: Vector3::new(accel(0), accel(2), accel(4)),
        gyro: Vector3::new(gyro(8), gyro(10), gyro(12)),
        temperature_c: word(6) / 340.0 + 36.53,
    }
}

/// MPU6050 driver
pub struct Mpu6050<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Mpu6050<I2C> {
    /// Wrap the bus. Call [`Mpu6050::init`] before sampling.
    pub const fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Wake the device and apply ranges
    ///
    /// # Errors
    /// [`Mpu6050Error::WrongDevice`] when something else answers,
    /// [`Mpu6050Error::Bus`] on a failed transaction.
    pub fn init(&mut self) -> Result<(), Mpu6050Error> {
        let id = self.read_reg(regs::WHO_AM_I)?;
        if id != MPU6050_ID {
            return Err(Mpu6050Error::WrongDevice(id));
        }
        self.write_reg(regs::PWR_MGMT_1, 0x00)?;
        // DLPF 21 Hz
        self.write_reg(regs::CONFIG, 0x04)?;
        // ±500 °/s
        self.write_reg(regs::GYRO_CONFIG, 0x08)?;
        // ±8 g
        self.write_reg(regs::ACCEL_CONFIG, 0x10)?;
        Ok(())
    }

    /// Read accel, temperature and gyro in one burst
    ///
    /// # Errors
    /// [`Mpu6050Error::Bus`] on a failed transaction.
    pub fn sample(&mut self) -> Result<ImuSample, Mpu6050Error> {
        let mut raw = [0u8; 14];
        self.i2c
            .write_read(self.address, &[regs::ACCEL_XOUT_H], &mut raw)
            .map_err(|_| Mpu6050Error::Bus)?;
        Ok(decode_burst(&raw))
    }

    /// Release the bus
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, Mpu6050Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(|_| Mpu6050Error::Bus)?;
        Ok(buf[0])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Mpu6050Error> {
        self.i2c
            .write(self.address, &[reg, value])
            .map_err(|_| Mpu6050Error::Bus)
    }
}

impl<I2C: I2c> ImuSource for Mpu6050<I2C> {
    fn read_sample(&mut self) -> Result<ImuSample, SensorUnavailable> {
        self.sample().map_err(|e| {
            crate::debug!("IMU read failed: {}", e);
            SensorUnavailable
        })
    }
}
