//! NMEA 0183 GPS receiver
//!
//! Accumulates UART bytes into sentences and folds `GGA` and `RMC` into a
//! single [`GpsFix`]. Any talker ID is accepted (`$GP`, `$GN`, `$GL`).
//! Sentences with a bad checksum are dropped.

use heapless::Vec;

use super::GpsSource;
use crate::types::{GpsFix, SensorUnavailable};

/// Longest sentence kept, per NMEA 0183 plus slack
pub const MAX_SENTENCE_LEN: usize = 96;

/// Knots to km/h
const KNOTS_TO_KMH: f32 = 1.852;

/// Sentence-level failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NmeaError {
    /// Checksum missing or wrong
    #[error("bad NMEA checksum")]
    InvalidChecksum,
    /// Field missing or unparseable
    #[error("bad NMEA field")]
    InvalidData,
}

#[cfg(feature = "embedded")]
impl defmt::Format for NmeaError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::InvalidChecksum => defmt::write!(f, "InvalidChecksum"),
            Self::InvalidData => defmt::write!(f, "InvalidData"),
        }
    }
}

/// Check the `*hh` XOR checksum of a sentence
#[must_use]
pub fn validate_checksum(line: &[u8]) -> bool {
    let mut parts = line.split(|&b| b == b'*');
    let payload = parts.next().unwrap_or(&[]);
    let checksum_hex = parts.next().unwrap_or(&[]);
    if payload.is_empty() || checksum_hex.len() < 2 {
        return false;
    }

    let start = usize::from(payload.starts_with(b"$"));
    let calc = payload[start..].iter().fold(0u8, |acc, &b| acc ^ b);

    core::str::from_utf8(&checksum_hex[..2])
        .ok()
        .and_then(|s| u8::from_str_radix(s, 16).ok())
        .is_some_and(|given| given == calc)
}

/// Apply one sentence to `fix`
///
/// Returns `true` when the sentence was a `GGA` or `RMC` and changed the fix.
///
/// # Errors
/// [`NmeaError`] when the checksum or a required field is bad; `fix` is left
/// untouched in that case.
pub fn apply_sentence(line: &[u8], fix: &mut GpsFix) -> Result<bool, NmeaError> {
    if !validate_checksum(line) {
        return Err(NmeaError::InvalidChecksum);
    }
    let sentence = core::str::from_utf8(line).map_err(|_| NmeaError::InvalidData)?;
    let body = sentence.split('*').next().unwrap_or_default();
    let fields: Vec<&str, 24> = body.split(',').take(24).collect();
    let Some(tag) = fields.first() else {
        return Err(NmeaError::InvalidData);
    };
    let field = |i: usize| fields.get(i).copied().unwrap_or_default();

    if tag.len() == 6 && tag.ends_with("GGA") {
        let mut next = *fix;
        let quality = field(6);
        next.valid = !quality.is_empty() && quality != "0";
        next.satellites = field(7).parse().unwrap_or(0);
        if next.valid {
            next.latitude = parse_coordinate(field(2), field(3))?;
            next.longitude = parse_coordinate(field(4), field(5))?;
            next.altitude_m = field(9).parse().map_err(|_| NmeaError::InvalidData)?;
        }
        *fix = next;
        Ok(true)
    } else if tag.len() == 6 && tag.ends_with("RMC") {
        let mut next = *fix;
        next.valid = field(2) == "A";
        if next.valid {
            next.latitude = parse_coordinate(field(3), field(4))?;
            next.longitude = parse_coordinate(field(5), field(6))?;
            let knots: f32 = field(7).parse().map_err(|_| NmeaError::InvalidData)?;
            next.speed_kmh = knots * KNOTS_TO_KMH;
            // course is blank when stationary
            next.course_deg = field(8).parse().unwrap_or(next.course_deg);
        }
        *fix = next;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere to signed degrees
fn parse_coordinate(raw: &str, hemisphere: &str) -> Result<f64, NmeaError> {
    let value: f64 = raw.parse().map_err(|_| NmeaError::InvalidData)?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let degrees = f64::from((value / 100.0) as u32);
    let minutes = value - degrees * 100.0;
    let magnitude = degrees + minutes / 60.0;
    match hemisphere {
        "N" | "E" => Ok(magnitude),
        "S" | "W" => Ok(-magnitude),
        _ => Err(NmeaError::InvalidData),
    }
}

/// Byte-fed NMEA receiver
#[derive(Debug, Default)]
pub struct NmeaReceiver {
    line: Vec<u8, MAX_SENTENCE_LEN>,
    overflow: bool,
    fix: GpsFix,
    fresh: bool,
    rejected: u32,
}

impl NmeaReceiver {
    /// Create a receiver with no fix
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte from the UART
    pub fn feed(&mut self, byte: u8) {
        match byte {
            b'$' => {
                self.line.clear();
                self.overflow = false;
                let _ = self.line.push(byte);
            }
            b'\r' | b'\n' => {
                if !self.line.is_empty() && !self.overflow {
                    match apply_sentence(&self.line, &mut self.fix) {
                        Ok(changed) => self.fresh |= changed,
                        Err(e) => {
                            self.rejected = self.rejected.saturating_add(1);
                            crate::debug!("NMEA sentence rejected: {}", e);
                        }
                    }
                }
                self.line.clear();
            }
            _ => {
                if self.line.push(byte).is_err() {
                    self.overflow = true;
                }
            }
        }
    }

    /// Feed a chunk of UART bytes
    pub fn feed_all(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.feed(b);
        }
    }

    /// Fix as of the last good sentence
    #[must_use]
    pub const fn fix(&self) -> &GpsFix {
        &self.fix
    }

    /// Sentences dropped for checksum or field errors
    #[must_use]
    pub const fn rejected(&self) -> u32 {
        self.rejected
    }
}

impl GpsSource for NmeaReceiver {
    fn read_fix(&mut self) -> Result<GpsFix, SensorUnavailable> {
        if core::mem::take(&mut self.fresh) {
            Ok(self.fix)
        } else {
            Err(SensorUnavailable)
        }
    }
}
