//! Power Management
//!
//! Battery voltage sensing for the single-cell `LiPo` pack.

use crate::config::{ADC_VREF, BATTERY_DIVIDER_RATIO};
use crate::types::BatteryLevel;

/// Full-scale reading of the 12-bit ADC
pub const ADC_FULL_SCALE: u16 = 4095;

/// Cell voltage treated as full
pub const CELL_FULL_V: f32 = 4.2;

/// Cell voltage treated as empty
pub const CELL_EMPTY_V: f32 = 3.0;

/// Battery voltage reading
#[derive(Clone, Copy, Debug)]
pub struct BatteryVoltage {
    /// Raw ADC reading (12-bit)
    raw: u16,
    /// Voltage divider ratio
    divider_ratio: f32,
    /// Reference voltage
    vref: f32,
}

impl BatteryVoltage {
    /// Create from ADC reading
    #[must_use]
    pub const fn from_adc(raw: u16, divider_ratio: f32, vref: f32) -> Self {
        Self {
            raw,
            divider_ratio,
            vref,
        }
    }

    /// Create from ADC reading using the board's divider and reference
    #[must_use]
    pub const fn from_board_adc(raw: u16) -> Self {
        Self::from_adc(raw, BATTERY_DIVIDER_RATIO, ADC_VREF)
    }

    /// Get voltage in volts
    #[must_use]
    pub fn voltage(&self) -> f32 {
        let raw = self.raw.min(ADC_FULL_SCALE);
        (f32::from(raw) / f32::from(ADC_FULL_SCALE)) * self.vref * self.divider_ratio
    }

    /// Charge level, linear between empty and full cell voltage
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn level(&self) -> BatteryLevel {
        let v = self.voltage();
        let pct = if v >= CELL_FULL_V {
            100.0
        } else if v <= CELL_EMPTY_V {
            0.0
        } else {
            ((v - CELL_EMPTY_V) / (CELL_FULL_V - CELL_EMPTY_V)) * 100.0
        };

        BatteryLevel::from_percent(pct as u8)
    }

    /// Check if battery is low
    #[must_use]
    pub fn is_low(&self) -> bool {
        self.voltage() < 3.3
    }

    /// Check if battery is critical
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.voltage() < 3.1
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for BatteryVoltage {
    fn format(&self, f: defmt::Formatter) {
        let v = self.voltage();
        let whole = v as u32;
        let frac = ((v - whole as f32) * 100.0) as u32;
        defmt::write!(f, "{}.{:02}V", whole, frac);
    }
}
