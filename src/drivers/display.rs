//! OLED Display Driver
//!
//! Draws rendered UI frames on the SSD1306 128x64 panel over blocking I2C.
//! Layout happens in [`crate::ui`]; this module only puts text on pixels.

use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use embedded_hal::i2c::I2c;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::{I2CDisplayInterface, Ssd1306};

use crate::config::DISPLAY_I2C_ADDR;
use crate::ui::{DisplaySurface, Frame};

/// Line pitch of the 6x10 font
const LINE_HEIGHT: i32 = 10;

/// Panel did not respond
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("display not responding")]
pub struct DisplayError;

impl defmt::Format for DisplayError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "DisplayError");
    }
}

/// Draw a frame's lines top to bottom
///
/// # Errors
/// Whatever the draw target reports.
pub fn draw_frame<D>(target: &mut D, frame: &Frame) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
    let mut y = 0;
    for line in frame {
        Text::with_baseline(line.as_str(), Point::new(0, y), style, Baseline::Top).draw(target)?;
        y += LINE_HEIGHT;
    }
    Ok(())
}

type Panel<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

/// SSD1306 panel as a [`DisplaySurface`]
pub struct OledDisplay<I2C> {
    panel: Panel<I2C>,
    ready: bool,
}

impl<I2C: I2c> OledDisplay<I2C> {
    /// Wrap the bus; nothing is sent until [`init`](Self::init)
    pub fn new(i2c: I2C) -> Self {
        let interface = I2CDisplayInterface::new_custom_address(i2c, DISPLAY_I2C_ADDR);
        let panel = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        Self {
            panel,
            ready: false,
        }
    }

    /// Run the panel's init sequence and blank it
    ///
    /// # Errors
    /// [`DisplayError`] if the panel does not acknowledge.
    pub fn init(&mut self) -> Result<(), DisplayError> {
        self.panel.init().map_err(|_| DisplayError)?;
        self.panel.clear_buffer();
        self.panel.flush().map_err(|_| DisplayError)?;
        self.ready = true;
        Ok(())
    }

    /// Whether init succeeded
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }
}

impl<I2C: I2c> DisplaySurface for OledDisplay<I2C> {
    fn show(&mut self, frame: &Frame) {
        if !self.ready {
            return;
        }
        self.panel.clear_buffer();
        if draw_frame(&mut self.panel, frame).is_err() || self.panel.flush().is_err() {
            crate::warn!("display update failed");
        }
    }
}
