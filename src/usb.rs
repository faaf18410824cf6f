//! USB Subsystem
//!
//! Carries the configuration console over CDC ACM. The console state is
//! shared between the USB task and the main loop through a critical-section
//! mutex; both sides hold it only for a single byte or a settings copy.

pub mod cdc;

use core::cell::RefCell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Timer;
use embassy_usb::class::cdc_acm::CdcAcmClass;
use embassy_usb::driver::Driver;
use heapless::String;

use crate::config::{ConfigChannel, LinkSettings, TELEMETRY_BUFFER_LEN};
use crate::protocol::ConsoleConfig;
use cdc::{write_line, CdcWriteBuffer, Disconnected};

/// How often a connected session checks for pushed status
const NOTIFY_POLL_MS: u64 = 100;

/// Console state shared between the USB task and the main loop
pub type SharedConsole = Mutex<CriticalSectionRawMutex, RefCell<ConsoleConfig>>;

/// Main-loop view of the shared console
pub struct ConsoleHandle<'a> {
    console: &'a SharedConsole,
}

impl<'a> ConsoleHandle<'a> {
    /// Wrap the shared console
    #[must_use]
    pub const fn new(console: &'a SharedConsole) -> Self {
        Self { console }
    }
}

impl ConfigChannel for ConsoleHandle<'_> {
    fn settings(&self) -> LinkSettings {
        self.console.lock(|c| c.borrow().settings())
    }

    fn is_connected(&self) -> bool {
        self.console.lock(|c| c.borrow().is_connected())
    }

    fn push_status(&mut self, text: &str) {
        self.console.lock(|c| c.borrow_mut().push_status(text));
    }
}

/// Serve the console forever, one host session at a time
pub async fn run_console<'d, D: Driver<'d>>(
    class: &mut CdcAcmClass<'d, D>,
    console: &SharedConsole,
) -> ! {
    let mut out = CdcWriteBuffer::new();
    loop {
        class.wait_connection().await;
        console.lock(|c| c.borrow_mut().set_connected(true));
        let _ = session(class, console, &mut out).await;
        console.lock(|c| c.borrow_mut().set_connected(false));
    }
}

async fn session<'d, D: Driver<'d>>(
    class: &mut CdcAcmClass<'d, D>,
    console: &SharedConsole,
    out: &mut CdcWriteBuffer,
) -> Result<(), Disconnected> {
    let mut rx = [0u8; 64];
    loop {
        let event = select(class.read_packet(&mut rx), Timer::after_millis(NOTIFY_POLL_MS)).await;
        match event {
            Either::First(read) => {
                let n = read?;
                for &byte in &rx[..n] {
                    let response = console.lock(|c| c.borrow_mut().handle_byte(byte));
                    if let Some(response) = response {
                        write_line(class, out, response.as_str()).await?;
                    }
                }
            }
            Either::Second(()) => {
                let pending: Option<String<TELEMETRY_BUFFER_LEN>> = console.lock(|c| {
                    c.borrow_mut()
                        .take_unsent_status()
                        .and_then(|text| String::try_from(text).ok())
                });
                if let Some(text) = pending {
                    write_line(class, out, &text).await?;
                }
            }
        }
    }
}
