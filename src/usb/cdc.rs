//! USB CDC ACM (Serial) Implementation
//!
//! Provides the virtual serial port that carries the configuration console.

use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::{Driver, EndpointError};
use embassy_usb::{Builder, Config, UsbDevice};
use static_cell::StaticCell;

use crate::config::{DEVICE_ID, USB_CDC_PACKET_SIZE};
use crate::protocol::MAX_RESPONSE_LEN;

/// Largest line written back: a response plus CRLF
pub const WRITE_BUFFER_LEN: usize = MAX_RESPONSE_LEN + 2;

const CONFIG_DESCRIPTOR_BUF_SIZE: usize = 256;
const BOS_DESCRIPTOR_BUF_SIZE: usize = 256;
const CONTROL_BUF_SIZE: usize = 64;

/// Host closed the port or the bus went away
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Disconnected;

impl From<EndpointError> for Disconnected {
    fn from(_: EndpointError) -> Self {
        Self
    }
}

/// CDC write buffer
pub struct CdcWriteBuffer {
    buffer: [u8; WRITE_BUFFER_LEN],
    len: usize,
}

impl CdcWriteBuffer {
    /// Create a new write buffer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [0; WRITE_BUFFER_LEN],
            len: 0,
        }
    }

    /// Write data to buffer
    pub fn write(&mut self, data: &[u8]) -> usize {
        let space = WRITE_BUFFER_LEN - self.len;
        let to_write = data.len().min(space);
        self.buffer[self.len..self.len + to_write].copy_from_slice(&data[..to_write]);
        self.len += to_write;
        to_write
    }

    /// Write with CRLF; the line ending always fits
    pub fn writeln(&mut self, data: &[u8]) -> usize {
        let room = WRITE_BUFFER_LEN.saturating_sub(self.len + 2);
        let written = self.write(&data[..data.len().min(room)]);
        self.write(b"\r\n");
        written
    }

    /// Get buffer contents
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Contents split into USB packets
    pub fn packets(&self) -> core::slice::Chunks<'_, u8> {
        self.as_bytes().chunks(usize::from(USB_CDC_PACKET_SIZE))
    }

    /// Whether the host needs a zero-length packet to end the transfer
    #[must_use]
    pub const fn needs_zlp(&self) -> bool {
        self.len > 0 && self.len % USB_CDC_PACKET_SIZE as usize == 0
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Get used length
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for CdcWriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Send one line to the host
///
/// # Errors
/// [`Disconnected`] if the endpoint goes away mid-write.
pub async fn write_line<'d, D: Driver<'d>>(
    class: &mut CdcAcmClass<'d, D>,
    out: &mut CdcWriteBuffer,
    text: &str,
) -> Result<(), Disconnected> {
    out.clear();
    out.writeln(text.as_bytes());
    for packet in out.packets() {
        class.write_packet(packet).await?;
    }
    if out.needs_zlp() {
        class.write_packet(&[]).await?;
    }
    Ok(())
}

/// USB device descriptor strings
pub struct UsbStrings {
    /// Manufacturer name
    pub manufacturer: &'static str,
    /// Product name
    pub product: &'static str,
    /// Serial number
    pub serial: &'static str,
}

impl Default for UsbStrings {
    fn default() -> Self {
        Self {
            manufacturer: "B.R.A.V.O.",
            product: "B.R.A.V.O. Node",
            serial: DEVICE_ID,
        }
    }
}

/// USB device info for descriptor
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceInfo {
    /// Vendor ID
    pub vid: u16,
    /// Product ID
    pub pid: u16,
    /// Device release number
    pub device_release: u16,
}

impl Default for UsbDeviceInfo {
    fn default() -> Self {
        Self {
            vid: crate::config::USB_VID,
            pid: crate::config::USB_PID,
            device_release: 0x0100,
        }
    }
}

impl UsbDeviceInfo {
    /// Build the embassy-usb device config
    #[must_use]
    pub fn to_config(&self, strings: &UsbStrings) -> Config<'static> {
        let mut config = Config::new(self.vid, self.pid);
        config.device_release = self.device_release;
        config.manufacturer = Some(strings.manufacturer);
        config.product = Some(strings.product);
        config.serial_number = Some(strings.serial);
        config.max_power = 100;
        config.max_packet_size_0 = 64;
        config
    }
}

impl defmt::Format for UsbDeviceInfo {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "USB({:04X}:{:04X})", self.vid, self.pid);
    }
}

/// Build the USB device with a single CDC ACM port
///
/// Call once; descriptor buffers are static.
pub fn build<D: Driver<'static>>(driver: D) -> (UsbDevice<'static, D>, CdcAcmClass<'static, D>) {
    static CONFIG_DESCRIPTOR: StaticCell<[u8; CONFIG_DESCRIPTOR_BUF_SIZE]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; BOS_DESCRIPTOR_BUF_SIZE]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; CONTROL_BUF_SIZE]> = StaticCell::new();
    static STATE: StaticCell<State<'static>> = StaticCell::new();

    let info = UsbDeviceInfo::default();
    let mut builder = Builder::new(
        driver,
        info.to_config(&UsbStrings::default()),
        CONFIG_DESCRIPTOR.init([0; CONFIG_DESCRIPTOR_BUF_SIZE]),
        BOS_DESCRIPTOR.init([0; BOS_DESCRIPTOR_BUF_SIZE]),
        &mut [],
        CONTROL_BUF.init([0; CONTROL_BUF_SIZE]),
    );
    let class = CdcAcmClass::new(&mut builder, STATE.init(State::new()), USB_CDC_PACKET_SIZE);
    crate::info!("usb device {}:{} ready", info.vid, info.pid);
    (builder.build(), class)
}
