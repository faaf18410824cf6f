//! Transceiver interface and receive buffering
//!
//! Every chip driver captures at most one pending packet. A packet that
//! arrives before the previous one is drained replaces it; the loss is
//! counted and logged, never hidden.

use heapless::{String, Vec};

use crate::config::MAX_PACKET_LEN;

/// Raw payload storage
pub type Payload = Vec<u8, MAX_PACKET_LEN>;

/// Payload decoded as text
pub type RadioText = String<MAX_PACKET_LEN>;

/// Radio link errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RadioError {
    /// Chip did not acknowledge the configuration
    #[error("radio did not acknowledge configuration")]
    InitFailed,
    /// Payload longer than the chip accepts
    #[error("payload of {len} bytes exceeds {max} byte limit")]
    PayloadTooLarge {
        /// Offered length
        len: usize,
        /// Chip limit
        max: usize,
    },
    /// Zero-length payload
    #[error("empty payload")]
    EmptyPayload,
    /// TxDone never arrived
    #[error("transmit failed")]
    TransmitFailed,
    /// SPI or GPIO transaction failed
    #[error("radio bus error")]
    Bus,
    /// Operation attempted before a successful initialize
    #[error("radio not initialized")]
    NotReady,
}

#[cfg(feature = "embedded")]
impl defmt::Format for RadioError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::InitFailed => defmt::write!(f, "InitFailed"),
            Self::PayloadTooLarge { len, max } => {
                defmt::write!(f, "PayloadTooLarge({}>{})", len, max);
            }
            Self::EmptyPayload => defmt::write!(f, "EmptyPayload"),
            Self::TransmitFailed => defmt::write!(f, "TransmitFailed"),
            Self::Bus => defmt::write!(f, "Bus"),
            Self::NotReady => defmt::write!(f, "NotReady"),
        }
    }
}

/// Power amplifier output stage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaSelect {
    /// PA_BOOST pin, up to +20 dBm
    Boost,
    /// RFO pin, up to +14 dBm
    Rfo,
}

impl PaSelect {
    /// Get display name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boost => "PA_BOOST",
            Self::Rfo => "RFO",
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for PaSelect {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.as_str());
    }
}

/// Link quality captured with a packet
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct LinkQuality {
    /// Packet RSSI in dBm
    pub rssi_dbm: i16,
    /// Packet SNR in dB
    pub snr_db: f32,
}

/// A received packet with its link quality
#[derive(Clone, Debug, PartialEq)]
pub struct RadioPacket {
    payload: Payload,
    quality: LinkQuality,
    received_at_ms: u64,
}

impl RadioPacket {
    /// Build a packet, rejecting empty or oversize payloads
    ///
    /// # Errors
    /// [`RadioError::EmptyPayload`] or [`RadioError::PayloadTooLarge`].
    pub fn new(bytes: &[u8], quality: LinkQuality, received_at_ms: u64) -> Result<Self, RadioError> {
        if bytes.is_empty() {
            return Err(RadioError::EmptyPayload);
        }
        let payload = Payload::from_slice(bytes).map_err(|()| RadioError::PayloadTooLarge {
            len: bytes.len(),
            max: MAX_PACKET_LEN,
        })?;
        Ok(Self {
            payload,
            quality,
            received_at_ms,
        })
    }

    /// Raw payload
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Always false, empty packets are never stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// RSSI in dBm
    #[must_use]
    pub const fn rssi(&self) -> i16 {
        self.quality.rssi_dbm
    }

    /// SNR in dB
    #[must_use]
    pub const fn snr(&self) -> f32 {
        self.quality.snr_db
    }

    /// Arrival time, ms since boot
    #[must_use]
    pub const fn received_at_ms(&self) -> u64 {
        self.received_at_ms
    }

    /// Payload as text, truncated at the first invalid UTF-8 sequence
    #[must_use]
    pub fn to_text(&self) -> RadioText {
        let text = match core::str::from_utf8(&self.payload) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&self.payload[..e.valid_up_to()]).unwrap_or_default(),
        };
        let mut out = RadioText::new();
        // capacities match, cannot overflow
        let _ = out.push_str(text);
        out
    }
}

/// Single-slot receive buffer
#[derive(Clone, Debug, Default)]
pub struct PendingSlot {
    packet: Option<RadioPacket>,
    last_quality: LinkQuality,
    overwritten: u32,
}

impl PendingSlot {
    /// Create an empty slot
    #[must_use]
    pub const fn new() -> Self {
        Self {
            packet: None,
            last_quality: LinkQuality {
                rssi_dbm: 0,
                snr_db: 0.0,
            },
            overwritten: 0,
        }
    }

    /// Store a packet, replacing any undrained one
    pub fn store(&mut self, packet: RadioPacket) {
        if let Some(old) = self.packet.as_ref() {
            self.overwritten = self.overwritten.saturating_add(1);
            crate::warn!(
                "pending packet overwritten ({} bytes lost, {} total)",
                old.len(),
                self.overwritten
            );
        }
        self.last_quality = packet.quality;
        self.packet = Some(packet);
    }

    /// Remove and return the pending packet
    pub fn take(&mut self) -> Option<RadioPacket> {
        self.packet.take()
    }

    /// Whether a packet is waiting
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.packet.is_some()
    }

    /// Quality of the most recently captured packet
    #[must_use]
    pub const fn last_quality(&self) -> LinkQuality {
        self.last_quality
    }

    /// Packets lost to overwrite since boot
    #[must_use]
    pub const fn overwritten(&self) -> u32 {
        self.overwritten
    }
}

/// Packet radio operations shared by every chip
pub trait Transceiver {
    /// Configure the modem and enter continuous receive
    ///
    /// # Errors
    /// [`RadioError::InitFailed`] if the chip does not acknowledge, or
    /// [`RadioError::Bus`] on a failed transaction.
    fn initialize(&mut self, pa: PaSelect) -> Result<(), RadioError>;

    /// Whether the last initialize succeeded
    fn is_ready(&self) -> bool;

    /// Send one packet, blocking until done, then return to receive
    ///
    /// # Errors
    /// [`RadioError::PayloadTooLarge`] and [`RadioError::EmptyPayload`] are
    /// raised before any bus access. [`RadioError::TransmitFailed`] when the
    /// chip never signals completion.
    fn transmit(&mut self, payload: &[u8]) -> Result<(), RadioError>;

    /// Non-blocking check for a completed inbound packet
    ///
    /// Returns `true` when a packet was captured into the pending slot.
    ///
    /// # Errors
    /// [`RadioError::Bus`] on a failed transaction.
    fn poll_receive(&mut self, now_ms: u64) -> Result<bool, RadioError>;

    /// The receive buffer
    fn pending(&self) -> &PendingSlot;

    /// The receive buffer, mutably
    fn pending_mut(&mut self) -> &mut PendingSlot;

    /// Whether a packet is pending, polling the chip first if none is
    fn available(&mut self, now_ms: u64) -> bool {
        if !self.pending().is_pending() {
            if let Err(e) = self.poll_receive(now_ms) {
                crate::warn!("receive poll failed: {}", e);
            }
        }
        self.pending().is_pending()
    }

    /// Drain the pending packet
    fn receive_bytes(&mut self) -> Option<RadioPacket> {
        self.pending_mut().take()
    }

    /// Drain the pending packet as text, empty if nothing is pending
    fn receive_message(&mut self) -> RadioText {
        self.receive_bytes()
            .map(|packet| packet.to_text())
            .unwrap_or_default()
    }

    /// RSSI of the most recently captured packet
    fn last_rssi(&self) -> i16 {
        self.pending().last_quality().rssi_dbm
    }

    /// SNR of the most recently captured packet
    fn last_snr(&self) -> f32 {
        self.pending().last_quality().snr_db
    }
}

/// Bring the radio up on PA_BOOST, falling back to RFO
///
/// # Errors
/// [`RadioError::InitFailed`] when both output stages fail.
pub fn initialize_with_fallback(radio: &mut dyn Transceiver) -> Result<PaSelect, RadioError> {
    for pa in [PaSelect::Boost, PaSelect::Rfo] {
        match radio.initialize(pa) {
            Ok(()) => {
                crate::info!("radio ready on {}", pa.as_str());
                return Ok(pa);
            }
            Err(e) => crate::warn!("radio init on {} failed: {}", pa.as_str(), e),
        }
    }
    crate::error!("radio init failed on all output stages");
    Err(RadioError::InitFailed)
}
