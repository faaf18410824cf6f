//! In-memory radio
//!
//! Stands in for a chip on the host. Frames handed to [`SimulatedRadio::deliver`]
//! sit "on air" until the next [`Transceiver::poll_receive`], one frame per
//! poll, the same way the SX127x raises one RxDone at a time. Transmitted
//! frames are recorded so tests and the host build can see what went out.
//! Init and transmit failures can be injected.

use heapless::{Deque, Vec};

use super::transceiver::{
    LinkQuality, PaSelect, Payload, PendingSlot, RadioError, RadioPacket, Transceiver,
};
use crate::config::MAX_PACKET_LEN;

/// Frames queued for reception
pub const AIR_QUEUE_DEPTH: usize = 8;

/// Transmitted frames kept for inspection
pub const TX_LOG_DEPTH: usize = 16;

/// Simulated transceiver
#[derive(Debug, Default)]
pub struct SimulatedRadio {
    ready: bool,
    pa: Option<PaSelect>,
    boost_broken: bool,
    init_broken: bool,
    transmit_broken: bool,
    air: Deque<(Payload, LinkQuality), AIR_QUEUE_DEPTH>,
    sent: Vec<Payload, TX_LOG_DEPTH>,
    transmit_calls: u32,
    pending: PendingSlot,
}

impl SimulatedRadio {
    /// Create a radio that initializes and transmits cleanly
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail initialization on PA_BOOST only
    #[must_use]
    pub fn with_broken_boost(mut self) -> Self {
        self.boost_broken = true;
        self
    }

    /// Fail initialization on every output stage
    #[must_use]
    pub fn with_broken_init(mut self) -> Self {
        self.init_broken = true;
        self
    }

    /// Make every following transmit fail or succeed
    pub fn set_transmit_broken(&mut self, broken: bool) {
        self.transmit_broken = broken;
    }

    /// Put a frame on the air for this radio to pick up
    ///
    /// # Errors
    /// [`RadioError::PayloadTooLarge`] or [`RadioError::EmptyPayload`] for a
    /// frame no chip could carry; [`RadioError::Bus`] when the air queue is full.
    pub fn deliver(&mut self, bytes: &[u8], rssi_dbm: i16, snr_db: f32) -> Result<(), RadioError> {
        if bytes.is_empty() {
            return Err(RadioError::EmptyPayload);
        }
        let payload = Payload::from_slice(bytes).map_err(|()| RadioError::PayloadTooLarge {
            len: bytes.len(),
            max: MAX_PACKET_LEN,
        })?;
        self.air
            .push_back((payload, LinkQuality { rssi_dbm, snr_db }))
            .map_err(|_| RadioError::Bus)
    }

    /// Output stage chosen at the last successful initialize
    #[must_use]
    pub const fn pa(&self) -> Option<PaSelect> {
        self.pa
    }

    /// Frames sent so far, oldest first
    #[must_use]
    pub fn sent(&self) -> &[Payload] {
        &self.sent
    }

    /// Frames that reached the (simulated) chip, successful or not
    #[must_use]
    pub const fn transmit_calls(&self) -> u32 {
        self.transmit_calls
    }

    /// Frames still waiting on air
    #[must_use]
    pub fn on_air(&self) -> usize {
        self.air.len()
    }
}

impl Transceiver for SimulatedRadio {
    fn initialize(&mut self, pa: PaSelect) -> Result<(), RadioError> {
        self.ready = false;
        if self.init_broken || (self.boost_broken && pa == PaSelect::Boost) {
            return Err(RadioError::InitFailed);
        }
        self.pa = Some(pa);
        self.ready = true;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn transmit(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        if payload.len() > MAX_PACKET_LEN {
            return Err(RadioError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PACKET_LEN,
            });
        }
        if payload.is_empty() {
            return Err(RadioError::EmptyPayload);
        }
        if !self.ready {
            return Err(RadioError::NotReady);
        }

        self.transmit_calls += 1;
        if self.transmit_broken {
            return Err(RadioError::TransmitFailed);
        }
        if self.sent.is_full() {
            self.sent.remove(0);
        }
        // length checked above and a slot was freed
        let _ = self.sent.push(Payload::from_slice(payload).unwrap_or_default());
        Ok(())
    }

    fn poll_receive(&mut self, now_ms: u64) -> Result<bool, RadioError> {
        if !self.ready {
            return Ok(false);
        }
        let Some((payload, quality)) = self.air.pop_front() else {
            return Ok(false);
        };
        let packet = RadioPacket::new(&payload, quality, now_ms)?;
        self.pending.store(packet);
        Ok(true)
    }

    fn pending(&self) -> &PendingSlot {
        &self.pending
    }

    fn pending_mut(&mut self) -> &mut PendingSlot {
        &mut self.pending
    }
}
