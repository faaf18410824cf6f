//! Link counters

use heapless::String;

use crate::config::PAYLOAD_PREVIEW_LEN;
use crate::radio::RadioPacket;

/// Running link totals since boot
///
/// Written only by the scheduler (and the test rig loop); everything else
/// gets a shared reference.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkCounters {
    tx_count: u32,
    tx_failures: u32,
    rx_count: u32,
    valid_rx_count: u32,
    last_rssi: Option<i16>,
    last_snr: Option<f32>,
    last_preview: String<PAYLOAD_PREVIEW_LEN>,
    last_tx_ok: Option<bool>,
    last_rx_ms: Option<u64>,
}

impl LinkCounters {
    /// All zero
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tx_count: 0,
            tx_failures: 0,
            rx_count: 0,
            valid_rx_count: 0,
            last_rssi: None,
            last_snr: None,
            last_preview: String::new(),
            last_tx_ok: None,
            last_rx_ms: None,
        }
    }

    /// Packets sent successfully
    #[must_use]
    pub const fn tx_count(&self) -> u32 {
        self.tx_count
    }

    /// Send attempts that failed
    #[must_use]
    pub const fn tx_failures(&self) -> u32 {
        self.tx_failures
    }

    /// Packets drained from the radio
    #[must_use]
    pub const fn rx_count(&self) -> u32 {
        self.rx_count
    }

    /// Drained packets that decoded as telemetry
    #[must_use]
    pub const fn valid_rx_count(&self) -> u32 {
        self.valid_rx_count
    }

    /// RSSI of the last drained packet
    #[must_use]
    pub const fn last_rssi(&self) -> Option<i16> {
        self.last_rssi
    }

    /// SNR of the last drained packet
    #[must_use]
    pub const fn last_snr(&self) -> Option<f32> {
        self.last_snr
    }

    /// Leading text of the last drained packet
    #[must_use]
    pub fn last_preview(&self) -> &str {
        &self.last_preview
    }

    /// Outcome of the last send attempt, `None` before the first
    #[must_use]
    pub const fn last_tx_ok(&self) -> Option<bool> {
        self.last_tx_ok
    }

    /// Arrival time of the last drained packet
    #[must_use]
    pub const fn last_rx_ms(&self) -> Option<u64> {
        self.last_rx_ms
    }

    /// Record a send attempt
    pub(crate) fn record_tx(&mut self, ok: bool) {
        if ok {
            self.tx_count = self.tx_count.wrapping_add(1);
        } else {
            self.tx_failures = self.tx_failures.wrapping_add(1);
        }
        self.last_tx_ok = Some(ok);
    }

    /// Record a drained packet and its text
    pub(crate) fn record_rx(&mut self, packet: &RadioPacket, text: &str) {
        self.rx_count = self.rx_count.wrapping_add(1);
        self.last_rssi = Some(packet.rssi());
        self.last_snr = Some(packet.snr());
        self.last_rx_ms = Some(packet.received_at_ms());
        self.last_preview.clear();
        for c in text.chars() {
            if self.last_preview.push(c).is_err() {
                break;
            }
        }
    }

    /// Record that the last drained packet was valid telemetry
    pub(crate) fn record_valid_telemetry(&mut self) {
        self.valid_rx_count = self.valid_rx_count.wrapping_add(1);
    }
}
