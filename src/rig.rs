//! Test Rig
//!
//! Bench variant for checking a radio link by hand. A button cycles the
//! operating mode:
//!
//! - `Relay`: listen and count packets, telemetry or not
//! - `Beacon`: send `ping <n>` on a fixed interval
//! - `Gps`: show the receiver's fix, radio idle
//!
//! Counts on screen are per mode and restart at every change. If the radio
//! will not come up the rig halts with the failure on screen.

use core::fmt::Write;

use heapless::String;

use crate::link::{GpsState, IntervalTimer, LinkCounters};
use crate::mode::{ButtonLatch, CycleMode, ModeController, RigMode};
use crate::radio::{initialize_with_fallback, PaSelect, RadioError, Transceiver};
use crate::sensors::GpsSource;
use crate::telemetry;
use crate::types::GpsFix;
use crate::ui::{self, DisplaySurface, View};

/// Beacon ping interval
pub const PING_INTERVAL_MS: u32 = 2000;

/// Screen refresh interval
pub const RIG_DISPLAY_INTERVAL_MS: u32 = 500;

/// GPS poll interval in `Gps` mode
pub const RIG_GPS_INTERVAL_MS: u32 = 1000;

type ScreenText = String<128>;
type Ping = String<16>;

/// Collaborators lent to the rig for one iteration
pub struct RigIo<'a> {
    /// Radio under test
    pub radio: &'a mut dyn Transceiver,
    /// GPS receiver
    pub gps: &'a mut dyn GpsSource,
    /// Screen
    pub display: &'a mut dyn DisplaySurface,
    /// Mode button
    pub button: &'a ButtonLatch,
}

/// Test rig state
pub struct TestRig {
    modes: ModeController<RigMode>,
    counters: LinkCounters,
    ping_timer: IntervalTimer,
    display_timer: IntervalTimer,
    gps_timer: IntervalTimer,
    gps: GpsFix,
    ping_seq: u32,
    halted: Option<RadioError>,
}

impl TestRig {
    /// Create a rig in `Relay` mode
    #[must_use]
    pub const fn new() -> Self {
        Self {
            modes: ModeController::new(RigMode::Relay),
            counters: LinkCounters::new(),
            ping_timer: IntervalTimer::new(PING_INTERVAL_MS),
            display_timer: IntervalTimer::new(RIG_DISPLAY_INTERVAL_MS),
            gps_timer: IntervalTimer::new(RIG_GPS_INTERVAL_MS),
            gps: GpsFix::searching(0),
            ping_seq: 0,
            halted: None,
        }
    }

    /// Bring the radio up; on failure the rig halts and says so on screen
    ///
    /// # Errors
    /// [`RadioError::InitFailed`] when neither output stage works.
    pub fn start(
        &mut self,
        radio: &mut dyn Transceiver,
        display: &mut dyn DisplaySurface,
    ) -> Result<PaSelect, RadioError> {
        match initialize_with_fallback(radio) {
            Ok(pa) => {
                self.halted = None;
                let mut text = ScreenText::new();
                let _ = write!(
                    text,
                    "TEST RIG\nRadio OK ({})\nMode: {}",
                    pa.as_str(),
                    self.mode().as_str()
                );
                display.show(&ui::render(&View::Message(&text)));
                Ok(pa)
            }
            Err(e) => {
                self.halted = Some(e);
                crate::error!("test rig halted: {}", e);
                display.show(&ui::render(&View::Message(
                    "RADIO INIT FAILED\nCheck wiring\nHALTED",
                )));
                Err(e)
            }
        }
    }

    /// Current mode
    #[must_use]
    pub const fn mode(&self) -> RigMode {
        self.modes.mode()
    }

    /// Why the rig halted, if it did
    #[must_use]
    pub const fn halted(&self) -> Option<RadioError> {
        self.halted
    }

    /// Totals since boot
    #[must_use]
    pub const fn counters(&self) -> &LinkCounters {
        &self.counters
    }

    /// Packets sent in the current mode
    #[must_use]
    pub fn mode_tx(&self) -> u32 {
        self.modes.mode_tx(&self.counters)
    }

    /// Packets received in the current mode
    #[must_use]
    pub fn mode_rx(&self) -> u32 {
        self.modes.mode_rx(&self.counters)
    }

    /// Telemetry packets received in the current mode
    #[must_use]
    pub fn mode_valid_rx(&self) -> u32 {
        self.modes.mode_valid_rx(&self.counters)
    }

    /// One loop iteration; returns whether the screen was redrawn
    pub fn run_once(&mut self, now_ms: u64, io: &mut RigIo<'_>) -> bool {
        if self.halted.is_some() {
            return false;
        }

        let changed = self.modes.poll(io.button, &self.counters);
        if changed && self.mode() == RigMode::Beacon {
            // first ping goes out a full interval after switching
            self.ping_timer.restart(now_ms);
        }

        match self.mode() {
            RigMode::Relay => self.relay(now_ms, io.radio),
            RigMode::Beacon => self.beacon(now_ms, io.radio),
            RigMode::Gps => {
                if self.gps_timer.poll(now_ms) {
                    if let Ok(fix) = io.gps.read_fix() {
                        self.gps = fix;
                    }
                }
            }
        }

        if changed || self.display_timer.poll(now_ms) {
            self.draw(io.display);
            true
        } else {
            false
        }
    }

    fn relay(&mut self, now_ms: u64, radio: &mut dyn Transceiver) {
        if !radio.available(now_ms) {
            return;
        }
        let Some(packet) = radio.receive_bytes() else {
            return;
        };
        let text = packet.to_text();
        self.counters.record_rx(&packet, &text);
        if telemetry::decode(&text).is_ok() {
            self.counters.record_valid_telemetry();
        }
        crate::info!(
            "rig rx #{}: {} bytes, RSSI {}",
            self.mode_rx(),
            packet.len(),
            packet.rssi()
        );
    }

    fn beacon(&mut self, now_ms: u64, radio: &mut dyn Transceiver) {
        if !self.ping_timer.poll(now_ms) {
            return;
        }
        let mut ping = Ping::new();
        let _ = write!(ping, "ping {}", self.ping_seq);
        self.ping_seq = self.ping_seq.wrapping_add(1);
        match radio.transmit(ping.as_bytes()) {
            Ok(()) => {
                self.counters.record_tx(true);
                crate::info!("rig tx: {}", ping.as_str());
            }
            Err(e) => {
                self.counters.record_tx(false);
                crate::warn!("rig tx failed: {}", e);
            }
        }
    }

    fn draw(&self, display: &mut dyn DisplaySurface) {
        if self.mode() == RigMode::Gps {
            let state = if self.gps.valid {
                GpsState::Fix
            } else {
                GpsState::NoFix
            };
            display.show(&ui::render(&View::Gps {
                fix: &self.gps,
                state,
            }));
            return;
        }

        let mut text = ScreenText::new();
        let c = &self.counters;
        match self.mode() {
            RigMode::Relay => {
                let _ = write!(
                    text,
                    "MODE: RELAY\nRX:{} Valid:{}\n",
                    self.mode_rx(),
                    self.mode_valid_rx()
                );
                match (c.last_rssi(), c.last_snr()) {
                    (Some(rssi), Some(snr)) => {
                        let _ = write!(text, "RSSI:{rssi} SNR:{snr:.1}\n{}", c.last_preview());
                    }
                    _ => {
                        let _ = write!(text, "Listening...");
                    }
                }
            }
            RigMode::Beacon => {
                let last = match c.last_tx_ok() {
                    Some(true) => "OK",
                    Some(false) => "FAIL",
                    None => "--",
                };
                let _ = write!(
                    text,
                    "MODE: BEACON\nTX:{}\nLast TX: {last}\nNext: ping {}",
                    self.mode_tx(),
                    self.ping_seq
                );
            }
            RigMode::Gps => {}
        }
        display.show(&ui::render(&View::Message(&text)));
    }
}

impl Default for TestRig {
    fn default() -> Self {
        Self::new()
    }
}
