//! Button-Driven Mode Switching
//!
//! The push button is the only input that can fire at any point during the
//! main loop. Its interrupt side is a [`ButtonLatch`]: three atomics, no
//! locks, no I/O. The main loop drains the latch through a
//! [`ModeController`], which cycles the mode and resets the mode-local
//! packet counts. Radio state is never touched from here.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::BUTTON_DEBOUNCE_MS;
use crate::link::LinkCounters;

/// Interrupt-side edge latch with debounce
///
/// Meant to live in a `static` shared between the button task or ISR and
/// the main loop.
#[derive(Debug)]
pub struct ButtonLatch {
    pending: AtomicU32,
    last_accepted_ms: AtomicU32,
    seen_edge: AtomicBool,
    debounce_ms: u32,
}

impl ButtonLatch {
    /// Create a latch with the default debounce window
    #[must_use]
    pub const fn new() -> Self {
        Self::with_debounce(BUTTON_DEBOUNCE_MS)
    }

    /// Create a latch with a custom debounce window
    #[must_use]
    pub const fn with_debounce(debounce_ms: u32) -> Self {
        Self {
            pending: AtomicU32::new(0),
            last_accepted_ms: AtomicU32::new(0),
            seen_edge: AtomicBool::new(false),
            debounce_ms,
        }
    }

    /// Record an edge; called from the interrupt path only
    ///
    /// Returns whether the edge was accepted. Edges inside the quiet period
    /// after the last accepted edge are dropped.
    pub fn on_edge(&self, now_ms: u32) -> bool {
        let quiet = !self.seen_edge.load(Ordering::Acquire)
            || now_ms.wrapping_sub(self.last_accepted_ms.load(Ordering::Relaxed)) >= self.debounce_ms;
        if quiet {
            self.last_accepted_ms.store(now_ms, Ordering::Relaxed);
            self.seen_edge.store(true, Ordering::Release);
            self.pending.fetch_add(1, Ordering::Release);
        }
        quiet
    }

    /// Take and clear the accepted-edge count
    pub fn take(&self) -> u32 {
        self.pending.swap(0, Ordering::AcqRel)
    }

    /// Accepted edges not yet taken
    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }
}

impl Default for ButtonLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// A mode set with a fixed cyclic order
pub trait CycleMode: Copy + Eq {
    /// The mode after this one
    #[must_use]
    fn next(self) -> Self;

    /// Short display name
    fn as_str(self) -> &'static str;
}

/// Display views of the node firmware
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Screen {
    /// Identity, battery and GPS summary
    #[default]
    Status,
    /// Full GPS fix
    Gps,
    /// Radio counters and last packet
    Link,
}

impl CycleMode for Screen {
    fn next(self) -> Self {
        match self {
            Self::Status => Self::Gps,
            Self::Gps => Self::Link,
            Self::Link => Self::Status,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::Gps => "GPS",
            Self::Link => "Link",
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for Screen {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.as_str());
    }
}

/// Operating modes of the test rig
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RigMode {
    /// Listen and count packets
    #[default]
    Relay,
    /// Send a numbered ping on an interval
    Beacon,
    /// Show the GPS fix
    Gps,
}

impl CycleMode for RigMode {
    fn next(self) -> Self {
        match self {
            Self::Relay => Self::Beacon,
            Self::Beacon => Self::Gps,
            Self::Gps => Self::Relay,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Relay => "RELAY",
            Self::Beacon => "BEACON",
            Self::Gps => "GPS",
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for RigMode {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.as_str());
    }
}

/// Counter values at the last mode change
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Baseline {
    tx: u32,
    rx: u32,
    valid_rx: u32,
}

/// Main-loop side of mode switching
#[derive(Clone, Debug)]
pub struct ModeController<M> {
    mode: M,
    changes: u32,
    baseline: Baseline,
}

impl<M: CycleMode> ModeController<M> {
    /// Start in `initial`
    pub const fn new(initial: M) -> Self {
        Self {
            mode: initial,
            changes: 0,
            baseline: Baseline {
                tx: 0,
                rx: 0,
                valid_rx: 0,
            },
        }
    }

    /// Current mode
    pub const fn mode(&self) -> M {
        self.mode
    }

    /// Mode changes since boot
    pub const fn changes(&self) -> u32 {
        self.changes
    }

    /// Apply accepted edges; returns whether the mode changed
    ///
    /// Every change restarts the mode-local counts from `counters`.
    pub fn poll(&mut self, latch: &ButtonLatch, counters: &LinkCounters) -> bool {
        let edges = latch.take();
        if edges == 0 {
            return false;
        }
        for _ in 0..edges {
            self.mode = self.mode.next();
        }
        self.changes = self.changes.wrapping_add(edges);
        self.baseline = Baseline {
            tx: counters.tx_count(),
            rx: counters.rx_count(),
            valid_rx: counters.valid_rx_count(),
        };
        crate::info!("mode -> {}", self.mode.as_str());
        true
    }

    /// Packets sent since the last mode change
    pub fn mode_tx(&self, counters: &LinkCounters) -> u32 {
        counters.tx_count().wrapping_sub(self.baseline.tx)
    }

    /// Packets received since the last mode change
    pub fn mode_rx(&self, counters: &LinkCounters) -> u32 {
        counters.rx_count().wrapping_sub(self.baseline.rx)
    }

    /// Valid telemetry received since the last mode change
    pub fn mode_valid_rx(&self, counters: &LinkCounters) -> u32 {
        counters.valid_rx_count().wrapping_sub(self.baseline.valid_rx)
    }
}

impl<M: CycleMode + Default> Default for ModeController<M> {
    fn default() -> Self {
        Self::new(M::default())
    }
}
