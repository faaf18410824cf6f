//! LoRa Radio Link
//!
//! One [`Transceiver`] trait, one implementation per physical chip. The
//! scheduler and the test rig only ever hold a `&mut dyn Transceiver`.

pub mod simulator;
pub mod sx127x;
pub mod transceiver;

pub use simulator::SimulatedRadio;
pub use sx127x::{ModemConfig, Sx127x};
pub use transceiver::{
    initialize_with_fallback, LinkQuality, PaSelect, PendingSlot, RadioError, RadioPacket,
    RadioText, Transceiver,
};
