//! B.R.A.V.O. Firmware Library
//!
//! Core of the B.R.A.V.O. LoRa telemetry nodes: battery-powered collars
//! that beacon their position and motion, and relay dongles that listen
//! for them. Both run the same cooperative loop on an STM32G474 with an
//! SX1276 radio, a GPS receiver, an MPU6050 and an SSD1306 panel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    APPLICATION LAYER                         │
//! │  Link Scheduler  │  Mode Controller  │  Config Console       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     CODEC / VIEWS                            │
//! │  Telemetry JSON  │  NMEA  │  Display text rendering          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   DRIVER LAYER                               │
//! │  SX127x  │  MPU6050  │  SSD1306  │  USB CDC                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    RTOS / SCHEDULER                          │
//! │           embassy-rs (async/await executor)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - **One owned state struct**: the scheduler owns counters and caches,
//!   collaborators are lent to it per iteration
//! - **Traits at the hardware seams**: radio, sensors, display and config
//!   are all `dyn` traits, so the whole loop runs on the host in tests
//! - **No unsafe in application code**
//! - **Explicit error handling**: all fallible operations return `Result`

#![cfg_attr(feature = "embedded", no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export dependencies needed by applications (only in embedded mode)
#[cfg(feature = "embedded")]
pub use embassy_executor;
#[cfg(feature = "embedded")]
pub use embassy_stm32;
#[cfg(feature = "embedded")]
pub use embassy_sync;
#[cfg(feature = "embedded")]
pub use embassy_time;
#[cfg(feature = "embedded")]
pub use embassy_usb;

/// Logging facade over `defmt` and `log`
#[macro_use]
pub mod macros;

/// Peripheral Drivers
///
/// Board glue for external parts that only exist on the target (OLED).
#[cfg(feature = "embedded")]
pub mod drivers;

/// Radio Transceiver
///
/// The transceiver trait, the SX127x driver and an in-memory simulator.
pub mod radio;

/// Telemetry Codec
///
/// Typed telemetry records and their JSON wire form.
pub mod telemetry;

/// Link Scheduler
///
/// The role-driven tick loop and its counters.
pub mod link;

/// Mode Controller
///
/// Debounced button latch and cyclic mode selection.
pub mod mode;

/// Sensors
///
/// GPS, IMU and battery sources.
pub mod sensors;

/// Power Management
///
/// Battery monitoring.
pub mod power;

/// User Interface
///
/// Display views and their text layout.
pub mod ui;

/// USB Subsystem
///
/// CDC ACM transport for the configuration console.
#[cfg(feature = "embedded")]
pub mod usb;

/// Communication Protocols
///
/// Serial configuration console.
pub mod protocol;

/// Test rig variant
pub mod rig;

/// Shared types used across modules
pub mod types;

/// System configuration and constants
pub mod config;

/// Prelude module for common imports
#[cfg(feature = "embedded")]
pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::config::*;
    pub use crate::types::*;

    // Seams
    pub use crate::config::ConfigChannel;
    pub use crate::radio::Transceiver;
    pub use crate::sensors::{BatterySource, GpsSource, ImuSource};
    pub use crate::ui::DisplaySurface;

    // Common traits
    pub use embedded_hal::digital::OutputPin;

    // Embassy
    pub use embassy_time::{Duration, Instant, Timer};

    // Error handling
    pub use core::result::Result;

    // Logging
    pub use defmt::{debug, error, info, trace, warn};
}
