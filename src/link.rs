//! Link Scheduler
//!
//! The cooperative duty-cycle loop. One call to
//! [`LinkScheduler::run_once`] is one loop iteration: GPS, IMU,
//! config/display, telemetry, receive and status, in that order, each gated
//! by its own interval.

pub mod counters;
pub mod interval;
pub mod scheduler;

pub use counters::LinkCounters;
pub use interval::IntervalTimer;
pub use scheduler::{GpsState, LinkScheduler, NodeIo, SensorCache, StatusSnapshot, TickReport};
