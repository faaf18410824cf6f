//! Peripheral Drivers
//!
//! Board-only drivers for external parts. The radio and IMU drivers are
//! generic over `embedded-hal` and live with their modules so they build on
//! the host; only the display needs the graphics stack.

pub mod display;
