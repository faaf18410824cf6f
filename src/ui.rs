//! User Interface
//!
//! Views are laid out as text here, with no hardware in sight, and handed
//! to a [`DisplaySurface`] that only draws. Every view fits the 128x64
//! panel in the 6x10 font: at most [`MAX_LINES`] lines of [`LINE_WIDTH`]
//! characters, longer text is cut.
//!
//! GPS and radio trouble is always spelled out (`NO FIX`, `STALE`,
//! `RADIO OFF`) rather than showing old numbers as if they were current.

use core::fmt::{self, Write};

use heapless::{String, Vec};

use crate::link::{GpsState, LinkCounters};
use crate::types::{BatteryLevel, DeviceRole, GpsFix};

/// Characters per line (128 px / 6 px)
pub const LINE_WIDTH: usize = 21;

/// Lines per frame (64 px / 10 px)
pub const MAX_LINES: usize = 6;

/// One text line
pub type Line = String<LINE_WIDTH>;

/// One rendered frame
pub type Frame = Vec<Line, MAX_LINES>;

/// Something that can show a frame
pub trait DisplaySurface {
    /// Replace the screen contents
    fn show(&mut self, frame: &Frame);
}

/// Inputs for the status view
#[derive(Clone, Copy, Debug)]
pub struct StatusView<'a> {
    /// Device identifier
    pub device_id: &'a str,
    /// Build role
    pub role: DeviceRole,
    /// Battery, if ever read
    pub battery: Option<BatteryLevel>,
    /// Cached fix
    pub gps: &'a GpsFix,
    /// Freshness of the cached fix
    pub gps_state: GpsState,
    /// Radio initialized
    pub radio_ready: bool,
    /// Config client attached
    pub config_connected: bool,
}

/// Inputs for the link view
#[derive(Clone, Copy, Debug)]
pub struct LinkView<'a> {
    /// Build role
    pub role: DeviceRole,
    /// Radio initialized
    pub radio_ready: bool,
    /// Totals
    pub counters: &'a LinkCounters,
}

/// A screen's worth of content
#[derive(Clone, Copy, Debug)]
pub enum View<'a> {
    /// Identity, battery, GPS summary
    Status(StatusView<'a>),
    /// GPS detail
    Gps {
        /// Cached fix
        fix: &'a GpsFix,
        /// Freshness of the cached fix
        state: GpsState,
    },
    /// Radio counters
    Link(LinkView<'a>),
    /// Free text, wrapped
    Message(&'a str),
}

/// `fmt::Write` adapter that silently cuts at the line width
struct Clipped<'a>(&'a mut Line);

impl Write for Clipped<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

fn push_line(frame: &mut Frame, args: fmt::Arguments<'_>) {
    let mut line = Line::new();
    // Clipped never fails
    let _ = Clipped(&mut line).write_fmt(args);
    // extra lines fall off the bottom of the panel
    let _ = frame.push(line);
}

const fn gps_label(state: GpsState) -> &'static str {
    match state {
        GpsState::Fix => "GPS: FIX",
        GpsState::Stale => "GPS: STALE",
        GpsState::NoFix => "GPS: NO FIX",
    }
}

const fn radio_label(ready: bool) -> &'static str {
    if ready {
        "RADIO OK"
    } else {
        "RADIO OFF"
    }
}

/// Lay out a view as text
#[must_use]
pub fn render(view: &View<'_>) -> Frame {
    let mut frame = Frame::new();
    match view {
        View::Status(status) => render_status(&mut frame, status),
        View::Gps { fix, state } => render_gps(&mut frame, fix, *state),
        View::Link(link) => render_link(&mut frame, link),
        View::Message(text) => render_message(&mut frame, text),
    }
    frame
}

fn render_status(frame: &mut Frame, view: &StatusView<'_>) {
    push_line(frame, format_args!("{}", view.device_id));
    match view.battery {
        Some(level) => push_line(
            frame,
            format_args!("{} | Bat:{}%", view.role.as_str(), level.as_percent()),
        ),
        None => push_line(frame, format_args!("{} | Bat:--", view.role.as_str())),
    }
    push_line(frame, format_args!("{}", gps_label(view.gps_state)));
    if view.gps_state == GpsState::NoFix {
        push_line(frame, format_args!("Sats: {}", view.gps.satellites));
    } else {
        push_line(frame, format_args!("Lat:{:.6}", view.gps.latitude));
        push_line(frame, format_args!("Lon:{:.6}", view.gps.longitude));
    }
    let cfg = if view.config_connected { " CFG" } else { "" };
    push_line(frame, format_args!("{}{}", radio_label(view.radio_ready), cfg));
}

fn render_gps(frame: &mut Frame, fix: &GpsFix, state: GpsState) {
    match state {
        GpsState::NoFix => {
            push_line(frame, format_args!("{}", gps_label(state)));
            push_line(frame, format_args!("Satellites: {}", fix.satellites));
            push_line(frame, format_args!("Searching..."));
        }
        GpsState::Fix | GpsState::Stale => {
            if state == GpsState::Fix {
                push_line(frame, format_args!("GPS Location:"));
            } else {
                push_line(frame, format_args!("{}", gps_label(state)));
            }
            push_line(frame, format_args!("Lat:{:.6}", fix.latitude));
            push_line(frame, format_args!("Lon:{:.6}", fix.longitude));
            push_line(frame, format_args!("Alt:{:.1}m", fix.altitude_m));
            push_line(frame, format_args!("Spd:{:.1}km/h", fix.speed_kmh));
            push_line(frame, format_args!("Sats:{}", fix.satellites));
        }
    }
}

fn render_link(frame: &mut Frame, view: &LinkView<'_>) {
    let counters = view.counters;
    push_line(frame, format_args!("LINK {}", view.role.as_str()));
    if !view.radio_ready {
        push_line(frame, format_args!("{}", radio_label(false)));
        return;
    }
    push_line(
        frame,
        format_args!("TX:{} RX:{}", counters.tx_count(), counters.rx_count()),
    );
    push_line(
        frame,
        format_args!(
            "Valid:{} Fail:{}",
            counters.valid_rx_count(),
            counters.tx_failures()
        ),
    );
    match (counters.last_rssi(), counters.last_snr()) {
        (Some(rssi), Some(snr)) => push_line(frame, format_args!("RSSI:{rssi} SNR:{snr:.1}")),
        _ => push_line(frame, format_args!("RSSI:-- SNR:--")),
    }
    let last_tx = match counters.last_tx_ok() {
        Some(true) => "OK",
        Some(false) => "FAIL",
        None => "--",
    };
    push_line(frame, format_args!("Last TX: {last_tx}"));
    push_line(frame, format_args!("{}", counters.last_preview()));
}

fn render_message(frame: &mut Frame, text: &str) {
    let mut line = Line::new();
    for c in text.chars() {
        if c == '\n' || line.push(c).is_err() {
            if frame.push(core::mem::take(&mut line)).is_err() {
                return;
            }
            if c != '\n' {
                let _ = line.push(c);
            }
        }
    }
    if !line.is_empty() {
        let _ = frame.push(line);
    }
}
