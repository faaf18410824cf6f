//! Tests for button handling and mode cycling
//!
//! Run with: cargo test --target x86_64-unknown-linux-gnu --no-default-features --features std --test mode_tests

use bravo_firmware::mode::{ButtonLatch, CycleMode, ModeController, RigMode, Screen};
use bravo_firmware::link::LinkCounters;

// ============================================================================
// Button Latch Tests
// ============================================================================

#[test]
fn first_edge_is_always_accepted() {
    let latch = ButtonLatch::new();
    assert!(latch.on_edge(0));
    assert_eq!(latch.pending(), 1);
}

#[test]
fn bounce_inside_window_is_dropped() {
    let latch = ButtonLatch::new();
    assert!(latch.on_edge(1_000));
    assert!(!latch.on_edge(1_010));
    assert!(!latch.on_edge(1_249));
    assert!(latch.on_edge(1_250));
    assert_eq!(latch.pending(), 2);
}

#[test]
fn dropped_edges_do_not_extend_the_window() {
    let latch = ButtonLatch::new();
    assert!(latch.on_edge(0));
    assert!(!latch.on_edge(200));
    // measured from the accepted edge at 0, not the bounce at 200
    assert!(latch.on_edge(260));
}

#[test]
fn take_clears_pending() {
    let latch = ButtonLatch::with_debounce(10);
    latch.on_edge(0);
    latch.on_edge(20);
    latch.on_edge(40);
    assert_eq!(latch.take(), 3);
    assert_eq!(latch.pending(), 0);
    assert_eq!(latch.take(), 0);
}

#[test]
fn window_survives_clock_wrap() {
    let latch = ButtonLatch::new();
    assert!(latch.on_edge(u32::MAX - 100));
    assert!(!latch.on_edge(50));
    assert!(latch.on_edge(200));
}

#[test]
fn latch_works_from_a_static() {
    static LATCH: ButtonLatch = ButtonLatch::new();
    LATCH.on_edge(5);
    assert_eq!(LATCH.take(), 1);
}

// ============================================================================
// Cycle Order Tests
// ============================================================================

#[test]
fn rig_modes_cycle_relay_beacon_gps() {
    assert_eq!(RigMode::Relay.next(), RigMode::Beacon);
    assert_eq!(RigMode::Beacon.next(), RigMode::Gps);
    assert_eq!(RigMode::Gps.next(), RigMode::Relay);
    assert_eq!(RigMode::default(), RigMode::Relay);
}

#[test]
fn screens_cycle_status_gps_link() {
    assert_eq!(Screen::Status.next(), Screen::Gps);
    assert_eq!(Screen::Gps.next(), Screen::Link);
    assert_eq!(Screen::Link.next(), Screen::Status);
}

#[test]
fn mode_names() {
    assert_eq!(RigMode::Relay.as_str(), "RELAY");
    assert_eq!(RigMode::Beacon.as_str(), "BEACON");
    assert_eq!(RigMode::Gps.as_str(), "GPS");
    assert_eq!(Screen::Gps.as_str(), "GPS");
}

// ============================================================================
// Mode Controller Tests
// ============================================================================

#[test]
fn no_edges_no_change() {
    let latch = ButtonLatch::new();
    let counters = LinkCounters::new();
    let mut modes = ModeController::new(RigMode::Relay);

    assert!(!modes.poll(&latch, &counters));
    assert_eq!(modes.mode(), RigMode::Relay);
    assert_eq!(modes.changes(), 0);
}

#[test]
fn one_edge_one_step() {
    let latch = ButtonLatch::new();
    let counters = LinkCounters::new();
    let mut modes = ModeController::<RigMode>::default();

    latch.on_edge(0);
    assert!(modes.poll(&latch, &counters));
    assert_eq!(modes.mode(), RigMode::Beacon);
    assert_eq!(modes.changes(), 1);
}

#[test]
fn queued_edges_all_apply() {
    let latch = ButtonLatch::new();
    let counters = LinkCounters::new();
    let mut modes = ModeController::new(RigMode::Relay);

    latch.on_edge(0);
    latch.on_edge(300);
    latch.on_edge(600);
    assert!(modes.poll(&latch, &counters));
    // three steps round the cycle
    assert_eq!(modes.mode(), RigMode::Relay);
    assert_eq!(modes.changes(), 3);
}

#[test]
fn mode_counts_start_at_zero() {
    let latch = ButtonLatch::new();
    let counters = LinkCounters::new();
    let mut modes = ModeController::new(Screen::Status);

    latch.on_edge(0);
    modes.poll(&latch, &counters);
    assert_eq!(modes.mode_tx(&counters), 0);
    assert_eq!(modes.mode_rx(&counters), 0);
    assert_eq!(modes.mode_valid_rx(&counters), 0);
}
