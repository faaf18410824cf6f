//! Tests for the link scheduler
//!
//! Drives `LinkScheduler::run_once` with a simulated clock, the in-memory
//! radio and scripted sensors.
//! Run with: cargo test --target x86_64-unknown-linux-gnu --no-default-features --features std --test scheduler_tests

use std::collections::VecDeque;

use bravo_firmware::config::{ConfigChannel, LinkSettings, MAX_PACKET_LEN};
use bravo_firmware::link::{GpsState, LinkScheduler, NodeIo, TickReport};
use bravo_firmware::mode::{ButtonLatch, Screen};
use bravo_firmware::radio::{PaSelect, SimulatedRadio, Transceiver};
use bravo_firmware::sensors::{BatterySource, GpsSource, ImuSource};
use bravo_firmware::telemetry::{self, TelemetryKind, TelemetryRecord};
use bravo_firmware::types::{
    BatteryLevel, DeviceRole, GpsFix, ImuSample, SensorUnavailable, Vector3,
};
use bravo_firmware::ui::{DisplaySurface, Frame};

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct ScriptedGps {
    fixes: VecDeque<GpsFix>,
}

impl GpsSource for ScriptedGps {
    fn read_fix(&mut self) -> Result<GpsFix, SensorUnavailable> {
        self.fixes.pop_front().ok_or(SensorUnavailable)
    }
}

struct FixedImu(Option<ImuSample>);

impl ImuSource for FixedImu {
    fn read_sample(&mut self) -> Result<ImuSample, SensorUnavailable> {
        self.0.ok_or(SensorUnavailable)
    }
}

struct FixedBattery(Option<u8>);

impl BatterySource for FixedBattery {
    fn battery_level(&mut self) -> Result<BatteryLevel, SensorUnavailable> {
        self.0.map(BatteryLevel::from_percent).ok_or(SensorUnavailable)
    }
}

#[derive(Default)]
struct RecordingDisplay {
    frames: Vec<Frame>,
}

impl DisplaySurface for RecordingDisplay {
    fn show(&mut self, frame: &Frame) {
        self.frames.push(frame.clone());
    }
}

#[derive(Default)]
struct FakeConfig {
    settings: LinkSettings,
    connected: bool,
    pushed: Vec<String>,
}

impl ConfigChannel for FakeConfig {
    fn settings(&self) -> LinkSettings {
        self.settings.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn push_status(&mut self, text: &str) {
        self.pushed.push(text.to_string());
    }
}

/// Everything a node needs, owned by the test
struct Bench {
    radio: SimulatedRadio,
    gps: ScriptedGps,
    imu: FixedImu,
    battery: FixedBattery,
    display: RecordingDisplay,
    config: FakeConfig,
    button: ButtonLatch,
}

impl Bench {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut radio = SimulatedRadio::new();
        radio.initialize(PaSelect::Boost).unwrap();
        Self {
            radio,
            gps: ScriptedGps::default(),
            imu: FixedImu(Some(ImuSample::default())),
            battery: FixedBattery(Some(80)),
            display: RecordingDisplay::default(),
            config: FakeConfig::default(),
            button: ButtonLatch::new(),
        }
    }

    fn step(&mut self, scheduler: &mut LinkScheduler, now_ms: u64) -> TickReport {
        let mut io = NodeIo {
            radio: &mut self.radio,
            gps: &mut self.gps,
            imu: &mut self.imu,
            battery: &mut self.battery,
            display: &mut self.display,
            config: &mut self.config,
            button: &self.button,
        };
        scheduler.run_once(now_ms, &mut io)
    }

    /// Run from `from_ms` to `to_ms` inclusive in 100 ms steps
    fn run(&mut self, scheduler: &mut LinkScheduler, from_ms: u64, to_ms: u64) {
        let mut now = from_ms;
        while now <= to_ms {
            self.step(scheduler, now);
            now += 100;
        }
    }
}

fn fix() -> GpsFix {
    GpsFix {
        valid: true,
        latitude: 48.1173,
        longitude: 11.516_666,
        altitude_m: 545.4,
        speed_kmh: 0.0,
        course_deg: 0.0,
        satellites: 8,
    }
}

fn sent_text(bench: &Bench, index: usize) -> String {
    String::from_utf8(bench.radio.sent()[index].to_vec()).unwrap()
}

fn first_line(frame: &Frame) -> &str {
    frame.first().map_or("", |line| line.as_str())
}

// ============================================================================
// Telemetry Tests
// ============================================================================

#[test]
fn telemetry_waits_for_its_interval() {
    let mut bench = Bench::new();
    let mut scheduler = LinkScheduler::new(DeviceRole::Both, "BRAVO_001");

    bench.run(&mut scheduler, 0, 9_900);
    assert!(bench.radio.sent().is_empty());

    let report = bench.step(&mut scheduler, 10_000);
    assert!(report.telemetry);
    assert_eq!(bench.radio.sent().len(), 1);
    assert_eq!(scheduler.counters().tx_count(), 1);
}

#[test]
fn telemetry_is_a_full_record() {
    let mut bench = Bench::new();
    let mut scheduler = LinkScheduler::new(DeviceRole::Beacon, "BRAVO_001");

    bench.run(&mut scheduler, 0, 10_000);

    assert_eq!(bench.radio.sent().len(), 1);
    let record = telemetry::decode(&sent_text(&bench, 0)).unwrap();
    assert_eq!(record.kind(), TelemetryKind::Full);
    assert_eq!(record.device_id(), "BRAVO_001");
    assert_eq!(record.timestamp_ms(), 10_000);
    assert_eq!(scheduler.sensors().battery, Some(BatteryLevel::from_percent(80)));
}

#[test]
fn full_record_with_a_fix_goes_out_in_parts() {
    let mut bench = Bench::new();
    bench.gps.fixes.push_back(fix());
    let mut scheduler = LinkScheduler::new(DeviceRole::Beacon, "BRAVO_001");

    bench.run(&mut scheduler, 0, 10_000);

    let kinds: Vec<TelemetryKind> = (0..bench.radio.sent().len())
        .map(|i| telemetry::decode(&sent_text(&bench, i)).unwrap().kind())
        .collect();
    assert_eq!(
        kinds,
        vec![TelemetryKind::Gps, TelemetryKind::Imu, TelemetryKind::Status]
    );
    let gps = telemetry::decode(&sent_text(&bench, 0)).unwrap();
    assert_eq!(gps.gps_fix(), Some(&fix()));
    assert_eq!(gps.timestamp_ms(), 10_000);
    assert_eq!(
        telemetry::decode(&sent_text(&bench, 2)).unwrap(),
        TelemetryRecord::status("BRAVO_001", 10_000, 80, 10, 0).unwrap()
    );
    assert_eq!(scheduler.counters().tx_count(), 1);
}

#[test]
fn field_readings_keep_the_beacon_on_air() {
    let mut bench = Bench::new();
    for _ in 0..40 {
        bench.gps.fixes.push_back(GpsFix {
            valid: true,
            latitude: 37.774_929_5,
            longitude: -122.419_415_5,
            altitude_m: 52.37,
            speed_kmh: 3.141_592_7,
            course_deg: 271.828_18,
            satellites: 12,
        });
    }
    bench.imu.0 = Some(ImuSample {
        accel: Vector3::new(-0.153_222_66, 0.987_654_3, 9.806_65),
        gyro: Vector3::new(0.012_345_679, -0.023_456_79, 0.001_234_567_9),
        temperature_c: 27.301_176,
    });
    bench.battery.0 = Some(87);
    let mut scheduler = LinkScheduler::new(DeviceRole::Beacon, "BRAVO_001");

    bench.run(&mut scheduler, 0, 30_000);

    assert_eq!(scheduler.counters().tx_count(), 3);
    assert_eq!(scheduler.counters().tx_failures(), 0);
    assert_eq!(bench.radio.sent().len(), 9);
    for (i, packet) in bench.radio.sent().iter().enumerate() {
        assert!(packet.len() <= MAX_PACKET_LEN, "packet {i}: {} bytes", packet.len());
        assert!(telemetry::decode(&sent_text(&bench, i)).is_ok());
    }
}

#[test]
fn telemetry_repeats_every_interval() {
    let mut bench = Bench::new();
    let mut scheduler = LinkScheduler::new(DeviceRole::Beacon, "BRAVO_001");

    bench.run(&mut scheduler, 0, 30_000);
    assert_eq!(bench.radio.sent().len(), 3);
}

#[test]
fn missing_battery_reads_as_zero() {
    let mut bench = Bench::new();
    bench.battery.0 = None;
    let mut scheduler = LinkScheduler::new(DeviceRole::Beacon, "N");

    bench.step(&mut scheduler, 10_000);

    let sent = sent_text(&bench, 0);
    let expected = TelemetryRecord::full("N", 10_000, 0, GpsFix::default(), ImuSample::default())
        .unwrap();
    assert_eq!(telemetry::decode(&sent).unwrap(), expected);
}

#[test]
fn failed_send_counts_failure_only() {
    let mut bench = Bench::new();
    bench.radio.set_transmit_broken(true);
    let mut scheduler = LinkScheduler::new(DeviceRole::Beacon, "BRAVO_001");

    bench.step(&mut scheduler, 10_000);

    assert_eq!(scheduler.counters().tx_count(), 0);
    assert_eq!(scheduler.counters().tx_failures(), 1);
    assert_eq!(scheduler.counters().last_tx_ok(), Some(false));
}

#[test]
fn radio_down_skips_transmit() {
    let mut bench = Bench::new();
    bench.radio = SimulatedRadio::new();
    let mut scheduler = LinkScheduler::new(DeviceRole::Beacon, "BRAVO_001");

    let report = bench.step(&mut scheduler, 10_000);

    assert!(report.telemetry);
    assert_eq!(bench.radio.transmit_calls(), 0);
    assert_eq!(scheduler.counters().tx_failures(), 1);
    assert!(!scheduler.status_snapshot(10_000).radio_ready);
}

#[test]
fn telemetry_is_pushed_to_connected_client() {
    let mut bench = Bench::new();
    bench.config.connected = true;
    let mut scheduler = LinkScheduler::new(DeviceRole::Beacon, "BRAVO_001");

    bench.step(&mut scheduler, 10_000);

    assert_eq!(bench.config.pushed.len(), 1);
    assert_eq!(bench.config.pushed[0].as_bytes(), bench.radio.sent()[0].as_slice());
}

#[test]
fn nothing_pushed_without_client() {
    let mut bench = Bench::new();
    let mut scheduler = LinkScheduler::new(DeviceRole::Beacon, "BRAVO_001");

    bench.step(&mut scheduler, 10_000);
    assert!(bench.config.pushed.is_empty());
}

// ============================================================================
// Role Tests
// ============================================================================

#[test]
fn relay_never_transmits() {
    let mut bench = Bench::new();
    let mut scheduler = LinkScheduler::new(DeviceRole::Relay, "RELAY_1");

    bench.run(&mut scheduler, 0, 30_000);

    assert_eq!(bench.radio.transmit_calls(), 0);
    assert_eq!(scheduler.counters().tx_count(), 0);
    assert_eq!(scheduler.counters().tx_failures(), 0);
}

#[test]
fn beacon_never_drains() {
    let mut bench = Bench::new();
    bench.radio.deliver(b"ping 1", -60, 7.0).unwrap();
    let mut scheduler = LinkScheduler::new(DeviceRole::Beacon, "BRAVO_001");

    bench.run(&mut scheduler, 0, 2_000);

    assert_eq!(bench.radio.on_air(), 1);
    assert_eq!(scheduler.counters().rx_count(), 0);
}

// ============================================================================
// Receive Tests
// ============================================================================

#[test]
fn relay_counts_valid_telemetry() {
    let mut bench = Bench::new();
    let remote = TelemetryRecord::status("BRAVO_002", 5_000, 60, 5, -80).unwrap();
    let text = telemetry::encode(&remote).unwrap();
    bench.radio.deliver(text.as_bytes(), -75, 6.5).unwrap();
    bench.radio.deliver(b"ping 3", -90, -1.0).unwrap();
    let mut scheduler = LinkScheduler::new(DeviceRole::Relay, "RELAY_1");

    assert!(bench.step(&mut scheduler, 0).received);
    assert!(bench.step(&mut scheduler, 10).received);
    assert!(!bench.step(&mut scheduler, 20).received);

    let counters = scheduler.counters();
    assert_eq!(counters.rx_count(), 2);
    assert_eq!(counters.valid_rx_count(), 1);
    assert_eq!(counters.last_rssi(), Some(-90));
    assert_eq!(counters.last_preview(), "ping 3");
    assert_eq!(scheduler.last_remote(), Some(&remote));
}

#[test]
fn combined_role_sends_and_receives() {
    let mut bench = Bench::new();
    bench.radio.deliver(b"hello", -50, 9.0).unwrap();
    let mut scheduler = LinkScheduler::new(DeviceRole::Both, "BRAVO_001");

    bench.run(&mut scheduler, 0, 10_000);

    assert_eq!(scheduler.counters().rx_count(), 1);
    assert_eq!(scheduler.counters().valid_rx_count(), 0);
    assert_eq!(scheduler.counters().tx_count(), 1);
}

// ============================================================================
// Sensor Tests
// ============================================================================

#[test]
fn gps_goes_stale_after_three_intervals() {
    let mut bench = Bench::new();
    bench.gps.fixes.push_back(fix());
    let mut scheduler = LinkScheduler::new(DeviceRole::Relay, "RELAY_1");

    assert_eq!(scheduler.gps_state(0), GpsState::NoFix);
    bench.step(&mut scheduler, 1_000);
    assert_eq!(scheduler.sensors().gps_updated_ms, Some(1_000));
    assert_eq!(scheduler.gps_state(4_000), GpsState::Fix);
    assert_eq!(scheduler.gps_state(4_001), GpsState::Stale);

    // silence keeps the cached fix
    bench.step(&mut scheduler, 2_000);
    assert_eq!(scheduler.sensors().gps, fix());
    assert_eq!(scheduler.sensors().gps_updated_ms, Some(1_000));
}

#[test]
fn invalid_fix_is_no_fix() {
    let mut bench = Bench::new();
    bench.gps.fixes.push_back(GpsFix::searching(3));
    let mut scheduler = LinkScheduler::new(DeviceRole::Relay, "RELAY_1");

    bench.step(&mut scheduler, 1_000);
    assert_eq!(scheduler.gps_state(1_000), GpsState::NoFix);
    assert_eq!(scheduler.status_snapshot(1_000).satellites, 3);
}

#[test]
fn imu_motion_is_cached() {
    let mut bench = Bench::new();
    bench.imu.0 = Some(ImuSample {
        accel: Vector3::new(0.0, 0.0, 14.8),
        ..ImuSample::default()
    });
    let mut scheduler = LinkScheduler::new(DeviceRole::Relay, "RELAY_1");

    let report = bench.step(&mut scheduler, 100);
    assert!(report.imu);
    assert!(scheduler.sensors().moving);
    assert!((scheduler.sensors().activity - 50.0).abs() < 0.01);
}

#[test]
fn failed_imu_read_keeps_last_sample() {
    let mut bench = Bench::new();
    let mut scheduler = LinkScheduler::new(DeviceRole::Relay, "RELAY_1");
    bench.step(&mut scheduler, 100);

    bench.imu.0 = None;
    bench.step(&mut scheduler, 200);
    assert_eq!(scheduler.sensors().imu, ImuSample::default());
    assert!(!scheduler.sensors().moving);
}

// ============================================================================
// Settings Tests
// ============================================================================

#[test]
fn settings_apply_each_iteration() {
    let mut bench = Bench::new();
    let mut scheduler = LinkScheduler::new(DeviceRole::Beacon, "BRAVO_001");
    bench.config.settings.telemetry_interval_ms = 2_000;

    bench.run(&mut scheduler, 0, 6_000);

    assert_eq!(scheduler.telemetry_interval_ms(), 2_000);
    assert_eq!(bench.radio.sent().len(), 3);
}

#[test]
fn intervals_are_floored() {
    let mut bench = Bench::new();
    bench.config.settings.gps_interval_ms = 10;
    bench.config.settings.telemetry_interval_ms = 0;
    let mut scheduler = LinkScheduler::new(DeviceRole::Beacon, "BRAVO_001");

    bench.step(&mut scheduler, 0);

    assert_eq!(scheduler.gps_interval_ms(), LinkSettings::MIN_INTERVAL_MS);
    assert_eq!(scheduler.telemetry_interval_ms(), LinkSettings::MIN_INTERVAL_MS);
}

#[test]
fn starting_settings_are_used() {
    let settings = LinkSettings {
        gps_interval_ms: 5_000,
        ..LinkSettings::default()
    };
    let scheduler = LinkScheduler::with_settings(DeviceRole::Both, "BRAVO_001", &settings);
    assert_eq!(scheduler.gps_interval_ms(), 5_000);
    assert_eq!(scheduler.telemetry_interval_ms(), 10_000);
}

// ============================================================================
// Display Tests
// ============================================================================

#[test]
fn display_refreshes_on_interval() {
    let mut bench = Bench::new();
    let mut scheduler = LinkScheduler::new(DeviceRole::Both, "BRAVO_001");

    bench.run(&mut scheduler, 0, 900);
    assert!(bench.display.frames.is_empty());

    assert!(bench.step(&mut scheduler, 1_000).display);
    assert_eq!(first_line(&bench.display.frames[0]), "BRAVO_001");
}

#[test]
fn button_cycles_screen_and_redraws_at_once() {
    let mut bench = Bench::new();
    let mut scheduler = LinkScheduler::new(DeviceRole::Both, "BRAVO_001");
    assert_eq!(scheduler.screen(), Screen::Status);

    assert!(bench.button.on_edge(10));
    assert!(bench.step(&mut scheduler, 20).display);
    assert_eq!(scheduler.screen(), Screen::Gps);
    assert_eq!(first_line(&bench.display.frames[0]), "GPS: NO FIX");

    assert!(bench.button.on_edge(400));
    bench.step(&mut scheduler, 410);
    assert_eq!(scheduler.screen(), Screen::Link);
    assert_eq!(first_line(&bench.display.frames[1]), "LINK BOTH");
}

// ============================================================================
// Status Tests
// ============================================================================

#[test]
fn status_fires_every_five_seconds() {
    let mut bench = Bench::new();
    let mut scheduler = LinkScheduler::new(DeviceRole::Relay, "RELAY_1");

    assert!(!bench.step(&mut scheduler, 4_900).status);
    assert!(bench.step(&mut scheduler, 5_000).status);
    assert!(!bench.step(&mut scheduler, 5_100).status);
}

#[test]
fn status_snapshot_reflects_state() {
    let mut bench = Bench::new();
    bench.config.connected = true;
    let mut scheduler = LinkScheduler::new(DeviceRole::Both, "BRAVO_001");

    bench.run(&mut scheduler, 0, 10_000);

    let snapshot = scheduler.status_snapshot(12_345);
    assert_eq!(snapshot.uptime_s, 12);
    assert_eq!(snapshot.role, DeviceRole::Both);
    assert!(snapshot.radio_ready);
    assert!(snapshot.config_connected);
    assert_eq!(snapshot.tx_count, 1);
    assert_eq!(snapshot.gps_state, GpsState::NoFix);
}
