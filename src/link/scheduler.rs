//! The scheduler state machine

use crate::config::{
    ConfigChannel, LinkSettings, DEVICE_NAME_LEN, DISPLAY_INTERVAL_MS, GPS_STALE_FACTOR,
    IMU_INTERVAL_MS, STATUS_INTERVAL_MS,
};
use crate::link::{IntervalTimer, LinkCounters};
use crate::mode::{ButtonLatch, ModeController, Screen};
use crate::radio::{RadioPacket, Transceiver};
use crate::sensors::{BatterySource, GpsSource, ImuSource};
use crate::telemetry::{self, DeviceId, TelemetryRecord};
use crate::types::{BatteryLevel, DeviceRole, GpsFix, ImuSample};
use crate::ui::{self, DisplaySurface, LinkView, StatusView, View};

/// Collaborators lent to the scheduler for one iteration
pub struct NodeIo<'a> {
    /// Packet radio
    pub radio: &'a mut dyn Transceiver,
    /// GPS receiver
    pub gps: &'a mut dyn GpsSource,
    /// Inertial sensor
    pub imu: &'a mut dyn ImuSource,
    /// Battery gauge
    pub battery: &'a mut dyn BatterySource,
    /// Screen
    pub display: &'a mut dyn DisplaySurface,
    /// Settings source and status sink
    pub config: &'a mut dyn ConfigChannel,
    /// Mode button, shared with the interrupt path
    pub button: &'a ButtonLatch,
}

/// Freshness of the cached GPS fix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpsState {
    /// No valid fix cached
    NoFix,
    /// Valid fix within the staleness window
    Fix,
    /// Valid fix, but the receiver has gone quiet
    Stale,
}

impl GpsState {
    /// Get display name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoFix => "NO FIX",
            Self::Fix => "FIX",
            Self::Stale => "STALE",
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for GpsState {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.as_str());
    }
}

/// Last known good sensor values
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SensorCache {
    /// Last fix the receiver reported
    pub gps: GpsFix,
    /// When `gps` was updated
    pub gps_updated_ms: Option<u64>,
    /// Last IMU sample
    pub imu: ImuSample,
    /// Activity score of `imu`, 0-100
    pub activity: f32,
    /// `imu` exceeded the motion threshold
    pub moving: bool,
    /// Last battery reading
    pub battery: Option<BatteryLevel>,
}

/// Which ticks did work in one iteration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// GPS interval elapsed
    pub gps: bool,
    /// IMU interval elapsed
    pub imu: bool,
    /// A frame was drawn
    pub display: bool,
    /// Telemetry interval elapsed (transmitting roles only)
    pub telemetry: bool,
    /// A packet was drained
    pub received: bool,
    /// Status interval elapsed
    pub status: bool,
}

/// Diagnostic snapshot emitted by the status tick
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusSnapshot {
    /// Seconds since boot
    pub uptime_s: u32,
    /// Last battery reading
    pub battery: Option<BatteryLevel>,
    /// Fix freshness
    pub gps_state: GpsState,
    /// Satellites in the cached fix
    pub satellites: u8,
    /// Activity score 0-100
    pub activity: f32,
    /// Motion flag
    pub moving: bool,
    /// Config client attached
    pub config_connected: bool,
    /// Radio initialized
    pub radio_ready: bool,
    /// Build role
    pub role: DeviceRole,
    /// Packets sent
    pub tx_count: u32,
    /// Packets received
    pub rx_count: u32,
    /// Valid telemetry received
    pub valid_rx_count: u32,
}

/// Scheduler state, owned by the main loop
pub struct LinkScheduler {
    role: DeviceRole,
    device_id: DeviceId,
    gps_timer: IntervalTimer,
    imu_timer: IntervalTimer,
    display_timer: IntervalTimer,
    telemetry_timer: IntervalTimer,
    status_timer: IntervalTimer,
    sensors: SensorCache,
    counters: LinkCounters,
    screens: ModeController<Screen>,
    last_remote: Option<TelemetryRecord>,
    config_connected: bool,
    radio_ready: bool,
}

impl LinkScheduler {
    /// Create a scheduler for `role` with default settings
    ///
    /// A `device_id` longer than the record field is cut.
    #[must_use]
    pub fn new(role: DeviceRole, device_id: &str) -> Self {
        Self::with_settings(role, device_id, &LinkSettings::default())
    }

    /// Create a scheduler with explicit starting settings
    #[must_use]
    pub fn with_settings(role: DeviceRole, device_id: &str, settings: &LinkSettings) -> Self {
        let mut id = DeviceId::new();
        for c in device_id.chars().take(DEVICE_NAME_LEN) {
            if id.push(c).is_err() {
                break;
            }
        }
        let mut scheduler = Self {
            role,
            device_id: id,
            gps_timer: IntervalTimer::new(settings.gps_interval_ms),
            imu_timer: IntervalTimer::new(IMU_INTERVAL_MS),
            display_timer: IntervalTimer::new(DISPLAY_INTERVAL_MS),
            telemetry_timer: IntervalTimer::new(settings.telemetry_interval_ms),
            status_timer: IntervalTimer::new(STATUS_INTERVAL_MS),
            sensors: SensorCache::default(),
            counters: LinkCounters::new(),
            screens: ModeController::new(Screen::Status),
            last_remote: None,
            config_connected: false,
            radio_ready: false,
        };
        scheduler.apply_settings(settings);
        scheduler
    }

    /// Build role
    #[must_use]
    pub const fn role(&self) -> DeviceRole {
        self.role
    }

    /// Link totals
    #[must_use]
    pub const fn counters(&self) -> &LinkCounters {
        &self.counters
    }

    /// Cached sensor values
    #[must_use]
    pub const fn sensors(&self) -> &SensorCache {
        &self.sensors
    }

    /// Screen currently shown
    #[must_use]
    pub const fn screen(&self) -> Screen {
        self.screens.mode()
    }

    /// Last record decoded from another node
    #[must_use]
    pub const fn last_remote(&self) -> Option<&TelemetryRecord> {
        self.last_remote.as_ref()
    }

    /// Current GPS interval
    #[must_use]
    pub const fn gps_interval_ms(&self) -> u32 {
        self.gps_timer.interval_ms()
    }

    /// Current telemetry interval
    #[must_use]
    pub const fn telemetry_interval_ms(&self) -> u32 {
        self.telemetry_timer.interval_ms()
    }

    /// Fix freshness at `now_ms`
    #[must_use]
    pub fn gps_state(&self, now_ms: u64) -> GpsState {
        match self.sensors.gps_updated_ms {
            Some(updated) if self.sensors.gps.valid => {
                let window = u64::from(self.gps_timer.interval_ms()) * u64::from(GPS_STALE_FACTOR);
                if now_ms.saturating_sub(updated) > window {
                    GpsState::Stale
                } else {
                    GpsState::Fix
                }
            }
            _ => GpsState::NoFix,
        }
    }

    /// Snapshot for the status report
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn status_snapshot(&self, now_ms: u64) -> StatusSnapshot {
        StatusSnapshot {
            uptime_s: (now_ms / 1000) as u32,
            battery: self.sensors.battery,
            gps_state: self.gps_state(now_ms),
            satellites: self.sensors.gps.satellites,
            activity: self.sensors.activity,
            moving: self.sensors.moving,
            config_connected: self.config_connected,
            radio_ready: self.radio_ready,
            role: self.role,
            tx_count: self.counters.tx_count(),
            rx_count: self.counters.rx_count(),
            valid_rx_count: self.counters.valid_rx_count(),
        }
    }

    /// One loop iteration
    pub fn run_once(&mut self, now_ms: u64, io: &mut NodeIo<'_>) -> TickReport {
        let mut report = TickReport::default();
        self.radio_ready = io.radio.is_ready();

        if self.gps_timer.poll(now_ms) {
            report.gps = true;
            self.gps_tick(now_ms, io.gps);
        }

        if self.imu_timer.poll(now_ms) {
            report.imu = true;
            self.imu_tick(io.imu);
        }

        report.display = self.config_display_tick(now_ms, io);

        if self.role.transmits() && self.telemetry_timer.poll(now_ms) {
            report.telemetry = true;
            self.telemetry_tick(now_ms, io);
        }

        if self.role.receives() {
            report.received = self.receive_tick(now_ms, io.radio);
        }

        if self.status_timer.poll(now_ms) {
            report.status = true;
            self.status_tick(now_ms);
        }

        report
    }

    fn apply_settings(&mut self, settings: &LinkSettings) {
        let floor = LinkSettings::MIN_INTERVAL_MS;
        self.gps_timer.set_interval(settings.gps_interval_ms.max(floor));
        self.telemetry_timer
            .set_interval(settings.telemetry_interval_ms.max(floor));
    }

    fn gps_tick(&mut self, now_ms: u64, gps: &mut dyn GpsSource) {
        match gps.read_fix() {
            Ok(fix) => {
                if fix.valid && !self.sensors.gps.valid {
                    crate::info!("GPS fix acquired, {} satellites", fix.satellites);
                } else if !fix.valid && self.sensors.gps.valid {
                    crate::warn!("GPS fix lost");
                }
                self.sensors.gps = fix;
                self.sensors.gps_updated_ms = Some(now_ms);
            }
            Err(_) => crate::debug!("no fresh GPS data"),
        }
    }

    fn imu_tick(&mut self, imu: &mut dyn ImuSource) {
        let Ok(sample) = imu.read_sample() else {
            return;
        };
        let moving = sample.is_moving();
        if moving != self.sensors.moving {
            if moving {
                crate::info!("motion detected");
            } else {
                crate::info!("motion stopped");
            }
        }
        self.sensors.imu = sample;
        self.sensors.activity = sample.activity_level();
        self.sensors.moving = moving;
    }

    fn config_display_tick(&mut self, now_ms: u64, io: &mut NodeIo<'_>) -> bool {
        let settings = io.config.settings();
        self.apply_settings(&settings);
        self.config_connected = io.config.is_connected();

        let changed = self.screens.poll(io.button, &self.counters);
        let due = self.display_timer.poll(now_ms);
        if !(changed || due) {
            return false;
        }
        let gps_state = self.gps_state(now_ms);
        let view = match self.screens.mode() {
            Screen::Status => View::Status(StatusView {
                device_id: &self.device_id,
                role: self.role,
                battery: self.sensors.battery,
                gps: &self.sensors.gps,
                gps_state,
                radio_ready: self.radio_ready,
                config_connected: self.config_connected,
            }),
            Screen::Gps => View::Gps {
                fix: &self.sensors.gps,
                state: gps_state,
            },
            Screen::Link => View::Link(LinkView {
                role: self.role,
                radio_ready: self.radio_ready,
                counters: &self.counters,
            }),
        };
        io.display.show(&ui::render(&view));
        true
    }

    fn telemetry_tick(&mut self, now_ms: u64, io: &mut NodeIo<'_>) {
        match io.battery.battery_level() {
            Ok(level) => self.sensors.battery = Some(level),
            Err(_) => crate::debug!("battery read failed"),
        }
        let battery = self.sensors.battery.map_or(0, BatteryLevel::as_percent);

        let record = match TelemetryRecord::full(
            &self.device_id,
            now_ms,
            battery,
            self.sensors.gps,
            self.sensors.imu,
        ) {
            Ok(record) => record,
            Err(e) => {
                crate::error!("telemetry record: {}", e);
                return;
            }
        };
        let encoded = match telemetry::encode(&record) {
            Ok(text) => text,
            Err(e) => {
                crate::error!("telemetry encode: {}", e);
                return;
            }
        };
        let uptime_s = u32::try_from(now_ms / 1000).unwrap_or(u32::MAX);
        let rssi = self.counters.last_rssi().unwrap_or(0);
        let packets = match telemetry::packetize(&record, &encoded, uptime_s, rssi) {
            Ok(packets) => packets,
            Err(e) => {
                crate::error!("telemetry encode: {}", e);
                return;
            }
        };

        if io.radio.is_ready() {
            // one tick, one count: a failed part fails the whole record
            match packets
                .iter()
                .try_for_each(|packet| io.radio.transmit(packet.as_bytes()))
            {
                Ok(()) => {
                    self.counters.record_tx(true);
                    crate::info!(
                        "telemetry sent ({} bytes in {} packets, #{})",
                        encoded.len(),
                        packets.len(),
                        self.counters.tx_count()
                    );
                }
                Err(e) => {
                    self.counters.record_tx(false);
                    crate::warn!("telemetry send failed: {}", e);
                }
            }
        } else {
            self.counters.record_tx(false);
            crate::warn!("telemetry not sent, radio not ready");
        }

        if io.config.is_connected() {
            io.config.push_status(&encoded);
        }
    }

    fn receive_tick(&mut self, now_ms: u64, radio: &mut dyn Transceiver) -> bool {
        if !radio.available(now_ms) {
            return false;
        }
        let Some(packet) = radio.receive_bytes() else {
            return false;
        };
        self.handle_packet(&packet);
        true
    }

    fn handle_packet(&mut self, packet: &RadioPacket) {
        let text = packet.to_text();
        self.counters.record_rx(packet, &text);
        crate::info!(
            "received {} bytes, RSSI {} dBm, SNR {} dB",
            packet.len(),
            packet.rssi(),
            packet.snr()
        );

        match telemetry::decode(&text) {
            Ok(record) => {
                self.counters.record_valid_telemetry();
                crate::info!(
                    "telemetry from {} ({})",
                    record.device_id(),
                    record.kind().as_str()
                );
                self.last_remote = Some(record);
            }
            Err(e) => crate::warn!("non-telemetry packet: {}", e),
        }
    }

    fn status_tick(&self, now_ms: u64) {
        let s = self.status_snapshot(now_ms);
        crate::info!(
            "status: up {}s, battery {}%, GPS {} ({} sats), activity {}, moving {}",
            s.uptime_s,
            s.battery.map_or(0, BatteryLevel::as_percent),
            s.gps_state.as_str(),
            s.satellites,
            s.activity,
            s.moving
        );
        crate::info!(
            "status: role {}, radio {}, config {}, tx {}, rx {}, valid {}",
            s.role.as_str(),
            s.radio_ready,
            s.config_connected,
            s.tx_count,
            s.rx_count,
            s.valid_rx_count
        );
    }
}
