//! Tests for the SX127x register driver
//!
//! The chip is modelled as a register file behind a fake SPI device, enough
//! to follow the init handshake, a transmit with TxDone and an RxDone read.
//! Run with: cargo test --target x86_64-unknown-linux-gnu --no-default-features --features std --test sx127x_tests

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_hal::spi::{ErrorType, Operation, SpiDevice};

use bravo_firmware::radio::sx127x::{
    regs, IRQ_PAYLOAD_CRC_ERROR, IRQ_RX_DONE, IRQ_TX_DONE, MODE_LONG_RANGE, MODE_RX_CONTINUOUS,
    MODE_TX, PA_BOOST, SX127X_VERSION,
};
use bravo_firmware::radio::{
    initialize_with_fallback, ModemConfig, PaSelect, RadioError, Sx127x, Transceiver,
};

// ============================================================================
// Fake Chip
// ============================================================================

struct Chip {
    regs: [u8; 128],
    fifo: [u8; 256],
    fifo_ptr: usize,
    /// Raise TxDone as soon as TX mode is entered
    tx_completes: bool,
    /// Drop the PA_BOOST bit on writes to `RegPaConfig`
    boost_missing: bool,
    sent: Vec<Vec<u8>>,
}

impl Chip {
    fn new() -> Self {
        let mut regs = [0u8; 128];
        regs[usize::from(regs::VERSION)] = SX127X_VERSION;
        Self {
            regs,
            fifo: [0; 256],
            fifo_ptr: 0,
            tx_completes: true,
            boost_missing: false,
            sent: Vec::new(),
        }
    }

    fn reg(&self, reg: u8) -> u8 {
        self.regs[usize::from(reg)]
    }

    fn write(&mut self, reg: u8, data: &[u8]) {
        if reg == regs::FIFO {
            for &b in data {
                self.fifo[self.fifo_ptr % 256] = b;
                self.fifo_ptr += 1;
            }
            return;
        }
        let value = data[0];
        match reg {
            regs::IRQ_FLAGS => self.regs[usize::from(reg)] &= !value,
            regs::FIFO_ADDR_PTR => {
                self.fifo_ptr = usize::from(value);
                self.regs[usize::from(reg)] = value;
            }
            regs::PA_CONFIG if self.boost_missing => self.regs[usize::from(reg)] = value & !PA_BOOST,
            regs::OP_MODE => {
                self.regs[usize::from(reg)] = value;
                if value & 0x07 == MODE_TX {
                    let len = usize::from(self.reg(regs::PAYLOAD_LENGTH));
                    self.sent.push(self.fifo[..len].to_vec());
                    if self.tx_completes {
                        self.regs[usize::from(regs::IRQ_FLAGS)] |= IRQ_TX_DONE;
                    }
                }
            }
            _ => self.regs[usize::from(reg)] = value,
        }
    }

    fn read(&mut self, reg: u8, out: &mut [u8]) {
        if reg == regs::FIFO {
            for b in out {
                *b = self.fifo[self.fifo_ptr % 256];
                self.fifo_ptr += 1;
            }
        } else if let Some(b) = out.first_mut() {
            *b = self.reg(reg);
        }
    }

    /// Stage a received packet the way the modem leaves it after RxDone
    fn receive(&mut self, payload: &[u8], raw_rssi: u8, raw_snr: i8, crc_error: bool) {
        let start = 0x40;
        self.fifo[start..start + payload.len()].copy_from_slice(payload);
        self.regs[usize::from(regs::FIFO_RX_CURRENT_ADDR)] = start as u8;
        self.regs[usize::from(regs::RX_NB_BYTES)] = payload.len() as u8;
        self.regs[usize::from(regs::PKT_RSSI_VALUE)] = raw_rssi;
        self.regs[usize::from(regs::PKT_SNR_VALUE)] = raw_snr as u8;
        let mut irq = IRQ_RX_DONE;
        if crc_error {
            irq |= IRQ_PAYLOAD_CRC_ERROR;
        }
        self.regs[usize::from(regs::IRQ_FLAGS)] = irq;
    }
}

#[derive(Clone)]
struct FakeSpi(Rc<RefCell<Chip>>);

impl ErrorType for FakeSpi {
    type Error = Infallible;
}

impl SpiDevice for FakeSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
        let mut chip = self.0.borrow_mut();
        for op in operations {
            match op {
                Operation::Write(data) => {
                    let (addr, rest) = data.split_first().unwrap();
                    assert!(addr & 0x80 != 0, "write without the write bit");
                    chip.write(addr & 0x7F, rest);
                }
                Operation::TransferInPlace(buf) => {
                    let addr = buf[0];
                    assert!(addr & 0x80 == 0, "read with the write bit");
                    chip.read(addr, &mut buf[1..]);
                }
                Operation::Read(_) | Operation::Transfer(_, _) | Operation::DelayNs(_) => {
                    panic!("driver uses write and transfer_in_place only")
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct ResetPin {
    levels: Vec<bool>,
}

impl PinErrorType for ResetPin {
    type Error = Infallible;
}

impl OutputPin for ResetPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.levels.push(true);
        Ok(())
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

type Driver = Sx127x<FakeSpi, ResetPin, NoDelay>;

fn driver() -> (Driver, Rc<RefCell<Chip>>) {
    let chip = Rc::new(RefCell::new(Chip::new()));
    let radio = Sx127x::new(
        FakeSpi(chip.clone()),
        ResetPin::default(),
        NoDelay,
        ModemConfig::default(),
    );
    (radio, chip)
}

fn ready_driver() -> (Driver, Rc<RefCell<Chip>>) {
    let (mut radio, chip) = driver();
    radio.initialize(PaSelect::Boost).unwrap();
    (radio, chip)
}

// ============================================================================
// Modem Config Tests
// ============================================================================

#[test]
fn frf_for_915_mhz() {
    let config = ModemConfig::default();
    assert_eq!(config.frf(), 0x00E4_C000);
}

#[test]
fn modem_config_registers_sf7_125k_cr45() {
    let config = ModemConfig::default();
    assert_eq!(config.bandwidth_code(), 7);
    assert_eq!(config.modem_config1(), 0x72);
    assert_eq!(config.modem_config2(), 0x74);
    assert_eq!(config.modem_config3(), 0x04);
}

#[test]
fn low_data_rate_optimize_for_sf12() {
    let config = ModemConfig {
        spreading_factor: 12,
        ..ModemConfig::default()
    };
    assert_eq!(config.modem_config3(), 0x0C);
}

#[test]
fn pa_registers_per_stage() {
    let config = ModemConfig::default();
    assert_eq!(config.pa_registers(PaSelect::Boost), (0x8F, 0x87));
    assert_eq!(config.pa_registers(PaSelect::Rfo), (0x7E, 0x84));

    let low = ModemConfig {
        tx_power_dbm: 10,
        ..ModemConfig::default()
    };
    assert_eq!(low.pa_registers(PaSelect::Boost), (0x88, 0x84));
    assert_eq!(low.pa_registers(PaSelect::Rfo), (0x7A, 0x84));
}

#[test]
fn boost_power_steps_near_the_top() {
    let at = |dbm: i8| ModemConfig {
        tx_power_dbm: dbm,
        ..ModemConfig::default()
    };
    // OutputPower saturates at 15 (17 dBm) on the normal PA_DAC setting
    assert_eq!(at(16).pa_registers(PaSelect::Boost), (0x8E, 0x84));
    assert_eq!(at(17).pa_registers(PaSelect::Boost), (0x8F, 0x84));
    // high-power PA_DAC, Pout = 5 + OutputPower
    assert_eq!(at(18).pa_registers(PaSelect::Boost), (0x8D, 0x87));
    assert_eq!(at(19).pa_registers(PaSelect::Boost), (0x8E, 0x87));
    assert_eq!(at(20).pa_registers(PaSelect::Boost), (0x8F, 0x87));
    assert_eq!(at(23).pa_registers(PaSelect::Boost), (0x8F, 0x87));
}

#[test]
fn boost_power_is_monotonic() {
    let pout = |dbm: i8| {
        let (config, dac) = ModemConfig {
            tx_power_dbm: dbm,
            ..ModemConfig::default()
        }
        .pa_registers(PaSelect::Boost);
        let offset = if dac == 0x87 { 5 } else { 2 };
        i8::try_from(config & 0x0F).unwrap() + offset
    };
    for dbm in 2..=20 {
        assert_eq!(pout(dbm), dbm, "requested {dbm} dBm");
    }
}

// ============================================================================
// Initialize Tests
// ============================================================================

#[test]
fn initialize_programs_modem_and_listens() {
    let (radio, chip) = ready_driver();
    assert!(radio.is_ready());

    let chip = chip.borrow();
    assert_eq!(chip.reg(regs::FR_MSB), 0xE4);
    assert_eq!(chip.reg(regs::FR_MID), 0xC0);
    assert_eq!(chip.reg(regs::FR_LSB), 0x00);
    assert_eq!(chip.reg(regs::SYNC_WORD), 0x12);
    assert_eq!(chip.reg(regs::PA_CONFIG), 0x8F);
    assert_eq!(chip.reg(regs::MAX_PAYLOAD_LENGTH), 255);
    assert_eq!(
        chip.reg(regs::OP_MODE),
        MODE_LONG_RANGE | MODE_RX_CONTINUOUS
    );
}

#[test]
fn initialize_pulses_reset() {
    let (radio, _chip) = ready_driver();
    let (_spi, reset, _delay) = radio.release();
    assert_eq!(reset.levels, vec![false, true]);
}

#[test]
fn wrong_version_fails_init() {
    let (mut radio, chip) = driver();
    chip.borrow_mut().regs[usize::from(regs::VERSION)] = 0x00;

    assert_eq!(radio.initialize(PaSelect::Boost), Err(RadioError::InitFailed));
    assert!(!radio.is_ready());
}

#[test]
fn lost_boost_bit_falls_back_to_rfo() {
    let (mut radio, chip) = driver();
    chip.borrow_mut().boost_missing = true;

    assert_eq!(initialize_with_fallback(&mut radio), Ok(PaSelect::Rfo));
    assert_eq!(chip.borrow().reg(regs::PA_CONFIG), 0x7E);
}

#[test]
fn sleep_clears_ready() {
    let (mut radio, chip) = ready_driver();
    radio.sleep().unwrap();
    assert!(!radio.is_ready());
    assert_eq!(chip.borrow().reg(regs::OP_MODE), MODE_LONG_RANGE);
}

// ============================================================================
// Transmit Tests
// ============================================================================

#[test]
fn transmit_loads_fifo_and_returns_to_receive() {
    let (mut radio, chip) = ready_driver();
    radio.transmit(b"ping 7").unwrap();

    let chip = chip.borrow();
    assert_eq!(chip.sent, vec![b"ping 7".to_vec()]);
    assert_eq!(chip.reg(regs::PAYLOAD_LENGTH), 6);
    assert_eq!(chip.reg(regs::IRQ_FLAGS), 0);
    assert_eq!(
        chip.reg(regs::OP_MODE),
        MODE_LONG_RANGE | MODE_RX_CONTINUOUS
    );
}

#[test]
fn missing_tx_done_times_out_and_still_listens() {
    let (mut radio, chip) = ready_driver();
    chip.borrow_mut().tx_completes = false;

    assert_eq!(radio.transmit(b"lost"), Err(RadioError::TransmitFailed));
    assert_eq!(
        chip.borrow().reg(regs::OP_MODE),
        MODE_LONG_RANGE | MODE_RX_CONTINUOUS
    );
}

#[test]
fn oversize_transmit_touches_no_register() {
    let (mut radio, chip) = ready_driver();
    let big = [0x55u8; 256];

    assert!(matches!(
        radio.transmit(&big),
        Err(RadioError::PayloadTooLarge { len: 256, max: 255 })
    ));
    assert!(chip.borrow().sent.is_empty());
}

#[test]
fn transmit_before_init_is_refused() {
    let (mut radio, chip) = driver();
    assert_eq!(radio.transmit(b"x"), Err(RadioError::NotReady));
    assert!(chip.borrow().sent.is_empty());
}

// ============================================================================
// Receive Tests
// ============================================================================

#[test]
fn rx_done_captures_packet_and_quality() {
    let (mut radio, chip) = ready_driver();
    // -157 + 97 = -60 dBm, 38 / 4 = 9.5 dB
    chip.borrow_mut().receive(b"hello", 97, 38, false);

    assert!(radio.available(1_000));
    assert_eq!(radio.last_rssi(), -60);
    assert!((radio.last_snr() - 9.5).abs() < f32::EPSILON);
    assert_eq!(chip.borrow().reg(regs::IRQ_FLAGS), 0);

    let packet = radio.receive_bytes().unwrap();
    assert_eq!(packet.as_bytes(), b"hello");
    assert_eq!(packet.received_at_ms(), 1_000);
}

#[test]
fn negative_snr_is_sign_extended() {
    let (mut radio, chip) = ready_driver();
    chip.borrow_mut().receive(b"far", 40, -18, false);

    assert!(radio.available(0));
    assert_eq!(radio.last_rssi(), -117);
    assert!((radio.last_snr() - -4.5).abs() < f32::EPSILON);
}

#[test]
fn crc_error_is_discarded() {
    let (mut radio, chip) = ready_driver();
    chip.borrow_mut().receive(b"noise", 60, 0, true);

    assert_eq!(radio.poll_receive(0), Ok(false));
    assert!(!radio.pending().is_pending());
    assert_eq!(chip.borrow().reg(regs::IRQ_FLAGS), 0);
}

#[test]
fn no_rx_done_means_nothing_pending() {
    let (mut radio, _chip) = ready_driver();
    assert_eq!(radio.poll_receive(0), Ok(false));
    assert!(!radio.available(0));
}

#[test]
fn second_packet_overwrites_undrained_first() {
    let (mut radio, chip) = ready_driver();
    chip.borrow_mut().receive(b"first", 100, 20, false);
    assert_eq!(radio.poll_receive(0), Ok(true));
    chip.borrow_mut().receive(b"second", 80, 4, false);
    assert_eq!(radio.poll_receive(1), Ok(true));

    assert_eq!(radio.pending().overwritten(), 1);
    assert_eq!(radio.receive_message().as_str(), "second");
}
