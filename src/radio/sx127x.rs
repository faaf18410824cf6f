//! SX1276/RFM95 LoRa driver
//!
//! Blocking, register-level driver over any `embedded-hal` 1.0 SPI device.
//! DIO0 is not wired on the collar board, so completion is detected by
//! polling `RegIrqFlags`: a bounded wait for TxDone after a send and a single
//! non-blocking read for RxDone per [`Transceiver::poll_receive`].
//!
//! The modem lives in RX continuous mode. A transmit parks it in standby,
//! sends, and always puts it back in RX continuous, even on failure.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;

use super::transceiver::{LinkQuality, PaSelect, PendingSlot, RadioError, RadioPacket, Transceiver};
use crate::config::{
    LORA_BANDWIDTH_HZ, LORA_CODING_RATE, LORA_FREQUENCY_HZ, LORA_SPREADING_FACTOR, LORA_SYNC_WORD,
    LORA_TX_POWER_DBM, MAX_PACKET_LEN, TX_TIMEOUT_MS,
};

/// Register map (LoRa mode)
#[allow(dead_code)]
pub mod regs {
    /// FIFO read/write access
    pub const FIFO: u8 = 0x00;
    /// Operating mode
    pub const OP_MODE: u8 = 0x01;
    /// Carrier frequency, MSB
    pub const FR_MSB: u8 = 0x06;
    /// Carrier frequency, middle byte
    pub const FR_MID: u8 = 0x07;
    /// Carrier frequency, LSB
    pub const FR_LSB: u8 = 0x08;
    /// PA selection and output power
    pub const PA_CONFIG: u8 = 0x09;
    /// LNA settings
    pub const LNA: u8 = 0x0C;
    /// FIFO SPI pointer
    pub const FIFO_ADDR_PTR: u8 = 0x0D;
    /// TX base address in FIFO
    pub const FIFO_TX_BASE_ADDR: u8 = 0x0E;
    /// RX base address in FIFO
    pub const FIFO_RX_BASE_ADDR: u8 = 0x0F;
    /// Start of last received packet
    pub const FIFO_RX_CURRENT_ADDR: u8 = 0x10;
    /// IRQ flags, write 1 to clear
    pub const IRQ_FLAGS: u8 = 0x12;
    /// Length of last received packet
    pub const RX_NB_BYTES: u8 = 0x13;
    /// SNR of last packet, 0.25 dB steps
    pub const PKT_SNR_VALUE: u8 = 0x19;
    /// RSSI of last packet
    pub const PKT_RSSI_VALUE: u8 = 0x1A;
    /// Bandwidth, coding rate, header mode
    pub const MODEM_CONFIG1: u8 = 0x1D;
    /// Spreading factor, CRC
    pub const MODEM_CONFIG2: u8 = 0x1E;
    /// Payload length for TX
    pub const PAYLOAD_LENGTH: u8 = 0x22;
    /// Maximum payload length for RX
    pub const MAX_PAYLOAD_LENGTH: u8 = 0x23;
    /// LDRO, AGC
    pub const MODEM_CONFIG3: u8 = 0x26;
    /// Sync word
    pub const SYNC_WORD: u8 = 0x39;
    /// DIO mapping
    pub const DIO_MAPPING1: u8 = 0x40;
    /// Silicon revision
    pub const VERSION: u8 = 0x42;
    /// High power PA settings
    pub const PA_DAC: u8 = 0x4D;
}

/// RxTimeout IRQ bit
pub const IRQ_RX_TIMEOUT: u8 = 0x80;
/// RxDone IRQ bit
pub const IRQ_RX_DONE: u8 = 0x40;
/// PayloadCrcError IRQ bit
pub const IRQ_PAYLOAD_CRC_ERROR: u8 = 0x20;
/// TxDone IRQ bit
pub const IRQ_TX_DONE: u8 = 0x08;

/// Sleep mode
pub const MODE_SLEEP: u8 = 0x00;
/// Standby mode
pub const MODE_STDBY: u8 = 0x01;
/// Transmit mode
pub const MODE_TX: u8 = 0x03;
/// RX continuous mode
pub const MODE_RX_CONTINUOUS: u8 = 0x05;
/// LoRa mode bit
pub const MODE_LONG_RANGE: u8 = 0x80;

/// PA_BOOST output select bit
pub const PA_BOOST: u8 = 0x80;

/// `RegVersion` value for SX1276/77/78/79 and RFM95/96/97/98
pub const SX127X_VERSION: u8 = 0x12;

/// Crystal oscillator frequency
const FXOSC: u64 = 32_000_000;

/// RSSI offset for the HF port
const RSSI_OFFSET_HF: i16 = -157;

/// Modem parameters written at initialize
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModemConfig {
    /// Carrier frequency in Hz
    pub frequency_hz: u32,
    /// Spreading factor, 6-12
    pub spreading_factor: u8,
    /// Signal bandwidth in Hz
    pub bandwidth_hz: u32,
    /// Coding rate denominator, 5-8
    pub coding_rate: u8,
    /// Output power in dBm
    pub tx_power_dbm: i8,
}

impl ModemConfig {
    /// `RegFrf` value for the carrier
    #[must_use]
    pub const fn frf(&self) -> u32 {
        (((self.frequency_hz as u64) << 19) / FXOSC) as u32
    }

    /// `RegModemConfig1` bandwidth code
    #[must_use]
    pub const fn bandwidth_code(&self) -> u8 {
        match self.bandwidth_hz {
            0..=7_800 => 0,
            7_801..=10_400 => 1,
            10_401..=15_600 => 2,
            15_601..=20_800 => 3,
            20_801..=31_250 => 4,
            31_251..=41_700 => 5,
            41_701..=62_500 => 6,
            62_501..=125_000 => 7,
            125_001..=250_000 => 8,
            _ => 9,
        }
    }

    /// `RegModemConfig1` value, explicit header
    #[must_use]
    pub const fn modem_config1(&self) -> u8 {
        let cr = self.coding_rate.saturating_sub(4) & 0x07;
        (self.bandwidth_code() << 4) | (cr << 1)
    }

    /// `RegModemConfig2` value, CRC on
    #[must_use]
    pub const fn modem_config2(&self) -> u8 {
        ((self.spreading_factor & 0x0F) << 4) | 0x04
    }

    /// `RegModemConfig3` value, AGC auto on, LDRO for slow symbols
    #[must_use]
    pub const fn modem_config3(&self) -> u8 {
        let ldro = if self.spreading_factor >= 11 && self.bandwidth_hz <= 125_000 {
            0x08
        } else {
            0x00
        };
        ldro | 0x04
    }

    /// `RegPaConfig` and `RegPaDac` for the chosen output stage
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn pa_registers(&self, pa: PaSelect) -> (u8, u8) {
        match pa {
            // PA_DAC high power above 17 dBm, Pout = 5 + OutputPower
            PaSelect::Boost => match self.tx_power_dbm {
                p if p >= 20 => (PA_BOOST | 0x0F, 0x87),
                p if p >= 18 => (PA_BOOST | (p - 5) as u8, 0x87),
                // Pout = 2 + OutputPower, OutputPower 0..=15
                p if p >= 2 => (PA_BOOST | (p - 2) as u8, 0x84),
                _ => (PA_BOOST, 0x84),
            },
            // MaxPower = 7 gives Pmax = 15 dBm, Pout = OutputPower
            PaSelect::Rfo => match self.tx_power_dbm {
                p if p >= 14 => (0x70 | 14, 0x84),
                p if p >= 0 => (0x70 | (p as u8 & 0x0F), 0x84),
                _ => (0x70, 0x84),
            },
        }
    }
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            frequency_hz: LORA_FREQUENCY_HZ,
            spreading_factor: LORA_SPREADING_FACTOR,
            bandwidth_hz: LORA_BANDWIDTH_HZ,
            coding_rate: LORA_CODING_RATE,
            tx_power_dbm: LORA_TX_POWER_DBM,
        }
    }
}

/// SX127x driver
///
/// # Type Parameters
/// - `SPI`: SPI device with chip-select management
/// - `RST`: active-low reset pin
/// - `D`: blocking delay for reset timing and TxDone polling
pub struct Sx127x<SPI, RST, D> {
    spi: SPI,
    reset: RST,
    delay: D,
    config: ModemConfig,
    ready: bool,
    pending: PendingSlot,
}

impl<SPI, RST, D> Sx127x<SPI, RST, D>
where
    SPI: SpiDevice,
    RST: OutputPin,
    D: DelayNs,
{
    /// Wrap the bus. Nothing is sent until [`Transceiver::initialize`].
    pub fn new(spi: SPI, reset: RST, delay: D, config: ModemConfig) -> Self {
        Self {
            spi,
            reset,
            delay,
            config,
            ready: false,
            pending: PendingSlot::new(),
        }
    }

    /// Modem parameters in use
    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    /// Release the bus and pins
    pub fn release(self) -> (SPI, RST, D) {
        (self.spi, self.reset, self.delay)
    }

    /// Put the modem to sleep; initialize again to resume
    ///
    /// # Errors
    /// [`RadioError::Bus`] on a failed transaction.
    pub fn sleep(&mut self) -> Result<(), RadioError> {
        self.ready = false;
        self.write_reg(regs::OP_MODE, MODE_LONG_RANGE | MODE_SLEEP)
    }

    fn hard_reset(&mut self) -> Result<(), RadioError> {
        self.reset.set_low().map_err(|_| RadioError::Bus)?;
        self.delay.delay_ms(10);
        self.reset.set_high().map_err(|_| RadioError::Bus)?;
        self.delay.delay_ms(10);
        Ok(())
    }

    fn configure(&mut self, pa: PaSelect) -> Result<(), RadioError> {
        let version = self.read_reg(regs::VERSION)?;
        if version != SX127X_VERSION {
            crate::warn!("unexpected SX127x version {}", version);
            return Err(RadioError::InitFailed);
        }

        // LoRa mode can only be selected from sleep
        self.write_reg(regs::OP_MODE, MODE_SLEEP)?;
        self.write_reg(regs::OP_MODE, MODE_LONG_RANGE | MODE_SLEEP)?;

        let frf = self.config.frf();
        self.write_reg(regs::FR_MSB, (frf >> 16) as u8)?;
        self.write_reg(regs::FR_MID, (frf >> 8) as u8)?;
        self.write_reg(regs::FR_LSB, frf as u8)?;

        self.write_reg(regs::FIFO_TX_BASE_ADDR, 0x00)?;
        self.write_reg(regs::FIFO_RX_BASE_ADDR, 0x00)?;
        // max gain, HF boost
        self.write_reg(regs::LNA, 0x23)?;

        let config1 = self.config.modem_config1();
        let config2 = self.config.modem_config2();
        self.write_reg(regs::MODEM_CONFIG1, config1)?;
        self.write_reg(regs::MODEM_CONFIG2, config2)?;
        self.write_reg(regs::MODEM_CONFIG3, self.config.modem_config3())?;

        let (pa_config, pa_dac) = self.config.pa_registers(pa);
        self.write_reg(regs::PA_CONFIG, pa_config)?;
        self.write_reg(regs::PA_DAC, pa_dac)?;

        self.write_reg(regs::SYNC_WORD, LORA_SYNC_WORD)?;
        self.write_reg(regs::MAX_PAYLOAD_LENGTH, MAX_PACKET_LEN as u8)?;

        // Read back what matters; a chip that lost any of it is not usable
        let acknowledged = self.read_reg(regs::OP_MODE)? == MODE_LONG_RANGE | MODE_SLEEP
            && self.read_reg(regs::FR_MSB)? == (frf >> 16) as u8
            && self.read_reg(regs::MODEM_CONFIG1)? == config1
            && self.read_reg(regs::MODEM_CONFIG2)? == config2
            && self.read_reg(regs::PA_CONFIG)? == pa_config;
        if !acknowledged {
            return Err(RadioError::InitFailed);
        }

        self.start_receive()
    }

    fn start_receive(&mut self) -> Result<(), RadioError> {
        // DIO0 -> RxDone
        self.write_reg(regs::DIO_MAPPING1, 0x00)?;
        self.write_reg(regs::IRQ_FLAGS, 0xFF)?;
        self.write_reg(regs::FIFO_ADDR_PTR, 0x00)?;
        self.write_reg(regs::OP_MODE, MODE_LONG_RANGE | MODE_RX_CONTINUOUS)
    }

    fn send_frame(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        self.write_reg(regs::OP_MODE, MODE_LONG_RANGE | MODE_STDBY)?;
        self.write_reg(regs::FIFO_ADDR_PTR, 0x00)?;
        self.write_fifo(payload)?;
        // payload length was checked against MAX_PACKET_LEN
        self.write_reg(regs::PAYLOAD_LENGTH, payload.len() as u8)?;
        // DIO0 -> TxDone
        self.write_reg(regs::DIO_MAPPING1, 0x40)?;
        self.write_reg(regs::IRQ_FLAGS, 0xFF)?;
        self.write_reg(regs::OP_MODE, MODE_LONG_RANGE | MODE_TX)?;

        for _ in 0..TX_TIMEOUT_MS {
            if self.read_reg(regs::IRQ_FLAGS)? & IRQ_TX_DONE != 0 {
                self.write_reg(regs::IRQ_FLAGS, IRQ_TX_DONE)?;
                return Ok(());
            }
            self.delay.delay_ms(1);
        }
        Err(RadioError::TransmitFailed)
    }

    fn read_quality(&mut self) -> Result<LinkQuality, RadioError> {
        let raw_rssi = self.read_reg(regs::PKT_RSSI_VALUE)?;
        #[allow(clippy::cast_possible_wrap)]
        let raw_snr = self.read_reg(regs::PKT_SNR_VALUE)? as i8;
        Ok(LinkQuality {
            rssi_dbm: RSSI_OFFSET_HF + i16::from(raw_rssi),
            snr_db: f32::from(raw_snr) / 4.0,
        })
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), RadioError> {
        self.spi
            .write(&[reg | 0x80, value])
            .map_err(|_| RadioError::Bus)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, RadioError> {
        let mut buf = [reg & 0x7F, 0x00];
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(|_| RadioError::Bus)?;
        Ok(buf[1])
    }

    fn write_fifo(&mut self, data: &[u8]) -> Result<(), RadioError> {
        let mut buf = [0u8; MAX_PACKET_LEN + 1];
        buf[0] = regs::FIFO | 0x80;
        buf[1..=data.len()].copy_from_slice(data);
        self.spi
            .write(&buf[..=data.len()])
            .map_err(|_| RadioError::Bus)
    }

    fn read_fifo(&mut self, len: usize) -> Result<([u8; MAX_PACKET_LEN + 1], usize), RadioError> {
        let mut buf = [0u8; MAX_PACKET_LEN + 1];
        buf[0] = regs::FIFO & 0x7F;
        self.spi
            .transfer_in_place(&mut buf[..=len])
            .map_err(|_| RadioError::Bus)?;
        Ok((buf, len))
    }
}

impl<SPI, RST, D> Transceiver for Sx127x<SPI, RST, D>
where
    SPI: SpiDevice,
    RST: OutputPin,
    D: DelayNs,
{
    fn initialize(&mut self, pa: PaSelect) -> Result<(), RadioError> {
        self.ready = false;
        self.hard_reset()?;
        self.configure(pa)?;
        self.ready = true;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn transmit(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        if payload.len() > MAX_PACKET_LEN {
            return Err(RadioError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PACKET_LEN,
            });
        }
        if payload.is_empty() {
            return Err(RadioError::EmptyPayload);
        }
        if !self.ready {
            return Err(RadioError::NotReady);
        }

        let sent = self.send_frame(payload);
        let listening = self.start_receive();
        sent.and(listening)
    }

    fn poll_receive(&mut self, now_ms: u64) -> Result<bool, RadioError> {
        if !self.ready {
            return Ok(false);
        }

        let irq = self.read_reg(regs::IRQ_FLAGS)?;
        if irq & IRQ_RX_DONE == 0 {
            return Ok(false);
        }

        let len = usize::from(self.read_reg(regs::RX_NB_BYTES)?);
        let crc_ok = irq & IRQ_PAYLOAD_CRC_ERROR == 0;
        let captured = if !crc_ok || len == 0 || len > MAX_PACKET_LEN {
            crate::debug!("discarding packet: len={} crc_ok={}", len, crc_ok);
            false
        } else {
            let quality = self.read_quality()?;
            let start = self.read_reg(regs::FIFO_RX_CURRENT_ADDR)?;
            self.write_reg(regs::FIFO_ADDR_PTR, start)?;
            let (buf, len) = self.read_fifo(len)?;
            let packet = RadioPacket::new(&buf[1..=len], quality, now_ms)?;
            self.pending.store(packet);
            true
        };

        // Still in RX continuous; clearing the flags re-arms RxDone
        self.write_reg(regs::IRQ_FLAGS, 0xFF)?;
        Ok(captured)
    }

    fn pending(&self) -> &PendingSlot {
        &self.pending
    }

    fn pending_mut(&mut self) -> &mut PendingSlot {
        &mut self.pending
    }
}
