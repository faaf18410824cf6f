//! B.R.A.V.O. Test Rig
//!
//! Bench firmware for link checks: the button cycles Relay, Beacon and GPS
//! modes. Halts with the failure on screen if the radio will not start.

#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_stm32::i2c::I2c;
use embassy_stm32::spi::{self, Spi};
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{self, UartRx};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embassy_time::{Delay, Instant, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use {defmt_rtt as _, panic_probe as _};

use bravo_firmware::config::{GPS_BAUD_RATE, I2C_FREQUENCY_HZ, LOOP_IDLE_MS, SPI_FREQUENCY_HZ};
use bravo_firmware::drivers::display::OledDisplay;
use bravo_firmware::mode::ButtonLatch;
use bravo_firmware::radio::{ModemConfig, Sx127x};
use bravo_firmware::rig::{RigIo, TestRig};
use bravo_firmware::sensors::{GpsSource, NmeaReceiver};
use bravo_firmware::types::{GpsFix, SensorUnavailable};

bind_interrupts!(struct Irqs {
    USART1 => usart::InterruptHandler<peripherals::USART1>;
});

static BUTTON: ButtonLatch = ButtonLatch::new();
static GPS_BYTES: Pipe<CriticalSectionRawMutex, 256> = Pipe::new();

struct PipedGps(NmeaReceiver);

impl GpsSource for PipedGps {
    fn read_fix(&mut self) -> Result<GpsFix, SensorUnavailable> {
        let mut chunk = [0u8; 64];
        while let Ok(n) = GPS_BYTES.try_read(&mut chunk) {
            self.0.feed_all(&chunk[..n]);
        }
        self.0.read_fix()
    }
}

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("B.R.A.V.O. test rig v{}", env!("CARGO_PKG_VERSION"));
    let p = embassy_stm32::init(embassy_stm32::Config::default());

    let i2c = RefCell::new(I2c::new_blocking(
        p.I2C1,
        p.PB8,
        p.PB9,
        Hertz(I2C_FREQUENCY_HZ),
        Default::default(),
    ));
    let mut display = OledDisplay::new(embedded_hal_bus::i2c::RefCellDevice::new(&i2c));
    if display.init().is_err() {
        warn!("display init failed");
    }

    let mut spi_config = spi::Config::default();
    spi_config.frequency = Hertz(SPI_FREQUENCY_HZ);
    let spi_bus = Spi::new_blocking(p.SPI1, p.PB3, p.PB5, p.PB4, spi_config);
    let nss = Output::new(p.PA4, Level::High, Speed::VeryHigh);
    let reset = Output::new(p.PA1, Level::High, Speed::Low);
    let spi_dev = ExclusiveDevice::new(spi_bus, nss, Delay).unwrap();
    let mut radio = Sx127x::new(spi_dev, reset, Delay, ModemConfig::default());

    let mut rig = TestRig::new();
    if rig.start(&mut radio, &mut display).is_err() {
        loop {
            Timer::after_secs(1).await;
        }
    }

    let mut uart_config = usart::Config::default();
    uart_config.baudrate = GPS_BAUD_RATE;
    let gps_rx = UartRx::new(p.USART1, Irqs, p.PC5, p.DMA1_CH1, uart_config).unwrap();
    let mut gps = PipedGps(NmeaReceiver::new());

    let button = ExtiInput::new(p.PC13, p.EXTI13, Pull::Down);
    spawner.spawn(button_task(button)).unwrap();
    spawner.spawn(gps_uart_task(gps_rx)).unwrap();

    loop {
        let mut io = RigIo {
            radio: &mut radio,
            gps: &mut gps,
            display: &mut display,
            button: &BUTTON,
        };
        rig.run_once(now_ms(), &mut io);
        Timer::after_millis(LOOP_IDLE_MS).await;
    }
}

#[embassy_executor::task]
async fn button_task(mut button: ExtiInput<'static>) {
    loop {
        button.wait_for_rising_edge().await;
        #[allow(clippy::cast_possible_truncation)]
        let now = now_ms() as u32;
        BUTTON.on_edge(now);
    }
}

#[embassy_executor::task]
async fn gps_uart_task(mut rx: UartRx<'static, embassy_stm32::mode::Async>) {
    let mut buf = [0u8; 64];
    loop {
        match rx.read_until_idle(&mut buf).await {
            Ok(n) => {
                // rig loop drains the pipe every GPS refresh; drop on overflow
                let _ = GPS_BYTES.try_write(&buf[..n]);
            }
            Err(e) => warn!("GPS UART error: {}", e),
        }
    }
}
