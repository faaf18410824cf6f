//! B.R.A.V.O. Node Main Application
//!
//! Entry point for collar and relay firmware. Brings up the board, spawns
//! the interrupt-side tasks, then runs the link scheduler forever.

#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_stm32::adc::Adc;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Blocking;
use embassy_stm32::spi::{self, Spi};
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{self, UartRx};
use embassy_stm32::{bind_interrupts, peripherals, usb};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::pipe::Pipe;
use embassy_time::{Delay, Instant, Timer};
use embassy_usb::class::cdc_acm::CdcAcmClass;
use embassy_usb::UsbDevice;
use embedded_hal_bus::i2c::RefCellDevice;
use embedded_hal_bus::spi::ExclusiveDevice;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use bravo_firmware::config::{
    DEVICE_ID, DEVICE_ROLE, GPS_BAUD_RATE, I2C_FREQUENCY_HZ, LOOP_IDLE_MS, MPU6050_I2C_ADDR,
    SPI_FREQUENCY_HZ,
};
use bravo_firmware::drivers::display::OledDisplay;
use bravo_firmware::link::{LinkScheduler, NodeIo};
use bravo_firmware::mode::ButtonLatch;
use bravo_firmware::protocol::ConsoleConfig;
use bravo_firmware::radio::{initialize_with_fallback, ModemConfig, Sx127x};
use bravo_firmware::sensors::{AdcBattery, GpsSource, Mpu6050, NmeaReceiver};
use bravo_firmware::types::{GpsFix, SensorUnavailable};
use bravo_firmware::usb::{cdc, run_console, ConsoleHandle, SharedConsole};

bind_interrupts!(struct Irqs {
    USART1 => usart::InterruptHandler<peripherals::USART1>;
    USB_LP => usb::InterruptHandler<peripherals::USB>;
});

type UsbDriver = usb::Driver<'static, peripherals::USB>;

/// Raw NMEA bytes from the UART task to the main loop
type GpsPipe = Pipe<CriticalSectionRawMutex, 256>;

static BUTTON: ButtonLatch = ButtonLatch::new();
static GPS_BYTES: GpsPipe = Pipe::new();
static CONSOLE: StaticCell<SharedConsole> = StaticCell::new();
static I2C_BUS: StaticCell<RefCell<I2c<'static, Blocking>>> = StaticCell::new();

/// GPS source fed from the UART pipe
struct PipedGps {
    nmea: NmeaReceiver,
}

impl GpsSource for PipedGps {
    fn read_fix(&mut self) -> Result<GpsFix, SensorUnavailable> {
        let mut chunk = [0u8; 64];
        while let Ok(n) = GPS_BYTES.try_read(&mut chunk) {
            self.nmea.feed_all(&chunk[..n]);
        }
        self.nmea.read_fix()
    }
}

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!(
        "B.R.A.V.O. node v{} ({}, {})",
        env!("CARGO_PKG_VERSION"),
        DEVICE_ID,
        DEVICE_ROLE.as_str()
    );

    let mut config = embassy_stm32::Config::default();
    {
        use embassy_stm32::rcc::{mux, Hsi48Config};
        config.rcc.hsi48 = Some(Hsi48Config {
            sync_from_usb: true,
        });
        config.rcc.mux.clk48sel = mux::Clk48sel::HSI48;
    }
    let p = embassy_stm32::init(config);

    // SX1276 on SPI1: PB3 = SCK, PB5 = MOSI, PB4 = MISO, PA4 = NSS, PA1 = RESET
    let mut spi_config = spi::Config::default();
    spi_config.frequency = Hertz(SPI_FREQUENCY_HZ);
    let spi_bus = Spi::new_blocking(p.SPI1, p.PB3, p.PB5, p.PB4, spi_config);
    let nss = Output::new(p.PA4, Level::High, Speed::VeryHigh);
    let reset = Output::new(p.PA1, Level::High, Speed::Low);
    let spi_dev = ExclusiveDevice::new(spi_bus, nss, Delay).unwrap();
    let mut radio = Sx127x::new(spi_dev, reset, Delay, ModemConfig::default());
    if initialize_with_fallback(&mut radio).is_err() {
        warn!("continuing without radio");
    }

    // I2C1 shared by the OLED and the MPU6050: PB8 = SCL, PB9 = SDA
    let i2c = I2c::new_blocking(
        p.I2C1,
        p.PB8,
        p.PB9,
        Hertz(I2C_FREQUENCY_HZ),
        Default::default(),
    );
    let i2c = I2C_BUS.init(RefCell::new(i2c));

    let mut display = OledDisplay::new(RefCellDevice::new(i2c));
    if let Err(e) = display.init() {
        warn!("display init failed: {}", e);
    }
    let mut imu = Mpu6050::new(RefCellDevice::new(i2c), MPU6050_I2C_ADDR);
    if let Err(e) = imu.init() {
        warn!("IMU init failed: {}", e);
    }

    // GPS on USART1 RX (PC5)
    let mut uart_config = usart::Config::default();
    uart_config.baudrate = GPS_BAUD_RATE;
    let gps_rx = UartRx::new(p.USART1, Irqs, p.PC5, p.DMA1_CH1, uart_config).unwrap();
    let mut gps = PipedGps {
        nmea: NmeaReceiver::new(),
    };

    let mut adc = Adc::new(p.ADC1);
    let mut battery_pin = p.PA0;
    let mut battery = AdcBattery::new(move || Some(adc.blocking_read(&mut battery_pin)));

    // Mode button on PC13, rising edge
    let button = ExtiInput::new(p.PC13, p.EXTI13, Pull::Down);

    // Configuration console over USB CDC
    let driver = usb::Driver::new(p.USB, Irqs, p.PA12, p.PA11);
    let (usb_device, class) = cdc::build(driver);
    let console: &'static SharedConsole =
        CONSOLE.init(Mutex::new(RefCell::new(ConsoleConfig::new(Default::default()))));

    spawner.spawn(button_task(button)).unwrap();
    spawner.spawn(gps_uart_task(gps_rx)).unwrap();
    spawner.spawn(usb_device_task(usb_device)).unwrap();
    spawner.spawn(console_task(class, console)).unwrap();

    let mut config_channel = ConsoleHandle::new(console);
    let mut scheduler = LinkScheduler::new(DEVICE_ROLE, DEVICE_ID);
    info!("entering main loop");

    loop {
        let mut io = NodeIo {
            radio: &mut radio,
            gps: &mut gps,
            imu: &mut imu,
            battery: &mut battery,
            display: &mut display,
            config: &mut config_channel,
            button: &BUTTON,
        };
        scheduler.run_once(now_ms(), &mut io);
        Timer::after_millis(LOOP_IDLE_MS).await;
    }
}

/// Button edges into the latch, nothing else
#[embassy_executor::task]
async fn button_task(mut button: ExtiInput<'static>) {
    loop {
        button.wait_for_rising_edge().await;
        #[allow(clippy::cast_possible_truncation)]
        let now = now_ms() as u32;
        BUTTON.on_edge(now);
    }
}

/// UART bytes into the GPS pipe
#[embassy_executor::task]
async fn gps_uart_task(mut rx: UartRx<'static, embassy_stm32::mode::Async>) {
    let mut buf = [0u8; 64];
    loop {
        match rx.read_until_idle(&mut buf).await {
            Ok(n) => {
                // main loop drains the pipe every GPS tick; drop on overflow
                let _ = GPS_BYTES.try_write(&buf[..n]);
            }
            Err(e) => warn!("GPS UART error: {}", e),
        }
    }
}

#[embassy_executor::task]
async fn usb_device_task(mut device: UsbDevice<'static, UsbDriver>) {
    device.run().await;
}

#[embassy_executor::task]
async fn console_task(mut class: CdcAcmClass<'static, UsbDriver>, console: &'static SharedConsole) {
    run_console(&mut class, console).await;
}
