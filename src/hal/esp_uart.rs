//! ESP-IDF backed scale UART (UART2, RX on GPIO16, TX on GPIO17).
//!
//! ```text
//! ESP32 GPIO17 (TX) ──────▶ Scale RX
//! ESP32 GPIO16 (RX) ◀────── Scale TX
//! ```
//!
//! For the loopback test, bridge GPIO16 and GPIO17.

use esp_idf_svc::hal::delay::NON_BLOCK;
use esp_idf_svc::hal::gpio::{AnyIOPin, Gpio16, Gpio17};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::uart::config::{Config, DataBits, StopBits};
use esp_idf_svc::hal::uart::{UartDriver, UART2};
use esp_idf_svc::hal::units::Hertz;

use super::uart::{LinkParams, Parity, UartError, UartPort};

/// UART2 plus its pins. The driver only exists while the port is open.
pub struct EspUart {
    uart: UART2,
    tx: Gpio17,
    rx: Gpio16,
    driver: Option<UartDriver<'static>>,
}

impl EspUart {
    pub fn new(uart: UART2, tx: Gpio17, rx: Gpio16) -> Self {
        Self {
            uart,
            tx,
            rx,
            driver: None,
        }
    }
}

fn driver_config(params: &LinkParams) -> Config {
    let data_bits = match params.data_bits {
        5 => DataBits::DataBits5,
        6 => DataBits::DataBits6,
        7 => DataBits::DataBits7,
        _ => DataBits::DataBits8,
    };
    let stop_bits = if params.stop_bits == 2 {
        StopBits::STOP2
    } else {
        StopBits::STOP1
    };

    let config = Config::default()
        .baudrate(Hertz(params.baud_rate))
        .data_bits(data_bits)
        .stop_bits(stop_bits);

    match params.parity {
        Parity::None => config.parity_none(),
        Parity::Even => config.parity_even(),
        Parity::Odd => config.parity_odd(),
    }
}

impl UartPort for EspUart {
    fn open(&mut self, params: &LinkParams) -> Result<(), UartError> {
        self.close();

        // SAFETY: the cloned peripherals only live inside `self.driver`,
        // which is dropped before any further clone is taken.
        let (uart, tx, rx) = unsafe {
            (
                self.uart.clone_unchecked(),
                self.tx.clone_unchecked(),
                self.rx.clone_unchecked(),
            )
        };

        let driver = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<AnyIOPin>::None, // CTS
            Option::<AnyIOPin>::None, // RTS
            &driver_config(params),
        )
        .map_err(|e| UartError::OpenFailed(e.code()))?;

        self.driver = Some(driver);
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the driver uninstalls it and frees the pins.
        self.driver = None;
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, UartError> {
        let driver = self.driver.as_mut().ok_or(UartError::NotOpen)?;
        driver.read(buf, NON_BLOCK).map_err(|e| UartError::Io(e.code()))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, UartError> {
        let driver = self.driver.as_mut().ok_or(UartError::NotOpen)?;
        driver.write(bytes).map_err(|e| UartError::Io(e.code()))
    }
}
