//! UART port abstraction.
//!
//! The link logic only ever talks to this trait. On the device it is backed
//! by the ESP-IDF UART driver, on the host by [`SimUart`](super::sim::SimUart).

use core::fmt;

/// Parity setting of the serial frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Parity {
    #[default]
    None = 0,
    Even = 1,
    Odd = 2,
}

impl Parity {
    /// Decode the wire value (0=None, 1=Even, 2=Odd).
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Parity::None),
            1 => Some(Parity::Even),
            2 => Some(Parity::Odd),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Letter used in the `8N1` frame notation.
    pub fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        }
    }
}

/// Physical line parameters applied when the port is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkParams {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

impl LinkParams {
    /// 8N1 at the given rate.
    pub const fn eight_n_one(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
        }
    }
}

impl fmt::Display for LinkParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits
        )
    }
}

/// Hardware-level UART failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartError {
    /// Driver install / pin setup failed.
    OpenFailed(i32),
    /// Read or write on an open driver failed.
    Io(i32),
    /// Operation on a port that is not open.
    NotOpen,
}

impl fmt::Display for UartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UartError::OpenFailed(code) => write!(f, "UART open failed ({})", code),
            UartError::Io(code) => write!(f, "UART I/O error ({})", code),
            UartError::NotOpen => f.write_str("UART not open"),
        }
    }
}

/// One physical UART peripheral.
///
/// Implementations must not block: `read` returns what is already buffered.
pub trait UartPort {
    /// Install the driver with the given parameters. The port is closed
    /// when this is called.
    fn open(&mut self, params: &LinkParams) -> Result<(), UartError>;

    /// Uninstall the driver. Safe to call when closed.
    fn close(&mut self);

    /// Copy up to `buf.len()` already received bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, UartError>;

    /// Queue bytes for transmission.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, UartError>;
}
