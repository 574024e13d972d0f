//! Hardware Abstraction Layer for the UART link.
//!
//! Thin wrappers around the peripheral. Business logic stays in core
//! modules, HAL is just I/O.

pub mod uart;
pub mod sim;

#[cfg(target_os = "espidf")]
pub mod esp_uart;

pub use uart::{LinkParams, Parity, UartError, UartPort};
pub use sim::{EchoMode, SimUart};

#[cfg(target_os = "espidf")]
pub use esp_uart::EspUart;
