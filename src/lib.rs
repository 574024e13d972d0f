//! # Weighsoft UART Link
//!
//! Scale UART monitor with a shared serial channel and link diagnostics.
//!
//! ## Architecture
//!
//! One physical UART, two users. [`SharedUartChannel`] enforces that at most
//! one of them holds it:
//! - [`LiveSerialReader`] reads scale lines and publishes the extracted weight
//! - [`DiagnosticsEngine`] runs loopback, baud scan and signal quality tests
//! - [`ModeArbiter`] switches between live monitoring and diagnostics
//!
//! [`UartLink`] owns all of them and drives a single cooperative loop.
//! Components never block and never print; logging goes through the
//! lock-free [`LINK_LOG`] stream and is drained outside the loop.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod logging;
pub mod log_globals;
pub mod log_drain;
pub mod hal;
pub mod config;
pub mod error;
pub mod state;
pub mod channel;
pub mod line;
pub mod extract;
pub mod serial;
pub mod diagnostics;
pub mod mode;
pub mod link;

pub use log_globals::LINK_LOG;
pub use log_drain::LogDrain;
pub use config::{Mode, PersistedSettings, SerialLinkConfig};
pub use error::{ChannelError, LinkError};
pub use state::{StateSink, StateUpdateResult, Topic};
pub use channel::{LinkContext, Owner, SharedUartChannel, UartOwnership};
pub use line::LineAssembler;
pub use extract::extract_weight;
pub use serial::LiveSerialReader;
pub use diagnostics::DiagnosticsEngine;
pub use mode::ModeArbiter;
pub use link::UartLink;
