//! Exclusive access to the single scale UART.
//!
//! # Ownership
//!
//! ```text
//!               open(LiveReader)              close(LiveReader)
//!  Released ─────────────────────▶ OwnedByLiveReader ─────────────▶ Released
//!     │
//!     │ open(Diagnostics)                     close(Diagnostics)
//!     └────────────────────────────▶ OwnedByDiagnostics ───────────▶ Released
//! ```
//!
//! Opening under a different owner fails with [`ChannelError::Busy`].
//! Opening again under the same owner closes and reopens the peripheral with
//! the new parameters; there is no partial reconfiguration.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::ChannelError;
use crate::hal::{LinkParams, UartPort};
use crate::line::{LineAssembler, LinePush};
use crate::state::StateSink;

/// Default line terminator appended by [`SharedUartChannel::write_line`].
pub const DEFAULT_TERMINATOR: &str = "\n";

/// Logical consumer of the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
    LiveReader,
    Diagnostics,
}

impl Owner {
    pub fn as_str(self) -> &'static str {
        match self {
            Owner::LiveReader => "live reader",
            Owner::Diagnostics => "diagnostics",
        }
    }
}

/// Who currently holds the peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UartOwnership {
    Released,
    OwnedByLiveReader,
    OwnedByDiagnostics,
}

/// The UART plus its current owner.
pub struct SharedUartChannel<P: UartPort> {
    port: P,
    owner: Option<Owner>,
    params: Option<LinkParams>,
    terminator: &'static str,
}

impl<P: UartPort> SharedUartChannel<P> {
    pub fn new(port: P) -> Self {
        Self::with_terminator(port, DEFAULT_TERMINATOR)
    }

    pub fn with_terminator(port: P, terminator: &'static str) -> Self {
        Self {
            port,
            owner: None,
            params: None,
            terminator,
        }
    }

    pub fn ownership(&self) -> UartOwnership {
        match self.owner {
            None => UartOwnership::Released,
            Some(Owner::LiveReader) => UartOwnership::OwnedByLiveReader,
            Some(Owner::Diagnostics) => UartOwnership::OwnedByDiagnostics,
        }
    }

    #[inline]
    pub fn is_open_by(&self, owner: Owner) -> bool {
        self.owner == Some(owner)
    }

    /// Parameters of the open peripheral.
    pub fn params(&self) -> Option<LinkParams> {
        self.params
    }

    /// Take the channel for `owner` and (re)open the peripheral.
    ///
    /// If the driver refuses the parameters the channel ends up released.
    pub fn open(&mut self, owner: Owner, params: &LinkParams) -> Result<(), ChannelError> {
        match self.owner {
            Some(current) if current != owner => return Err(ChannelError::Busy(current)),
            Some(_) => self.port.close(),
            None => {}
        }

        self.owner = None;
        self.params = None;
        self.port.open(params)?;
        self.owner = Some(owner);
        self.params = Some(*params);
        Ok(())
    }

    /// Release the channel. No-op unless `owner` holds it.
    pub fn close(&mut self, owner: Owner) {
        if self.owner == Some(owner) {
            self.port.close();
            self.owner = None;
            self.params = None;
        }
    }

    fn check_owner(&self, owner: Owner) -> Result<(), ChannelError> {
        match self.owner {
            Some(current) if current == owner => Ok(()),
            Some(_) => Err(ChannelError::NotOwner),
            None => Err(ChannelError::NotOpen),
        }
    }

    /// Copy already received bytes into `buf`, never blocks.
    pub fn read_available(&mut self, owner: Owner, buf: &mut [u8]) -> Result<usize, ChannelError> {
        self.check_owner(owner)?;
        Ok(self.port.read(buf)?)
    }

    /// Transmit `text` followed by the line terminator.
    pub fn write_line(&mut self, owner: Owner, text: &str) -> Result<(), ChannelError> {
        self.check_owner(owner)?;
        let mut frame = String::with_capacity(text.len() + self.terminator.len());
        frame.push_str(text);
        frame.push_str(self.terminator);
        self.port.write(frame.as_bytes())?;
        Ok(())
    }
}

/// Lines completed by one [`read_lines`] call.
#[derive(Debug, Default)]
pub struct LineBatch {
    pub lines: Vec<String>,
    /// Partial lines thrown away for exceeding the assembler budget.
    pub overflows: u32,
}

/// Drain everything the channel has buffered for `owner` through `assembler`.
pub fn read_lines<P: UartPort, const N: usize>(
    channel: &mut SharedUartChannel<P>,
    owner: Owner,
    assembler: &mut LineAssembler<N>,
) -> Result<LineBatch, ChannelError> {
    let mut batch = LineBatch::default();
    let mut buf = [0u8; 64];

    loop {
        let n = channel.read_available(owner, &mut buf)?;
        if n == 0 {
            break;
        }
        for &byte in &buf[..n] {
            match assembler.push(byte) {
                Some(LinePush::Line(line)) => {
                    batch.lines.push(String::from_utf8_lossy(line).into_owned());
                }
                Some(LinePush::Overflow) => batch.overflows += 1,
                None => {}
            }
        }
    }

    Ok(batch)
}

/// Everything a component needs for one call: the channel, the
/// notification sink and the current time.
pub struct LinkContext<'a, P: UartPort> {
    pub channel: &'a mut SharedUartChannel<P>,
    pub sink: &'a mut dyn StateSink,
    pub now_us: u64,
}

impl<'a, P: UartPort> LinkContext<'a, P> {
    pub fn new(channel: &'a mut SharedUartChannel<P>, sink: &'a mut dyn StateSink, now_us: u64) -> Self {
        Self { channel, sink, now_us }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SimUart;

    #[test]
    fn test_open_by_other_owner_is_busy() {
        let sim = SimUart::new();
        let mut channel = SharedUartChannel::new(sim.clone());

        channel.open(Owner::LiveReader, &LinkParams::eight_n_one(9600)).unwrap();
        assert_eq!(
            channel.open(Owner::Diagnostics, &LinkParams::eight_n_one(115200)),
            Err(ChannelError::Busy(Owner::LiveReader))
        );
        assert_eq!(channel.ownership(), UartOwnership::OwnedByLiveReader);
        assert_eq!(sim.params(), Some(LinkParams::eight_n_one(9600)));
    }

    #[test]
    fn test_reopen_same_owner_cycles_peripheral() {
        let sim = SimUart::new();
        let mut channel = SharedUartChannel::new(sim.clone());

        channel.open(Owner::Diagnostics, &LinkParams::eight_n_one(1200)).unwrap();
        channel.open(Owner::Diagnostics, &LinkParams::eight_n_one(2400)).unwrap();

        assert_eq!(sim.open_count(), 2);
        assert_eq!(sim.close_count(), 1);
        assert_eq!(channel.params(), Some(LinkParams::eight_n_one(2400)));
    }

    #[test]
    fn test_close_by_non_owner_is_noop() {
        let sim = SimUart::new();
        let mut channel = SharedUartChannel::new(sim.clone());

        channel.open(Owner::LiveReader, &LinkParams::eight_n_one(9600)).unwrap();
        channel.close(Owner::Diagnostics);
        assert!(channel.is_open_by(Owner::LiveReader));

        channel.close(Owner::LiveReader);
        channel.close(Owner::LiveReader);
        assert_eq!(channel.ownership(), UartOwnership::Released);
        assert_eq!(sim.close_count(), 1);
    }

    #[test]
    fn test_failed_open_releases() {
        let sim = SimUart::new();
        let mut channel = SharedUartChannel::new(sim.clone());

        sim.fail_next_open();
        let err = channel.open(Owner::LiveReader, &LinkParams::eight_n_one(9600));
        assert!(matches!(err, Err(ChannelError::Io(_))));
        assert_eq!(channel.ownership(), UartOwnership::Released);
    }

    #[test]
    fn test_io_requires_ownership() {
        let sim = SimUart::new();
        let mut channel = SharedUartChannel::new(sim.clone());
        let mut buf = [0u8; 8];

        assert_eq!(
            channel.read_available(Owner::LiveReader, &mut buf),
            Err(ChannelError::NotOpen)
        );

        channel.open(Owner::LiveReader, &LinkParams::eight_n_one(9600)).unwrap();
        assert_eq!(
            channel.write_line(Owner::Diagnostics, "TEST:0"),
            Err(ChannelError::NotOwner)
        );
    }

    #[test]
    fn test_write_line_appends_terminator() {
        let sim = SimUart::loopback();
        let mut channel = SharedUartChannel::with_terminator(sim.clone(), "\r\n");
        channel.open(Owner::Diagnostics, &LinkParams::eight_n_one(115200)).unwrap();

        channel.write_line(Owner::Diagnostics, "TEST:0").unwrap();

        let mut buf = [0u8; 16];
        let n = channel.read_available(Owner::Diagnostics, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"TEST:0\r\n");
    }

    #[test]
    fn test_read_lines_collects_complete_lines() {
        let sim = SimUart::new();
        let mut channel = SharedUartChannel::new(sim.clone());
        let mut assembler = LineAssembler::<16>::new();
        channel.open(Owner::LiveReader, &LinkParams::eight_n_one(9600)).unwrap();

        sim.inject(b"W: 1.0\r\nW: 2.0\nW: 3");
        let batch = read_lines(&mut channel, Owner::LiveReader, &mut assembler).unwrap();

        assert_eq!(batch.lines, ["W: 1.0", "W: 2.0"]);
        assert_eq!(batch.overflows, 0);
        assert_eq!(assembler.as_bytes(), b"W: 3");
    }
}
