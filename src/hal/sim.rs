//! Simulated UART for host builds and tests.
//!
//! `SimUart` is a cheap handle: clones share the same simulated peripheral,
//! so a test can keep one clone to inject bytes and inspect traffic while the
//! link owns another.
//!
//! Behaviour mirrors a real driver where it matters:
//! - opening flushes the receive FIFO
//! - bytes injected while closed are lost
//! - reads never block

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use super::uart::{LinkParams, UartError, UartPort};

/// What the far end does with transmitted bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EchoMode {
    /// Nothing comes back.
    Off,
    /// Every transmitted byte is received back unchanged (TX wired to RX).
    Exact,
    /// Like `Exact`, but every `n`-th transmitted line comes back with its
    /// first byte replaced by `'X'`.
    CorruptEvery(u32),
}

#[derive(Debug)]
struct SimState {
    params: Option<LinkParams>,
    rx: Vec<u8>,
    tx: Vec<u8>,
    echo: EchoMode,
    echo_line_count: u32,
    on_open: Vec<(u32, Vec<u8>)>,
    open_count: u32,
    close_count: u32,
    fail_next_open: bool,
}

/// Host-side stand-in for the scale UART.
#[derive(Clone, Debug)]
pub struct SimUart {
    state: Rc<RefCell<SimState>>,
}

impl SimUart {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                params: None,
                rx: Vec::new(),
                tx: Vec::new(),
                echo: EchoMode::Off,
                echo_line_count: 0,
                on_open: Vec::new(),
                open_count: 0,
                close_count: 0,
                fail_next_open: false,
            })),
        }
    }

    /// Loopback port: TX wired straight to RX.
    pub fn loopback() -> Self {
        let sim = Self::new();
        sim.set_echo(EchoMode::Exact);
        sim
    }

    pub fn set_echo(&self, echo: EchoMode) {
        let mut s = self.state.borrow_mut();
        s.echo = echo;
        s.echo_line_count = 0;
    }

    /// Bytes arriving on the wire. Lost if the port is closed.
    pub fn inject(&self, bytes: &[u8]) {
        let mut s = self.state.borrow_mut();
        if s.params.is_some() {
            s.rx.extend_from_slice(bytes);
        }
    }

    /// Make `bytes` available every time the port is opened at `baud_rate`.
    ///
    /// Models a device that only produces readable data at its own rate.
    pub fn script_on_open(&self, baud_rate: u32, bytes: &[u8]) {
        self.state.borrow_mut().on_open.push((baud_rate, bytes.to_vec()));
    }

    /// Make the next `open` fail with a driver error.
    pub fn fail_next_open(&self) {
        self.state.borrow_mut().fail_next_open = true;
    }

    pub fn is_open(&self) -> bool {
        self.state.borrow().params.is_some()
    }

    pub fn params(&self) -> Option<LinkParams> {
        self.state.borrow().params
    }

    pub fn open_count(&self) -> u32 {
        self.state.borrow().open_count
    }

    pub fn close_count(&self) -> u32 {
        self.state.borrow().close_count
    }

    /// Everything transmitted so far, split into lines, and clear the log.
    pub fn take_tx_lines(&self) -> Vec<String> {
        let mut s = self.state.borrow_mut();
        let text = String::from_utf8_lossy(&s.tx).into_owned();
        s.tx.clear();
        text.split(['\r', '\n'])
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }
}

impl Default for SimUart {
    fn default() -> Self {
        Self::new()
    }
}

impl UartPort for SimUart {
    fn open(&mut self, params: &LinkParams) -> Result<(), UartError> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        if s.fail_next_open {
            s.fail_next_open = false;
            return Err(UartError::OpenFailed(-1));
        }
        s.params = Some(*params);
        s.rx.clear();
        s.open_count += 1;

        let scripted: Vec<u8> = s
            .on_open
            .iter()
            .filter(|(baud, _)| *baud == params.baud_rate)
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect();
        s.rx.extend_from_slice(&scripted);
        Ok(())
    }

    fn close(&mut self) {
        let mut s = self.state.borrow_mut();
        if s.params.take().is_some() {
            s.close_count += 1;
        }
        s.rx.clear();
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, UartError> {
        let mut s = self.state.borrow_mut();
        if s.params.is_none() {
            return Err(UartError::NotOpen);
        }
        let n = buf.len().min(s.rx.len());
        buf[..n].copy_from_slice(&s.rx[..n]);
        s.rx.drain(..n);
        Ok(n)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, UartError> {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        if s.params.is_none() {
            return Err(UartError::NotOpen);
        }
        s.tx.extend_from_slice(bytes);

        let echo = s.echo;
        match echo {
            EchoMode::Off => {}
            EchoMode::Exact => s.rx.extend_from_slice(bytes),
            EchoMode::CorruptEvery(n) => {
                s.echo_line_count += 1;
                let mut echoed = bytes.to_vec();
                if n > 0 && s.echo_line_count % n == 0 {
                    if let Some(first) = echoed.first_mut() {
                        *first = b'X';
                    }
                }
                s.rx.extend_from_slice(&echoed);
            }
        }
        Ok(bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_lost_while_closed() {
        let mut sim = SimUart::new();
        sim.inject(b"lost\n");
        sim.open(&LinkParams::eight_n_one(9600)).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(sim.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_scripted_data_only_at_matching_baud() {
        let mut sim = SimUart::new();
        sim.script_on_open(9600, b"W: 1.0\n");

        let mut buf = [0u8; 16];
        sim.open(&LinkParams::eight_n_one(4800)).unwrap();
        assert_eq!(sim.read(&mut buf).unwrap(), 0);

        sim.close();
        sim.open(&LinkParams::eight_n_one(9600)).unwrap();
        assert_eq!(sim.read(&mut buf).unwrap(), 7);
    }

    #[test]
    fn test_corrupt_every_second_line() {
        let mut sim = SimUart::new();
        sim.set_echo(EchoMode::CorruptEvery(2));
        sim.open(&LinkParams::eight_n_one(115200)).unwrap();

        sim.write(b"AB\n").unwrap();
        sim.write(b"CD\n").unwrap();

        let mut buf = [0u8; 16];
        let n = sim.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"AB\nXD\n");
    }
}
