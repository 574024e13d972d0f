//! Module: diagnostics
//!
//! Purpose: link self-tests that borrow the scale UART from the live reader.
//!
//! - [`loopback`]: TX bridged to RX, echoed packets compared byte for byte
//! - [`baud_scan`]: listen at each candidate rate until a device talks
//! - [`signal`]: timestamped packets for loss, latency and jitter
//!
//! # Channel hand-over
//!
//! ```text
//!  enable test ──▶ reader.suspend(Diagnostics) ──▶ channel.open(Diagnostics)
//!
//!  all tests off ─▶ channel.close(Diagnostics) ──▶ reader.resume(Diagnostics)
//! ```
//!
//! Only one test may be enabled at a time; enabling a second one is
//! rejected. A test that finishes on its own is noticed by comparing the
//! previous tick's activity with the current one, so the channel goes back
//! exactly once.
//!
//! Progress notifications are throttled to one per
//! [`NOTIFY_THROTTLE_US`]; start, rate changes and final results are
//! published immediately.

pub mod baud_scan;
pub mod loopback;
pub mod signal;

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::channel::{read_lines, LinkContext, Owner};
use crate::hal::{LinkParams, UartPort};
use crate::line::LineAssembler;
use crate::logging::LogSource;
use crate::serial::{SerialControl, SuspendReason};
use crate::state::{origin, StateUpdateResult, Topic};
use crate::{link_info, link_warn};

pub use baud_scan::{BaudScanSnapshot, BaudScanStatus, BaudScanner, ScanStep, BAUD_CANDIDATES};
pub use loopback::{LoopbackSnapshot, LoopbackStatus, LoopbackTest};
pub use signal::{SignalQualityTest, SignalSnapshot, SignalStatus, DEFAULT_TOTAL_PACKETS};

/// Rate used by the loopback and signal tests.
pub const DIAGNOSTIC_BAUD_RATE: u32 = 115_200;

/// Line budget for test traffic.
pub const DIAG_LINE_BUDGET: usize = 256;

/// Minimum gap between progress notifications.
pub const NOTIFY_THROTTLE_US: u64 = 500_000;

/// Lets the mode arbiter cancel every test when returning to live
/// monitoring. Idempotent.
pub trait DiagnosticsControl<P: UartPort> {
    fn stop_all_tests(&mut self, serial: &mut dyn SerialControl<P>, cx: &mut LinkContext<'_, P>);
}

/// Which of the three tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestKind {
    Loopback,
    BaudScan,
    SignalQuality,
}

impl TestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TestKind::Loopback => "loopback",
            TestKind::BaudScan => "baud scan",
            TestKind::SignalQuality => "signal quality",
        }
    }
}

/// Diagnostics topic as served to clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub loopback: LoopbackSnapshot,
    pub baud_scan: BaudScanSnapshot,
    pub signal_quality: SignalSnapshot,
}

/// Start/stop request. Absent fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DiagnosticsUpdate {
    pub loopback_enabled: Option<bool>,
    pub baud_scan_enabled: Option<bool>,
    pub signal_test_enabled: Option<bool>,
    /// Only read when the signal test is being enabled.
    pub signal_total_packets: Option<u32>,
}

impl DiagnosticsUpdate {
    fn requested(&self, kind: TestKind) -> Option<bool> {
        match kind {
            TestKind::Loopback => self.loopback_enabled,
            TestKind::BaudScan => self.baud_scan_enabled,
            TestKind::SignalQuality => self.signal_test_enabled,
        }
    }
}

const ALL_TESTS: [TestKind; 3] = [TestKind::Loopback, TestKind::BaudScan, TestKind::SignalQuality];

/// The three test state machines plus the channel bookkeeping they share.
pub struct DiagnosticsEngine {
    loopback: LoopbackTest,
    baud_scan: BaudScanner,
    signal: SignalQualityTest,
    rx: LineAssembler<DIAG_LINE_BUDGET>,
    /// Channel granted for the running test.
    hardware: bool,
    /// Any test was enabled at the end of the previous tick.
    was_active: bool,
    last_notify_us: u64,
}

impl DiagnosticsEngine {
    pub fn new() -> Self {
        Self {
            loopback: LoopbackTest::default(),
            baud_scan: BaudScanner::default(),
            signal: SignalQualityTest::new(),
            rx: LineAssembler::new(),
            hardware: false,
            was_active: false,
            last_notify_us: 0,
        }
    }

    /// Reset every test to idle. Call once at startup.
    pub fn begin(&mut self, now_us: u64) {
        *self = Self::new();
        link_info!(LogSource::Diagnostics, now_us, "Ready, tests idle");
    }

    pub fn loopback(&self) -> &LoopbackTest {
        &self.loopback
    }

    pub fn baud_scan(&self) -> &BaudScanner {
        &self.baud_scan
    }

    pub fn signal(&self) -> &SignalQualityTest {
        &self.signal
    }

    pub fn is_enabled(&self, kind: TestKind) -> bool {
        match kind {
            TestKind::Loopback => self.loopback.enabled,
            TestKind::BaudScan => self.baud_scan.enabled,
            TestKind::SignalQuality => self.signal.enabled,
        }
    }

    pub fn any_enabled(&self) -> bool {
        ALL_TESTS.iter().any(|&k| self.is_enabled(k))
    }

    /// The running test has the channel (false means "no hardware access").
    pub fn has_hardware(&self) -> bool {
        self.hardware
    }

    pub fn read_state(&self, now_us: u64) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            loopback: self.loopback.snapshot(now_us),
            baud_scan: self.baud_scan.snapshot(),
            signal_quality: self.signal.snapshot(),
        }
    }

    /// Start or stop tests.
    ///
    /// Enabling a test while a different one stays enabled returns
    /// [`StateUpdateResult::Error`] and changes nothing.
    pub fn update<P: UartPort>(
        &mut self,
        update: &DiagnosticsUpdate,
        update_origin: &str,
        serial: &mut dyn SerialControl<P>,
        cx: &mut LinkContext<'_, P>,
    ) -> StateUpdateResult {
        let enabling = ALL_TESTS
            .iter()
            .copied()
            .find(|&k| update.requested(k) == Some(true) && !self.is_enabled(k));
        let enabled_after = ALL_TESTS
            .iter()
            .filter(|&&k| update.requested(k).unwrap_or(self.is_enabled(k)))
            .count();

        if enabling.is_some() && enabled_after > 1 {
            link_warn!(
                LogSource::Diagnostics,
                cx.now_us,
                "Rejected: only one test may run at a time"
            );
            return StateUpdateResult::Error;
        }

        let mut changed = false;

        for kind in ALL_TESTS {
            if update.requested(kind) == Some(false) && self.is_enabled(kind) {
                self.stop_test(kind, cx.now_us);
                changed = true;
            }
        }
        if changed && enabling.is_none() && !self.any_enabled() {
            self.release(serial, cx);
        }

        if let Some(kind) = enabling {
            self.start_test(kind, update.signal_total_packets, serial, cx);
            changed = true;
        }

        if changed {
            cx.sink.state_changed(Topic::Diagnostics, update_origin);
            StateUpdateResult::Changed
        } else {
            StateUpdateResult::Unchanged
        }
    }

    fn stop_test(&mut self, kind: TestKind, now_us: u64) {
        match kind {
            TestKind::Loopback => self.loopback.stop(),
            TestKind::BaudScan => self.baud_scan.stop(),
            TestKind::SignalQuality => self.signal.stop(),
        }
        link_info!(LogSource::Diagnostics, now_us, "{} test stopped", kind.as_str());
    }

    fn start_test<P: UartPort>(
        &mut self,
        kind: TestKind,
        total_packets: Option<u32>,
        serial: &mut dyn SerialControl<P>,
        cx: &mut LinkContext<'_, P>,
    ) {
        let rate = match kind {
            TestKind::Loopback => {
                self.loopback.start(cx.now_us);
                DIAGNOSTIC_BAUD_RATE
            }
            TestKind::BaudScan => self.baud_scan.start(cx.now_us),
            TestKind::SignalQuality => {
                let total = total_packets.unwrap_or(DEFAULT_TOTAL_PACKETS);
                self.signal.start(total);
                link_info!(LogSource::Diagnostics, cx.now_us, "Signal quality test: {} packets", total);
                DIAGNOSTIC_BAUD_RATE
            }
        };
        link_info!(LogSource::Diagnostics, cx.now_us, "{} test started", kind.as_str());

        serial.suspend(SuspendReason::Diagnostics, cx);
        self.hardware = self.open_at(rate, cx);
        if kind == TestKind::BaudScan {
            link_info!(LogSource::Diagnostics, cx.now_us, "Baud scan: testing {} baud", rate);
        }
        self.last_notify_us = cx.now_us;
    }

    fn open_at<P: UartPort>(&mut self, rate: u32, cx: &mut LinkContext<'_, P>) -> bool {
        self.rx.clear();
        match cx.channel.open(Owner::Diagnostics, &LinkParams::eight_n_one(rate)) {
            Ok(()) => {
                link_info!(LogSource::Diagnostics, cx.now_us, "UART started: {} baud", rate);
                true
            }
            Err(e) => {
                link_warn!(LogSource::Diagnostics, cx.now_us, "No hardware access: {}", e);
                false
            }
        }
    }

    fn close_channel<P: UartPort>(&mut self, cx: &mut LinkContext<'_, P>) {
        if cx.channel.is_open_by(Owner::Diagnostics) {
            cx.channel.close(Owner::Diagnostics);
            link_info!(LogSource::Diagnostics, cx.now_us, "UART stopped");
        }
        self.rx.clear();
        self.hardware = false;
    }

    /// Give the channel back to the live reader.
    fn release<P: UartPort>(&mut self, serial: &mut dyn SerialControl<P>, cx: &mut LinkContext<'_, P>) {
        self.close_channel(cx);
        self.was_active = false;
        serial.resume(SuspendReason::Diagnostics, cx);
    }

    fn notify_now<P: UartPort>(&mut self, cx: &mut LinkContext<'_, P>) {
        cx.sink.state_changed(Topic::Diagnostics, origin::DIAG_HW);
        self.last_notify_us = cx.now_us;
    }

    fn notify_progress<P: UartPort>(&mut self, cx: &mut LinkContext<'_, P>) {
        if cx.now_us.saturating_sub(self.last_notify_us) >= NOTIFY_THROTTLE_US {
            self.notify_now(cx);
        }
    }

    fn read_test_lines<P: UartPort>(&mut self, cx: &mut LinkContext<'_, P>) -> Vec<String> {
        if !self.hardware {
            return Vec::new();
        }
        match read_lines(cx.channel, Owner::Diagnostics, &mut self.rx) {
            Ok(batch) => {
                if batch.overflows > 0 {
                    link_warn!(
                        LogSource::Diagnostics,
                        cx.now_us,
                        "{} line(s) exceeded {} bytes, discarded",
                        batch.overflows,
                        DIAG_LINE_BUDGET
                    );
                }
                batch.lines
            }
            Err(e) => {
                link_warn!(LogSource::Diagnostics, cx.now_us, "Read failed: {}", e);
                Vec::new()
            }
        }
    }

    fn send<P: UartPort>(&mut self, packet: &str, cx: &mut LinkContext<'_, P>) {
        if let Err(e) = cx.channel.write_line(Owner::Diagnostics, packet) {
            link_warn!(LogSource::Diagnostics, cx.now_us, "Send failed: {}", e);
        }
    }

    /// One cooperative tick.
    pub fn poll<P: UartPort>(&mut self, serial: &mut dyn SerialControl<P>, cx: &mut LinkContext<'_, P>) {
        let active = self.any_enabled();

        if !active && self.was_active {
            link_info!(LogSource::Diagnostics, cx.now_us, "All tests stopped, releasing UART");
            self.release(serial, cx);
        }

        if self.loopback.enabled {
            self.run_loopback(cx);
        }
        if self.baud_scan.enabled {
            self.run_baud_scan(cx);
        }
        if self.signal.enabled {
            self.run_signal(cx);
        }

        self.was_active = active;
    }

    fn run_loopback<P: UartPort>(&mut self, cx: &mut LinkContext<'_, P>) {
        if self.hardware && self.loopback.send_due(cx.now_us) {
            let packet = String::from(self.loopback.next_packet(cx.now_us));
            self.send(&packet, cx);
        }

        for line in self.read_test_lines(cx) {
            self.loopback.on_line(&line);
        }

        self.notify_progress(cx);
    }

    fn run_baud_scan<P: UartPort>(&mut self, cx: &mut LinkContext<'_, P>) {
        let received = self.read_test_lines(cx).len();
        for _ in 0..received {
            if let ScanStep::Found(rate) = self.baud_scan.on_line() {
                link_info!(LogSource::Diagnostics, cx.now_us, "Baud scan: detected {} baud", rate);
                self.close_channel(cx);
                self.notify_now(cx);
                return;
            }
            link_info!(
                LogSource::Diagnostics,
                cx.now_us,
                "Baud scan: line {} at {} baud",
                self.baud_scan.packets_at_rate,
                self.baud_scan.current_rate().unwrap_or(0)
            );
        }

        let quiet_rate = self.baud_scan.current_rate().unwrap_or(0);
        match self.baud_scan.check_timeout(cx.now_us) {
            ScanStep::Listening | ScanStep::Found(_) => {}
            ScanStep::Advance(rate) => {
                link_info!(LogSource::Diagnostics, cx.now_us, "Baud scan: no data at {} baud", quiet_rate);
                self.hardware = self.open_at(rate, cx);
                link_info!(LogSource::Diagnostics, cx.now_us, "Baud scan: testing {} baud", rate);
                self.notify_now(cx);
            }
            ScanStep::NotFound => {
                link_info!(LogSource::Diagnostics, cx.now_us, "Baud scan: not found at any rate");
                self.close_channel(cx);
                self.notify_now(cx);
            }
        }
    }

    fn run_signal<P: UartPort>(&mut self, cx: &mut LinkContext<'_, P>) {
        if self.hardware && self.signal.send_due(cx.now_us) {
            let packet = self.signal.next_packet(cx.now_us);
            self.send(&packet, cx);
        }

        for line in self.read_test_lines(cx) {
            self.signal.on_line(&line, cx.now_us);
        }

        if self.signal.is_finished(cx.now_us) {
            self.signal.finish();
            link_info!(
                LogSource::Diagnostics,
                cx.now_us,
                "Signal quality test complete: {}% quality",
                self.signal.quality_percent
            );
            self.close_channel(cx);
            self.notify_now(cx);
        } else {
            self.notify_progress(cx);
        }
    }
}

impl Default for DiagnosticsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: UartPort> DiagnosticsControl<P> for DiagnosticsEngine {
    fn stop_all_tests(&mut self, serial: &mut dyn SerialControl<P>, cx: &mut LinkContext<'_, P>) {
        link_info!(LogSource::Diagnostics, cx.now_us, "Stopping all tests");
        for kind in ALL_TESTS {
            if self.is_enabled(kind) {
                self.stop_test(kind, cx.now_us);
            }
        }
        self.release(serial, cx);
        cx.sink.state_changed(Topic::Diagnostics, origin::MODE_SWITCH);
    }
}
