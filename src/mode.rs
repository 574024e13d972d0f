//! UART mode arbitration.
//!
//! ```text
//!                  request "diagnostics"
//!  LiveMonitoring ───────────────────────▶ Diagnostics
//!        ▲                                     │
//!        └─────────────────────────────────────┘
//!                  request "live"
//!
//!  → Diagnostics: reader.suspend(Mode)           (tests stay opt-in)
//!  → Live:        engine.stop_all_tests(), reader.resume(Mode)
//! ```
//!
//! The collaborators are handed in per call. Until they exist (before
//! startup finished) a requested mode is stored and applied later.

use alloc::string::String;
use serde::{Deserialize, Serialize};

use crate::channel::LinkContext;
use crate::config::Mode;
use crate::diagnostics::DiagnosticsControl;
use crate::hal::UartPort;
use crate::logging::LogSource;
use crate::serial::{SerialControl, SuspendReason};
use crate::state::{origin, StateUpdateResult, Topic};
use crate::{link_info, link_warn};

/// The two services the arbiter steers.
pub struct Collaborators<'a, P: UartPort> {
    pub serial: &'a mut dyn SerialControl<P>,
    pub diagnostics: &'a mut dyn DiagnosticsControl<P>,
}

/// Mode topic as served to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ModeSnapshot {
    pub mode: Mode,
}

/// Mode change request, `{"mode": "live" | "diagnostics"}`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ModeUpdate {
    pub mode: String,
}

pub struct ModeArbiter {
    mode: Mode,
    /// Mode stored but not yet applied to the collaborators.
    pending: bool,
}

impl ModeArbiter {
    /// Arbiter holding the persisted `mode`, applied on the first
    /// [`apply`](Self::apply) with collaborators.
    pub fn new(mode: Mode) -> Self {
        Self { mode, pending: true }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// A mode is waiting for the collaborators.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn read_state(&self) -> ModeSnapshot {
        ModeSnapshot { mode: self.mode }
    }

    /// Handle a mode change request.
    ///
    /// Unknown names are rejected. Requests tagged [`origin::INIT`] are
    /// stored without being applied.
    pub fn update<P: UartPort>(
        &mut self,
        update: &ModeUpdate,
        update_origin: &str,
        collaborators: Option<Collaborators<'_, P>>,
        cx: &mut LinkContext<'_, P>,
    ) -> StateUpdateResult {
        let Some(mode) = Mode::from_name(&update.mode) else {
            link_warn!(LogSource::Mode, cx.now_us, "Unknown mode '{}'", update.mode);
            return StateUpdateResult::Error;
        };
        if mode == self.mode {
            return StateUpdateResult::Unchanged;
        }

        self.mode = mode;
        self.pending = true;
        cx.sink.state_changed(Topic::UartMode, update_origin);

        if update_origin != origin::INIT {
            link_info!(LogSource::Mode, cx.now_us, "Mode change requested: {}", mode.as_str());
            self.apply(collaborators, cx);
        }
        StateUpdateResult::Changed
    }

    /// Push the current mode to the collaborators, or defer if they are
    /// not registered yet.
    pub fn apply<P: UartPort>(&mut self, collaborators: Option<Collaborators<'_, P>>, cx: &mut LinkContext<'_, P>) {
        let Some(c) = collaborators else {
            link_warn!(
                LogSource::Mode,
                cx.now_us,
                "Services not registered yet, '{}' deferred",
                self.mode.as_str()
            );
            self.pending = true;
            return;
        };

        self.pending = false;
        match self.mode {
            Mode::LiveMonitoring => {
                link_info!(LogSource::Mode, cx.now_us, "Switching to LIVE MONITORING");
                c.diagnostics.stop_all_tests(&mut *c.serial, cx);
                c.serial.resume(SuspendReason::Mode, cx);
            }
            Mode::Diagnostics => {
                link_info!(LogSource::Mode, cx.now_us, "Switching to DIAGNOSTICS");
                c.serial.suspend(SuspendReason::Mode, cx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SharedUartChannel;
    use crate::hal::SimUart;
    use crate::state::RecordingSink;
    use alloc::vec::Vec;

    #[derive(Default)]
    struct Calls(Vec<&'static str>);

    impl<P: UartPort> SerialControl<P> for Calls {
        fn suspend(&mut self, reason: SuspendReason, _cx: &mut LinkContext<'_, P>) {
            assert_eq!(reason, SuspendReason::Mode);
            self.0.push("suspend");
        }

        fn resume(&mut self, reason: SuspendReason, _cx: &mut LinkContext<'_, P>) {
            assert_eq!(reason, SuspendReason::Mode);
            self.0.push("resume");
        }
    }

    #[derive(Default)]
    struct Stops(u32);

    impl<P: UartPort> DiagnosticsControl<P> for Stops {
        fn stop_all_tests(&mut self, _serial: &mut dyn SerialControl<P>, _cx: &mut LinkContext<'_, P>) {
            self.0 += 1;
        }
    }

    fn request(mode: &str) -> ModeUpdate {
        ModeUpdate { mode: mode.into() }
    }

    #[test]
    fn test_switch_to_diagnostics_suspends_only() {
        let mut channel = SharedUartChannel::new(SimUart::new());
        let mut sink = RecordingSink::new();
        let mut cx = LinkContext::new(&mut channel, &mut sink, 0);
        let (mut serial, mut diag) = (Calls::default(), Stops::default());
        let mut arbiter = ModeArbiter::new(Mode::LiveMonitoring);

        let result = arbiter.update(
            &request("diagnostics"),
            "http",
            Some(Collaborators { serial: &mut serial, diagnostics: &mut diag }),
            &mut cx,
        );

        assert_eq!(result, StateUpdateResult::Changed);
        assert_eq!(serial.0, ["suspend"]);
        assert_eq!(diag.0, 0);
        assert!(!arbiter.is_pending());
    }

    #[test]
    fn test_switch_to_live_stops_tests_then_resumes() {
        let mut channel = SharedUartChannel::new(SimUart::new());
        let mut sink = RecordingSink::new();
        let mut cx = LinkContext::new(&mut channel, &mut sink, 0);
        let (mut serial, mut diag) = (Calls::default(), Stops::default());
        let mut arbiter = ModeArbiter::new(Mode::Diagnostics);

        arbiter.update(
            &request("live"),
            "ws",
            Some(Collaborators { serial: &mut serial, diagnostics: &mut diag }),
            &mut cx,
        );

        assert_eq!(diag.0, 1);
        assert_eq!(serial.0, ["resume"]);
        assert_eq!(sink.count(Topic::UartMode, "ws"), 1);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let mut channel = SharedUartChannel::new(SimUart::new());
        let mut sink = RecordingSink::new();
        let mut cx = LinkContext::new(&mut channel, &mut sink, 0);
        let mut arbiter = ModeArbiter::new(Mode::LiveMonitoring);

        let result = arbiter.update(&request("maintenance"), "http", None, &mut cx);
        assert_eq!(result, StateUpdateResult::Error);
        assert_eq!(arbiter.mode(), Mode::LiveMonitoring);
    }

    #[test]
    fn test_same_mode_unchanged() {
        let mut channel = SharedUartChannel::new(SimUart::new());
        let mut sink = RecordingSink::new();
        let mut cx = LinkContext::new(&mut channel, &mut sink, 0);
        let mut arbiter = ModeArbiter::new(Mode::LiveMonitoring);

        let result = arbiter.update(&request("live"), "http", None, &mut cx);
        assert_eq!(result, StateUpdateResult::Unchanged);
    }

    #[test]
    fn test_deferred_until_registered() {
        let mut channel = SharedUartChannel::new(SimUart::new());
        let mut sink = RecordingSink::new();
        let mut cx = LinkContext::new(&mut channel, &mut sink, 0);
        let (mut serial, mut diag) = (Calls::default(), Stops::default());
        let mut arbiter = ModeArbiter::new(Mode::LiveMonitoring);

        let result = arbiter.update(&request("diagnostics"), "http", None, &mut cx);
        assert_eq!(result, StateUpdateResult::Changed);
        assert_eq!(arbiter.mode(), Mode::Diagnostics);
        assert!(arbiter.is_pending());

        arbiter.apply(Some(Collaborators { serial: &mut serial, diagnostics: &mut diag }), &mut cx);
        assert_eq!(serial.0, ["suspend"]);
        assert!(!arbiter.is_pending());
    }

    #[test]
    fn test_init_origin_stored_not_applied() {
        let mut channel = SharedUartChannel::new(SimUart::new());
        let mut sink = RecordingSink::new();
        let mut cx = LinkContext::new(&mut channel, &mut sink, 0);
        let (mut serial, mut diag) = (Calls::default(), Stops::default());
        let mut arbiter = ModeArbiter::new(Mode::LiveMonitoring);

        arbiter.update(
            &request("diagnostics"),
            origin::INIT,
            Some(Collaborators { serial: &mut serial, diagnostics: &mut diag }),
            &mut cx,
        );
        assert!(serial.0.is_empty());
        assert_eq!(arbiter.mode(), Mode::Diagnostics);
        assert!(arbiter.is_pending());
    }
}
