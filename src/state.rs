//! State-change plumbing shared by every stateful component.
//!
//! Components never talk to a transport. They return a
//! [`StateUpdateResult`] from updates and push a notification into a
//! [`StateSink`] tagged with the origin of the change, so the transport glue
//! can skip echoing a change back to whoever caused it.

use alloc::string::String;
use alloc::vec::Vec;

/// Outcome of applying an update document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateUpdateResult {
    Changed,
    Unchanged,
    Error,
}

/// Origin tags attached to state changes.
pub mod origin {
    /// Data produced by the live reader from scale lines.
    pub const SERIAL_HW: &str = "serial_hw";
    /// Progress produced by the diagnostics engine.
    pub const DIAG_HW: &str = "diag_hw";
    /// Tests stopped because of a mode change.
    pub const MODE_SWITCH: &str = "mode_switch";
    /// Values restored at startup.
    pub const INIT: &str = "init";
}

/// Observable state topics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    Serial,
    UartMode,
    Diagnostics,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Serial => "serial",
            Topic::UartMode => "uart_mode",
            Topic::Diagnostics => "diagnostics",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "serial" => Some(Topic::Serial),
            "uart_mode" => Some(Topic::UartMode),
            "diagnostics" => Some(Topic::Diagnostics),
            _ => None,
        }
    }
}

/// Receiver of state-changed notifications.
pub trait StateSink {
    fn state_changed(&mut self, topic: Topic, origin: &str);
}

/// Sink that discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StateSink for NullSink {
    fn state_changed(&mut self, _topic: Topic, _origin: &str) {}
}

/// Sink that remembers every notification, in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Vec<(Topic, String)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[(Topic, String)] {
        &self.events
    }

    /// Notifications for `topic` tagged `origin`.
    pub fn count(&self, topic: Topic, origin: &str) -> usize {
        self.events
            .iter()
            .filter(|(t, o)| *t == topic && o == origin)
            .count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl StateSink for RecordingSink {
    fn state_changed(&mut self, topic: Topic, origin: &str) {
        self.events.push((topic, String::from(origin)));
    }
}
