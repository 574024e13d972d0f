//! Global log stream instance.
//!
//! Every component runs on the one cooperative control loop, so a single
//! stream is enough: many producers (components), one consumer (console drain).

use crate::logging::LogStream;

/// Log stream fed by `link_info!` and friends.
pub static LINK_LOG: LogStream = LogStream::new();
