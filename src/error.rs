//! Error types for the link components

use core::fmt;

use crate::channel::Owner;
use crate::hal::UartError;

/// Shared channel error with code and message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// C01: Channel open under a different owner
    Busy(Owner),
    /// C02: Caller does not own the channel
    NotOwner,
    /// C03: Channel not open
    NotOpen,
    /// C04: Peripheral failure
    Io(UartError),
}

impl ChannelError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Busy(_) => "C01",
            Self::NotOwner => "C02",
            Self::NotOpen => "C03",
            Self::Io(_) => "C04",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::Busy(_) => "channel busy",
            Self::NotOwner => "not channel owner",
            Self::NotOpen => "channel not open",
            Self::Io(_) => "UART failure",
        }
    }
}

impl From<UartError> for ChannelError {
    fn from(e: UartError) -> Self {
        ChannelError::Io(e)
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy(owner) => write!(f, "{}: {} (held by {})", self.code(), self.message(), owner.as_str()),
            Self::Io(e) => write!(f, "{}: {}: {}", self.code(), self.message(), e),
            _ => write!(f, "{}: {}", self.code(), self.message()),
        }
    }
}

/// Error from the JSON state surface
#[derive(Debug)]
pub enum LinkError {
    /// L01: Body is not a valid update document
    Decode(serde_json::Error),
    /// L02: Snapshot could not be encoded
    Encode(serde_json::Error),
    /// L03: Unknown topic name
    UnknownTopic,
}

impl LinkError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "L01",
            Self::Encode(_) => "L02",
            Self::UnknownTopic => "L03",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::Decode(_) => "invalid update document",
            Self::Encode(_) => "state encoding failed",
            Self::UnknownTopic => "unknown topic",
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) | Self::Encode(e) => {
                write!(f, "{}: {}: {}", self.code(), self.message(), e)
            }
            Self::UnknownTopic => write!(f, "{}: {}", self.code(), self.message()),
        }
    }
}
