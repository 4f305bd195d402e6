//! Protocol selection for the event loop.
//!
//! Maps the configured protocol onto the per-protocol decision functions
//! so the event loop can stay a single state machine.

use crate::config::ProtocolType;
use crate::protocols::{echo, http, Action};

/// Protocol type for completion handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Echo,
    Http,
}

impl Protocol {
    /// Action after a read completed with `n` bytes (`0` = peer shutdown).
    pub fn on_read(self, n: usize) -> Action {
        match self {
            Protocol::Echo => echo::on_read(n),
            Protocol::Http => http::on_read(n),
        }
    }

    /// Action after the pending write has been fully sent.
    pub fn on_write_complete(self) -> Action {
        match self {
            Protocol::Echo => echo::on_write_complete(),
            Protocol::Http => http::on_write_complete(),
        }
    }
}

impl From<ProtocolType> for Protocol {
    fn from(protocol: ProtocolType) -> Self {
        match protocol {
            ProtocolType::Echo => Protocol::Echo,
            ProtocolType::Http => Protocol::Http,
        }
    }
}
