//! Echo protocol.
//!
//! Bytes received on a connection are written back unmodified, and the
//! connection keeps reading until the peer closes it. There is no framing:
//! each read is echoed as a unit.

use super::Action;

/// Decide what follows a successful read of `n` bytes.
///
/// A zero-length read is the peer's orderly shutdown.
pub fn on_read(n: usize) -> Action {
    if n == 0 {
        Action::Close
    } else {
        Action::Echo(n)
    }
}

/// Decide what follows a fully written echo.
pub fn on_write_complete() -> Action {
    Action::Read
}
