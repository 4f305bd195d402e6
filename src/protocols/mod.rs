//! Connection behaviours.
//!
//! The event loop runs the same accept → read → write cycle for every
//! connection; a protocol only decides what happens after a read and after
//! a write completes.
//!
//! - `echo`: write back whatever was read, then read again
//! - `http`: answer any request with a fixed response, then close

pub mod echo;
pub mod http;

/// What the event loop does next with a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Issue a new read.
    Read,
    /// Write back the `n` bytes just read from the read buffer.
    Echo(usize),
    /// Write the connection's response.
    Respond,
    /// Close the descriptor and release the connection.
    Close,
}
