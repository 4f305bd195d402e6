//! ringserve: a completion-queue driven TCP server core.
//!
//! A single thread accepts connections and serves them without ever
//! blocking on a socket: every accept, read and write is a request to a
//! completion engine, and the event loop only reacts to completions.
//!
//! Two behaviours share the same state machine:
//! - Echo: bytes are written back as they arrive
//! - HTTP: the first request is answered with a fixed response, then closed

pub mod config;
pub mod protocols;
pub mod runtime;
