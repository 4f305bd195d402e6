//! Custom runtime for completion-driven networking.
//!
//! One thread, one engine, one event loop. The loop is written against the
//! [`Engine`] contract and runs on either backend:
//! - Linux: io_uring for native completion-based I/O
//! - Linux/macOS: mio readiness (epoll/kqueue) adapted to completions
//!
//! Shared pieces:
//! - `BufferPool`: Per-loop read buffers
//! - `Connection`: Per-connection context and its registry
//! - `Token`: Operation identity for completion correlation

mod buffer;
mod connection;
pub mod engine;
mod event_loop;
mod listener;
mod protocol;
mod token;

pub(crate) use buffer::BufferPool;
pub(crate) use connection::{Connection, ConnectionRegistry, PendingOp};
pub(crate) use protocol::Protocol;
pub(crate) use token::Token;

pub use engine::{Completion, Engine, Request};
pub use event_loop::EventLoop;
pub use listener::{Listener, SetupError};

#[cfg(target_os = "linux")]
pub mod uring;

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub mod mio;

use crate::config::{Config, RuntimeType};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use tracing::info;
#[cfg(target_os = "linux")]
use tracing::warn;

/// Serve connections from `listener` with the configured engine.
///
/// Runs until the engine fails; per-connection errors never end it.
pub fn run(config: &Config, listener: &Listener) -> io::Result<()> {
    let listener_fd = listener.as_raw_fd();

    match config.runtime {
        RuntimeType::IoUring => run_uring(config, listener_fd),
        RuntimeType::Mio => run_mio(config, listener_fd),
    }
}

/// Run with io_uring, falling back to mio if the kernel refuses a ring.
#[cfg(target_os = "linux")]
fn run_uring(config: &Config, listener_fd: RawFd) -> io::Result<()> {
    match uring::UringEngine::new(config.ring_size) {
        Ok(engine) => {
            info!(ring_size = config.ring_size, "Using io_uring runtime");
            EventLoop::new(engine, listener_fd, config).run()
        }
        Err(e) => {
            warn!(error = %e, "io_uring unavailable, falling back to mio");
            run_mio(config, listener_fd)
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn run_uring(config: &Config, listener_fd: RawFd) -> io::Result<()> {
    info!("io_uring is Linux only");
    run_mio(config, listener_fd)
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn run_mio(config: &Config, listener_fd: RawFd) -> io::Result<()> {
    let engine = self::mio::MioEngine::new(config.ring_size as usize)?;
    info!("Using mio runtime (epoll/kqueue)");
    EventLoop::new(engine, listener_fd, config).run()
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn run_mio(_config: &Config, _listener_fd: RawFd) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Unsupported platform: only Linux and macOS are supported",
    ))
}
