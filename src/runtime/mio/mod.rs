//! mio-based engine.
//!
//! Readiness-based I/O using mio (epoll on Linux, kqueue on macOS), adapted
//! to the completion contract so the same event loop runs on top of it.
//! Useful where io_uring is unavailable or disabled.

mod engine;

pub use engine::MioEngine;
