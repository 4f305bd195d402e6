//! Completion engine contract.
//!
//! The event loop never performs socket I/O itself. It pushes requests to
//! an engine, flushes them with [`Engine::submit`], and consumes the
//! completions the engine hands back from [`Engine::wait`]. Each request
//! carries an opaque `user_data` value that comes back unchanged in its
//! completion.

use std::io;
use std::os::unix::io::RawFd;

/// An asynchronous operation request.
///
/// Buffers are raw pointers: the engine reads or writes them after `push`
/// returns, so the caller must keep them alive and untouched until the
/// matching completion has been consumed.
#[derive(Debug, Clone, Copy)]
pub enum Request {
    /// Accept one connection on a listening socket, or keep accepting until
    /// the engine reports otherwise when `multishot` is set.
    Accept { fd: RawFd, multishot: bool },
    /// Receive up to `len` bytes into `buf`.
    Recv { fd: RawFd, buf: *mut u8, len: usize },
    /// Send `len` bytes from `buf`.
    Send { fd: RawFd, buf: *const u8, len: usize },
}

impl Request {
    /// Descriptor the request operates on.
    pub fn fd(&self) -> RawFd {
        match *self {
            Request::Accept { fd, .. } | Request::Recv { fd, .. } | Request::Send { fd, .. } => fd,
        }
    }
}

/// Result of a finished operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// The `user_data` the request was pushed with.
    pub user_data: u64,
    /// Negative errno on failure; otherwise the new descriptor (accept) or
    /// the byte count (recv/send).
    pub result: i32,
    /// A multishot accept is still armed and will complete again.
    pub more: bool,
}

impl Completion {
    /// The error carried by a failed completion.
    pub fn error(&self) -> Option<io::Error> {
        (self.result < 0).then(|| io::Error::from_raw_os_error(-self.result))
    }
}

/// Completion-queue I/O engine.
pub trait Engine {
    /// Queue a request. It is not handed to the engine until `submit`.
    ///
    /// # Safety
    /// Buffers referenced by `request` must remain valid, and must not be
    /// accessed by anyone else, until the completion carrying `user_data`
    /// has been returned by `wait`.
    unsafe fn push(&mut self, request: Request, user_data: u64) -> io::Result<()>;

    /// Flush queued requests. Returns how many were submitted.
    fn submit(&mut self) -> io::Result<usize>;

    /// Block until at least one completion is available, then move up to
    /// `max` completions into `out`. Returned completions are consumed.
    fn wait(&mut self, out: &mut Vec<Completion>, max: usize) -> io::Result<()>;

    /// Close a descriptor. No request may be outstanding on it.
    fn close(&mut self, fd: RawFd) {
        unsafe { libc::close(fd) };
    }
}

/// Retry a syscall wrapper that was interrupted by a signal.
pub(crate) fn retry_interrupted<T>(mut f: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match f() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}
