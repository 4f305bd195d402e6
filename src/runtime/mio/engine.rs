//! Completion emulation over mio readiness.
//!
//! A submitted request is attempted right away with a non-blocking syscall.
//! If the socket is not ready the request is parked: its descriptor is
//! registered with the poller under the parked slot's key and the syscall
//! is retried whenever mio reports readiness. Once the syscall produces a
//! result the descriptor is deregistered and the result is queued as a
//! completion, exactly as a kernel completion queue would report it.

use crate::runtime::engine::{retry_interrupted, Completion, Engine, Request};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

#[cfg(target_os = "linux")]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: libc::c_int = 0;

/// Completion engine built on a mio poller.
pub struct MioEngine {
    poll: Poll,
    events: Events,
    /// Pushed but not yet submitted.
    queued: Vec<(Request, u64)>,
    /// Submitted requests waiting for readiness, keyed by mio token.
    parked: Slab<(Request, u64)>,
    /// Finished requests not yet handed out.
    ready: VecDeque<Completion>,
    woken: Vec<usize>,
}

impl MioEngine {
    /// Create an engine expecting roughly `capacity` requests in flight.
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(capacity.min(1024)),
            queued: Vec::with_capacity(capacity),
            parked: Slab::with_capacity(capacity),
            ready: VecDeque::with_capacity(capacity),
            woken: Vec::new(),
        })
    }

    /// Number of requests waiting for readiness.
    pub fn parked(&self) -> usize {
        self.parked.len()
    }

    fn start(&mut self, request: Request, user_data: u64) {
        // A multishot accept always parks; it completes once per connection
        if !matches!(request, Request::Accept { multishot: true, .. }) {
            if let Some(result) = attempt(request) {
                self.complete(user_data, result, false);
                return;
            }
        }

        let interest = match request {
            Request::Accept { .. } | Request::Recv { .. } => Interest::READABLE,
            Request::Send { .. } => Interest::WRITABLE,
        };

        let key = self.parked.insert((request, user_data));
        let fd = request.fd();
        if let Err(e) = self
            .poll
            .registry()
            .register(&mut SourceFd(&fd), Token(key), interest)
        {
            self.parked.remove(key);
            self.complete(user_data, -e.raw_os_error().unwrap_or(libc::EIO), false);
        }
    }

    fn on_ready(&mut self, key: usize) {
        let Some(&(request, user_data)) = self.parked.get(key) else {
            return;
        };

        if let Request::Accept {
            multishot: true, ..
        } = request
        {
            // Drain the backlog, the accept stays armed
            while let Some(result) = attempt(request) {
                if result < 0 {
                    self.unpark(key);
                    self.complete(user_data, result, false);
                    return;
                }
                self.complete(user_data, result, true);
            }
        } else if let Some(result) = attempt(request) {
            self.unpark(key);
            self.complete(user_data, result, false);
        }
    }

    fn unpark(&mut self, key: usize) {
        let (request, _) = self.parked.remove(key);
        let _ = self
            .poll
            .registry()
            .deregister(&mut SourceFd(&request.fd()));
    }

    fn complete(&mut self, user_data: u64, result: i32, more: bool) {
        self.ready.push_back(Completion {
            user_data,
            result,
            more,
        });
    }
}

impl Engine for MioEngine {
    unsafe fn push(&mut self, request: Request, user_data: u64) -> io::Result<()> {
        self.queued.push((request, user_data));
        Ok(())
    }

    fn submit(&mut self) -> io::Result<usize> {
        let mut queued = std::mem::take(&mut self.queued);
        let count = queued.len();
        for (request, user_data) in queued.drain(..) {
            self.start(request, user_data);
        }
        self.queued = queued;
        Ok(count)
    }

    fn wait(&mut self, out: &mut Vec<Completion>, max: usize) -> io::Result<()> {
        // Poll at least once per call so parked requests keep up with
        // sockets whose requests complete eagerly on every submit
        let mut timeout = (!self.ready.is_empty()).then_some(Duration::ZERO);
        loop {
            retry_interrupted(|| self.poll.poll(&mut self.events, timeout))?;

            self.woken.clear();
            self.woken
                .extend(self.events.iter().map(|event| event.token().0));
            for i in 0..self.woken.len() {
                self.on_ready(self.woken[i]);
            }

            if !self.ready.is_empty() {
                break;
            }
            timeout = None;
        }

        let n = max.min(self.ready.len());
        out.extend(self.ready.drain(..n));
        Ok(())
    }
}

/// Run the request's syscall once. `None` means the socket is not ready.
fn attempt(request: Request) -> Option<i32> {
    loop {
        let result = unsafe { syscall(request) };
        if result >= 0 {
            return Some(result as i32);
        }

        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::WouldBlock => return None,
            io::ErrorKind::Interrupted => continue,
            _ => return Some(-err.raw_os_error().unwrap_or(libc::EIO)),
        }
    }
}

unsafe fn syscall(request: Request) -> isize {
    match request {
        Request::Accept { fd, .. } => accept(fd) as isize,
        Request::Recv { fd, buf, len } => libc::recv(fd, buf.cast(), len, 0),
        Request::Send { fd, buf, len } => libc::send(fd, buf.cast(), len, SEND_FLAGS),
    }
}

/// Accept a connection as a non-blocking, close-on-exec socket.
#[cfg(target_os = "linux")]
unsafe fn accept(fd: RawFd) -> RawFd {
    libc::accept4(
        fd,
        std::ptr::null_mut(),
        std::ptr::null_mut(),
        libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
    )
}

#[cfg(not(target_os = "linux"))]
unsafe fn accept(fd: RawFd) -> RawFd {
    let conn = libc::accept(fd, std::ptr::null_mut(), std::ptr::null_mut());
    if conn >= 0 {
        let flags = libc::fcntl(conn, libc::F_GETFL);
        libc::fcntl(conn, libc::F_SETFL, flags | libc::O_NONBLOCK);
        libc::fcntl(conn, libc::F_SETFD, libc::FD_CLOEXEC);
    }
    conn
}
