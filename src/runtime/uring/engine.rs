//! io_uring implementation of the completion engine.

use crate::runtime::engine::{retry_interrupted, Completion, Engine, Request};
use io_uring::{cqueue, opcode, squeue, types, IoUring};
use std::io;

/// Completion engine backed by one io_uring instance.
pub struct UringEngine {
    ring: IoUring,
}

impl UringEngine {
    /// Create a ring with `entries` submission queue slots.
    pub fn new(entries: u32) -> io::Result<Self> {
        Ok(Self {
            ring: IoUring::new(entries)?,
        })
    }

    fn entry(request: Request) -> squeue::Entry {
        match request {
            Request::Accept {
                fd,
                multishot: false,
            } => opcode::Accept::new(types::Fd(fd), std::ptr::null_mut(), std::ptr::null_mut())
                .build(),
            Request::Accept {
                fd,
                multishot: true,
            } => opcode::AcceptMulti::new(types::Fd(fd)).build(),
            Request::Recv { fd, buf, len } => {
                opcode::Recv::new(types::Fd(fd), buf, len as u32).build()
            }
            Request::Send { fd, buf, len } => opcode::Send::new(types::Fd(fd), buf, len as u32)
                .flags(libc::MSG_NOSIGNAL)
                .build(),
        }
    }
}

impl Engine for UringEngine {
    unsafe fn push(&mut self, request: Request, user_data: u64) -> io::Result<()> {
        let entry = Self::entry(request).user_data(user_data);

        if self.ring.submission().push(&entry).is_ok() {
            return Ok(());
        }

        // Queue full: flush what is already there and try once more
        retry_interrupted(|| self.ring.submit())?;
        self.ring
            .submission()
            .push(&entry)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "submission queue full"))
    }

    fn submit(&mut self) -> io::Result<usize> {
        retry_interrupted(|| self.ring.submit())
    }

    fn wait(&mut self, out: &mut Vec<Completion>, max: usize) -> io::Result<()> {
        if self.ring.completion().is_empty() {
            retry_interrupted(|| self.ring.submit_and_wait(1))?;
        }

        // Dropping the queue publishes the new head, releasing the slots
        out.extend(self.ring.completion().take(max).map(|cqe| Completion {
            user_data: cqe.user_data(),
            result: cqe.result(),
            more: cqueue::more(cqe.flags()),
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Token;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::AsRawFd;

    /// Kernels or sandboxes without io_uring skip these tests.
    fn engine() -> Option<UringEngine> {
        UringEngine::new(8).ok()
    }

    fn wait_one(engine: &mut UringEngine) -> Completion {
        let mut out = Vec::new();
        while out.is_empty() {
            engine.wait(&mut out, 1).unwrap();
        }
        out[0]
    }

    #[test]
    fn test_accept_recv_send() {
        let Some(mut engine) = engine() else { return };
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        let accept = Request::Accept {
            fd: listener.as_raw_fd(),
            multishot: false,
        };
        unsafe { engine.push(accept, Token::ACCEPT).unwrap() };
        assert_eq!(engine.submit().unwrap(), 1);
        let completion = wait_one(&mut engine);
        assert_eq!(completion.user_data, Token::ACCEPT);
        assert!(completion.result >= 0);
        let fd = completion.result;

        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 16];
        let recv = Request::Recv {
            fd,
            buf: buf.as_mut_ptr(),
            len: buf.len(),
        };
        unsafe { engine.push(recv, 7).unwrap() };
        engine.submit().unwrap();
        let completion = wait_one(&mut engine);
        assert_eq!(completion.user_data, 7);
        assert_eq!(&buf[..completion.result as usize], b"ping");

        let send = Request::Send {
            fd,
            buf: b"pong".as_ptr(),
            len: 4,
        };
        unsafe { engine.push(send, 8).unwrap() };
        engine.submit().unwrap();
        assert_eq!(wait_one(&mut engine).result, 4);

        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"pong");

        engine.close(fd);
    }

    #[test]
    fn test_recv_on_bad_descriptor_fails() {
        let Some(mut engine) = engine() else { return };
        let mut buf = [0u8; 4];
        let recv = Request::Recv {
            fd: -1,
            buf: buf.as_mut_ptr(),
            len: buf.len(),
        };
        unsafe { engine.push(recv, 1).unwrap() };
        engine.submit().unwrap();

        let completion = wait_one(&mut engine);
        assert_eq!(completion.result, -libc::EBADF);
        assert_eq!(completion.error().unwrap().raw_os_error(), Some(libc::EBADF));
    }
}
