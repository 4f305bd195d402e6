//! Completion-driven event loop.
//!
//! Completion-based model: queue operations on the engine, flush them once
//! per turn, then process the completions that come back in batches.
//!
//! Every connection has exactly one operation in flight. The completion for
//! that operation is the only way back to the connection: its `user_data`
//! is the connection's [`Token`], and the connection's [`PendingOp`] says
//! how to read the result.
//!
//! ```text
//! accept ──▶ read ──▶ write ──▶ read ──▶ ...
//!              │         │
//!              └─────────┴──▶ close (error, EOF, or protocol decision)
//! ```

use crate::config::Config;
use crate::protocols::{http, Action};
use crate::runtime::engine::{Completion, Engine, Request};
use crate::runtime::{BufferPool, Connection, ConnectionRegistry, PendingOp, Protocol, Token};
use bytes::Bytes;
use std::io;
use std::os::unix::io::RawFd;
use tracing::{debug, warn};

/// Single-threaded dispatcher over one completion engine.
pub struct EventLoop<E: Engine> {
    engine: E,
    listener_fd: RawFd,
    protocol: Protocol,
    connections: ConnectionRegistry,
    buffers: BufferPool,
    /// Shared response for the HTTP protocol, built once.
    response: Bytes,
    multishot_accept: bool,
    batch_size: usize,
    completions: Vec<Completion>,
}

impl<E: Engine> EventLoop<E> {
    pub fn new(engine: E, listener_fd: RawFd, config: &Config) -> Self {
        Self {
            engine,
            listener_fd,
            protocol: config.protocol.into(),
            connections: ConnectionRegistry::new(config.max_connections),
            buffers: BufferPool::new(config.max_connections, config.buffer_size),
            response: http::response(&config.http_body),
            multishot_accept: config.multishot_accept,
            batch_size: config.batch_size,
            completions: Vec::with_capacity(config.batch_size),
        }
    }

    /// Run forever. Only returns if the engine itself fails.
    pub fn run(&mut self) -> io::Result<()> {
        self.request_accept()?;

        loop {
            self.turn()?;
        }
    }

    /// Flush queued requests, wait for completions and handle them.
    pub fn turn(&mut self) -> io::Result<()> {
        self.engine.submit()?;

        let mut batch = std::mem::take(&mut self.completions);
        let result = self
            .engine
            .wait(&mut batch, self.batch_size)
            .and_then(|()| batch.drain(..).try_for_each(|c| self.dispatch(c)));

        batch.clear();
        self.completions = batch;
        result
    }

    /// Number of open client connections.
    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    /// Route one completion to its handler.
    fn dispatch(&mut self, completion: Completion) -> io::Result<()> {
        match Token::decode(completion.user_data) {
            Token::Accept => self.handle_accept(completion),
            token => {
                self.handle_connection(token, completion);
                Ok(())
            }
        }
    }

    fn handle_accept(&mut self, completion: Completion) -> io::Result<()> {
        // Re-arm accept unless a multishot accept is still running
        if !completion.more {
            self.request_accept()?;
        }

        if let Some(err) = completion.error() {
            warn!(error = %err, "Accept failed");
            return Ok(());
        }

        let fd = completion.result;

        let Some(buf_idx) = self.buffers.alloc() else {
            warn!(fd, buffers = self.buffers.capacity(), "Buffer pool exhausted, closing");
            self.engine.close(fd);
            return Ok(());
        };

        let token = match self.connections.insert(Connection::new(fd, buf_idx)) {
            Some(token) => token,
            None => {
                warn!(
                    fd,
                    max_connections = self.connections.capacity(),
                    "Connection limit reached, closing"
                );
                self.buffers.free(buf_idx);
                self.engine.close(fd);
                return Ok(());
            }
        };

        debug!(
            fd,
            active = self.connections.len(),
            free_buffers = self.buffers.available(),
            "Accepted connection"
        );

        let result = self.request_read(token);
        self.close_on_error(token, result);
        Ok(())
    }

    fn handle_connection(&mut self, token: Token, completion: Completion) {
        let Some(conn) = self.connections.get_mut(token) else {
            warn!(user_data = completion.user_data, "Completion for unknown connection");
            return;
        };

        if let Some(err) = completion.error() {
            debug!(fd = conn.fd, op = ?conn.op, error = %err, "Operation failed");
            self.close(token);
            return;
        }

        let n = completion.result as usize;

        let action = match conn.op {
            PendingOp::Read => self.protocol.on_read(n),
            PendingOp::Write { written, total } => {
                let written = written + n;
                if written >= total {
                    self.protocol.on_write_complete()
                } else if n == 0 {
                    debug!(fd = conn.fd, written, total, "Write made no progress");
                    Action::Close
                } else {
                    // Short write, send the rest
                    let result = self.request_write(token, written, total);
                    self.close_on_error(token, result);
                    return;
                }
            }
        };

        let result = match action {
            Action::Read => self.request_read(token),
            Action::Echo(len) => self.request_write(token, 0, len),
            Action::Respond => {
                let len = conn.attach_response(&self.response);
                self.request_write(token, 0, len)
            }
            Action::Close => {
                self.close(token);
                return;
            }
        };
        self.close_on_error(token, result);
    }

    /// Queue an accept on the listener.
    fn request_accept(&mut self) -> io::Result<()> {
        let request = Request::Accept {
            fd: self.listener_fd,
            multishot: self.multishot_accept,
        };
        // No buffers involved
        unsafe { self.engine.push(request, Token::ACCEPT) }
    }

    /// Queue a read into the connection's pool buffer.
    fn request_read(&mut self, token: Token) -> io::Result<()> {
        let conn = self.connections.get_mut(token).ok_or_else(not_found)?;
        conn.start_reading();

        let request = Request::Recv {
            fd: conn.fd,
            buf: self.buffers.get_ptr(conn.buf_idx),
            len: self.buffers.buffer_size(),
        };
        // The pool buffer belongs to this connection until it is closed, and
        // a connection is only closed once its operation has completed.
        unsafe { self.engine.push(request, token.encode()) }
    }

    /// Queue a write of bytes `written..total` of the connection's write
    /// source: the response when one is attached, the read buffer otherwise.
    fn request_write(&mut self, token: Token, written: usize, total: usize) -> io::Result<()> {
        let conn = self.connections.get_mut(token).ok_or_else(not_found)?;
        conn.start_writing(written, total);

        let source = match &conn.response {
            Some(response) => response.as_ptr(),
            None => {
                debug_assert!(total <= self.buffers.buffer_size());
                self.buffers.get_ptr(conn.buf_idx) as *const u8
            }
        };

        let request = Request::Send {
            fd: conn.fd,
            buf: unsafe { source.add(written) },
            len: total - written,
        };
        // Same ownership argument as reads; the response is a reference
        // counted handle held by the connection.
        unsafe { self.engine.push(request, token.encode()) }
    }

    fn close_on_error(&mut self, token: Token, result: io::Result<()>) {
        if let Err(e) = result {
            warn!(error = %e, "Failed to queue operation, closing connection");
            self.close(token);
        }
    }

    /// Close the descriptor and release everything the connection holds.
    fn close(&mut self, token: Token) {
        if let Some(conn) = self.connections.remove(token) {
            self.buffers.free(conn.buf_idx);
            self.engine.close(conn.fd);
            debug!(fd = conn.fd, active = self.connections.len(), "Connection closed");
        }
    }
}

fn not_found() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "connection not found")
}
