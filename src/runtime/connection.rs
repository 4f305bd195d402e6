//! Connection contexts and the registry that owns them.
//!
//! A connection context is the state the event loop keeps for one accepted
//! socket between completions: its descriptor, the pool buffer it reads
//! into, the operation currently outstanding on it and, for the HTTP
//! responder, the response being sent. The registry is the only owner;
//! completions reach a context through its [`Token`].

use crate::runtime::token::Token;
use bytes::Bytes;
use slab::Slab;
use std::os::unix::io::RawFd;

/// Operation currently outstanding on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOp {
    /// A receive into the connection's read buffer.
    Read,
    /// A send of `total` bytes from the write source, `written` of which
    /// the engine has already confirmed.
    Write {
        /// Bytes already written.
        written: usize,
        /// Total bytes to write.
        total: usize,
    },
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection {
    /// File descriptor for the socket.
    pub fd: RawFd,
    /// Operation currently in flight.
    pub op: PendingOp,
    /// Buffer index in the read buffer pool.
    pub buf_idx: usize,
    /// Response attached on the first read (HTTP responder only).
    pub response: Option<Bytes>,
    generation: u32,
}

impl Connection {
    /// Create a connection whose first operation will be a read.
    pub fn new(fd: RawFd, buf_idx: usize) -> Self {
        Self {
            fd,
            op: PendingOp::Read,
            buf_idx,
            response: None,
            generation: 0,
        }
    }

    /// Transition to reading state.
    pub fn start_reading(&mut self) {
        self.op = PendingOp::Read;
    }

    /// Transition to writing bytes `written..total` of the write source.
    pub fn start_writing(&mut self, written: usize, total: usize) {
        self.op = PendingOp::Write { written, total };
    }

    /// Attach the response to send, keeping one that is already attached.
    pub fn attach_response(&mut self, response: &Bytes) -> usize {
        self.response.get_or_insert_with(|| response.clone()).len()
    }
}

/// Registry of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove. Each slot carries a generation
/// that changes on every insert, so tokens of removed connections are
/// rejected even after their slot is reused.
pub struct ConnectionRegistry {
    connections: Slab<Connection>,
    max_connections: usize,
    next_generation: u32,
}

impl ConnectionRegistry {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
            next_generation: 0,
        }
    }

    /// Insert a new connection into the registry.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert(&mut self, mut conn: Connection) -> Option<Token> {
        if self.connections.len() >= self.max_connections {
            return None;
        }

        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        conn.generation = generation;

        let index = self.connections.insert(conn);
        Some(Token::Conn {
            index: index as u32,
            generation,
        })
    }

    /// Get an immutable reference to a connection.
    pub fn get(&self, token: Token) -> Option<&Connection> {
        match token {
            Token::Conn { index, generation } => self
                .connections
                .get(index as usize)
                .filter(|conn| conn.generation == generation),
            Token::Accept => None,
        }
    }

    /// Get a mutable reference to a connection.
    pub fn get_mut(&mut self, token: Token) -> Option<&mut Connection> {
        match token {
            Token::Conn { index, generation } => self
                .connections
                .get_mut(index as usize)
                .filter(|conn| conn.generation == generation),
            Token::Accept => None,
        }
    }

    /// Remove a connection from the registry, handing ownership back.
    pub fn remove(&mut self, token: Token) -> Option<Connection> {
        self.get(token)?;
        match token {
            Token::Conn { index, .. } => Some(self.connections.remove(index as usize)),
            Token::Accept => None,
        }
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Maximum number of connections allowed.
    pub fn capacity(&self) -> usize {
        self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_transitions() {
        let mut conn = Connection::new(42, 0);

        assert_eq!(conn.op, PendingOp::Read);

        conn.start_writing(0, 100);
        assert_eq!(
            conn.op,
            PendingOp::Write {
                written: 0,
                total: 100
            }
        );

        conn.start_reading();
        assert_eq!(conn.op, PendingOp::Read);
    }

    #[test]
    fn test_attach_response_once() {
        let mut conn = Connection::new(42, 0);
        let first = Bytes::from_static(b"first");

        assert_eq!(conn.attach_response(&first), 5);
        assert_eq!(conn.attach_response(&Bytes::from_static(b"second")), 5);
        assert_eq!(conn.response.as_deref(), Some(&b"first"[..]));
    }

    #[test]
    fn test_connection_registry() {
        let mut registry = ConnectionRegistry::new(2);

        let t1 = registry.insert(Connection::new(10, 0)).unwrap();
        let t2 = registry.insert(Connection::new(11, 1)).unwrap();

        // At capacity
        assert!(registry.insert(Connection::new(12, 2)).is_none());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.capacity(), 2);
        assert_eq!(registry.get(t1).unwrap().fd, 10);
        assert_eq!(registry.get(t2).unwrap().buf_idx, 1);
        assert!(registry.get(Token::Accept).is_none());

        assert_eq!(registry.remove(t1).unwrap().fd, 10);
        assert!(registry.get(t1).is_none());
        assert!(registry.remove(t1).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_token_after_slot_reuse() {
        let mut registry = ConnectionRegistry::new(4);

        let old = registry.insert(Connection::new(10, 0)).unwrap();
        registry.remove(old);

        let new = registry.insert(Connection::new(20, 0)).unwrap();
        let (Token::Conn { index: a, .. }, Token::Conn { index: b, .. }) = (old, new) else {
            panic!("expected connection tokens");
        };
        // Slab reuses the slot, the generation tells them apart
        assert_eq!(a, b);
        assert_ne!(old, new);

        assert!(registry.get_mut(old).is_none());
        assert!(registry.remove(old).is_none());
        assert_eq!(registry.get(new).unwrap().fd, 20);
        assert_eq!(registry.len(), 1);
    }
}
