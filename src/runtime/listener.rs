//! Listening socket setup.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};

/// Fatal server setup errors.
#[derive(Debug)]
pub enum SetupError {
    Socket(io::Error),
    Bind(SocketAddr, io::Error),
    Listen(SocketAddr, io::Error),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::Socket(e) => write!(f, "Failed to create socket: {}", e),
            SetupError::Bind(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
            SetupError::Listen(addr, e) => write!(f, "Failed to listen on {}: {}", addr, e),
        }
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SetupError::Socket(e) | SetupError::Bind(_, e) | SetupError::Listen(_, e) => Some(e),
        }
    }
}

/// A bound, listening TCP socket.
///
/// Non-blocking with `SO_REUSEADDR` set, so a restart does not trip over a
/// lingering bind.
#[derive(Debug)]
pub struct Listener {
    socket: socket2::Socket,
}

impl Listener {
    /// Create, bind and listen.
    pub fn bind(addr: SocketAddr, backlog: i32) -> Result<Self, SetupError> {
        let socket = socket2::Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )
        .map_err(SetupError::Socket)?;

        socket
            .set_reuse_address(true)
            .and_then(|_| socket.set_nonblocking(true))
            .map_err(SetupError::Socket)?;
        socket
            .bind(&addr.into())
            .map_err(|e| SetupError::Bind(addr, e))?;
        socket
            .listen(backlog)
            .map_err(|e| SetupError::Listen(addr, e))?;

        Ok(Self { socket })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()?.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "listener is not an inet socket")
        })
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_port() {
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), libc::SOMAXCONN).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(std::net::TcpStream::connect(addr).is_ok());
    }

    #[test]
    fn test_bind_in_use_is_setup_error() {
        let first = Listener::bind("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let addr = first.local_addr().unwrap();

        // SO_REUSEADDR does not allow two live listeners on one port
        match Listener::bind(addr, 16) {
            Err(SetupError::Bind(failed, _)) => assert_eq!(failed, addr),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
