//! Shared helpers: each test starts its own server on an ephemeral port.

#![allow(dead_code)]

use ringserve::config::{Config, ProtocolType, RuntimeType};
use ringserve::runtime::{self, Listener};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

pub fn test_config(protocol: ProtocolType, runtime: RuntimeType) -> Config {
    let mut config = Config::new(protocol);
    config.listen = "127.0.0.1:0".parse().unwrap();
    config.runtime = runtime;
    config.max_connections = 256;
    config.ring_size = 64;
    config
}

/// Bind and serve on a background thread; the server lives until the test
/// process exits.
pub fn start(config: Config) -> SocketAddr {
    let listener = Listener::bind(config.listen, config.backlog).unwrap();
    let addr = listener.local_addr().unwrap();

    thread::Builder::new()
        .name("ringserve-test".to_string())
        .spawn(move || {
            if let Err(e) = runtime::run(&config, &listener) {
                panic!("event loop failed: {e}");
            }
        })
        .unwrap();

    addr
}

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

pub fn echo_round_trip(stream: &mut TcpStream, msg: &[u8]) -> Vec<u8> {
    stream.write_all(msg).unwrap();
    let mut buf = vec![0u8; msg.len()];
    stream.read_exact(&mut buf).unwrap();
    buf
}

/// Reads until the server closes the connection.
pub fn read_until_eof(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Connect, then reset the connection instead of closing it cleanly.
pub fn connect_and_reset(addr: SocketAddr) {
    let stream = TcpStream::connect(addr).unwrap();
    let socket = socket2::Socket::from(stream);
    socket.set_linger(Some(Duration::ZERO)).unwrap();
    drop(socket);
}
