//! Fixed-response HTTP protocol.
//!
//! The first bytes received on a connection are answered with a canned
//! `200 OK` and the connection is closed once it has been written. The
//! request is never parsed.
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: text/plain\r\n
//! Content-Length: <body length>\r\n
//! Connection: close\r\n
//! \r\n
//! <body>
//! ```

use super::Action;
use bytes::Bytes;

/// Build the response sent to every client.
pub fn response(body: &str) -> Bytes {
    Bytes::from(format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        body.len(),
        body
    ))
}

/// Decide what follows a successful read of `n` bytes.
pub fn on_read(n: usize) -> Action {
    if n == 0 {
        Action::Close
    } else {
        Action::Respond
    }
}

/// One response per connection.
pub fn on_write_complete() -> Action {
    Action::Close
}
