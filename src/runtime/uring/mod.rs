//! Linux io_uring engine.
//!
//! Completion-based I/O: requests become submission queue entries and
//! results are read straight off the completion queue.

mod engine;

pub use engine::UringEngine;
