//! Ping protocol implementation.
//!
//! A tiny line protocol used for connectivity checks:
//! - Client sends a command terminated by `\r` plus one more byte
//!   (canonically `\n`).
//! - Server answers with a single line terminated by `\r\n`.
//!
//! ## Protocol Format
//!
//! ```text
//! Connect:  Hello, (127.0.0.1, 40123)\r\n
//!
//! Request:  ping\r\n
//! Response: pong\r\n
//!
//! Request:  quit\r\n
//! Response: Goodbye.\r\n   (server closes the connection)
//!
//! Request:  anything else\r\n
//! Response: Invalid message.\r\n
//! ```
//!
//! When remote shutdown is enabled, `shutdown` answers `Shutting down`,
//! closes the connection and stops the listener.
//!
//! Commands are case-sensitive and must match exactly. A backspace byte
//! erases the previously typed byte, which keeps raw telnet sessions usable.

pub mod line;
pub mod parser;

pub use line::LineReader;
pub use parser::{greeting, Dispatcher, Verdict};
