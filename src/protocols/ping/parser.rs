//! Ping protocol command dispatch.

use std::fmt;

/// Line terminator appended to every server reply.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Parsed ping command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `ping`
    Ping,
    /// `quit`
    Quit,
    /// `shutdown`, only recognised when remote shutdown is enabled.
    Shutdown,
    /// Anything else, including the empty line.
    Unknown,
}

/// What the session does after replying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep reading lines.
    Continue,
    /// Close this connection.
    Terminate,
    /// Close this connection and stop accepting new ones.
    Shutdown,
}

/// A reply line (without terminator) and the verdict that goes with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub text: &'static str,
    pub verdict: Verdict,
}

impl Reply {
    /// Reply text followed by the wire terminator.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.text.len() + TERMINATOR.len());
        out.extend_from_slice(self.text.as_bytes());
        out.extend_from_slice(TERMINATOR);
        out
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text)
    }
}

/// Dispatches decoded lines to replies.
///
/// Matching is exact and case-sensitive. Surrounding whitespace is part of
/// the command, so `"ping "` is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    allow_shutdown: bool,
}

impl Dispatcher {
    pub fn new(allow_shutdown: bool) -> Self {
        Self { allow_shutdown }
    }

    /// Classify a decoded line.
    pub fn parse(&self, line: &[u8]) -> Command {
        match line {
            b"ping" => Command::Ping,
            b"quit" => Command::Quit,
            b"shutdown" if self.allow_shutdown => Command::Shutdown,
            _ => Command::Unknown,
        }
    }

    /// Map a decoded line to its reply.
    pub fn dispatch(&self, line: &[u8]) -> Reply {
        reply_for(self.parse(line))
    }
}

/// Fixed reply for each command.
pub fn reply_for(command: Command) -> Reply {
    match command {
        Command::Ping => Reply {
            text: "pong",
            verdict: Verdict::Continue,
        },
        Command::Quit => Reply {
            text: "Goodbye.",
            verdict: Verdict::Terminate,
        },
        Command::Shutdown => Reply {
            text: "Shutting down",
            verdict: Verdict::Shutdown,
        },
        Command::Unknown => Reply {
            text: "Invalid message.",
            verdict: Verdict::Continue,
        },
    }
}

/// Greeting sent when a client connects: `Hello, (<host>, <port>)`.
pub fn greeting(host: impl fmt::Display, port: u16) -> Vec<u8> {
    format!("Hello, ({host}, {port})\r\n").into_bytes()
}
