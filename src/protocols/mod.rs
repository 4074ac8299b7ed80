//! Protocol implementations.
//!
//! - `ping`: line framing and command dispatch for the ping/pong protocol

pub mod ping;
