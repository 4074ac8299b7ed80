//! Connection runtime.
//!
//! Shared pieces used by the acceptor and every session task:
//! - `ConnectionRegistry`: active connections, safe for concurrent use
//! - `ConnectionSession`: per-connection state machine
//! - `Shutdown`: stop signal raised by a session, observed by the acceptor

mod connection;
mod session;

pub use connection::{ClientConnection, ClientInfo, ConnectionRegistry};
pub use session::ConnectionSession;

use std::sync::Arc;
use tokio::sync::watch;

/// One-shot stop signal for the listener.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Ask the listener to stop accepting.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    #[cfg(test)]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once `trigger` has been called.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
