//! TCP server for the ping protocol.
//!
//! The acceptor registers every incoming connection and hands it to its own
//! session task, then goes straight back to `accept`. It stops when the
//! shared `Shutdown` signal fires.

use crate::config::Config;
use crate::error::ServerError;
use crate::protocols::ping::Dispatcher;
use crate::runtime::{ClientConnection, ConnectionRegistry, ConnectionSession, Shutdown};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Server instance
pub struct Server {
    config: Config,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Dispatcher,
    shutdown: Shutdown,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let dispatcher = Dispatcher::new(config.allow_shutdown);

        Server {
            config,
            registry: ConnectionRegistry::new(),
            dispatcher,
            shutdown: Shutdown::new(),
        }
    }

    /// Handle that stops the accept loop when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Bind the configured listen address.
    pub fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.listen;
        let listener = create_listener(addr, self.config.backlog)
            .and_then(TcpListener::from_std)
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!(address = %listener.local_addr()?, "Server listening");
        Ok(listener)
    }

    /// Bind and accept connections until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;
        self.serve(listener).await;
        Ok(())
    }

    /// Accept connections on `listener` until shutdown.
    ///
    /// Sessions already running are left alone when this returns.
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.triggered() => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_session(stream, addr),
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        if self.registry.is_empty() {
            info!("Stopped accepting connections");
            return;
        }

        let active = self.registry.snapshot();
        info!(active = active.len(), "Stopped accepting connections");
        for client in active {
            debug!(
                conn_id = client.id,
                peer = %client.addr,
                connected_at = %client.connected_at,
                "Session still open"
            );
        }
    }

    fn spawn_session(&self, stream: tokio::net::TcpStream, addr: SocketAddr) {
        let conn = ClientConnection::new(stream, self.registry.register(addr));
        let conn_id = conn.info().id;
        info!(conn_id, peer = %addr, active = self.registry.len(), "Connection accepted");

        let session = ConnectionSession::new(conn, self.dispatcher, self.shutdown.clone());
        tokio::spawn(async move {
            match session.run().await {
                Ok(end) => info!(conn_id, peer = %addr, ?end, "Connection closed"),
                Err(e) => warn!(conn_id, peer = %addr, error = %e, "Connection error"),
            }
        });
    }

    /// Get a reference to the registry for testing
    #[cfg(test)]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr, backlog: u32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    Ok(socket.into())
}
