//! Per-connection session state machine.
//!
//! ```text
//! Greeting -> AwaitingLine -> Dispatching -> AwaitingLine
//!                  |                |
//!                  v                v
//!               Closed  <------  Closed
//! ```
//!
//! A session owns its stream and registry membership. Both are released
//! when `run` returns, whichever state it ended in.

use crate::protocols::ping::{greeting, Dispatcher, LineReader, Verdict};
use super::connection::Registration;
use crate::runtime::{ClientConnection, ClientInfo, Shutdown};
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, trace};

/// Current state of a session.
#[derive(Debug)]
enum SessionState {
    /// Sending the welcome line.
    Greeting,
    /// Waiting for the next complete line.
    AwaitingLine,
    /// Answering a decoded line.
    Dispatching(BytesMut),
    /// Terminal.
    Closed(SessionEnd),
}

/// How a session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent `quit`.
    Quit,
    /// Client sent `shutdown` and the listener was told to stop.
    Shutdown,
    /// Peer closed the stream, possibly mid-line.
    Disconnected,
}

/// Drives one client connection from greeting to close.
pub struct ConnectionSession<S> {
    lines: LineReader<BufReader<S>>,
    dispatcher: Dispatcher,
    shutdown: Shutdown,
    // Declared after `lines` so the stream is closed before the registry
    // entry goes away.
    registration: Registration,
}

impl<S> ConnectionSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(conn: ClientConnection<S>, dispatcher: Dispatcher, shutdown: Shutdown) -> Self {
        let ClientConnection {
            stream,
            registration,
        } = conn;

        Self {
            lines: LineReader::new(BufReader::new(stream)),
            dispatcher,
            shutdown,
            registration,
        }
    }

    pub fn info(&self) -> &ClientInfo {
        self.registration.info()
    }

    /// Run the session until the client quits or the stream fails.
    ///
    /// Read and write errors end only this session.
    pub async fn run(mut self) -> io::Result<SessionEnd> {
        let mut state = SessionState::Greeting;

        loop {
            state = match state {
                SessionState::Greeting => {
                    let addr = self.info().addr;
                    self.send(&greeting(addr.ip(), addr.port())).await?;
                    SessionState::AwaitingLine
                }
                SessionState::AwaitingLine => match self.lines.read_line().await? {
                    Some(line) => SessionState::Dispatching(line),
                    None => {
                        trace!(conn_id = self.info().id, "Connection closed by client");
                        SessionState::Closed(SessionEnd::Disconnected)
                    }
                },
                SessionState::Dispatching(line) => {
                    debug!(
                        conn_id = self.info().id,
                        peer = %self.info().addr,
                        line = %line.escape_ascii(),
                        "Received line"
                    );

                    let reply = self.dispatcher.dispatch(&line);
                    self.send(&reply.to_wire()).await?;

                    match reply.verdict {
                        Verdict::Continue => SessionState::AwaitingLine,
                        Verdict::Terminate => {
                            self.close().await?;
                            SessionState::Closed(SessionEnd::Quit)
                        }
                        Verdict::Shutdown => {
                            info!(peer = %self.info().addr, "Shutdown requested by client");
                            self.shutdown.trigger();
                            self.close().await?;
                            SessionState::Closed(SessionEnd::Shutdown)
                        }
                    }
                }
                SessionState::Closed(end) => return Ok(end),
            };
        }
    }

    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let stream = self.lines.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;

        debug!(
            conn_id = self.registration.info().id,
            peer = %self.registration.info().addr,
            data = %data.escape_ascii(),
            "Sent"
        );
        Ok(())
    }

    /// Shut down the write half so the client sees EOF.
    async fn close(&mut self) -> io::Result<()> {
        self.lines.get_mut().shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ConnectionRegistry;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio_test::io::Builder;

    fn peer() -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 7], 40123))
    }

    fn session<S>(
        stream: S,
        registry: &Arc<ConnectionRegistry>,
        dispatcher: Dispatcher,
    ) -> (ConnectionSession<S>, Shutdown)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let shutdown = Shutdown::new();
        let conn = ClientConnection::new(stream, registry.register(peer()));
        (
            ConnectionSession::new(conn, dispatcher, shutdown.clone()),
            shutdown,
        )
    }

    #[tokio::test]
    async fn test_ping_then_quit() {
        let registry = ConnectionRegistry::new();
        let stream = Builder::new()
            .write(b"Hello, (10.0.0.7, 40123)\r\n")
            .read(b"ping\r\n")
            .write(b"pong\r\n")
            .read(b"quit\r\n")
            .write(b"Goodbye.\r\n")
            .build();

        let (session, _) = session(stream, &registry, Dispatcher::default());
        assert_eq!(registry.len(), 1);

        let end = session.run().await.unwrap();
        assert_eq!(end, SessionEnd::Quit);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_message_keeps_session_open() {
        let registry = ConnectionRegistry::new();
        let stream = Builder::new()
            .write(b"Hello, (10.0.0.7, 40123)\r\n")
            .read(b"hello\r\n")
            .write(b"Invalid message.\r\n")
            .read(b"\r\n")
            .write(b"Invalid message.\r\n")
            .read(b"pinx\x08g\r\n")
            .write(b"pong\r\n")
            .build();

        let (session, _) = session(stream, &registry, Dispatcher::default());
        let end = session.run().await.unwrap();
        assert_eq!(end, SessionEnd::Disconnected);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_mid_line_sends_nothing() {
        let registry = ConnectionRegistry::new();
        let stream = Builder::new()
            .write(b"Hello, (10.0.0.7, 40123)\r\n")
            .read(b"pi")
            .build();

        let (session, _) = session(stream, &registry, Dispatcher::default());
        assert_eq!(session.run().await.unwrap(), SessionEnd::Disconnected);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_read_error_ends_session() {
        let registry = ConnectionRegistry::new();
        let stream = Builder::new()
            .write(b"Hello, (10.0.0.7, 40123)\r\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let (session, _) = session(stream, &registry, Dispatcher::default());
        let err = session.run().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_command_triggers_signal() {
        let registry = ConnectionRegistry::new();
        let stream = Builder::new()
            .write(b"Hello, (10.0.0.7, 40123)\r\n")
            .read(b"shutdown\r\n")
            .write(b"Shutting down\r\n")
            .build();

        let (session, shutdown) = session(stream, &registry, Dispatcher::new(true));
        assert!(!shutdown.is_triggered());

        assert_eq!(session.run().await.unwrap(), SessionEnd::Shutdown);
        assert!(shutdown.is_triggered());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_quit_closes_stream() {
        use tokio::io::AsyncReadExt;

        let registry = ConnectionRegistry::new();
        let (mut client, server) = tokio::io::duplex(256);
        let (session, _) = session(server, &registry, Dispatcher::default());
        let task = tokio::spawn(session.run());

        client.write_all(b"quit\r\n").await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"Hello, (10.0.0.7, 40123)\r\nGoodbye.\r\n");

        assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Quit);
        assert!(registry.is_empty());
    }
}
