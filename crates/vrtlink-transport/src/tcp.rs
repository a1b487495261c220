//! TCP command session for radio configuration.
//!
//! This module provides [`TcpCommandSession`], which implements the
//! [`CommandSession`] trait over the radio's line-oriented ASCII command
//! port. Each command is one line; the radio answers with zero or more
//! value lines followed by a status line, either `ok` or `err <reason>`.
//!
//! # Example
//!
//! ```no_run
//! use vrtlink_core::transport::CommandSession;
//! use vrtlink_transport::TcpCommandSession;
//! use std::time::Duration;
//!
//! # async fn example() -> vrtlink_core::Result<()> {
//! let session = TcpCommandSession::connect("192.168.10.2:8111").await?;
//!
//! let reply = session
//!     .send_command("get tx/0/duc/0/rate", Duration::from_secs(2))
//!     .await?;
//! println!("rate index: {:?}", reply.last());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use vrtlink_core::error::{Error, Result};
use vrtlink_core::transport::CommandSession;

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Status line closing a successful reply.
const REPLY_OK: &str = "ok";

/// Prefix of the status line closing a failed reply.
const REPLY_ERR: &str = "err";

#[derive(Debug)]
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Line-oriented command session over a persistent TCP connection.
///
/// Commands are serialized: a second caller waits until the first reply
/// has been collected, so replies are never interleaved.
#[derive(Debug)]
pub struct TcpCommandSession {
    /// The open connection, `None` after `close()` or a reply timeout.
    conn: Mutex<Option<Connection>>,
    /// The address string for logging.
    addr: String,
}

impl TcpCommandSession {
    /// Connect to the radio's command port using the default timeout.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect to the radio's command port with a specified timeout.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        tracing::debug!(
            addr = %addr,
            timeout_ms = timeout.as_millis(),
            "Connecting to command port"
        );

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %addr, "Command connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::error!(addr = %addr, error = %e, "Command connection failed");
                map_connect_error(e, addr)
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        tracing::info!(addr = %addr, "Command session established");

        Ok(Self::from_stream(stream, addr.to_string()))
    }

    /// Wrap an already-connected `TcpStream`.
    ///
    /// `addr` is only used as a label in log output.
    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            conn: Mutex::new(Some(Connection {
                reader: BufReader::new(read),
                writer,
            })),
            addr,
        }
    }

    /// Get the address string this session was connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether the connection is still open.
    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Shut the connection down. Later commands fail with
    /// [`Error::NotConnected`].
    pub async fn close(&self) -> Result<()> {
        if let Some(mut conn) = self.conn.lock().await.take() {
            tracing::debug!(addr = %self.addr, "Closing command session");
            if let Err(e) = conn.writer.shutdown().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to shutdown TCP stream (continuing anyway)"
                );
            }
            tracing::info!(addr = %self.addr, "Command session closed");
        }
        Ok(())
    }
}

#[async_trait]
impl CommandSession for TcpCommandSession {
    async fn send_command(&self, text: &str, timeout: Duration) -> Result<Vec<String>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(Error::NotConnected)?;

        tracing::debug!(addr = %self.addr, command = %text, "Sending command");

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        conn.writer
            .write_all(line.as_bytes())
            .await
            .map_err(map_io_error)?;
        conn.writer.flush().await.map_err(map_io_error)?;

        let reply = tokio::time::timeout(timeout, read_reply(&mut conn.reader)).await;
        match reply {
            Ok(Ok(lines)) => {
                tracing::trace!(addr = %self.addr, command = %text, reply = ?lines, "Command ok");
                Ok(lines)
            }
            Ok(Err(e)) => {
                tracing::warn!(addr = %self.addr, command = %text, error = %e, "Command failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    addr = %self.addr,
                    command = %text,
                    timeout_ms = timeout.as_millis(),
                    "Timeout waiting for command reply, closing session"
                );
                // A late reply would otherwise be read as the next command's.
                *guard = None;
                Err(Error::Timeout)
            }
        }
    }
}

/// Collect value lines up to the closing status line.
async fn read_reply(reader: &mut BufReader<OwnedReadHalf>) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    let mut buf = String::new();
    loop {
        buf.clear();
        let n = reader.read_line(&mut buf).await.map_err(map_io_error)?;
        if n == 0 {
            return Err(Error::ConnectionLost);
        }
        let line = buf.trim_end_matches(['\r', '\n']);
        if line == REPLY_OK {
            return Ok(lines);
        }
        if let Some(reason) = line.strip_prefix(REPLY_ERR) {
            let reason = reason.trim();
            return Err(Error::Protocol(if reason.is_empty() {
                "command rejected".to_string()
            } else {
                reason.to_string()
            }));
        }
        lines.push(line.to_string());
    }
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn test_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    /// Accept one connection and answer each received line with `replies`
    /// in order.
    fn spawn_radio(listener: TcpListener, replies: Vec<&'static str>) -> tokio::task::JoinHandle<Vec<String>> {
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut reader = BufReader::new(read);
            let mut received = Vec::new();
            for reply in replies {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                received.push(line.trim_end().to_string());
                write.write_all(reply.as_bytes()).await.unwrap();
            }
            received
        })
    }

    #[tokio::test]
    async fn get_returns_value_lines() {
        let (listener, addr) = test_listener().await;
        let radio = spawn_radio(listener, vec!["9\nok\n"]);

        let session = TcpCommandSession::connect(&addr).await.unwrap();
        let reply = session
            .send_command("get tx/0/duc/0/rate", Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(reply, vec!["9".to_string()]);
        assert_eq!(radio.await.unwrap(), vec!["get tx/0/duc/0/rate"]);
    }

    #[tokio::test]
    async fn set_returns_empty_reply() {
        let (listener, addr) = test_listener().await;
        let radio = spawn_radio(listener, vec!["ok\r\n"]);

        let session = TcpCommandSession::connect(&addr).await.unwrap();
        let reply = session
            .send_command("set tx/0/duc/0/pause 1", Duration::from_secs(2))
            .await
            .unwrap();

        assert!(reply.is_empty());
        radio.await.unwrap();
    }

    #[tokio::test]
    async fn err_line_is_protocol_error() {
        let (listener, addr) = test_listener().await;
        let radio = spawn_radio(listener, vec!["err no such path\n"]);

        let session = TcpCommandSession::connect(&addr).await.unwrap();
        let err = session
            .send_command("get tx/9/stream_id", Duration::from_secs(2))
            .await
            .unwrap_err();

        match err {
            Error::Protocol(msg) => assert_eq!(msg, "no such path"),
            other => panic!("expected Protocol error, got: {:?}", other),
        }
        radio.await.unwrap();
    }

    #[tokio::test]
    async fn reply_timeout() {
        let (listener, addr) = test_listener().await;
        let radio = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await;
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        let session = TcpCommandSession::connect(&addr).await.unwrap();
        let result = session
            .send_command("get tx/0/stream_id", Duration::from_millis(50))
            .await;

        assert!(
            matches!(result, Err(Error::Timeout)),
            "expected Timeout, got: {:?}",
            result
        );
        assert!(!session.is_connected().await);
        assert!(matches!(
            session
                .send_command("get tx/0/stream_id", Duration::from_millis(50))
                .await,
            Err(Error::NotConnected)
        ));
        radio.abort();
    }

    #[tokio::test]
    async fn peer_close_is_connection_lost() {
        let (listener, addr) = test_listener().await;
        let radio = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await;
        });

        let session = TcpCommandSession::connect(&addr).await.unwrap();
        let result = session
            .send_command("get tx/0/stream_id", Duration::from_secs(2))
            .await;

        assert!(matches!(result, Err(Error::ConnectionLost)));
        radio.await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TcpCommandSession::connect(&addr).await.unwrap_err();
        match &err {
            Error::Transport(msg) => assert!(msg.contains("connection refused")),
            other => panic!("expected Transport error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn closed_session_is_not_connected() {
        let (listener, addr) = test_listener().await;
        let radio = tokio::spawn(async move {
            let _ = listener.accept().await.unwrap();
        });

        let session = TcpCommandSession::connect(&addr).await.unwrap();
        assert!(session.is_connected().await);
        session.close().await.unwrap();
        assert!(!session.is_connected().await);

        let result = session
            .send_command("get tx/0/stream_id", Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(Error::NotConnected)));
        radio.await.unwrap();
    }
}
