//! Outbound session to the notification bus.
//!
//! A [`BusSession`] exists only while connected: [`BusSession::connect`]
//! either returns a live session that has already sent its `HELLO`
//! handshake, or a [`ConnectionError`]. The caller models "disconnected" as
//! `Option<BusSession>::None` and drops the session after any
//! [`SendError`].
//!
//! The protocol is one-directional. Nothing is ever read back from the peer.

use std::time::Duration;

use tokio::io::AsyncWriteExt as _;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::codec;
use crate::error::{ConnectionError, SendError};

/// Message id of the handshake frame.
pub const HELLO_MESSAGE: &str = "HELLO";

/// Message id of a broadcast command.
pub const BUS_COMM_MESSAGE: &str = "busComm";

/// Client identifier sent in the handshake unless configured otherwise.
pub const DEFAULT_CLIENT_NAME: &str = "MVPTracker";

/// Prefix the bus expects in front of party-chat text.
const COMM_PREFIX: &str = "p ";

/// Connection parameters for a [`BusSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Name announced in the `HELLO` handshake.
    pub client_name: String,
    /// Deadline for the TCP connect.
    pub connect_timeout: Duration,
    /// Deadline for writing one frame.
    pub send_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            connect_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(10),
        }
    }
}

/// A connected session to the notification bus.
pub struct BusSession {
    stream: TcpStream,
    peer: String,
    send_timeout: Duration,
}

impl BusSession {
    /// Connect to the bus at `addr` and send the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if the connect fails or times out, or if
    /// the handshake frame cannot be written.
    pub async fn connect(addr: &str, config: &SessionConfig) -> Result<Self, ConnectionError> {
        debug!(addr = addr, "connecting to bus");
        let stream = match timeout(config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ConnectionError::Connect {
                    addr: addr.to_owned(),
                    source,
                });
            }
            Err(_elapsed) => {
                return Err(ConnectionError::Timeout {
                    addr: addr.to_owned(),
                    timeout_ms: config.connect_timeout.as_millis(),
                });
            }
        };
        stream
            .set_nodelay(true)
            .map_err(|source| ConnectionError::Connect {
                addr: addr.to_owned(),
                source,
            })?;

        let mut session = Self {
            stream,
            peer: addr.to_owned(),
            send_timeout: config.send_timeout,
        };
        session
            .send(HELLO_MESSAGE, &[("name", config.client_name.as_str())])
            .await
            .map_err(|source| ConnectionError::Handshake {
                addr: addr.to_owned(),
                source,
            })?;

        info!(
            addr = addr,
            client_name = config.client_name,
            "connected to bus"
        );
        Ok(session)
    }

    /// Encode and write one frame.
    ///
    /// There is no retry: a failed or short write is returned to the caller,
    /// which should drop this session.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if encoding fails, the write fails, or the write
    /// exceeds the send timeout.
    pub async fn send(&mut self, message_id: &str, args: &[(&str, &str)]) -> Result<(), SendError> {
        let frame = codec::encode(message_id, args)?;
        match timeout(self.send_timeout, self.stream.write_all(&frame)).await {
            Ok(result) => result?,
            Err(_elapsed) => {
                return Err(SendError::Timeout {
                    timeout_ms: self.send_timeout.as_millis(),
                });
            }
        }
        debug!(
            peer = self.peer,
            message_id = message_id,
            frame_len = frame.len(),
            "frame sent"
        );
        Ok(())
    }

    /// Broadcast `text` to every player as a `busComm` party message.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] under the same conditions as [`send`](Self::send).
    pub async fn send_notification(&mut self, text: &str) -> Result<(), SendError> {
        let comm = format!("{COMM_PREFIX}{text}");
        self.send(BUS_COMM_MESSAGE, &[("player", "all"), ("comm", &comm)])
            .await
    }

    /// Address this session was opened against.
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl std::fmt::Debug for BusSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusSession")
            .field("peer", &self.peer)
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_bus_conventions() {
        let config = SessionConfig::default();
        assert_eq!(config.client_name, "MVPTracker");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn refused_connect_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await;
        let Ok(listener) = listener else {
            return;
        };
        let addr = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        drop(listener);

        let result = BusSession::connect(&addr, &SessionConfig::default()).await;
        assert!(matches!(result, Err(ConnectionError::Connect { .. })));
    }
}
