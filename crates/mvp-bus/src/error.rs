//! Error types for the bus codec and session.
//!
//! Encoding failures are programmer errors (inputs that cannot be framed)
//! and only ever fail the single send that produced them. Connection and
//! send failures are recoverable: the caller drops the session and
//! reconnects on a later cycle.

use std::io;

/// A message could not be framed.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    /// The message identifier does not fit a 1-byte length.
    #[error("message id is {len} bytes, limit is 255")]
    MessageIdTooLong {
        /// Length of the offending message id in bytes.
        len: usize,
    },

    /// An argument key does not fit a 1-byte length.
    #[error("argument key is {len} bytes, limit is 255")]
    KeyTooLong {
        /// Length of the offending key in bytes.
        len: usize,
    },

    /// An argument value does not fit a 3-byte length.
    #[error("value for key {key:?} is {len} bytes, limit is 16777215")]
    ValueTooLong {
        /// Key whose value was too long.
        key: String,
        /// Length of the offending value in bytes.
        len: usize,
    },

    /// The whole frame does not fit the 4-byte length prefix.
    #[error("frame is {len} bytes, exceeds the 32-bit length prefix")]
    FrameTooLarge {
        /// Computed frame length.
        len: usize,
    },
}

/// A byte buffer is not a well-formed frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ended before a field could be read.
    #[error("frame truncated: needed {needed} more bytes at offset {offset}")]
    Truncated {
        /// Offset of the field being read.
        offset: usize,
        /// Bytes the field required.
        needed: usize,
    },

    /// The length prefix disagrees with the buffer size.
    #[error("length prefix says {declared} bytes, buffer holds {actual}")]
    LengthMismatch {
        /// Length carried in the prefix.
        declared: usize,
        /// Actual buffer length.
        actual: usize,
    },

    /// The frame kind is not the argument-map kind.
    #[error("unsupported frame kind {0}")]
    UnknownKind(u8),

    /// A value carries a type tag other than UTF-8 string.
    #[error("unsupported value type tag {0}")]
    UnknownValueType(u8),

    /// A string field is not valid UTF-8.
    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 {
        /// Which field failed (`message id`, `key`, or `value`).
        field: &'static str,
    },
}

/// Opening a session to the bus failed.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The TCP connect failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address being dialled.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The TCP connect did not finish in time.
    #[error("connect to {addr} timed out after {timeout_ms}ms")]
    Timeout {
        /// Address being dialled.
        addr: String,
        /// Connect deadline in milliseconds.
        timeout_ms: u128,
    },

    /// The socket opened but the handshake frame could not be written.
    #[error("handshake with {addr} failed: {source}")]
    Handshake {
        /// Address of the peer.
        addr: String,
        /// The send failure.
        #[source]
        source: SendError,
    },
}

/// Writing a frame to an established session failed.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The message could not be framed.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The socket write failed.
    #[error("socket write failed: {0}")]
    Io(#[from] io::Error),

    /// The socket write did not finish in time.
    #[error("socket write timed out after {timeout_ms}ms")]
    Timeout {
        /// Send deadline in milliseconds.
        timeout_ms: u128,
    },
}
