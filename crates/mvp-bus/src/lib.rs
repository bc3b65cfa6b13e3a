//! Wire protocol and peer session for the MVP tracker's notification bus.
//!
//! The bus speaks a small self-describing binary format: a length-prefixed
//! frame carrying a message id and a map of string arguments. This crate only
//! sends; the tracker never reads from the peer.
//!
//! # Modules
//!
//! - [`codec`] -- Frame encoding (and decoding, for peers and tests).
//! - [`session`] -- [`BusSession`]: connect with handshake, fire-and-forget send.
//! - [`error`] -- Error taxonomy for encoding, decoding, connecting, and sending.
//!
//! # Usage
//!
//! ```
//! use mvp_bus::codec::{decode, encode};
//!
//! let frame = encode("busComm", &[("player", "all"), ("comm", "p hello")]).ok();
//! let decoded = frame.as_deref().map(decode);
//! assert!(matches!(decoded, Some(Ok(ref f)) if f.get("comm") == Some("p hello")));
//! ```

pub mod codec;
pub mod error;
pub mod session;

pub use codec::{Frame, decode, encode};
pub use error::{ConnectionError, DecodeError, EncodingError, SendError};
pub use session::{BusSession, SessionConfig};
