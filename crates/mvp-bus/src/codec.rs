//! Length-prefixed frame codec for the notification bus.
//!
//! # Frame Layout
//!
//! All integers are big-endian.
//!
//! ```text
//! u32  total frame length (includes these 4 bytes)
//! u8   kind (0 = argument map)
//! u8   message id length, then message id bytes
//! per argument, in order:
//!   u8   key length, then key bytes
//!   u8   value type (1 = UTF-8 string)
//!   u24  value length, then value bytes
//! ```
//!
//! There is no escaping or padding. The daemon only ever encodes; [`decode`]
//! exists for peers and tests that need to read frames back.

use crate::error::{DecodeError, EncodingError};

/// Frame kind for an argument-map message.
pub const KIND_ARGUMENT_MAP: u8 = 0;

/// Value type tag for a UTF-8 string.
pub const VALUE_TYPE_UTF8: u8 = 1;

/// Largest value length representable in the 3-byte length field.
pub const MAX_VALUE_LEN: usize = 0x00FF_FFFF;

/// Size of the fixed header before the message id bytes.
const HEADER_LEN: usize = 4 + 1 + 1;

/// A decoded frame: message id plus arguments in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message identifier (e.g. `HELLO`, `busComm`).
    pub message_id: String,
    /// Arguments in the order they appeared on the wire.
    pub args: Vec<(String, String)>,
}

impl Frame {
    /// Look up the first argument named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Encode a message id and ordered arguments into one frame.
///
/// # Errors
///
/// Returns [`EncodingError`] if the message id or any key exceeds 255 bytes,
/// any value exceeds [`MAX_VALUE_LEN`] bytes, or the frame would exceed the
/// 32-bit length prefix.
pub fn encode(message_id: &str, args: &[(&str, &str)]) -> Result<Vec<u8>, EncodingError> {
    let mid_len = u8::try_from(message_id.len()).map_err(|_err| {
        EncodingError::MessageIdTooLong {
            len: message_id.len(),
        }
    })?;

    let mut body = Vec::new();
    for &(key, value) in args {
        let key_len = u8::try_from(key.len())
            .map_err(|_err| EncodingError::KeyTooLong { len: key.len() })?;
        let [_, hi, mid, lo] = value_len_bytes(key, value)?;

        body.push(key_len);
        body.extend_from_slice(key.as_bytes());
        body.push(VALUE_TYPE_UTF8);
        body.extend_from_slice(&[hi, mid, lo]);
        body.extend_from_slice(value.as_bytes());
    }

    let total = HEADER_LEN
        .checked_add(message_id.len())
        .and_then(|n| n.checked_add(body.len()))
        .ok_or(EncodingError::FrameTooLarge { len: usize::MAX })?;
    let total_prefix =
        u32::try_from(total).map_err(|_err| EncodingError::FrameTooLarge { len: total })?;

    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&total_prefix.to_be_bytes());
    frame.push(KIND_ARGUMENT_MAP);
    frame.push(mid_len);
    frame.extend_from_slice(message_id.as_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Big-endian 4-byte form of a value length already checked to fit 24 bits.
fn value_len_bytes(key: &str, value: &str) -> Result<[u8; 4], EncodingError> {
    let too_long = || EncodingError::ValueTooLong {
        key: key.to_owned(),
        len: value.len(),
    };
    if value.len() > MAX_VALUE_LEN {
        return Err(too_long());
    }
    let len = u32::try_from(value.len()).map_err(|_err| too_long())?;
    Ok(len.to_be_bytes())
}

/// Decode exactly one frame occupying the whole of `buf`.
///
/// # Errors
///
/// Returns [`DecodeError`] if the buffer is truncated, the length prefix
/// disagrees with the buffer, or a kind, type tag, or string is invalid.
pub fn decode(buf: &[u8]) -> Result<Frame, DecodeError> {
    let mut reader = Reader::new(buf);

    let declared = reader.u32()?;
    let declared = usize::try_from(declared).unwrap_or(usize::MAX);
    if declared != buf.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: buf.len(),
        });
    }

    let kind = reader.u8()?;
    if kind != KIND_ARGUMENT_MAP {
        return Err(DecodeError::UnknownKind(kind));
    }

    let mid_len = usize::from(reader.u8()?);
    let message_id = reader.string(mid_len, "message id")?;

    let mut args = Vec::new();
    while !reader.is_empty() {
        let key_len = usize::from(reader.u8()?);
        let key = reader.string(key_len, "key")?;
        let value_type = reader.u8()?;
        if value_type != VALUE_TYPE_UTF8 {
            return Err(DecodeError::UnknownValueType(value_type));
        }
        let value_len = reader.u24()?;
        let value = reader.string(value_len, "value")?;
        args.push((key, value));
    }

    Ok(Frame { message_id, args })
}

/// Read the declared total length from the first four bytes of a frame.
///
/// Returns `None` when fewer than four bytes are available.
pub fn frame_len(prefix: &[u8]) -> Option<usize> {
    let bytes: [u8; 4] = prefix.get(..4)?.try_into().ok()?;
    usize::try_from(u32::from_be_bytes(bytes)).ok()
}

/// Forward-only cursor over a frame buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    const fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let truncated = DecodeError::Truncated {
            offset: self.pos,
            needed: n,
        };
        let end = self.pos.checked_add(n).ok_or_else(|| truncated.clone())?;
        let slice = self.buf.get(self.pos..end).ok_or(truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        let [b] = self.array::<1>()?;
        Ok(b)
    }

    fn u24(&mut self) -> Result<usize, DecodeError> {
        let [hi, mid, lo] = self.array::<3>()?;
        Ok((usize::from(hi) << 16) | (usize::from(mid) << 8) | usize::from(lo))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.array::<4>()?))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let offset = self.pos;
        self.take(N)?
            .try_into()
            .map_err(|_err| DecodeError::Truncated { offset, needed: N })
    }

    fn string(&mut self, n: usize, field: &'static str) -> Result<String, DecodeError> {
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec()).map_err(|_err| DecodeError::InvalidUtf8 { field })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    #[test]
    fn hello_frame_matches_known_bytes() {
        let frame = encode("HELLO", &[("name", "MVPTracker")]).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&30u32.to_be_bytes());
        expected.push(0);
        expected.push(5);
        expected.extend_from_slice(b"HELLO");
        expected.push(4);
        expected.extend_from_slice(b"name");
        expected.push(1);
        expected.extend_from_slice(&[0, 0, 10]);
        expected.extend_from_slice(b"MVPTracker");

        assert_eq!(frame, expected);
        assert_eq!(frame.len(), 30);
    }

    #[test]
    fn length_prefix_counts_itself() {
        let frame = encode("busComm", &[]).unwrap();
        assert_eq!(frame_len(&frame), Some(frame.len()));
        assert_eq!(frame.len(), 4 + 1 + 1 + 7);
    }

    #[test]
    fn arguments_keep_their_order() {
        let frame = encode("busComm", &[("player", "all"), ("comm", "p hi")]).unwrap();
        let decoded = decode(&frame).unwrap();
        let keys: Vec<&str> = decoded.args.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["player", "comm"]);
    }

    #[test]
    fn bus_comm_text_survives_a_round_trip() {
        let text = "DEAD: Golden Thief Bug died at 23:59:59 \u{2014} \u{1F480}";
        let comm = format!("p {text}");
        let frame = encode("busComm", &[("player", "all"), ("comm", &comm)]).unwrap();
        let decoded = decode(&frame).unwrap();

        assert_eq!(decoded.message_id, "busComm");
        assert_eq!(decoded.get("player"), Some("all"));
        let recovered = decoded.get("comm").and_then(|c| c.strip_prefix("p "));
        assert_eq!(recovered, Some(text));
    }

    #[test]
    fn value_at_the_24_bit_ceiling_encodes() {
        let value = "x".repeat(MAX_VALUE_LEN);
        let frame = encode("busComm", &[("comm", &value)]).unwrap();
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.get("comm").map(str::len), Some(MAX_VALUE_LEN));
    }

    #[test]
    fn value_past_the_ceiling_is_rejected() {
        let value = "x".repeat(MAX_VALUE_LEN + 1);
        let err = encode("busComm", &[("comm", &value)]).unwrap_err();
        assert!(matches!(err, EncodingError::ValueTooLong { len, .. } if len == MAX_VALUE_LEN + 1));
    }

    #[test]
    fn long_message_id_is_rejected() {
        let mid = "m".repeat(256);
        let err = encode(&mid, &[]).unwrap_err();
        assert!(matches!(err, EncodingError::MessageIdTooLong { len: 256 }));
        assert!(encode(&"m".repeat(255), &[]).is_ok());
    }

    #[test]
    fn long_key_is_rejected() {
        let key = "k".repeat(256);
        let err = encode("busComm", &[(&key, "v")]).unwrap_err();
        assert!(matches!(err, EncodingError::KeyTooLong { len: 256 }));
    }

    #[test]
    fn decode_rejects_truncated_frames() {
        let frame = encode("HELLO", &[("name", "MVPTracker")]).unwrap();
        let cut = frame.get(..frame.len() - 3).unwrap();
        assert!(matches!(decode(cut), Err(DecodeError::LengthMismatch { .. })));
        assert!(matches!(decode(&[0, 0]), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn decode_rejects_unknown_kind_and_type() {
        let mut frame = encode("HELLO", &[("name", "x")]).unwrap();
        frame[4] = 7;
        assert_eq!(decode(&frame), Err(DecodeError::UnknownKind(7)));

        let mut frame = encode("HELLO", &[("name", "x")]).unwrap();
        // 6 header + 5 mid + 1 key len + 4 key = type tag offset
        frame[16] = 2;
        assert_eq!(decode(&frame), Err(DecodeError::UnknownValueType(2)));
    }

    #[test]
    fn decode_rejects_value_overrunning_the_frame() {
        let mut frame = encode("HELLO", &[("name", "x")]).unwrap();
        // bump the value length from 1 to 2 without adding bytes
        frame[19] = 2;
        assert!(matches!(decode(&frame), Err(DecodeError::Truncated { .. })));
    }
}
