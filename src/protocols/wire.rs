//! Siphon's binary push protocol.
//!
//! One datagram carries exactly one metric:
//!
//! ```text
//! |timestamp(4)|value(8)|name\0tag1\0tag2\0tag3|
//!     u32 LE     i64 LE   NUL separated UTF-8
//! ```
//!
//! Only the name is mandatory in the tail. Tags past the third are dropped.
//! The timestamp is seconds since the Unix epoch and so runs out in 2106.

use byteorder::{ByteOrder, LittleEndian};
use crate::constants::{FRAME_PREFIX_LEN, MIN_FRAME_LEN};
use crate::metric::Metric;

/// Why a frame could not be turned into a `Metric`.
///
/// With the 13 byte floor the numeric prefix can never be cut short, so this
/// is the only way decoding fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The frame has fewer than 13 bytes.
    #[error("invalid incoming message: {len} bytes, need at least 13")]
    TooShort {
        /// Length of the rejected frame.
        len: usize,
    },
}

/// Why a `Metric` could not be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The timestamp is before 1970 or after 2106.
    #[error("timestamp {0} does not fit in 32 unsigned bits of seconds")]
    TimestampOutOfRange(i64),
}

/// Decode one frame.
///
/// The decoder is pure; it is safe to call from any number of listeners at
/// once. An empty name is passed through as is. Strings that are not valid
/// UTF-8 are decoded lossily.
///
/// # Examples
///
/// ```
/// use siphon::protocols::wire::decode;
///
/// let mut frame = Vec::new();
/// frame.extend_from_slice(&1_700_000_000u32.to_le_bytes());
/// frame.extend_from_slice(&42i64.to_le_bytes());
/// frame.extend_from_slice(b"cpu\0host1");
///
/// let m = decode(&frame).unwrap();
/// assert_eq!("cpu", m.name);
/// assert_eq!(42, m.value);
/// assert_eq!("host1", m.tag1);
/// ```
pub fn decode(payload: &[u8]) -> Result<Metric, DecodeError> {
    if payload.len() < MIN_FRAME_LEN {
        return Err(DecodeError::TooShort { len: payload.len() });
    }

    let secs = LittleEndian::read_u32(&payload[0..4]);
    let value = LittleEndian::read_i64(&payload[4..FRAME_PREFIX_LEN]);

    let mut strings = payload[FRAME_PREFIX_LEN..].split(|b| *b == 0).map(utf8);
    let name = strings.next().unwrap_or_default();

    Ok(Metric::new(name, value)
        .timestamp_secs(secs)
        .tags(strings.take(3)))
}

#[inline]
fn utf8(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Append the wire encoding of `metric` to `buf`.
///
/// Trailing empty tags are not written, so a metric with only `tag1` set
/// produces `name\0tag1`.
pub fn encode(metric: &Metric, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    let secs = metric.timestamp.timestamp();
    if secs < 0 || secs > i64::from(u32::max_value()) {
        return Err(EncodeError::TimestampOutOfRange(secs));
    }
    let mut prefix = [0u8; FRAME_PREFIX_LEN];
    LittleEndian::write_u32(&mut prefix[0..4], secs as u32);
    LittleEndian::write_i64(&mut prefix[4..], metric.value);
    buf.extend_from_slice(&prefix);
    buf.extend_from_slice(metric.name.as_bytes());

    let tags = [&metric.tag1, &metric.tag2, &metric.tag3];
    let used = tags.iter().rposition(|t| !t.is_empty()).map_or(0, |i| i + 1);
    for tag in &tags[..used] {
        buf.push(0);
        buf.extend_from_slice(tag.as_bytes());
    }
    Ok(())
}
