//! Library level constants

/// MIO token used to distinguish shutdown events from socket readiness.
///
/// Note - It is assumed that the listener will not hold more than 2048
/// sockets, 0 indexed.
pub const SYSTEM: mio::Token = mio::Token(2048);

/// Capacity of the ingestion queue when the configuration does not say
/// otherwise.
pub const QUEUE_CAPACITY: usize = 1_000;

/// Largest datagram the listener will read in one go, 1 MiB.
pub const MAX_FRAME_SIZE: usize = 1_048_576;

/// Fixed prefix of a wire frame: u32 timestamp plus i64 value.
pub const FRAME_PREFIX_LEN: usize = 12;

/// Smallest frame the decoder accepts: the prefix and one byte of name.
pub const MIN_FRAME_LEN: usize = FRAME_PREFIX_LEN + 1;
