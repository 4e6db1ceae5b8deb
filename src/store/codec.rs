//! # Slot Codec
//!
//! Length-prefixed string encoding for fixed-size store slots.
//!
//! A slot with `max_length = N` occupies `N + 1` bytes:
//!
//! ```text
//! [len][data 0..len][0x00][0x00 padding ...]
//!  1     len <= N-1   1     up to slot end
//! ```
//!
//! The length byte is never trusted on the way back out: a corrupted value is
//! clamped to `N - 1` so decoding stays inside the slot.

/// Size in bytes of a slot that holds at most `max_length - 1` data bytes
pub const fn slot_size(max_length: usize) -> usize {
    max_length + 1
}

/// Encode `value` into `slot`
///
/// `slot.len()` must be `max_length + 1` (see [`slot_size`]). Input longer
/// than `max_length - 1` bytes is truncated silently.
///
/// # Returns
///
/// * `usize` - Number of data bytes actually stored
///
/// # Examples
///
/// ```
/// use geolinker_agent::store::codec::{encode, slot_size};
///
/// let mut slot = [0xAAu8; slot_size(12)];
/// assert_eq!(encode(&mut slot, b"48.117300"), 9);
/// assert_eq!(slot[0], 9);
/// assert_eq!(slot[10], 0);
/// ```
pub fn encode(slot: &mut [u8], value: &[u8]) -> usize {
    if slot.len() < 2 {
        slot.fill(0);
        return 0;
    }

    let max_length = slot.len() - 1;
    let len = value.len().min(max_length - 1);

    slot[0] = len as u8;
    slot[1..1 + len].copy_from_slice(&value[..len]);
    // Terminator and zero padding through the end of the slot
    slot[1 + len..].fill(0);

    len
}

/// Decode the data bytes stored in `slot`
///
/// Never reads past the slot: an out-of-range length byte is clamped to
/// `max_length - 1`.
pub fn decode(slot: &[u8]) -> &[u8] {
    if slot.len() < 2 {
        return &[];
    }

    let max_length = slot.len() - 1;
    let len = clamp_length(slot[0], max_length);

    &slot[1..1 + len]
}

/// Clamp a stored length byte to what a slot of `max_length` can hold
pub fn clamp_length(stored: u8, max_length: usize) -> usize {
    let stored = stored as usize;
    if stored >= max_length {
        max_length.saturating_sub(1)
    } else {
        stored
    }
}
