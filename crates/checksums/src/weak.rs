//! crates/checksums/src/weak.rs
//!
//! Additive rolling checksum over a fixed-size window.
//!
//! The checksum is the classic rsync pair of 16-bit halves: `a` sums the
//! window bytes and `b` sums the bytes weighted by their distance from the
//! window end. Both halves wrap modulo 2^16 and are packed into a `u32` as
//! `(b << 16) | a`. Sliding the window by one byte is an O(1) update, which
//! is what makes scanning a seed file at every offset affordable.

/// Computes the weak checksum of `data` in one shot.
///
/// Bytes contribute as signed 8-bit values, matching the wire format of
/// existing artifacts. The window size is the buffer length.
///
/// # Examples
///
/// ```
/// use checksums::weak_checksum;
///
/// assert_eq!(weak_checksum(b"0123456789"), 183_829_005);
/// ```
#[must_use]
pub fn weak_checksum(data: &[u8]) -> u32 {
    let len = data.len();
    let mut a: u16 = 0;
    let mut b: u16 = 0;

    for (i, &byte) in data.iter().enumerate() {
        let value = byte as i8 as u16;
        a = a.wrapping_add(value);
        b = b.wrapping_add(((len - i) as u16).wrapping_mul(value));
    }

    (u32::from(b) << 16) | u32::from(a)
}

/// Slides the checksum window across one block of new data, one byte at a
/// time.
///
/// `window_pair` holds exactly `2 * size` bytes: the previous window in
/// `window_pair[..size]` and the incoming block in `window_pair[size..]`.
/// On the very first call the previous window must be a zero sentinel; on
/// subsequent calls it is the block processed by the previous call, so the
/// rolling state carries across block boundaries when the returned value is
/// passed back in as `running`.
///
/// After each byte the callback receives `(offset, wcs)` where `offset` is
/// the window start relative to the incoming block's first byte (always in
/// `-(size - 1)..=0`) and `wcs` is the checksum of the `size` bytes starting
/// there. The value after the final byte is returned.
///
/// Rolling and one-shot computation agree at every position:
///
/// ```
/// use checksums::{weak_checksum, weak_checksum_roll};
///
/// let mut pair = vec![0u8; 8];
/// pair[4..].copy_from_slice(b"wxyz");
/// let rolled = weak_checksum_roll(&pair, 4, 0, |offset, wcs| {
///     if offset == 0 {
///         assert_eq!(wcs, weak_checksum(b"wxyz"));
///     }
/// });
/// assert_eq!(rolled, weak_checksum(b"wxyz"));
/// ```
pub fn weak_checksum_roll(
    window_pair: &[u8],
    size: usize,
    running: u32,
    mut callback: impl FnMut(i64, u32),
) -> u32 {
    assert_eq!(window_pair.len(), 2 * size, "window pair must be twice the window size");

    let mut a = running as u16;
    let mut b = (running >> 16) as u16;
    let weight = size as u16;

    for i in 0..size {
        let incoming = window_pair[size + i] as i8 as u16;
        let outgoing = window_pair[i] as i8 as u16;
        a = a.wrapping_add(incoming).wrapping_sub(outgoing);
        b = b.wrapping_add(a).wrapping_sub(weight.wrapping_mul(outgoing));
        callback(i as i64 + 1 - size as i64, (u32::from(b) << 16) | u32::from(a));
    }

    (u32::from(b) << 16) | u32::from(a)
}
