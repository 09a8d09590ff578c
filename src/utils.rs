//! Utility functions.

use std::io::Write;

/// Aligns an offset or size up to the next multiple of `align`.
/// `align` must be a power of two.
pub fn align_up(value: u32, align: u32) -> u32 {
    assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Encodes `s` as UTF-8 followed by a single NUL byte.
pub fn utf8z(s: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(s.len() + 1);
    bytes.extend_from_slice(s.as_bytes());
    bytes.push(0);
    bytes
}

/// Encodes `s` as ASCII followed by a single NUL byte.
///
/// Every character becomes exactly one byte; anything outside ASCII is
/// written as `?`.
pub fn asciiz(s: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = s
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect();
    bytes.push(0);
    bytes
}

/// Appends `count` zero bytes to `w`.
pub fn write_zeros<W: Write + ?Sized>(w: &mut W, count: usize) -> std::io::Result<()> {
    const ZEROS: [u8; 16] = [0; 16];
    let mut left = count;
    while left > 0 {
        let n = left.min(ZEROS.len());
        w.write_all(&ZEROS[..n])?;
        left -= n;
    }
    Ok(())
}
