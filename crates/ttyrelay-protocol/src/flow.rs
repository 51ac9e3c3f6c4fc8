//! Byte counters for output acknowledgement.
//!
//! Both sides count output bytes modulo 2^28. A renderer reports how much it
//! has consumed with `RECEIVED`, and the backlog is the wrapped difference.

pub const MASK28: u32 = 0x0FFF_FFFF;

/// Advance a 28-bit counter by `n` bytes.
pub fn advance(counter: u32, n: usize) -> u32 {
    // Only the low 28 bits of n matter.
    counter.wrapping_add((n as u64 & MASK28 as u64) as u32) & MASK28
}

/// Bytes written but not yet confirmed, in `[0, 2^28)`.
pub fn backlog(written: u32, confirmed: u32) -> u32 {
    written.wrapping_sub(confirmed) & MASK28
}
