//! Bit-level reader and writer for densely packed fixed-width fields.
//!
//! Fields are stored most-significant bit first and may straddle byte
//! boundaries. The reader is a stateless function of `(bytes, offset, width)`
//! so any field can be extracted independently of the ones before it.

/// Largest field the reader and writer handle.
pub const MAX_FIELD_BITS: u32 = 32;

/// Read `width` bits starting at absolute bit `bit_offset`.
///
/// Returns the field right-justified in a `u32`, or `None` when the field
/// would run past the end of `bytes` or `width` is not in `1..=32`.
///
/// A 32-bit field at a non-zero offset touches five source bytes, which is
/// why the accumulator is a `u64`.
pub fn read_bits(bytes: &[u8], bit_offset: usize, width: u32) -> Option<u32> {
    if width == 0 || width > MAX_FIELD_BITS {
        return None;
    }
    let end = bit_offset.checked_add(width as usize)?;
    if end > bytes.len().checked_mul(8)? {
        return None;
    }

    let first = bit_offset / 8;
    let last = (end - 1) / 8;

    let mut acc: u64 = 0;
    for &byte in &bytes[first..=last] {
        acc = (acc << 8) | byte as u64;
    }

    let span_bits = (last - first + 1) * 8;
    let trailing = span_bits - (bit_offset % 8) - width as usize;
    let mask = (1u64 << width) - 1;
    Some(((acc >> trailing) & mask) as u32)
}

/// Appends fixed-width fields to a byte buffer with no padding between them.
///
/// The final byte is zero-padded on the right.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    buf: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer sized for `fields` fields of `width` bits.
    pub fn with_capacity(fields: usize, width: u32) -> Self {
        Self {
            buf: Vec::with_capacity((fields * width as usize + 7) / 8),
            bit_len: 0,
        }
    }

    /// Append the low `width` bits of `value`, most significant first.
    ///
    /// # Panics
    ///
    /// Panics if `width` is greater than 32.
    pub fn write_bits(&mut self, value: u32, width: u32) {
        assert!(width <= MAX_FIELD_BITS, "field wider than 32 bits");
        for i in (0..width).rev() {
            if self.bit_len % 8 == 0 {
                self.buf.push(0);
            }
            if (value >> i) & 1 == 1 {
                let idx = self.bit_len / 8;
                self.buf[idx] |= 0x80 >> (self.bit_len % 8);
            }
            self.bit_len += 1;
        }
    }

    /// Number of bits written so far.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Finish and return the packed bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
