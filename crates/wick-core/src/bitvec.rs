//! Fixed-size bit-vector pack/unpack helpers.
//!
//! Hosts use these to ship per-joint flag sets (e.g. which joints carry
//! live data this frame) in a compact wire form.

/// Number of bytes needed to store `num_bits` bits.
pub fn bit_vector_size(num_bits: usize) -> usize {
    num_bits.div_ceil(8)
}

/// Write `num_bits` bits into `buffer`, reading each bit from `f(i)`.
/// Returns the number of bytes written.
///
/// # Panics
/// Panics if `buffer` is smaller than [`bit_vector_size`]`(num_bits)`.
pub fn write_bit_vector<F: FnMut(usize) -> bool>(
    buffer: &mut [u8],
    num_bits: usize,
    mut f: F,
) -> usize {
    let num_bytes = bit_vector_size(num_bits);
    assert!(buffer.len() >= num_bytes);
    buffer[..num_bytes].fill(0);
    for i in 0..num_bits {
        if f(i) {
            buffer[i / 8] |= 1 << (i % 8);
        }
    }
    num_bytes
}

/// Read `num_bits` bits from `buffer`, handing each to `f(i, value)`.
/// Returns the number of bytes read.
///
/// # Panics
/// Panics if `buffer` is smaller than [`bit_vector_size`]`(num_bits)`.
pub fn read_bit_vector<F: FnMut(usize, bool)>(buffer: &[u8], num_bits: usize, mut f: F) -> usize {
    let num_bytes = bit_vector_size(num_bits);
    assert!(buffer.len() >= num_bytes);
    for i in 0..num_bits {
        f(i, buffer[i / 8] & (1 << (i % 8)) != 0);
    }
    num_bytes
}
