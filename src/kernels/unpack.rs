/// Expand densely packed signed int4 values into one `i8` per element.
///
/// Element `i` lives in byte `i / 2`: even indices in the low nibble, odd
/// indices in the high nibble. Nibbles `8..=15` sign-extend to `-8..=-1`.
/// Returns the filled prefix of `out`.
///
/// # Panics
/// If `out` holds fewer than `count` elements or `packed` fewer than
/// `count.div_ceil(2)` bytes.
pub fn unpack_dense_i4<'o>(packed: &[u8], count: usize, out: &'o mut [i8]) -> &'o [i8] {
    assert!(out.len() >= count, "unpack scratch holds {} elements, need {}", out.len(), count);
    assert!(packed.len() * 2 >= count, "packed buffer holds {} bytes, need {}", packed.len(), (count + 1) / 2);
    let pairs = count / 2;
    for (i, &byte) in packed[..pairs].iter().enumerate() {
        out[2 * i] = low_nibble(byte);
        out[2 * i + 1] = high_nibble(byte);
    }
    if count % 2 != 0 {
        out[count - 1] = low_nibble(packed[pairs]);
    }
    &out[..count]
}

#[inline]
fn low_nibble(byte: u8) -> i8 { ((byte << 4) as i8) >> 4 }

#[inline]
fn high_nibble(byte: u8) -> i8 { (byte as i8) >> 4 }

/// Pack `values` (each clamped to `-8..=7`) two per byte, low nibble first.
pub fn pack_dense_i4(values: &[i8]) -> Vec<u8> {
    let mut out = vec![0u8; (values.len() + 1) / 2];
    for (i, &v) in values.iter().enumerate() {
        let nibble = (v.clamp(-8, 7) as u8) & 0x0F;
        if i % 2 == 0 { out[i / 2] |= nibble; } else { out[i / 2] |= nibble << 4; }
    }
    out
}
