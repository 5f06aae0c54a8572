//! Fixed-point requantization helpers shared by every convolution variant.
//!
//! Multipliers are Q0.31 values in `[2^30, 2^31)`; a non-negative `shift`
//! scales up before the multiply, a negative one rounds down afterwards.

/// High 32 bits of `2 * a * b`, rounded; saturates the single overflow case
/// `a == b == i32::MIN`.
#[inline]
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN { return i32::MAX; }
    let ab = i64::from(a) * i64::from(b);
    let nudge = if ab >= 0 { 1i64 << 30 } else { 1 - (1i64 << 30) };
    // i64 division truncates toward zero
    ((ab + nudge) / (1i64 << 31)) as i32
}

/// `x / 2^exponent`, rounding half away from zero.
#[inline]
pub fn rounding_divide_by_pot(x: i32, exponent: i32) -> i32 {
    debug_assert!((0..=31).contains(&exponent), "exponent {} out of range", exponent);
    let mask = ((1i64 << exponent) - 1) as i32;
    let remainder = x & mask;
    let threshold = (mask >> 1) + i32::from(x < 0);
    (x >> exponent) + i32::from(remainder > threshold)
}

/// Rescale a 32-bit accumulator by `multiplier * 2^(shift - 31)`.
#[inline]
pub fn multiply_by_quantized_multiplier(x: i32, multiplier: i32, shift: i32) -> i32 {
    let left_shift = shift.max(0);
    let right_shift = (-shift).max(0);
    debug_assert!(left_shift <= 31, "left shift {} too large", left_shift);
    let shifted = (i64::from(x) << left_shift).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    rounding_divide_by_pot(saturating_rounding_doubling_high_mul(shifted, multiplier), right_shift)
}

/// Rescale a 64-bit accumulator. The multiplier is first reduced to Q0.15,
/// then `(x * reduced + 2^(s-1)) >> s` with `s = 15 - shift`, so ties round
/// toward positive infinity.
#[inline]
pub fn multiply_by_quantized_multiplier_i64(x: i64, multiplier: i32, shift: i32) -> i32 {
    debug_assert!(multiplier >= 0, "negative multiplier {}", multiplier);
    debug_assert!((-31..8).contains(&shift), "shift {} out of range", shift);
    debug_assert!((-(1i64 << 47)..(1i64 << 47)).contains(&x), "accumulator {} exceeds 48 bits", x);
    let reduced: i32 = if multiplier < 0x7FFF_0000 { (multiplier + (1 << 15)) >> 16 } else { 0x7FFF };
    let total_shift = 15 - shift;
    let x = x * i64::from(reduced) + (1i64 << (total_shift - 1));
    (x >> total_shift) as i32
}

/// Accumulator width used by the 16-bit engine.
pub trait AccumScalar: Copy + Default + Send + Sync + std::fmt::Debug + 'static {
    /// Inclusive shift range [`AccumScalar::rescale`] accepts.
    const SHIFT_RANGE: (i32, i32);

    fn from_i32(v: i32) -> Self;
    /// Two's-complement sum, as the hardware accumulator behaves.
    fn add_wrapping(self, other: Self) -> Self;
    fn rescale(self, multiplier: i32, shift: i32) -> i32;
}

impl AccumScalar for i32 {
    const SHIFT_RANGE: (i32, i32) = (-31, 31);

    #[inline]
    fn from_i32(v: i32) -> Self { v }
    #[inline]
    fn add_wrapping(self, other: Self) -> Self { self.wrapping_add(other) }
    #[inline]
    fn rescale(self, multiplier: i32, shift: i32) -> i32 { multiply_by_quantized_multiplier(self, multiplier, shift) }
}

impl AccumScalar for i64 {
    const SHIFT_RANGE: (i32, i32) = (-31, 7);

    #[inline]
    fn from_i32(v: i32) -> Self { i64::from(v) }
    #[inline]
    fn add_wrapping(self, other: Self) -> Self { self.wrapping_add(other) }
    #[inline]
    fn rescale(self, multiplier: i32, shift: i32) -> i32 { multiply_by_quantized_multiplier_i64(self, multiplier, shift) }
}
