use pretty_assertions::assert_eq;
use qconv::kernels::rescale::{saturating_rounding_doubling_high_mul, AccumScalar};
use qconv::kernels::{multiply_by_quantized_multiplier, multiply_by_quantized_multiplier_i64};
use qconv::params::{quantize_multiplier, IDENTITY_MULTIPLIER, IDENTITY_SHIFT};

const HALF: i32 = 1 << 30;
const SQRT_HALF: i32 = 1_518_500_250;

#[test]
fn narrow_rescale_pinned_values() {
    let cases: &[(i32, i32, i32, i32)] = &[
        (1, HALF, -1, 1),
        (-1, HALF, -1, 0),
        (3, HALF, -1, 1),
        (-3, HALF, -1, -1),
        (100, HALF, 0, 50),
        (-100, HALF, 0, -50),
        (5, HALF, 1, 5),
        (-128, HALF, 1, -128),
        (1000, SQRT_HALF, 0, 707),
        (100_000, SQRT_HALF, -2, 17_678),
        (i32::MAX, i32::MAX, 0, 2_147_483_646),
    ];
    for &(acc, m, s, want) in cases {
        assert_eq!(multiply_by_quantized_multiplier(acc, m, s), want, "acc={} m={} s={}", acc, m, s);
    }
}

#[test]
fn wide_rescale_pinned_values() {
    let cases: &[(i64, i32, i32, i32)] = &[
        (1, HALF, -1, 0),
        (2, HALF, -1, 1),
        (-2, HALF, -1, 0),
        (3, HALF, -1, 1),
        (-3, HALF, -1, -1),
        (1000, SQRT_HALF, 0, 707),
        (100_000, SQRT_HALF, -2, 17_677),
    ];
    for &(acc, m, s, want) in cases {
        assert_eq!(multiply_by_quantized_multiplier_i64(acc, m, s), want, "acc={} m={} s={}", acc, m, s);
    }
}

#[test]
fn identity_pair_leaves_accumulator_unchanged() {
    assert_eq!(quantize_multiplier(1.0), (IDENTITY_MULTIPLIER, IDENTITY_SHIFT));
    for x in [-(1 << 29), -70_000, -129, -1, 0, 1, 127, 32_767, 1 << 29] {
        assert_eq!(multiply_by_quantized_multiplier(x, IDENTITY_MULTIPLIER, IDENTITY_SHIFT), x);
        assert_eq!(multiply_by_quantized_multiplier_i64(i64::from(x), IDENTITY_MULTIPLIER, IDENTITY_SHIFT), x);
    }
}

#[test]
fn left_shift_saturates_instead_of_wrapping() {
    assert_eq!(multiply_by_quantized_multiplier(1 << 30, HALF, 2), multiply_by_quantized_multiplier(i32::MAX, HALF, 0));
    assert_eq!(saturating_rounding_doubling_high_mul(i32::MIN, i32::MIN), i32::MAX);
}

#[test]
fn accum_scalar_dispatches_to_matching_width() {
    assert_eq!(AccumScalar::rescale(100_000i32, SQRT_HALF, -2), 17_678);
    assert_eq!(AccumScalar::rescale(100_000i64, SQRT_HALF, -2), 17_677);
    assert_eq!(<i64 as AccumScalar>::from_i32(-5), -5i64);
}

#[test]
fn quantized_multiplier_reproduces_real_scale() {
    for real in [0.0123, 0.5, 0.9, 1.7, 3.25] {
        let (m, s) = quantize_multiplier(real);
        assert!((HALF..=i32::MAX).contains(&m), "multiplier {} for {}", m, real);
        let back = f64::from(m) * 2f64.powi(s - 31);
        assert!((back - real).abs() < 1e-8, "{} -> ({}, {}) -> {}", real, m, s, back);
    }
}
