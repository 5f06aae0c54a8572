use criterion::{black_box, criterion_group, criterion_main, Criterion};
use qconv::kernels::{multiply_by_quantized_multiplier, multiply_by_quantized_multiplier_i64};
use qconv::kernels::unpack_dense_i4;

fn accumulators() -> Vec<i32> {
    let mut seed = 0x9E37_79B9u32;
    (0..4096)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed as i32) >> 8
        })
        .collect()
}

fn bench_rescale(c: &mut Criterion) {
    let accs = accumulators();
    c.bench_function("rescale_i32_4096", |b| {
        b.iter(|| {
            let mut sum = 0i64;
            for &a in &accs {
                sum += i64::from(multiply_by_quantized_multiplier(black_box(a), 1_518_500_250, -3));
            }
            black_box(sum)
        })
    });
    c.bench_function("rescale_i64_4096", |b| {
        b.iter(|| {
            let mut sum = 0i64;
            for &a in &accs {
                sum += i64::from(multiply_by_quantized_multiplier_i64(black_box(i64::from(a)), 1_518_500_250, -3));
            }
            black_box(sum)
        })
    });
}

fn bench_unpack(c: &mut Criterion) {
    let packed: Vec<u8> = (0..8192u32).map(|i| (i.wrapping_mul(37) & 0xFF) as u8).collect();
    let mut out = vec![0i8; packed.len() * 2];
    c.bench_function("unpack_i4_16k", |b| {
        b.iter(|| {
            let n = out.len();
            black_box(unpack_dense_i4(black_box(&packed), n, &mut out).len())
        })
    });
}

criterion_group!(benches, bench_rescale, bench_unpack);
criterion_main!(benches);
